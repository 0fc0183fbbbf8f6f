//! Notification worker: polls the mail outbox and delivers jobs to the
//! configured mail service until interrupted.

use anyhow::Result;
use clap::Parser;
use cnab_reconciler::mailer::WebhookMailer;
use cnab_reconciler::{config, db, outbox};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about = "Drain the notification outbox")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/reconciler.db", cfg.app.storage_root));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let mailer = WebhookMailer::from_config(&cfg.mailer);
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);
    let max_backoff = cfg.app.max_backoff_seconds as i64;

    info!("starting outbox worker");
    loop {
        match outbox::process_next_task(&pool, &mailer, max_backoff).await {
            Ok(processed) => {
                if !processed {
                    tokio::time::sleep(poll_sleep).await;
                }
            }
            Err(err) => {
                error!(?err, "outbox worker error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
