//! Shipping-file generator: registers every receivable, untransmitted title
//! of a contractor with the bank via a CNAB400 remessa file.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use cnab_reconciler::processor::{self, Envelope, ShippingSummary};
use cnab_reconciler::{config, db};
use std::path::PathBuf;
use tracing::error;

#[derive(Debug, Parser)]
#[command(author, version, about = "Generate a CNAB shipping (remessa) file")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Contractor whose open titles should be registered
    #[arg(long)]
    contractor: i64,
    /// Beneficiary company name stamped in the file header
    #[arg(long)]
    company: String,
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

    let today = Utc::now().date_naive();
    let envelope = match processor::generate_shipping_file(
        &pool,
        &cfg,
        args.contractor,
        &args.company,
        today,
    )
    .await
    {
        Ok(Some(summary)) => Envelope::ok("shipping file generated", summary),
        Ok(None) => Envelope::<ShippingSummary>::nok("no titles awaiting registration"),
        Err(err) => {
            error!(?err, "failed to generate shipping file");
            let envelope =
                Envelope::<ShippingSummary>::nok("could not generate shipping file");
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
