use anyhow::Result;
use clap::Parser;
use cnab_reconciler::processor::{self, Envelope, ProcessError, ProcessingResult};
use cnab_reconciler::{config, db};
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Debug, Parser)]
#[command(author, version, about = "Process a CNAB return file for a contractor")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Contractor the file belongs to
    #[arg(long)]
    contractor: i64,
    /// Return file to process
    file: PathBuf,
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

    let bytes = tokio::fs::read(&args.file).await?;
    let content = String::from_utf8_lossy(&bytes);
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let envelope = match processor::process_return_file(
        &pool,
        Path::new(&cfg.app.storage_root),
        args.contractor,
        &content,
        &filename,
    )
    .await
    {
        Ok(result) => Envelope::ok("return file processed", result),
        Err(err) => {
            error!(?err, "failed to process return file");
            let message = match err {
                ProcessError::AlreadyProcessed(name) => {
                    format!("file {} was already processed", name)
                }
                ProcessError::Parse(parse) => format!("could not parse return file: {}", parse),
                ProcessError::Storage(_) | ProcessError::Db(_) => {
                    "could not process return file".to_string()
                }
            };
            let envelope = Envelope::<ProcessingResult>::nok(message);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
