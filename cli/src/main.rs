//! A3S Refs CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_refs_cli::commands::{dispatch, Cli};
use a3s_refs_core::error::RefsError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli, config).await {
        match e.downcast_ref::<RefsError>() {
            Some(refs) if refs.is_conflict() => eprintln!("Conflict: {e}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}
