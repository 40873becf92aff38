use clap::Parser;
use tracing_subscriber::EnvFilter;

use screepsdash::cli::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(error) = Cli::parse().run().await {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}
