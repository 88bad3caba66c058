use std::process;

use clap::Parser;
use poweron_gate::{ci, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with reported results.
    let default_filter = if cli.debug {
        "warn,poweron_gate=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.execute().await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            if ci::is_github_actions() {
                ci::error(&format!("{e:#}"));
            }
            eprintln!("Error: {e}");

            let mut source = e.source();
            while let Some(err) = source {
                eprintln!("  Caused by: {err}");
                source = err.source();
            }

            process::exit(1);
        }
    }
}
