// crates/cli/src/main.rs
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use datadict_cli::{run, Cli, Outcome};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "warn,datadict_jobs=info,datadict_client=info,datadict_cli=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("  \u{2717} {e:#}");
            Outcome::Unsuccessful.into()
        }
    }
}
