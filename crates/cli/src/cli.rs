// crates/cli/src/cli.rs
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use datadict_client::config::{API_TOKEN_ENV, API_URL_ENV, DEFAULT_API_URL};

pub const USER_ENV: &str = "DATADICT_USER";

#[derive(Parser, Debug)]
#[command(
    name = "datadict-import",
    version,
    about = "Start and watch data-dictionary import jobs"
)]
pub struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = API_URL_ENV, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// User the jobs belong to
    #[arg(long, global = true, env = USER_ENV)]
    pub user: Option<String>,

    /// Bearer token for the backend
    #[arg(long, global = true, env = API_TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,

    /// Print events and records as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an import job and watch it to the end
    Start {
        /// Connection config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Table to import; repeat for several. Defaults to the config's `selected_tables`
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },
    /// Resume the active import job and watch it
    Watch,
    /// Show one job
    Status { job_id: Uuid },
    /// List active jobs
    List,
    /// Cancel a job
    Cancel { job_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_tables() {
        let cli = Cli::parse_from([
            "datadict-import",
            "--api-url",
            "http://backend:8000",
            "--user",
            "alice",
            "start",
            "--config",
            "conn.json",
            "--table",
            "customers",
            "-t",
            "orders",
        ]);
        assert_eq!(cli.api_url, "http://backend:8000");
        assert_eq!(cli.user.as_deref(), Some("alice"));
        match cli.command {
            Commands::Start { config, tables } => {
                assert_eq!(config, PathBuf::from("conn.json"));
                assert_eq!(tables, vec!["customers", "orders"]);
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["datadict-import", "list", "--json", "--user", "bob"]);
        assert!(cli.json);
        assert_eq!(cli.user.as_deref(), Some("bob"));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_cancel_requires_uuid() {
        let err = Cli::try_parse_from(["datadict-import", "cancel", "not-a-uuid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
