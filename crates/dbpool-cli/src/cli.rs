//! dbpool - run statements against pooled database targets
//!
//! Loads a pools configuration file, starts one pool per target plus the
//! idle monitor, runs one command, and tears everything down again.
//!
//! # Usage
//!
//! ```text
//! dbpool --config pools.toml list
//! dbpool --config pools.toml query main "SELECT * FROM items"
//! dbpool --config pools.toml --json exec main "DELETE FROM items WHERE id = 3"
//! ```

mod commands;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dbpool_connection::DatabasePools;
use dbpool_core::PoolsConfig;
use dbpool_drivers::DriverRegistry;

#[derive(Parser, Debug)]
#[command(name = "dbpool", version, about = "Pooled database connections from the command line")]
struct Cli {
    /// Pools configuration file
    #[arg(long, short, env = "DBPOOL_CONFIG")]
    config: PathBuf,

    /// Print results and logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List the configured targets and their pools
    List,
    /// Run a query and print the rows
    Query {
        /// Target name
        name: String,
        /// SQL text
        sql: String,
    },
    /// Execute a statement and commit it
    Exec {
        /// Target name
        name: String,
        /// SQL text
        sql: String,
    },
    /// Open and close one connection per target
    Check,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    let config = PoolsConfig::from_path(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let pools = DatabasePools::new(Arc::new(DriverRegistry::with_defaults()));
    pools.startup(&config).context("failed to start database pools")?;

    let result = commands::run(&pools, &cli.command, cli.json).await;
    pools.destroy().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "dbpool",
            "--config",
            "pools.toml",
            "query",
            "main",
            "SELECT 1",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("pools.toml"));
        assert!(!cli.json);
        assert_eq!(
            cli.command,
            Command::Query {
                name: "main".into(),
                sql: "SELECT 1".into(),
            }
        );
    }

    #[test]
    fn test_json_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["dbpool", "-c", "pools.toml", "list", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.command, Command::List);
    }

    #[test]
    fn test_exec_needs_sql() {
        assert!(Cli::try_parse_from(["dbpool", "-c", "pools.toml", "exec", "main"]).is_err());
    }
}
