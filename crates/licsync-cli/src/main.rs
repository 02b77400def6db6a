use anyhow::Result;
use clap::{Parser, Subcommand};

use licsync_reconcile::LicenseStore;

mod commands;

#[derive(Parser)]
#[command(name = "licsync")]
#[command(about = "License monitoring sync CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,

        /// Layered config paths in merge order (default: LICSYNC_CONFIG)
        #[arg(long = "config", global = true)]
        config_paths: Vec<String>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Monitoring reconciliation
    Sync {
        #[command(subcommand)]
        cmd: SyncCmd,
    },

    /// License records
    License {
        #[command(subcommand)]
        cmd: LicenseCmd,

        /// Layered config paths in merge order (default: LICSYNC_CONFIG)
        #[arg(long = "config", global = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum SyncCmd {
    /// Drain every configured source once, print the run report.
    /// Exits non-zero when the store became unavailable mid-run.
    Once {
        /// Layered config paths in merge order (default: LICSYNC_CONFIG)
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum LicenseCmd {
    /// Print every license as one JSON object per line, newest first.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd, config_paths } => {
            let (_, cfg) = commands::load_config(&commands::config_paths_or_env(config_paths))?;
            let pool = commands::connect(&cfg).await?;
            match cmd {
                DbCmd::Status => {
                    let s = licsync_db::status(&pool).await?;
                    println!("db_ok={} has_licenses_table={}", s.ok, s.has_licenses_table);
                }
                DbCmd::Migrate => {
                    licsync_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = licsync_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Sync { cmd } => match cmd {
            SyncCmd::Once { config_paths } => commands::sync::run_once(config_paths).await?,
        },

        Commands::License { cmd, config_paths } => match cmd {
            LicenseCmd::List => {
                let (_, cfg) =
                    commands::load_config(&commands::config_paths_or_env(config_paths))?;
                let pool = commands::connect(&cfg).await?;
                let store = licsync_db::PgLicenseStore::new(pool);
                for license in store.list().await? {
                    println!("{}", serde_json::to_string(&license)?);
                }
            }
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable key=value output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
