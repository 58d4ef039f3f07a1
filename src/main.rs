//! pg-access - maintenance entry point.
//!
//! Checks connectivity and creates or drops the configured database.

use clap::Parser;
use pg_access::config::{Command, Config};
use pg_access::db::{Database, admin};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Maintenance database used for CREATE/DROP DATABASE.
const MAINTENANCE_DATABASE: &str = "postgres";

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db_config = &config.db;
    match config.command {
        Command::Ping => {
            let db = Database::connect(
                "postgres",
                &db_config.connection_url()?,
                db_config.instance_id.as_deref().unwrap_or_default(),
                &db_config.pool_options(),
                db_config.db_options(),
            )
            .await?;
            let version = db.server_version().await?;
            info!(
                server_version = %version,
                pool_size = db.pool().size(),
                "Database reachable"
            );
            println!("{} {}", db_config.database, version);
            db.close().await?;
        }
        Command::CreateDb => {
            let server_url = db_config.connection_url_for(MAINTENANCE_DATABASE)?;
            if admin::create_db_if_not_exists(&server_url, &db_config.database).await? {
                println!("created {}", db_config.database);
            } else {
                println!("{} already exists", db_config.database);
            }
        }
        Command::DropDb => {
            let server_url = db_config.connection_url_for(MAINTENANCE_DATABASE)?;
            admin::drop_db(&server_url, &db_config.database).await?;
            println!("dropped {}", db_config.database);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        host = %config.db.host,
        port = config.db.port,
        database = %config.db.database,
        "Starting pg-access v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(&config).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
