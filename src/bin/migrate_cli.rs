//! CLI for applying database migrations (§10 "migrate_cli").

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codecell_core::config::Config;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Database migration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations under `migrations/`.
    Run,
    /// Print applied/pending migration status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Commands::Run => {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("failed to run migrations")?;
            println!("migrations applied");
        }
        Commands::Status => {
            let migrator = sqlx::migrate!("./migrations");
            for migration in migrator.iter() {
                println!("{:>20} {}", migration.version, migration.description);
            }
        }
    }

    Ok(())
}
