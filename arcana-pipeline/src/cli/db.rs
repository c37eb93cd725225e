//! Database management commands.

use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use crate::config::Settings;
use crate::storage::TradeStore;

/// Database subcommands.
#[derive(Subcommand)]
pub enum DbCommands {
    /// Initialize the schema (tables and hypertables)
    Init,
}

pub async fn execute(cmd: DbCommands) -> Result<()> {
    match cmd {
        DbCommands::Init => {
            let settings = Settings::load()?;
            info!("connecting to {}:{}...", settings.database.host, settings.database.port);
            let store =
                TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;
            store.init_schema().await?;
            println!("Database schema initialized successfully.");
            Ok(())
        }
    }
}
