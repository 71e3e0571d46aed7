use shelf_core::config::EngineConfig;
use shelf_core::BookId;

use crate::commands::common::{normalize_book_identifier, open_engine, settle};
use crate::error::CliError;

pub async fn run_remove(id: &str, config: &EngineConfig) -> Result<(), CliError> {
    let id = BookId::new(normalize_book_identifier(id)?);
    let coordinator = open_engine(config)?;

    if coordinator.local().get(&id).await?.is_none() {
        return Err(CliError::BookNotFound(id.to_string()));
    }
    coordinator.remove(&id).await?;
    settle(&coordinator).await;

    println!("{id}");
    Ok(())
}
