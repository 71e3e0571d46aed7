use shelf_core::config::EngineConfig;

use crate::commands::common::{normalize_search_query, open_engine, print_books};
use crate::error::CliError;

pub async fn run_list(as_json: bool, config: &EngineConfig) -> Result<(), CliError> {
    let coordinator = open_engine(config)?;
    let books = coordinator.list_all().next().await?;
    print_books(&books, as_json)
}

pub async fn run_search(query: &str, as_json: bool, config: &EngineConfig) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let coordinator = open_engine(config)?;
    let books = coordinator.search_local(normalized_query).next().await?;
    print_books(&books, as_json)
}
