use shelf_core::config::EngineConfig;

use crate::commands::common::{
    format_catalog_lines, normalize_search_query, open_engine, select_result, settle,
};
use crate::error::CliError;

pub async fn run_find(
    query: &str,
    save: Option<usize>,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let coordinator = open_engine(config)?;

    let results = coordinator
        .search_remote_catalog(&normalized_query)
        .await
        .map_err(|error| CliError::Search(error.user_message()))?;

    let Some(selection) = save else {
        if results.is_empty() {
            println!("No results.");
        }
        for line in format_catalog_lines(&results) {
            println!("{line}");
        }
        return Ok(());
    };

    let chosen = select_result(&results, selection)?.clone();
    let saved = coordinator.save(chosen).await?;
    settle(&coordinator).await;
    println!("Saved \"{}\" ({})", saved.title, saved.id);
    Ok(())
}
