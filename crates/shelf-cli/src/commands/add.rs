use shelf_core::config::EngineConfig;
use shelf_core::Book;

use crate::commands::common::{normalize_title, open_engine, settle};
use crate::error::CliError;

pub async fn run_add(
    title_parts: &[String],
    author: &str,
    year: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let title = normalize_title(title_parts)?;

    let coordinator = open_engine(config)?;
    let book = coordinator
        .save(Book::manual(title, author.trim(), year.trim()))
        .await?;
    settle(&coordinator).await;

    println!("{}", book.id);
    Ok(())
}
