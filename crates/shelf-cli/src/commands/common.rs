use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use shelf_core::config::EngineConfig;
use shelf_core::models::CoverSize;
use shelf_core::sync::SyncCoordinator;
use shelf_core::Book;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct BookListItem {
    pub id: String,
    pub title: String,
    pub author: String,
    pub year: String,
    pub cover_url: Option<String>,
    pub created_at: i64,
    pub relative_time: String,
    pub pending_sync: bool,
}

pub fn resolve_config(cli_db_path: Option<PathBuf>) -> Result<EngineConfig, CliError> {
    let mut config = EngineConfig::from_env()?;
    if let Some(db_path) = cli_db_path {
        config.db_path = db_path;
    }
    Ok(config)
}

pub fn open_engine(config: &EngineConfig) -> Result<SyncCoordinator, CliError> {
    Ok(config.build_coordinator()?)
}

/// Let background pushes finish before the process exits.
pub async fn settle(coordinator: &SyncCoordinator) {
    coordinator.flush().await;
}

pub fn format_book_lines(books: &[Book]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    books
        .iter()
        .map(|book| {
            let title = truncate(&book.title, 36);
            let author = truncate(&book.author, 24);
            let relative_time = format_relative_time(book.created_at, now_ms);
            let marker = if book.dirty { "*" } else { " " };
            format!(
                "{marker} {title:<36}  {author:<24}  {year:<6}  {relative_time:<10}  {}",
                book.id,
                year = book.year,
            )
        })
        .collect()
}

pub fn format_catalog_lines(books: &[Book]) -> Vec<String> {
    books
        .iter()
        .enumerate()
        .map(|(index, book)| {
            format!(
                "{:>2}. {}  ({}, {})",
                index + 1,
                truncate(&book.title, 60),
                book.author,
                book.year
            )
        })
        .collect()
}

pub fn book_to_list_item(book: &Book) -> BookListItem {
    let now_ms = Utc::now().timestamp_millis();
    BookListItem {
        id: book.id.to_string(),
        title: book.title.clone(),
        author: book.author.clone(),
        year: book.year.clone(),
        cover_url: book.cover_url(CoverSize::Medium),
        created_at: book.created_at,
        relative_time: format_relative_time(book.created_at, now_ms),
        pending_sync: book.dirty,
    }
}

pub fn print_books(books: &[Book], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json_items = books
            .iter()
            .map(book_to_list_item)
            .collect::<Vec<BookListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if books.is_empty() {
        println!("No books yet.");
        return Ok(());
    }
    for line in format_book_lines(books) {
        println!("{line}");
    }
    Ok(())
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < month {
        format!("{}d ago", diff / day)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_title(parts: &[String]) -> Result<String, CliError> {
    let title = parts.join(" ");
    let trimmed = title.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyTitle)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_book_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyBookId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Pick the 1-based `selection` out of `results`.
pub fn select_result(results: &[Book], selection: usize) -> Result<&Book, CliError> {
    selection
        .checked_sub(1)
        .and_then(|index| results.get(index))
        .ok_or(CliError::InvalidSelection(selection, results.len()))
}
