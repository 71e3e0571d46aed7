//! Data models for Shelf

mod book;

pub use book::{sanitize_id, Book, BookId, CoverSize};
