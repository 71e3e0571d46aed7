//! shelf-core - Core library for Shelf
//!
//! This crate contains the book model, the local store and the offline-first
//! sync engine used by every Shelf client. Clients talk to a
//! [`sync::SyncCoordinator`] and render the [`services::LiveQuery`] snapshots
//! it hands out; remote effects happen in the background.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Book, BookId};
pub use sync::start;
