use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Keep a personal book collection that works offline and syncs when it can")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a book by hand
    #[command(alias = "new")]
    Add {
        /// Book title
        title: Vec<String>,
        /// Author name
        #[arg(short, long, default_value = "")]
        author: String,
        /// Publication year
        #[arg(short, long, default_value = "")]
        year: String,
    },
    /// List the collection, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the collection by title or author
    Search {
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up books in the online catalog
    Find {
        /// Search query
        query: String,
        /// Save the Nth result (1-based) to the collection
        #[arg(long, value_name = "N")]
        save: Option<usize>,
    },
    /// Remove a book from the collection
    #[command(alias = "rm")]
    Remove {
        /// Book ID
        id: String,
    },
    /// Push every book with unsynced changes now
    Sync,
    /// Pull the cloud copy of the collection into this device
    Restore,
    /// Keep syncing in the foreground until interrupted
    Watch,
    /// Manage the identity the collection is stored under
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Show the current identity
    Status,
    /// Sign in to an existing account (replaces the current identity)
    Login {
        /// Account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Attach an email and password to the current anonymous identity
    Upgrade {
        /// Account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Sign out and continue with a fresh anonymous identity
    Logout,
}
