//! Shelf CLI - keep a personal book collection from the terminal
//!
//! Every change lands in the local database first and is pushed to the
//! cloud copy when the remote store is reachable.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::resolve_config;
use crate::commands::find::run_find;
use crate::commands::list::{run_list, run_search};
use crate::commands::remove::run_remove;
use crate::commands::sync::{run_restore, run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "shelf=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|error| CliError::Logging(format!("{error}")))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.db_path)?;
    tracing::debug!(db_path = %config.db_path.display(), "Resolved configuration");

    match cli.command {
        Commands::Add {
            title,
            author,
            year,
        } => run_add(&title, &author, &year, &config).await?,
        Commands::List { json } => run_list(json, &config).await?,
        Commands::Search { query, json } => run_search(&query, json, &config).await?,
        Commands::Find { query, save } => run_find(&query, save, &config).await?,
        Commands::Remove { id } => run_remove(&id, &config).await?,
        Commands::Sync => run_sync(&config).await?,
        Commands::Restore => run_restore(&config).await?,
        Commands::Watch => run_watch(&config).await?,
        Commands::Auth { command } => run_auth(command, &config).await?,
    }

    Ok(())
}
