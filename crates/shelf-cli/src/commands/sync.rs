use std::sync::Arc;

use shelf_core::config::EngineConfig;

use crate::commands::common::{open_engine, settle};
use crate::error::CliError;

pub async fn run_sync(config: &EngineConfig) -> Result<(), CliError> {
    let coordinator = open_engine(config)?;
    let report = coordinator.sync_dirty_now().await?;

    if report.attempted == 0 {
        println!("Everything is synced.");
    } else {
        let pending = report.failed + report.superseded;
        println!(
            "Synced {} of {} books ({pending} still pending)",
            report.confirmed, report.attempted
        );
    }
    Ok(())
}

pub async fn run_restore(config: &EngineConfig) -> Result<(), CliError> {
    let coordinator = open_engine(config)?;
    let restored = coordinator
        .pull_now()
        .await
        .ok_or(CliError::RestoreFailed)?;

    println!("Restored {restored} books from the cloud");
    Ok(())
}

/// Run the startup sequence and the loop until Ctrl-C.
pub async fn run_watch(config: &EngineConfig) -> Result<(), CliError> {
    let coordinator = Arc::new(open_engine(config)?);
    let handle = shelf_core::start(Arc::clone(&coordinator), config.sync_interval);
    let mut live = coordinator.list_all();

    println!(
        "Syncing every {}s. Press Ctrl-C to stop.",
        config.sync_interval.as_secs()
    );
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            snapshot = live.next() => {
                let books = snapshot?;
                let pending = books.iter().filter(|book| book.dirty).count();
                println!("{} books, {pending} pending sync", books.len());
            }
        }
    }

    handle.stop().await;
    settle(&coordinator).await;
    Ok(())
}
