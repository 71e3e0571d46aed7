use shelf_core::auth::{Credential, Identity};
use shelf_core::config::EngineConfig;

use crate::cli::AuthCommands;
use crate::commands::common::open_engine;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, config: &EngineConfig) -> Result<(), CliError> {
    let coordinator = open_engine(config)?;
    let session = coordinator.session();

    match command {
        AuthCommands::Status => {
            let identity = session.current_identity().await?;
            println!("{}", describe_identity(&identity));
        }
        AuthCommands::Login { email, password } => {
            require_accounts(config)?;
            let credential = Credential::new(&email, &password)?;
            let identity = session.sign_in(&credential).await?;
            println!("Signed in as {}", email_label(&identity));
            println!("Books stored under the previous identity are no longer synced.");
        }
        AuthCommands::Upgrade { email, password } => {
            require_accounts(config)?;
            let credential = Credential::new(&email, &password)?;
            let identity = session.upgrade_to_permanent(&credential).await?;
            println!(
                "Identity {} is now permanent ({})",
                identity.owner,
                email_label(&identity)
            );
        }
        AuthCommands::Logout => {
            let identity = session.sign_out().await?;
            println!("Signed out; now using anonymous identity {}", identity.owner);
        }
    }
    Ok(())
}

fn require_accounts(config: &EngineConfig) -> Result<(), CliError> {
    if config.supabase.is_some() {
        Ok(())
    } else {
        Err(CliError::AuthNotConfigured)
    }
}

pub fn email_label(identity: &Identity) -> &str {
    identity.email.as_deref().unwrap_or("(no email)")
}

pub fn describe_identity(identity: &Identity) -> String {
    if identity.is_anonymous() {
        format!("Anonymous identity {}", identity.owner)
    } else {
        format!(
            "Signed in as {} (identity {})",
            email_label(identity),
            identity.owner
        )
    }
}
