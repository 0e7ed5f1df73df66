//! `toolrelay tokens` — Manage upstream credentials.

use clap::Subcommand;
use toolrelay_config::AppConfig;
use toolrelay_core::{CredentialStore, Provider};
use toolrelay_credentials::{open_store, parse_credential};
use toolrelay_providers::DriverCallProvider;

#[derive(Subcommand)]
pub enum TokenAction {
    /// List stored credentials (secrets masked)
    List,

    /// Add a credential from a token or a pasted curl command
    Add {
        /// The token, or a curl command containing it
        input: String,

        /// Label for the credential
        #[arg(short, long, default_value = "")]
        name: String,

        /// Mark as verified without probing the upstream
        #[arg(long)]
        verified: bool,
    },

    /// Remove a credential
    Remove { id: i64 },

    /// Probe the upstream with a credential and record the result
    Test { id: i64 },
}

pub async fn run(action: TokenAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = open_store(&config.credentials.backend, &config.credentials.resolved_db_path()).await?;

    match action {
        TokenAction::List => list(store.as_ref()).await?,
        TokenAction::Add { input, name, verified } => {
            let secret = parse_credential(&input)?;
            let credential = store.add(name.trim(), &secret).await?;
            if verified {
                store.mark_valid(credential.id, true).await?;
            }
            println!("Added token {} ({})", credential.id, credential.masked());
            if !verified {
                println!("   Run `toolrelay tokens test {}` to verify it.", credential.id);
            }
        }
        TokenAction::Remove { id } => {
            store.remove(id).await?;
            println!("Removed token {id}");
        }
        TokenAction::Test { id } => {
            let credential = store.get(id).await?.ok_or_else(|| format!("Token {id} not found"))?;
            let provider = DriverCallProvider::new(&config.upstream)?;
            let valid = match provider.verify(&credential.secret, &config.upstream.probe_model).await {
                Ok(valid) => valid,
                Err(e) => {
                    println!("   Error: {e}");
                    false
                }
            };
            store.mark_valid(id, valid).await?;
            println!("Token {id}: {}", if valid { "valid" } else { "invalid" });
        }
    }

    Ok(())
}

async fn list(store: &dyn CredentialStore) -> Result<(), Box<dyn std::error::Error>> {
    let all = store.list().await?;
    if all.is_empty() {
        println!("No tokens stored. Add one with `toolrelay tokens add`.");
        return Ok(());
    }

    println!(
        "{:<5} {:<20} {:<26} {:<8} {:<8} LAST USED",
        "ID", "NAME", "TOKEN", "ACTIVE", "VALID"
    );
    for c in all {
        let last_used = c
            .last_used
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".into());
        println!(
            "{:<5} {:<20} {:<26} {:<8} {:<8} {}",
            c.id,
            c.name,
            c.masked(),
            c.is_active,
            c.is_valid,
            last_used
        );
    }
    Ok(())
}
