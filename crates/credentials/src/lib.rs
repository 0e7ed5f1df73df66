//! Credential storage for toolrelay.
//!
//! Two [`CredentialStore`](toolrelay_core::CredentialStore) backends:
//! - [`InMemoryCredentialStore`] for tests and throwaway runs
//! - [`SqliteCredentialStore`] for the persistent pool (feature `sqlite`)
//!
//! [`token_parser`] turns operator input (a bare token or a pasted curl
//! command) into the secret that gets stored.

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod token_parser;

pub use in_memory::InMemoryCredentialStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCredentialStore;
pub use token_parser::{TokenParseError, parse_credential};

use std::sync::Arc;
use toolrelay_core::{CredentialError, CredentialStore};

/// Open the backend named in configuration.
///
/// `"memory"` ignores `db_path`. Anything else opens SQLite at `db_path`.
pub async fn open_store(
    backend: &str,
    db_path: &str,
) -> Result<Arc<dyn CredentialStore>, CredentialError> {
    match backend {
        "memory" => Ok(Arc::new(InMemoryCredentialStore::new())),
        #[cfg(feature = "sqlite")]
        _ => Ok(Arc::new(SqliteCredentialStore::new(db_path).await?)),
        #[cfg(not(feature = "sqlite"))]
        other => Err(CredentialError::Storage(format!(
            "backend '{other}' unavailable for {db_path}: built without sqlite"
        ))),
    }
}
