//! Credential trait — storage and rotation of upstream bearer credentials.
//!
//! Requests draw credentials through [`CredentialStore::checkout`], which
//! picks the least recently used active and verified credential and stamps
//! it as used in one step, so concurrent requests spread across the pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// A stored upstream credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,

    /// Operator-chosen label
    pub name: String,

    /// The bearer secret sent upstream
    pub secret: String,

    /// Disabled credentials are never handed out
    pub is_active: bool,

    /// Set once the upstream has accepted the credential
    pub is_valid: bool,

    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// The secret shortened for display: first and last ten characters.
    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &"***")
            .field("is_active", &self.is_active)
            .field("is_valid", &self.is_valid)
            .field("last_used", &self.last_used)
            .finish()
    }
}

/// Shorten a secret to `first10...last10` when it is longer than 24 characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 24 {
        return secret.to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("{head}...{tail}")
}

/// Ordering used to pick the next credential: never used first, then the
/// oldest `last_used`, ties broken by the oldest `created_at` and then id.
pub fn rotation_order(a: &Credential, b: &Credential) -> std::cmp::Ordering {
    match (a.last_used, b.last_used) {
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (x, y) => x
            .cmp(&y)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id)),
    }
}

/// The credential storage trait.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Store a new credential. It starts active and unverified.
    async fn add(&self, name: &str, secret: &str) -> Result<Credential, CredentialError>;

    /// All credentials, newest first.
    async fn list(&self) -> Result<Vec<Credential>, CredentialError>;

    async fn get(&self, id: i64) -> Result<Option<Credential>, CredentialError>;

    async fn remove(&self, id: i64) -> Result<(), CredentialError>;

    async fn rename(&self, id: i64, name: &str) -> Result<(), CredentialError>;

    async fn set_active(&self, id: i64, active: bool) -> Result<(), CredentialError>;

    async fn mark_valid(&self, id: i64, valid: bool) -> Result<(), CredentialError>;

    async fn mark_used(&self, id: i64) -> Result<(), CredentialError>;

    /// The next usable credential without touching its usage stamp.
    async fn next_usable(&self) -> Result<Option<Credential>, CredentialError>;

    /// Pick the next usable credential and mark it used.
    ///
    /// The default is not atomic; backends that can serialize the pair
    /// should override it.
    async fn checkout(&self) -> Result<Option<Credential>, CredentialError> {
        let Some(credential) = self.next_usable().await? else {
            return Ok(None);
        };
        self.mark_used(credential.id).await?;
        Ok(Some(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(id: i64, last_used: Option<DateTime<Utc>>, created_at: DateTime<Utc>) -> Credential {
        Credential {
            id,
            name: format!("c{id}"),
            secret: "s".into(),
            is_active: true,
            is_valid: true,
            last_used,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn short_secrets_are_not_masked() {
        assert_eq!(mask_secret("abc"), "abc");
        assert_eq!(mask_secret(&"x".repeat(24)), "x".repeat(24));
    }

    #[test]
    fn long_secrets_keep_both_ends() {
        let secret = format!("{}{}{}", "A".repeat(10), "m".repeat(20), "Z".repeat(10));
        assert_eq!(mask_secret(&secret), format!("{}...{}", "A".repeat(10), "Z".repeat(10)));
    }

    #[test]
    fn debug_hides_secret() {
        let mut c = credential(1, None, Utc::now());
        c.secret = "eyJsupersecret".into();
        let rendered = format!("{c:?}");
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn never_used_sorts_first() {
        let now = Utc::now();
        let used = credential(1, Some(now), now - Duration::hours(2));
        let fresh = credential(2, None, now);
        let mut all = vec![used, fresh];
        all.sort_by(rotation_order);
        assert_eq!(all[0].id, 2);
    }

    #[test]
    fn ties_break_on_creation() {
        let now = Utc::now();
        let newer = credential(1, None, now);
        let older = credential(2, None, now - Duration::minutes(5));
        let mut all = vec![newer, older];
        all.sort_by(rotation_order);
        assert_eq!(all[0].id, 2);
    }
}
