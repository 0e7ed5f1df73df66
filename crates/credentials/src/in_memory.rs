//! In-memory credential store.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use toolrelay_core::credential::rotation_order;
use toolrelay_core::{Credential, CredentialError, CredentialStore};

#[derive(Default)]
struct Pool {
    next_id: i64,
    items: Vec<Credential>,
}

impl Pool {
    fn find_mut(&mut self, id: i64) -> Result<&mut Credential, CredentialError> {
        self.items
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(CredentialError::NotFound(id))
    }

    fn next_usable(&self) -> Option<&Credential> {
        self.items
            .iter()
            .filter(|c| c.is_active && c.is_valid)
            .min_by(|a, b| rotation_order(a, b))
    }
}

/// A credential pool held in process memory. Lost on restart.
pub struct InMemoryCredentialStore {
    pool: Arc<RwLock<Pool>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            pool: Arc::new(RwLock::new(Pool::default())),
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, name: &str, secret: &str) -> Result<Credential, CredentialError> {
        let mut pool = self.pool.write().await;
        if pool.items.iter().any(|c| c.secret == secret) {
            return Err(CredentialError::Duplicate);
        }
        pool.next_id += 1;
        let now = Utc::now();
        let credential = Credential {
            id: pool.next_id,
            name: name.to_string(),
            secret: secret.to_string(),
            is_active: true,
            is_valid: false,
            last_used: None,
            created_at: now,
            updated_at: now,
        };
        pool.items.push(credential.clone());
        Ok(credential)
    }

    async fn list(&self) -> Result<Vec<Credential>, CredentialError> {
        let pool = self.pool.read().await;
        let mut all = pool.items.clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    async fn get(&self, id: i64) -> Result<Option<Credential>, CredentialError> {
        let pool = self.pool.read().await;
        Ok(pool.items.iter().find(|c| c.id == id).cloned())
    }

    async fn remove(&self, id: i64) -> Result<(), CredentialError> {
        let mut pool = self.pool.write().await;
        let before = pool.items.len();
        pool.items.retain(|c| c.id != id);
        if pool.items.len() == before {
            return Err(CredentialError::NotFound(id));
        }
        Ok(())
    }

    async fn rename(&self, id: i64, name: &str) -> Result<(), CredentialError> {
        let mut pool = self.pool.write().await;
        let credential = pool.find_mut(id)?;
        credential.name = name.to_string();
        credential.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), CredentialError> {
        let mut pool = self.pool.write().await;
        let credential = pool.find_mut(id)?;
        credential.is_active = active;
        credential.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_valid(&self, id: i64, valid: bool) -> Result<(), CredentialError> {
        let mut pool = self.pool.write().await;
        let credential = pool.find_mut(id)?;
        credential.is_valid = valid;
        credential.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_used(&self, id: i64) -> Result<(), CredentialError> {
        let mut pool = self.pool.write().await;
        let credential = pool.find_mut(id)?;
        credential.last_used = Some(Utc::now());
        Ok(())
    }

    async fn next_usable(&self) -> Result<Option<Credential>, CredentialError> {
        let pool = self.pool.read().await;
        Ok(pool.next_usable().cloned())
    }

    async fn checkout(&self) -> Result<Option<Credential>, CredentialError> {
        let mut pool = self.pool.write().await;
        let Some(id) = pool.next_usable().map(|c| c.id) else {
            return Ok(None);
        };
        let credential = pool.find_mut(id)?;
        credential.last_used = Some(Utc::now());
        Ok(Some(credential.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn verified(store: &InMemoryCredentialStore, name: &str) -> Credential {
        let c = store.add(name, &format!("secret-{name}")).await.unwrap();
        store.mark_valid(c.id, true).await.unwrap();
        c
    }

    #[tokio::test]
    async fn new_credentials_start_active_and_unverified() {
        let store = InMemoryCredentialStore::new();
        let c = store.add("main", "eyJabc").await.unwrap();
        assert!(c.is_active);
        assert!(!c.is_valid);
        assert!(c.last_used.is_none());
        assert_eq!(store.name(), "in_memory");
    }

    #[tokio::test]
    async fn duplicate_secret_rejected() {
        let store = InMemoryCredentialStore::new();
        store.add("a", "same").await.unwrap();
        let err = store.add("b", "same").await.unwrap_err();
        assert!(matches!(err, CredentialError::Duplicate));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = InMemoryCredentialStore::new();
        store.add("first", "s1").await.unwrap();
        store.add("second", "s2").await.unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all[0].name, "second");
        assert_eq!(all[1].name, "first");
    }

    #[tokio::test]
    async fn unverified_credentials_are_not_handed_out() {
        let store = InMemoryCredentialStore::new();
        store.add("pending", "s1").await.unwrap();
        assert!(store.checkout().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_credentials_are_skipped() {
        let store = InMemoryCredentialStore::new();
        let a = verified(&store, "a").await;
        let b = verified(&store, "b").await;
        store.set_active(a.id, false).await.unwrap();
        let picked = store.checkout().await.unwrap().unwrap();
        assert_eq!(picked.id, b.id);
    }

    #[tokio::test]
    async fn checkout_rotates_least_recently_used() {
        let store = InMemoryCredentialStore::new();
        let a = verified(&store, "a").await;
        let b = verified(&store, "b").await;

        let first = store.checkout().await.unwrap().unwrap();
        let second = store.checkout().await.unwrap().unwrap();
        let third = store.checkout().await.unwrap().unwrap();

        assert_eq!(first.id, a.id);
        assert_eq!(second.id, b.id);
        assert_eq!(third.id, a.id);
        assert!(third.last_used.is_some());
    }

    #[tokio::test]
    async fn missing_ids_report_not_found() {
        let store = InMemoryCredentialStore::new();
        assert!(matches!(
            store.remove(42).await.unwrap_err(),
            CredentialError::NotFound(42)
        ));
        assert!(matches!(
            store.rename(7, "x").await.unwrap_err(),
            CredentialError::NotFound(7)
        ));
        assert!(store.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_and_remove() {
        let store = InMemoryCredentialStore::new();
        let c = store.add("old", "s").await.unwrap();
        store.rename(c.id, "new").await.unwrap();
        assert_eq!(store.get(c.id).await.unwrap().unwrap().name, "new");
        store.remove(c.id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
