use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod models;
pub mod store;

use models::UserId;
use store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Configured users can only be removed by editing the configuration.
    Pinned,
    NotFound,
}

/// The set of Telegram users allowed to talk to the bot.
///
/// The effective set is the union of the configured ids and the ids persisted
/// in the user store. Configured ids always win: the store can add users but
/// never revoke a configured one.
#[derive(Debug)]
pub struct UserRegistry {
    configured: BTreeSet<UserId>,
    stored: RwLock<BTreeSet<UserId>>,
    store_path: Option<PathBuf>,
}

impl UserRegistry {
    /// Registry without persistence, used when no store path is configured.
    pub fn new(configured: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            configured: configured.into_iter().collect(),
            stored: RwLock::new(BTreeSet::new()),
            store_path: None,
        }
    }

    /// Registry overlaid with the store at `store_path`. A store that cannot be
    /// read contributes nothing.
    pub fn load(configured: impl IntoIterator<Item = UserId>, store_path: PathBuf) -> Self {
        let registry = Self {
            configured: configured.into_iter().collect(),
            stored: RwLock::new(BTreeSet::new()),
            store_path: Some(store_path),
        };
        registry.reload();
        registry
    }

    /// Re-reads the user store from disk.
    pub fn reload(&self) {
        let Some(path) = &self.store_path else {
            return;
        };

        let loaded = match store::load(path) {
            Ok(users) => {
                tracing::info!("Loaded {} users from {}", users.len(), path.display());
                users
            }
            Err(e) => {
                tracing::error!("Failed to load users from {}: {}", path.display(), e);
                BTreeSet::new()
            }
        };

        *self.write_stored() = loaded;
    }

    pub fn is_authorized(&self, user_id: UserId) -> bool {
        self.configured.contains(&user_id) || self.read_stored().contains(&user_id)
    }

    /// Configured users administer the runtime additions.
    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.configured.contains(&user_id)
    }

    pub fn list_users(&self) -> BTreeSet<UserId> {
        let stored = self.read_stored();
        self.configured.union(&stored).copied().collect()
    }

    /// Returns `false` when the user was already authorized.
    pub fn add_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        if self.configured.contains(&user_id) {
            return Ok(false);
        }

        let mut stored = self.write_stored();
        if stored.contains(&user_id) {
            return Ok(false);
        }

        let mut updated = stored.clone();
        updated.insert(user_id);
        self.persist(&updated)?;
        *stored = updated;

        tracing::info!("Added user {} to authorized list", user_id);
        Ok(true)
    }

    pub fn remove_user(&self, user_id: UserId) -> Result<RemoveOutcome, StoreError> {
        if self.configured.contains(&user_id) {
            return Ok(RemoveOutcome::Pinned);
        }

        let mut stored = self.write_stored();
        if !stored.contains(&user_id) {
            return Ok(RemoveOutcome::NotFound);
        }

        let mut updated = stored.clone();
        updated.remove(&user_id);
        self.persist(&updated)?;
        *stored = updated;

        tracing::info!("Removed user {} from authorized list", user_id);
        Ok(RemoveOutcome::Removed)
    }

    fn persist(&self, users: &BTreeSet<UserId>) -> Result<(), StoreError> {
        match &self.store_path {
            Some(path) => store::save(path, users),
            None => Ok(()),
        }
    }

    fn read_stored(&self) -> RwLockReadGuard<'_, BTreeSet<UserId>> {
        match self.stored.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("UserRegistry lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_stored(&self) -> RwLockWriteGuard<'_, BTreeSet<UserId>> {
        match self.stored.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("UserRegistry lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_configured_user_is_authorized() {
        let registry = UserRegistry::new([111]);
        assert!(registry.is_authorized(111));
        assert!(!registry.is_authorized(222));
    }

    #[test]
    fn test_empty_registry_denies_everyone() {
        let registry = UserRegistry::new([]);
        assert!(!registry.is_authorized(0));
        assert!(registry.list_users().is_empty());
    }

    #[test]
    fn test_store_overlays_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "[222, 111]").unwrap();

        let registry = UserRegistry::load([111], path);

        assert!(registry.is_authorized(111));
        assert!(registry.is_authorized(222));
        assert_eq!(registry.list_users(), [111, 222].into_iter().collect());
        assert!(registry.is_admin(111));
        assert!(!registry.is_admin(222));
    }

    #[test]
    fn test_unparseable_store_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "{ broken").unwrap();

        let registry = UserRegistry::load([111], path);

        assert!(registry.is_authorized(111));
        assert_eq!(registry.list_users(), [111].into_iter().collect());
    }

    #[test]
    fn test_add_user_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("users.json");

        let registry = UserRegistry::load([111], path.clone());
        assert!(registry.add_user(333).unwrap());
        assert!(!registry.add_user(333).unwrap());
        assert!(!registry.add_user(111).unwrap());

        let reloaded = UserRegistry::load([111], path);
        assert_eq!(reloaded.list_users(), registry.list_users());
        assert!(reloaded.is_authorized(333));
    }

    #[test]
    fn test_remove_user_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let registry = UserRegistry::load([111], path.clone());
        registry.add_user(222).unwrap();

        assert_eq!(registry.remove_user(111).unwrap(), RemoveOutcome::Pinned);
        assert_eq!(registry.remove_user(999).unwrap(), RemoveOutcome::NotFound);
        assert_eq!(registry.remove_user(222).unwrap(), RemoveOutcome::Removed);
        assert!(!registry.is_authorized(222));

        assert!(store::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let registry = UserRegistry::load([], path.clone());
        assert!(!registry.is_authorized(444));

        fs::write(&path, "[444]").unwrap();
        registry.reload();
        assert!(registry.is_authorized(444));
    }
}
