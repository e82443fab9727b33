//! The signed-in user and where it is persisted.
//!
//! A remembered user lives in the durable store and survives restarts; a
//! session-only user lives in the ephemeral store. At most one of the two
//! holds an entry at any time.

use crate::SessionResult;
use kindearth_http::SessionLostHandler;
use kindearth_storage::{KeyValueStore, StorageKeys};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// An authenticated storefront user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Session {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Why the session changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    SignedIn,
    Restored,
    SignedOut,
    /// The session could not be refreshed; the user must sign in again.
    Expired,
}

/// Payload for session change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionChange {
    pub user: Option<Session>,
    pub remembered: bool,
    pub reason: ChangeReason,
}

/// Callback type for session change notifications.
pub type SessionCallback = Box<dyn Fn(&SessionChange) + Send + Sync>;

#[derive(Debug, Default)]
struct SessionState {
    user: Option<Session>,
    remembered: bool,
}

/// Owns the current user and its persistence.
pub struct SessionStore {
    durable: Box<dyn KeyValueStore>,
    ephemeral: Box<dyn KeyValueStore>,
    state: RwLock<SessionState>,
    callback: Mutex<Option<SessionCallback>>,
}

impl SessionStore {
    pub fn new(durable: Box<dyn KeyValueStore>, ephemeral: Box<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            ephemeral,
            state: RwLock::new(SessionState::default()),
            callback: Mutex::new(None),
        }
    }

    /// Set a callback to be notified of session changes.
    pub fn set_callback(&self, callback: SessionCallback) {
        *self.callback.lock() = Some(callback);
    }

    pub fn user(&self) -> Option<Session> {
        self.state.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().user.is_some()
    }

    /// Whether the current user is persisted across restarts.
    pub fn is_remembered(&self) -> bool {
        self.state.read().remembered
    }

    /// Replace the current user.
    ///
    /// With a user, it is written to the durable store when `remember_me`
    /// is set and to the ephemeral store otherwise; the other store's entry
    /// is removed first. `None` clears both stores.
    ///
    /// If either store fails, nobody is left signed in: memory is cleared
    /// and at most one store holds an entry.
    pub fn set_user(&self, user: Option<Session>, remember_me: bool) -> SessionResult<()> {
        let Some(user) = user else {
            return self.clear(ChangeReason::SignedOut);
        };

        let json = serde_json::to_string(&user)?;
        let (target, target_key, other, other_key) = if remember_me {
            (&self.durable, StorageKeys::REMEMBERED_USER, &self.ephemeral, StorageKeys::SESSION_USER)
        } else {
            (&self.ephemeral, StorageKeys::SESSION_USER, &self.durable, StorageKeys::REMEMBERED_USER)
        };

        let persisted = other
            .delete(other_key)
            .and_then(|_| target.set(target_key, &json));
        if let Err(e) = persisted {
            warn!(user_id = %user.id, error = %e, "Failed to persist user");
            if self.state.read().user.is_some() {
                self.replace(None, false, ChangeReason::SignedOut);
            }
            return Err(e.into());
        }

        info!(user_id = %user.id, remembered = remember_me, "User signed in");
        self.replace(Some(user), remember_me, ChangeReason::SignedIn);
        Ok(())
    }

    /// Restore the user persisted by a previous run.
    ///
    /// The durable entry wins over the ephemeral one. An entry that no longer
    /// parses is deleted and treated as absent.
    pub fn load_on_startup(&self) -> SessionResult<Option<Session>> {
        if let Some(user) = read_entry(self.durable.as_ref(), StorageKeys::REMEMBERED_USER)? {
            if self.ephemeral.delete(StorageKeys::SESSION_USER)? {
                debug!("Dropped session-only entry shadowed by remembered user");
            }
            info!(user_id = %user.id, "Restored remembered user");
            self.replace(Some(user.clone()), true, ChangeReason::Restored);
            return Ok(Some(user));
        }

        if let Some(user) = read_entry(self.ephemeral.as_ref(), StorageKeys::SESSION_USER)? {
            info!(user_id = %user.id, "Restored session user");
            self.replace(Some(user.clone()), false, ChangeReason::Restored);
            return Ok(Some(user));
        }

        debug!("No stored user");
        Ok(None)
    }

    /// Sign out locally. Never waits on the network.
    pub fn logout(&self) -> SessionResult<()> {
        self.clear(ChangeReason::SignedOut)
    }

    /// Clear memory and both stores. Memory is cleared even if a store fails;
    /// the first store error is returned.
    fn clear(&self, reason: ChangeReason) -> SessionResult<()> {
        let had_user = self.state.read().user.is_some();
        self.replace(None, false, reason);

        let durable = self.durable.delete(StorageKeys::REMEMBERED_USER);
        let ephemeral = self.ephemeral.delete(StorageKeys::SESSION_USER);

        if had_user {
            info!(reason = ?reason, "User signed out");
        }
        durable?;
        ephemeral?;
        Ok(())
    }

    fn replace(&self, user: Option<Session>, remembered: bool, reason: ChangeReason) {
        {
            let mut state = self.state.write();
            state.user = user.clone();
            state.remembered = remembered;
        }

        let change = SessionChange {
            user,
            remembered,
            reason,
        };
        if let Some(cb) = self.callback.lock().as_ref() {
            cb(&change);
        }
    }
}

impl SessionLostHandler for SessionStore {
    fn on_session_lost(&self) {
        warn!("Session could not be refreshed, login required");
        if let Err(e) = self.clear(ChangeReason::Expired) {
            warn!(error = %e, "Failed to clear stored user after session loss");
        }
    }
}

fn read_entry(store: &dyn KeyValueStore, key: &str) -> SessionResult<Option<Session>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(user) => Ok(Some(user)),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding unreadable stored user");
            store.delete(key)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindearth_storage::{FileStorage, MemoryStorage};
    use std::sync::Arc;

    /// Shares one backing store between the session store and the test.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<MemoryStorage>);

    impl KeyValueStore for SharedStore {
        fn set(&self, key: &str, value: &str) -> kindearth_storage::StorageResult<()> {
            self.0.set(key, value)
        }

        fn get(&self, key: &str) -> kindearth_storage::StorageResult<Option<String>> {
            self.0.get(key)
        }

        fn delete(&self, key: &str) -> kindearth_storage::StorageResult<bool> {
            self.0.delete(key)
        }
    }

    fn user(id: &str) -> Session {
        Session {
            id: id.to_string(),
            email: format!("{id}@kindearth.shop"),
            first_name: "Ana".to_string(),
            last_name: "Lima".to_string(),
            roles: BTreeSet::from(["Customer".to_string()]),
        }
    }

    fn store() -> (SessionStore, SharedStore, SharedStore) {
        let durable = SharedStore::default();
        let ephemeral = SharedStore::default();
        let store = SessionStore::new(Box::new(durable.clone()), Box::new(ephemeral.clone()));
        (store, durable, ephemeral)
    }

    fn populated(store: &SharedStore, key: &str) -> bool {
        store.get(key).unwrap().is_some()
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let json = serde_json::to_value(user("u-1")).unwrap();
        assert_eq!(json["firstName"], "Ana");
        assert_eq!(json["lastName"], "Lima");
        assert_eq!(json["roles"][0], "Customer");

        let parsed: Session = serde_json::from_str(
            r#"{"id":"u-2","email":"b@x.io","firstName":"Bo","lastName":"Ng"}"#,
        )
        .unwrap();
        assert!(parsed.roles.is_empty());
        assert_eq!(parsed.full_name(), "Bo Ng");
    }

    #[test]
    fn test_exactly_one_store_follows_latest_call() {
        let (store, durable, ephemeral) = store();

        store.set_user(Some(user("u-1")), true).unwrap();
        assert!(populated(&durable, StorageKeys::REMEMBERED_USER));
        assert!(!populated(&ephemeral, StorageKeys::SESSION_USER));
        assert!(store.is_remembered());

        store.set_user(Some(user("u-2")), false).unwrap();
        assert!(!populated(&durable, StorageKeys::REMEMBERED_USER));
        assert!(populated(&ephemeral, StorageKeys::SESSION_USER));
        assert!(!store.is_remembered());
        assert_eq!(store.user().unwrap().id, "u-2");

        store.set_user(Some(user("u-3")), true).unwrap();
        assert!(populated(&durable, StorageKeys::REMEMBERED_USER));
        assert!(!populated(&ephemeral, StorageKeys::SESSION_USER));
    }

    #[test]
    fn test_set_none_clears_both_stores() {
        let (store, durable, ephemeral) = store();
        durable.set(StorageKeys::REMEMBERED_USER, "{}").unwrap();
        ephemeral.set(StorageKeys::SESSION_USER, "{}").unwrap();

        store.set_user(None, true).unwrap();

        assert!(!populated(&durable, StorageKeys::REMEMBERED_USER));
        assert!(!populated(&ephemeral, StorageKeys::SESSION_USER));
        assert!(store.user().is_none());
        assert!(!store.is_remembered());
    }

    #[test]
    fn test_startup_prefers_durable_entry() {
        let (store, durable, ephemeral) = store();
        durable
            .set(StorageKeys::REMEMBERED_USER, &serde_json::to_string(&user("durable")).unwrap())
            .unwrap();
        ephemeral
            .set(StorageKeys::SESSION_USER, &serde_json::to_string(&user("ephemeral")).unwrap())
            .unwrap();

        let loaded = store.load_on_startup().unwrap().unwrap();

        assert_eq!(loaded.id, "durable");
        assert!(store.is_remembered());
        assert_eq!(store.user().unwrap().id, "durable");
        assert!(!populated(&ephemeral, StorageKeys::SESSION_USER));
    }

    #[test]
    fn test_corrupt_durable_entry_is_deleted() {
        let (store, durable, ephemeral) = store();
        durable.set(StorageKeys::REMEMBERED_USER, "{not json").unwrap();
        ephemeral
            .set(StorageKeys::SESSION_USER, &serde_json::to_string(&user("eph")).unwrap())
            .unwrap();

        let loaded = store.load_on_startup().unwrap().unwrap();

        assert_eq!(loaded.id, "eph");
        assert!(!store.is_remembered());
        assert!(!populated(&durable, StorageKeys::REMEMBERED_USER));
        assert!(populated(&ephemeral, StorageKeys::SESSION_USER));
    }

    #[test]
    fn test_corrupt_ephemeral_entry_is_deleted() {
        let (store, _durable, ephemeral) = store();
        ephemeral.set(StorageKeys::SESSION_USER, r#"{"id":1}"#).unwrap();

        assert!(store.load_on_startup().unwrap().is_none());
        assert!(!populated(&ephemeral, StorageKeys::SESSION_USER));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_remembered_user_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let first = SessionStore::new(
            Box::new(FileStorage::new(path.clone())),
            Box::new(MemoryStorage::new()),
        );
        first.set_user(Some(user("u-1")), true).unwrap();
        drop(first);

        let second = SessionStore::new(
            Box::new(FileStorage::new(path)),
            Box::new(MemoryStorage::new()),
        );
        let restored = second.load_on_startup().unwrap().unwrap();
        assert_eq!(restored.id, "u-1");
        assert!(second.is_remembered());
    }

    #[test]
    fn test_callback_sees_every_change() {
        let (store, _durable, _ephemeral) = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.set_callback(Box::new(move |change| sink.lock().push(change.clone())));

        store.set_user(Some(user("u-1")), false).unwrap();
        store.logout().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].reason, ChangeReason::SignedIn);
        assert_eq!(seen[0].user.as_ref().unwrap().id, "u-1");
        assert_eq!(seen[1].reason, ChangeReason::SignedOut);
        assert!(seen[1].user.is_none());
    }

    #[test]
    fn test_session_lost_clears_everything() {
        let (store, durable, _ephemeral) = store();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = reasons.clone();
        store.set_callback(Box::new(move |change| sink.lock().push(change.reason)));

        store.set_user(Some(user("u-1")), true).unwrap();
        store.on_session_lost();

        assert!(store.user().is_none());
        assert!(!populated(&durable, StorageKeys::REMEMBERED_USER));
        assert_eq!(
            *reasons.lock(),
            vec![ChangeReason::SignedIn, ChangeReason::Expired]
        );
    }

    /// Accepts writes but fails every delete.
    struct StuckStore(SharedStore);

    impl KeyValueStore for StuckStore {
        fn set(&self, key: &str, value: &str) -> kindearth_storage::StorageResult<()> {
            self.0.set(key, value)
        }

        fn get(&self, key: &str) -> kindearth_storage::StorageResult<Option<String>> {
            self.0.get(key)
        }

        fn delete(&self, _key: &str) -> kindearth_storage::StorageResult<bool> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    #[test]
    fn test_failed_switch_leaves_one_entry_and_no_user() {
        let durable = SharedStore::default();
        let ephemeral = SharedStore::default();
        let store = SessionStore::new(
            Box::new(durable.clone()),
            Box::new(StuckStore(ephemeral.clone())),
        );
        store.set_user(Some(user("u-1")), false).unwrap();
        assert!(populated(&ephemeral, StorageKeys::SESSION_USER));

        let result = store.set_user(Some(user("u-2")), true);

        assert!(matches!(result, Err(crate::SessionError::Storage(_))));
        assert!(!populated(&durable, StorageKeys::REMEMBERED_USER));
        assert!(store.user().is_none());
        assert!(!store.is_remembered());
    }
}
