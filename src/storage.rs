use crate::errors::{AppError, Result};
use crate::models::{USER_TABLE_VERSION, UserRecord, UserTable};
use std::{collections::BTreeMap, path::Path, path::PathBuf};
use tokio::fs;
use tracing::{debug, error, warn};

pub const USERS_KEY: &str = "wasteSegregationUsers";
pub const CURRENT_USER_ID_KEY: &str = "currentUserId";

/// String-keyed, string-valued substrate mirrored to a JSON file.
///
/// Writes go to disk first; the in-memory map only changes once the file
/// has been replaced, so a failed write leaves the previous state in place.
#[derive(Debug, Default)]
pub struct KvStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
}

impl KvStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the file at `path`. A file that does not parse is moved aside
    /// to `*.json.corrupt` so the next write cannot destroy it.
    pub async fn open(path: &Path) -> Self {
        let entries = match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    error!(path = %path.display(), "failed to parse data file: {err}");
                    set_aside(path).await;
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                error!(path = %path.display(), "failed to read data file: {err}");
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path.to_path_buf()),
            entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub async fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.set_many([(key, value)]).await
    }

    /// Writes several keys with a single file replacement.
    pub async fn set_many<'a>(
        &mut self,
        pairs: impl IntoIterator<Item = (&'a str, String)>,
    ) -> Result<()> {
        let mut next = self.entries.clone();
        for (key, value) in pairs {
            next.insert(key.to_string(), value);
        }
        self.commit(next).await
    }

    pub async fn remove(&mut self, key: &str) -> Result<()> {
        if !self.entries.contains_key(key) {
            return Ok(());
        }
        let mut next = self.entries.clone();
        next.remove(key);
        self.commit(next).await
    }

    async fn commit(&mut self, next: BTreeMap<String, String>) -> Result<()> {
        if let Some(path) = &self.path {
            persist_entries(path, &next).await?;
        }
        self.entries = next;
        Ok(())
    }
}

pub fn corrupt_path(path: &Path) -> PathBuf {
    path.with_extension("json.corrupt")
}

async fn set_aside(path: &Path) {
    let target = corrupt_path(path);
    match fs::rename(path, &target).await {
        Ok(()) => warn!(from = %path.display(), to = %target.display(), "unreadable data file moved aside"),
        Err(err) => error!(path = %path.display(), "failed to move unreadable data file aside: {err}"),
    }
}

async fn persist_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    let payload = serde_json::to_vec_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload).await?;
    fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), "data file written");
    Ok(())
}

/// Typed view over the two fixed keys: the user table and the current session.
#[derive(Debug)]
pub struct UserStore {
    kv: KvStore,
}

impl UserStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub fn in_memory() -> Self {
        Self::new(KvStore::in_memory())
    }

    pub fn users(&self) -> Result<BTreeMap<String, UserRecord>> {
        let Some(raw) = self.kv.get(USERS_KEY) else {
            return Ok(BTreeMap::new());
        };
        let table: UserTable = serde_json::from_str(raw)?;
        if table.version != USER_TABLE_VERSION {
            return Err(AppError::Storage(format!(
                "unsupported user table version {}",
                table.version
            )));
        }
        Ok(table.users)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users()?.remove(user_id))
    }

    /// Overwrites the whole user table.
    pub async fn put_all(&mut self, users: BTreeMap<String, UserRecord>) -> Result<()> {
        let raw = encode_table(users)?;
        self.kv.set(USERS_KEY, raw).await
    }

    /// Overwrites the user table and points the session at `user_id` in one
    /// commit; either both land or neither does.
    pub async fn put_all_and_set_session(
        &mut self,
        users: BTreeMap<String, UserRecord>,
        user_id: &str,
    ) -> Result<()> {
        let raw = encode_table(users)?;
        self.kv
            .set_many([(USERS_KEY, raw), (CURRENT_USER_ID_KEY, user_id.to_string())])
            .await
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.kv.get(CURRENT_USER_ID_KEY).map(str::to_string)
    }

    pub async fn set_current_session_id(&mut self, user_id: &str) -> Result<()> {
        self.kv.set(CURRENT_USER_ID_KEY, user_id.to_string()).await
    }

    pub async fn clear_current_session_id(&mut self) -> Result<()> {
        self.kv.remove(CURRENT_USER_ID_KEY).await
    }
}

fn encode_table(users: BTreeMap<String, UserRecord>) -> Result<String> {
    let table = UserTable {
        version: USER_TABLE_VERSION,
        users,
    };
    Ok(serde_json::to_string(&table)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("waste_tracker_{name}_{}_{nanos}.json", std::process::id()));
        path
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let store = UserStore::new(KvStore::open(&temp_path("missing")).await);
        assert!(store.users().unwrap().is_empty());
        assert!(store.current_session_id().is_none());
    }

    #[tokio::test]
    async fn table_and_session_survive_reopen() {
        let path = temp_path("reopen");
        let mut store = UserStore::new(KvStore::open(&path).await);
        let mut users = BTreeMap::new();
        users.insert(
            "user_1".to_string(),
            UserRecord::new("a@example.com", "hash", Utc::now()),
        );
        store.put_all(users).await.unwrap();
        store.set_current_session_id("user_1").await.unwrap();

        let reopened = UserStore::new(KvStore::open(&path).await);
        assert_eq!(reopened.current_session_id().as_deref(), Some("user_1"));
        let record = reopened.get("user_1").unwrap().expect("missing user");
        assert_eq!(record.email, "a@example.com");

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn clear_session_removes_pointer() {
        let mut store = UserStore::in_memory();
        store.set_current_session_id("user_1").await.unwrap();
        store.clear_current_session_id().await.unwrap();
        assert!(store.current_session_id().is_none());
    }

    #[tokio::test]
    async fn foreign_table_version_is_rejected() {
        let mut kv = KvStore::in_memory();
        kv.set(USERS_KEY, r#"{"version": 99, "users": {}}"#.to_string())
            .await
            .unwrap();
        let store = UserStore::new(kv);
        assert!(matches!(store.users(), Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"not json").unwrap();
        let mut store = UserStore::new(KvStore::open(&path).await);
        assert!(store.users().unwrap().is_empty());

        let aside = corrupt_path(&path);
        assert!(!path.exists());
        assert_eq!(std::fs::read(&aside).unwrap(), b"not json");

        // The next write must not touch the preserved copy.
        store.set_current_session_id("user_1").await.unwrap();
        assert_eq!(std::fs::read(&aside).unwrap(), b"not json");

        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(aside);
    }

    #[tokio::test]
    async fn table_and_session_commit_together() {
        let path = temp_path("together");
        let mut store = UserStore::new(KvStore::open(&path).await);
        let mut users = BTreeMap::new();
        users.insert(
            "user_1".to_string(),
            UserRecord::new("a@example.com", "hash", Utc::now()),
        );
        store.put_all_and_set_session(users, "user_1").await.unwrap();

        let reopened = UserStore::new(KvStore::open(&path).await);
        assert_eq!(reopened.current_session_id().as_deref(), Some("user_1"));
        assert!(reopened.get("user_1").unwrap().is_some());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn failed_combined_write_changes_neither_key() {
        let mut path = temp_path("unwritable");
        path.push("nested/state.json");
        let mut store = UserStore::new(KvStore::open(&path).await);
        let mut users = BTreeMap::new();
        users.insert(
            "user_1".to_string(),
            UserRecord::new("a@example.com", "hash", Utc::now()),
        );

        let err = store.put_all_and_set_session(users, "user_1").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(store.users().unwrap().is_empty());
        assert!(store.current_session_id().is_none());
    }
}
