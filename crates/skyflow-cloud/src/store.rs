//! Durable action repository
//!
//! All records live in a single `actions.json` document next to a
//! `pending` index of the ids still `running`. Writers are serialised by an
//! in-process mutex plus an exclusive lock file, and every write replaces the
//! document through a temporary file and an atomic rename, so readers never
//! observe a half-written store.

use crate::action::{ActionRecord, ActionStatus};
use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const STORE_VERSION: u32 = 1;

/// Default file name of the store inside the config directory
pub const STORE_FILE: &str = "actions.json";

/// A lock file older than this is considered abandoned
const LOCK_STALE_SECS: i64 = 30;
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    next_id: u64,
    records: BTreeMap<u64, ActionRecord>,
    /// Ids of records whose status is `running`
    pending: BTreeSet<u64>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            next_id: 1,
            records: BTreeMap::new(),
            pending: BTreeSet::new(),
        }
    }
}

impl StoreDocument {
    fn reindex(&mut self, id: u64, status: ActionStatus) {
        if status == ActionStatus::Running {
            self.pending.insert(id);
        } else {
            self.pending.remove(&id);
        }
    }
}

/// File-backed store of [`ActionRecord`]s keyed by local id
pub struct ActionStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl ActionStore {
    /// Open (or create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
        };

        if let Some(dir) = store.path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir).await?;
            tracing::debug!("Created action store directory: {}", dir.display());
        }

        if !store.path.exists() {
            let _guard = store.write_guard.lock().await;
            let lock = store.acquire_lock().await?;
            if !store.path.exists() {
                store.write(&StoreDocument::default()).await?;
                tracing::debug!("Initialized action store: {}", store.path.display());
            }
            lock.release().await?;
        }

        // Fail early on an unreadable or too-new store
        store.load().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension(format!("tmp.{}", std::process::id()))
    }

    async fn load(&self) -> Result<StoreDocument> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreDocument::default());
            }
            Err(e) => return Err(e.into()),
        };

        let doc: StoreDocument = serde_json::from_str(&content)?;
        if doc.version > STORE_VERSION {
            return Err(CloudError::Store(format!(
                "Action store version {} is newer than supported version {}",
                doc.version, STORE_VERSION
            )));
        }
        Ok(doc)
    }

    async fn write(&self, doc: &StoreDocument) -> Result<()> {
        let tmp = self.tmp_path();
        let content = serde_json::to_vec_pretty(doc)?;

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn acquire_lock(&self) -> Result<StoreLock> {
        let lock_path = self.lock_path();
        let started = tokio::time::Instant::now();

        loop {
            let created = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await;

            match created {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    file.write_all(&serde_json::to_vec(&info)?).await?;
                    return Ok(StoreLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.remove_stale_lock(&lock_path).await? {
                        continue;
                    }
                    if started.elapsed() >= LOCK_TIMEOUT {
                        return Err(CloudError::Lock(format!(
                            "Action store is locked: {}",
                            lock_path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns true when a stale lock was removed
    async fn remove_stale_lock(&self, lock_path: &Path) -> Result<bool> {
        let content = match fs::read_to_string(lock_path).await {
            Ok(content) => content,
            // released between our create and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        let stale = match serde_json::from_str::<LockInfo>(&content) {
            Ok(info) => {
                Utc::now()
                    .signed_duration_since(info.acquired_at)
                    .num_seconds()
                    >= LOCK_STALE_SECS
            }
            // holder still writing its info, or crashed before it did
            Err(_) => match lock_file_age(lock_path).await? {
                Some(age) => age.as_secs() >= LOCK_STALE_SECS as u64,
                None => return Ok(true),
            },
        };

        if stale {
            tracing::warn!("Removing stale action store lock: {}", lock_path.display());
            match fs::remove_file(lock_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stale)
    }

    /// Read-modify-write under both locks
    async fn update<T>(&self, f: impl FnOnce(&mut StoreDocument) -> Result<T>) -> Result<T> {
        let _guard = self.write_guard.lock().await;
        let lock = self.acquire_lock().await?;

        let result = async {
            let mut doc = self.load().await?;
            let out = f(&mut doc)?;
            self.write(&doc).await?;
            Ok(out)
        }
        .await;

        lock.release().await?;
        result
    }

    /// Insert (when `record.id` is unset) or update a record.
    ///
    /// Inserting assigns the id and stamps `created_at`; every call stamps
    /// `updated_at`. Updating an id the store does not know fails with
    /// [`CloudError::NotFound`].
    pub async fn save(&self, record: &mut ActionRecord) -> Result<()> {
        let mut updated = record.clone();

        let saved = self
            .update(|doc| {
                let now = Utc::now();
                updated.updated_at = now;

                let id = match updated.id {
                    None => {
                        let id = doc.next_id;
                        doc.next_id += 1;
                        updated.id = Some(id);
                        updated.created_at = now;
                        id
                    }
                    Some(id) => {
                        let existing = doc
                            .records
                            .get(&id)
                            .ok_or_else(|| CloudError::NotFound(format!("action #{}", id)))?;
                        if existing.status.is_terminal() && existing.status != updated.status {
                            return Err(CloudError::Store(format!(
                                "action #{} is already {}",
                                id, existing.status
                            )));
                        }
                        updated.created_at = existing.created_at;
                        id
                    }
                };

                doc.reindex(id, updated.status);
                doc.records.insert(id, updated.clone());
                Ok(updated)
            })
            .await?;

        *record = saved;
        Ok(())
    }

    /// Look up a record; a missing id is `Ok(None)`
    pub async fn get(&self, id: u64) -> Result<Option<ActionRecord>> {
        let doc = self.load().await?;
        Ok(doc.records.get(&id).cloned())
    }

    /// All `running` records, newest created first
    pub async fn list_pending(&self) -> Result<Vec<ActionRecord>> {
        let doc = self.load().await?;
        let mut records: Vec<ActionRecord> = doc
            .pending
            .iter()
            .filter_map(|id| doc.records.get(id))
            .filter(|r| r.is_running())
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// `running` records for one server of one provider
    pub async fn find_pending(&self, provider: &str, server_id: &str) -> Result<Vec<ActionRecord>> {
        Ok(self
            .list_pending()
            .await?
            .into_iter()
            .filter(|r| r.provider == provider && r.server_id == server_id)
            .collect())
    }

    /// The `n` most recently created records, any status, newest first
    pub async fn list_recent(&self, n: usize) -> Result<Vec<ActionRecord>> {
        let doc = self.load().await?;
        let mut records: Vec<ActionRecord> = doc.records.into_values().collect();
        sort_newest_first(&mut records);
        records.truncate(n);
        Ok(records)
    }

    /// Remove terminal records last updated more than `age` ago.
    /// `running` records are never removed.
    pub async fn delete_older_than(&self, age: Duration) -> Result<usize> {
        let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };

        let removed = self
            .update(|doc| {
                let expired: Vec<u64> = doc
                    .records
                    .iter()
                    .filter(|(_, r)| r.status.is_terminal() && r.updated_at < cutoff)
                    .map(|(id, _)| *id)
                    .collect();
                for id in &expired {
                    doc.records.remove(id);
                    doc.pending.remove(id);
                }
                Ok(expired.len())
            })
            .await?;

        if removed > 0 {
            tracing::debug!("Deleted {} expired action records", removed);
        }
        Ok(removed)
    }
}

fn sort_newest_first(records: &mut [ActionRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// Time since the lock file was last modified, `None` once it is gone
async fn lock_file_age(lock_path: &Path) -> Result<Option<Duration>> {
    let modified = match fs::metadata(lock_path).await {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // a timestamp in the future counts as fresh
    Ok(Some(modified.elapsed().unwrap_or(Duration::ZERO)))
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the store lock file
struct StoreLock {
    lock_path: PathBuf,
    released: bool,
}

impl StoreLock {
    async fn release(mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            match fs::remove_file(&self.lock_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionCommand;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(server: &str) -> ActionRecord {
        ActionRecord::new("mock", server, ActionCommand::StartServer)
    }

    #[tokio::test]
    async fn test_open_creates_directory_and_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join(STORE_FILE);

        let store = ActionStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert!(store.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_insert_and_update() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        let mut first = record("srv-1");
        store.save(&mut first).await.unwrap();
        let mut second = record("srv-2");
        store.save(&mut second).await.unwrap();

        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));

        let created_at = first.created_at;
        let before = first.updated_at;
        first.set_progress(60);
        store.save(&mut first).await.unwrap();

        let loaded = store.get(1).await.unwrap().unwrap();
        assert_eq!(loaded.progress, 60);
        assert_eq!(loaded.created_at, created_at);
        assert!(loaded.updated_at >= before);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        let mut ghost = record("srv-1");
        ghost.id = Some(42);
        let err = store.save(&mut ghost).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        assert!(store.get(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_record_cannot_be_reopened() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        let mut rec = record("srv-1");
        rec.mark_error("boom");
        store.save(&mut rec).await.unwrap();

        rec.status = ActionStatus::Running;
        assert!(store.save(&mut rec).await.is_err());
    }

    #[tokio::test]
    async fn test_list_pending_and_recent_ordering() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        for server in ["srv-1", "srv-2", "srv-3"] {
            let mut rec = record(server);
            store.save(&mut rec).await.unwrap();
        }
        let mut done = store.get(2).await.unwrap().unwrap();
        done.mark_success();
        store.save(&mut done).await.unwrap();

        let pending: Vec<u64> = store
            .list_pending()
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.id)
            .collect();
        assert_eq!(pending, vec![3, 1]);

        let recent: Vec<u64> = store
            .list_recent(2)
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.id)
            .collect();
        assert_eq!(recent, vec![3, 2]);

        assert_eq!(store.list_recent(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_older_than_never_removes_running() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        let mut running = record("srv-1");
        store.save(&mut running).await.unwrap();
        let mut ok = record("srv-2");
        ok.mark_success();
        store.save(&mut ok).await.unwrap();
        let mut failed = record("srv-3");
        failed.mark_error("boom");
        store.save(&mut failed).await.unwrap();

        // a generous age keeps everything
        assert_eq!(
            store
                .delete_older_than(Duration::from_secs(3600))
                .await
                .unwrap(),
            0
        );

        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = store.delete_older_than(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 2);

        let left = store.list_recent(10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].server_id, "srv-1");
        assert!(left[0].is_running());
    }

    #[tokio::test]
    async fn test_reopen_after_restart() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(STORE_FILE);

        {
            let store = ActionStore::open(&path).await.unwrap();
            let mut rec = record("srv-1").with_action_id("a1");
            store.save(&mut rec).await.unwrap();
        }

        let store = ActionStore::open(&path).await.unwrap();
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_id, "a1");

        let mut next = record("srv-2");
        store.save(&mut next).await.unwrap();
        assert_eq!(next.id, Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_saves_do_not_lose_records() {
        let temp_dir = tempdir().unwrap();
        let store = Arc::new(
            ActionStore::open(temp_dir.path().join(STORE_FILE))
                .await
                .unwrap(),
        );

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut rec = record(&format!("srv-{}", i));
                store.save(&mut rec).await.unwrap();
                rec.set_progress(50);
                store.save(&mut rec).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let all = store.list_recent(100).await.unwrap();
        assert_eq!(all.len(), 16);
        assert!(all.iter().all(|r| r.progress == 50));
        assert!(!store.lock_path().exists());
    }

    #[tokio::test]
    async fn test_find_pending_by_server() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        let mut a = record("srv-1");
        store.save(&mut a).await.unwrap();
        let mut b = record("srv-2");
        store.save(&mut b).await.unwrap();

        let found = store.find_pending("mock", "srv-1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.find_pending("other", "srv-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_empty_lock_is_reclaimed() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        // writer crashed after creating the lock but before writing its info
        let lock = std::fs::File::create(store.lock_path()).unwrap();
        lock.set_modified(std::time::SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
        drop(lock);

        let started = std::time::Instant::now();
        let mut rec = record("srv-1");
        store.save(&mut rec).await.unwrap();
        assert!(started.elapsed() < LOCK_TIMEOUT);
        assert!(!store.lock_path().exists());

        let mut next = record("srv-2");
        store.save(&mut next).await.unwrap();
        assert_eq!(store.list_pending().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fresh_empty_lock_is_respected() {
        let temp_dir = tempdir().unwrap();
        let store = ActionStore::open(temp_dir.path().join(STORE_FILE))
            .await
            .unwrap();

        std::fs::File::create(store.lock_path()).unwrap();
        assert!(!store.remove_stale_lock(&store.lock_path()).await.unwrap());
        assert!(store.lock_path().exists());
    }
}
