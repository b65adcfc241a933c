//! CSV-backed reputation store.
//!
//! Each list lives in its own file with a header row:
//! `whitelist.csv` / `blacklist.csv` hold `ip,status,reason,created_at`,
//! `keywords.csv` holds `keyword,created_at`.
//!
//! Writes are serialized through a single async mutex. A write builds the next
//! state on a copy, persists every touched file (temp file + rename, bounded by
//! the I/O timeout, retried once) and only then swaps the copy in. A failed
//! write leaves both the files and the in-memory state as they were.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::error::{GateError, GateResult};
use crate::models::{EntryStatus, KeywordRule, ListCounts, ReputationEntry, StoreFile};
use crate::store::ReputationStore;
use crate::store::lists::{Dirty, Lists};

const WHITELIST_FILE: &str = "whitelist.csv";
const BLACKLIST_FILE: &str = "blacklist.csv";
const KEYWORDS_FILE: &str = "keywords.csv";

const ENTRY_HEADER: [&str; 4] = ["ip", "status", "reason", "created_at"];
const KEYWORD_HEADER: [&str; 2] = ["keyword", "created_at"];

const WRITE_ATTEMPTS: usize = 2;

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    io_timeout: Duration,
    lists: RwLock<Lists>,
    writer: Mutex<()>,
    #[cfg(test)]
    failing_writes: std::sync::atomic::AtomicUsize,
}

impl FileStore {
    /// Open (or create) the list directory and load whatever is already there.
    pub async fn open(dir: impl Into<PathBuf>, io_timeout: Duration) -> GateResult<Self> {
        let dir = dir.into();
        bounded(io_timeout, tokio::fs::create_dir_all(&dir)).await?;

        let whitelist = load_rows::<ReputationEntry>(&dir.join(WHITELIST_FILE), io_timeout).await?;
        let blacklist = load_rows::<ReputationEntry>(&dir.join(BLACKLIST_FILE), io_timeout).await?;
        let keywords = load_rows::<KeywordRule>(&dir.join(KEYWORDS_FILE), io_timeout).await?;
        debug!(
            whitelist = whitelist.len(),
            blacklist = blacklist.len(),
            keywords = keywords.len(),
            dir = %dir.display(),
            "loaded reputation lists"
        );

        Ok(Self {
            dir,
            io_timeout,
            lists: RwLock::new(Lists::from_rows(whitelist, blacklist, keywords)),
            writer: Mutex::new(()),
            #[cfg(test)]
            failing_writes: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Lists) -> T) -> GateResult<T> {
        let guard = self
            .lists
            .read()
            .map_err(|_| GateError::Storage("file store lock poisoned".into()))?;
        Ok(f(&guard))
    }

    fn snapshot(&self) -> GateResult<Lists> {
        self.read(Lists::clone)
    }

    fn commit(&self, next: Lists) -> GateResult<()> {
        let mut guard = self
            .lists
            .write()
            .map_err(|_| GateError::Storage("file store lock poisoned".into()))?;
        *guard = next;
        Ok(())
    }

    // Apply a mutation under the writer lock; persist before publishing it
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Lists) -> GateResult<(T, Dirty)>,
    ) -> GateResult<T> {
        let _writer = timeout(self.io_timeout, self.writer.lock())
            .await
            .map_err(|_| GateError::Storage("timed out waiting for list writer".into()))?;

        let mut next = self.snapshot()?;
        let (value, dirty) = f(&mut next)?;
        if dirty.is_empty() {
            return Ok(value);
        }
        if dirty.whitelist {
            let rows = next.list(EntryStatus::Whitelisted);
            self.persist(WHITELIST_FILE, encode_rows(&ENTRY_HEADER, &rows)?).await?;
        }
        if dirty.blacklist {
            let rows = next.list(EntryStatus::Blacklisted);
            self.persist(BLACKLIST_FILE, encode_rows(&ENTRY_HEADER, &rows)?).await?;
        }
        if dirty.keywords {
            let rows = next.keywords();
            self.persist(KEYWORDS_FILE, encode_rows(&KEYWORD_HEADER, &rows)?).await?;
        }
        self.commit(next)?;
        Ok(value)
    }

    async fn persist(&self, name: &str, bytes: Vec<u8>) -> GateResult<()> {
        let path = self.dir.join(name);
        let mut last_err = None;
        for attempt in 1..=WRITE_ATTEMPTS {
            match self.write_once(&path, &bytes).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(file = name, attempt, error = %err, "list write failed");
                    last_err = Some(err);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| GateError::Storage(format!("{name}: write failed")));
        error!(file = name, error = %err, "giving up on list write");
        Err(err)
    }

    #[cfg(not(test))]
    async fn write_once(&self, path: &Path, bytes: &[u8]) -> GateResult<()> {
        bounded(self.io_timeout, write_atomic(path, bytes)).await
    }

    // Tests can make the next N writes fail
    #[cfg(test)]
    async fn write_once(&self, path: &Path, bytes: &[u8]) -> GateResult<()> {
        use std::sync::atomic::Ordering;
        let pending = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(GateError::Storage("injected write failure".into()));
        }
        bounded(self.io_timeout, write_atomic(path, bytes)).await
    }
}

#[async_trait]
impl ReputationStore for FileStore {
    fn storage_type(&self) -> &'static str {
        "file"
    }

    async fn get_entry(&self, status: EntryStatus, ip: IpAddr) -> GateResult<Option<ReputationEntry>> {
        self.read(|lists| lists.entry(status, ip).cloned())
    }

    async fn add_whitelist(&self, ip: IpAddr) -> GateResult<ReputationEntry> {
        self.mutate(|lists| Ok(lists.add_whitelist(ip, Utc::now()))).await
    }

    async fn add_blacklist(&self, ip: IpAddr, reason: &str) -> GateResult<ReputationEntry> {
        self.mutate(|lists| Ok(lists.add_blacklist(ip, reason, Utc::now()))).await
    }

    async fn remove_whitelist(&self, ip: IpAddr) -> GateResult<bool> {
        self.mutate(|lists| Ok(lists.remove(EntryStatus::Whitelisted, ip))).await
    }

    async fn remove_blacklist(&self, ip: IpAddr) -> GateResult<bool> {
        self.mutate(|lists| Ok(lists.remove(EntryStatus::Blacklisted, ip))).await
    }

    async fn list_whitelist(&self) -> GateResult<Vec<ReputationEntry>> {
        self.read(|lists| lists.list(EntryStatus::Whitelisted))
    }

    async fn list_blacklist(&self) -> GateResult<Vec<ReputationEntry>> {
        self.read(|lists| lists.list(EntryStatus::Blacklisted))
    }

    async fn add_keyword(&self, keyword: &str) -> GateResult<KeywordRule> {
        self.mutate(|lists| lists.add_keyword(keyword, Utc::now())).await
    }

    async fn remove_keyword(&self, keyword: &str) -> GateResult<bool> {
        self.mutate(|lists| lists.remove_keyword(keyword)).await
    }

    async fn list_keywords(&self) -> GateResult<Vec<KeywordRule>> {
        self.read(Lists::keywords)
    }

    async fn counts(&self) -> GateResult<ListCounts> {
        self.read(Lists::counts)
    }

    async fn files(&self) -> Vec<StoreFile> {
        let mut files = Vec::with_capacity(3);
        for name in [WHITELIST_FILE, BLACKLIST_FILE, KEYWORDS_FILE] {
            let path = self.dir.join(name);
            let exists = bounded(self.io_timeout, tokio::fs::try_exists(&path))
                .await
                .unwrap_or(false);
            files.push(StoreFile {
                name: name.to_string(),
                path: path.display().to_string(),
                exists,
            });
        }
        files
    }

    async fn probe(&self) -> GateResult<()> {
        let meta = bounded(self.io_timeout, tokio::fs::metadata(&self.dir)).await?;
        if !meta.is_dir() {
            return Err(GateError::Storage(format!("{} is not a directory", self.dir.display())));
        }
        Ok(())
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = std::io::Result<T>>,
) -> GateResult<T> {
    match timeout(limit, fut).await {
        Ok(result) => result.map_err(GateError::from),
        Err(_) => Err(GateError::Storage(format!("I/O timed out after {limit:?}"))),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

async fn load_rows<T: DeserializeOwned>(path: &Path, limit: Duration) -> GateResult<Vec<T>> {
    if !bounded(limit, tokio::fs::try_exists(path)).await? {
        return Ok(Vec::new());
    }
    let bytes = bounded(limit, tokio::fs::read(path)).await?;
    decode_rows(&bytes).map_err(|err| GateError::Storage(format!("{}: {err}", path.display())))
}

fn encode_rows<T: Serialize>(header: &[&str], rows: &[T]) -> GateResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| GateError::Storage(err.to_string()))
}

fn decode_rows<T: DeserializeOwned>(bytes: &[u8]) -> GateResult<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn lists_survive_reopen() {
        let temp = TempDir::new().expect("temp dir");
        {
            let store = FileStore::open(temp.path(), TIMEOUT).await.expect("open");
            store.add_whitelist(ip("10.1.1.1")).await.unwrap();
            store.add_blacklist(ip("10.2.2.2"), "scraper, aggressive").await.unwrap();
            store.add_keyword("Union Select").await.unwrap();
        }

        let store = FileStore::open(temp.path(), TIMEOUT).await.expect("reopen");
        assert!(store.is_whitelisted(ip("10.1.1.1")).await.unwrap());
        let entry = store
            .get_entry(EntryStatus::Blacklisted, ip("10.2.2.2"))
            .await
            .unwrap()
            .expect("blacklist entry");
        assert_eq!(entry.reason, "scraper, aggressive");
        let keywords = store.list_keywords().await.unwrap();
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0].keyword, "union select");
    }

    #[tokio::test]
    async fn files_carry_header_rows() {
        let temp = TempDir::new().expect("temp dir");
        let store = FileStore::open(temp.path(), TIMEOUT).await.expect("open");
        store.add_blacklist(ip("10.2.2.2"), "flood").await.unwrap();
        store.remove_blacklist(ip("10.2.2.2")).await.unwrap();

        let text = std::fs::read_to_string(temp.path().join(BLACKLIST_FILE)).unwrap();
        assert_eq!(text.trim(), "ip,status,reason,created_at");
    }

    #[tokio::test]
    async fn whitelisting_rewrites_both_files() {
        let temp = TempDir::new().expect("temp dir");
        let store = FileStore::open(temp.path(), TIMEOUT).await.expect("open");
        store.add_blacklist(ip("10.3.3.3"), "manual").await.unwrap();
        store.add_whitelist(ip("10.3.3.3")).await.unwrap();

        let black = std::fs::read_to_string(temp.path().join(BLACKLIST_FILE)).unwrap();
        let white = std::fs::read_to_string(temp.path().join(WHITELIST_FILE)).unwrap();
        assert!(!black.contains("10.3.3.3"));
        assert!(white.contains("10.3.3.3,whitelisted"));
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let temp = TempDir::new().expect("temp dir");
        let store = FileStore::open(temp.path(), TIMEOUT).await.expect("open");
        // A directory squatting on the temp path makes the write fail
        std::fs::create_dir(temp.path().join("blacklist.csv.tmp")).unwrap();

        let err = store.add_blacklist(ip("10.4.4.4"), "manual").await.unwrap_err();
        assert_eq!(err.code(), "storage_error");
        assert!(!store.is_blacklisted(ip("10.4.4.4")).await.unwrap());
    }

    #[tokio::test]
    async fn one_failed_attempt_is_retried() {
        let temp = TempDir::new().expect("temp dir");
        let store = FileStore::open(temp.path(), TIMEOUT).await.expect("open");
        store.failing_writes.store(1, std::sync::atomic::Ordering::SeqCst);

        store.add_blacklist(ip("10.4.4.5"), "manual").await.expect("second attempt lands");
        assert!(store.is_blacklisted(ip("10.4.4.5")).await.unwrap());

        let reopened = FileStore::open(temp.path(), TIMEOUT).await.expect("reopen");
        assert!(reopened.is_blacklisted(ip("10.4.4.5")).await.unwrap());
    }

    #[tokio::test]
    async fn two_failed_attempts_surface_storage_error() {
        let temp = TempDir::new().expect("temp dir");
        let store = FileStore::open(temp.path(), TIMEOUT).await.expect("open");
        store.failing_writes.store(2, std::sync::atomic::Ordering::SeqCst);

        let err = store.add_keyword("drop").await.unwrap_err();
        assert_eq!(err.code(), "storage_error");
        assert!(store.list_keywords().await.unwrap().is_empty());
        assert!(!temp.path().join(KEYWORDS_FILE).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_keep_every_row() {
        let temp = TempDir::new().expect("temp dir");
        let store = std::sync::Arc::new(FileStore::open(temp.path(), TIMEOUT).await.expect("open"));

        let handles: Vec<_> = (0..32u8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store.add_blacklist(ip(&format!("10.9.0.{i}")), "flood").await
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task").expect("add_blacklist");
        }

        let text = std::fs::read_to_string(temp.path().join(BLACKLIST_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 33);
        assert_eq!(lines[0], "ip,status,reason,created_at");
        for line in &lines[1..] {
            assert_eq!(line.split(',').count(), 4, "torn row {line:?}");
        }

        let reopened = FileStore::open(temp.path(), TIMEOUT).await.expect("reopen");
        assert_eq!(reopened.list_blacklist().await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn corrupted_rows_refuse_to_load() {
        let temp = TempDir::new().expect("temp dir");
        std::fs::write(
            temp.path().join(WHITELIST_FILE),
            "ip,status,reason,created_at\nnot-an-ip,whitelisted,,2024-01-01T00:00:00Z\n",
        )
        .unwrap();
        let err = FileStore::open(temp.path(), TIMEOUT).await.unwrap_err();
        assert_eq!(err.code(), "storage_error");
    }

    #[tokio::test]
    async fn status_lists_three_files() {
        let temp = TempDir::new().expect("temp dir");
        let store = FileStore::open(temp.path(), TIMEOUT).await.expect("open");
        store.add_keyword("drop table").await.unwrap();
        let files = store.files().await;
        assert_eq!(files.len(), 3);
        let keywords = files.iter().find(|f| f.name == KEYWORDS_FILE).unwrap();
        assert!(keywords.exists);
        let whitelist = files.iter().find(|f| f.name == WHITELIST_FILE).unwrap();
        assert!(!whitelist.exists);
        store.probe().await.expect("probe");
    }
}
