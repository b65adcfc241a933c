use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use std::sync::RwLock;

use crate::error::{GateError, GateResult};
use crate::models::{EntryStatus, KeywordRule, ListCounts, ReputationEntry};
use crate::store::ReputationStore;
use crate::store::lists::Lists;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: RwLock<Lists>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Lists) -> T) -> GateResult<T> {
        let guard = self
            .lists
            .read()
            .map_err(|_| GateError::Storage("memory store lock poisoned".into()))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Lists) -> T) -> GateResult<T> {
        let mut guard = self
            .lists
            .write()
            .map_err(|_| GateError::Storage("memory store lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl ReputationStore for MemoryStore {
    fn storage_type(&self) -> &'static str {
        "memory"
    }

    async fn get_entry(&self, status: EntryStatus, ip: IpAddr) -> GateResult<Option<ReputationEntry>> {
        self.read(|lists| lists.entry(status, ip).cloned())
    }

    async fn add_whitelist(&self, ip: IpAddr) -> GateResult<ReputationEntry> {
        self.write(|lists| lists.add_whitelist(ip, Utc::now()).0)
    }

    async fn add_blacklist(&self, ip: IpAddr, reason: &str) -> GateResult<ReputationEntry> {
        self.write(|lists| lists.add_blacklist(ip, reason, Utc::now()).0)
    }

    async fn remove_whitelist(&self, ip: IpAddr) -> GateResult<bool> {
        self.write(|lists| lists.remove(EntryStatus::Whitelisted, ip).0)
    }

    async fn remove_blacklist(&self, ip: IpAddr) -> GateResult<bool> {
        self.write(|lists| lists.remove(EntryStatus::Blacklisted, ip).0)
    }

    async fn list_whitelist(&self) -> GateResult<Vec<ReputationEntry>> {
        self.read(|lists| lists.list(EntryStatus::Whitelisted))
    }

    async fn list_blacklist(&self) -> GateResult<Vec<ReputationEntry>> {
        self.read(|lists| lists.list(EntryStatus::Blacklisted))
    }

    async fn add_keyword(&self, keyword: &str) -> GateResult<KeywordRule> {
        self.write(|lists| lists.add_keyword(keyword, Utc::now()))?
            .map(|(rule, _)| rule)
    }

    async fn remove_keyword(&self, keyword: &str) -> GateResult<bool> {
        self.write(|lists| lists.remove_keyword(keyword))?
            .map(|(removed, _)| removed)
    }

    async fn list_keywords(&self) -> GateResult<Vec<KeywordRule>> {
        self.read(Lists::keywords)
    }

    async fn counts(&self) -> GateResult<ListCounts> {
        self.read(Lists::counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn blacklist_is_visible_immediately() {
        let store = MemoryStore::new();
        store.add_blacklist(ip("192.0.2.7"), "manual").await.unwrap();
        assert!(store.is_blacklisted(ip("192.0.2.7")).await.unwrap());
        assert!(!store.is_whitelisted(ip("192.0.2.7")).await.unwrap());
    }

    #[tokio::test]
    async fn lists_stay_mutually_exclusive() {
        let store = MemoryStore::new();
        let target = ip("192.0.2.7");
        let ops: [u8; 8] = [0, 1, 1, 0, 2, 1, 3, 0];
        for op in ops {
            match op {
                0 => {
                    store.add_whitelist(target).await.unwrap();
                }
                1 => {
                    store.add_blacklist(target, "x").await.unwrap();
                }
                2 => {
                    store.remove_whitelist(target).await.unwrap();
                }
                _ => {
                    store.remove_blacklist(target).await.unwrap();
                }
            }
            let white = store.is_whitelisted(target).await.unwrap();
            let black = store.is_blacklisted(target).await.unwrap();
            assert!(!(white && black), "ip on both lists after op {op}");
        }
    }

    #[tokio::test]
    async fn removing_absent_entry_is_ok() {
        let store = MemoryStore::new();
        assert!(!store.remove_blacklist(ip("192.0.2.99")).await.unwrap());
        assert!(!store.remove_keyword("nothing").await.unwrap());
    }
}
