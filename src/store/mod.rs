//! Reputation storage.
//!
//! [`ReputationStore`] is the seam between the decision engine and wherever
//! the lists live. Two backends ship with the crate:
//! - [`MemoryStore`]: process-local, used in tests and for throwaway runs.
//! - [`FileStore`]: one CSV file per list, single writer, bounded I/O.
//!
//! IPs are typed as [`IpAddr`] here, so malformed addresses are rejected by
//! the caller before a store is ever touched.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::GateResult;
use crate::models::{EntryStatus, KeywordRule, ListCounts, ReputationEntry, StoreFile};

pub mod file;
pub mod lists;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Short name reported by `/status` and `/health`.
    fn storage_type(&self) -> &'static str;

    async fn get_entry(&self, status: EntryStatus, ip: IpAddr) -> GateResult<Option<ReputationEntry>>;

    async fn is_whitelisted(&self, ip: IpAddr) -> GateResult<bool> {
        Ok(self.get_entry(EntryStatus::Whitelisted, ip).await?.is_some())
    }

    async fn is_blacklisted(&self, ip: IpAddr) -> GateResult<bool> {
        Ok(self.get_entry(EntryStatus::Blacklisted, ip).await?.is_some())
    }

    /// Idempotent. Drops the IP from the blacklist first.
    async fn add_whitelist(&self, ip: IpAddr) -> GateResult<ReputationEntry>;

    /// Idempotent; re-adding refreshes reason and timestamp. Drops the IP from the whitelist.
    async fn add_blacklist(&self, ip: IpAddr, reason: &str) -> GateResult<ReputationEntry>;

    /// Returns whether an entry was removed. Absent IPs are not an error.
    async fn remove_whitelist(&self, ip: IpAddr) -> GateResult<bool>;

    async fn remove_blacklist(&self, ip: IpAddr) -> GateResult<bool>;

    async fn list_whitelist(&self) -> GateResult<Vec<ReputationEntry>>;

    async fn list_blacklist(&self) -> GateResult<Vec<ReputationEntry>>;

    async fn add_keyword(&self, keyword: &str) -> GateResult<KeywordRule>;

    async fn remove_keyword(&self, keyword: &str) -> GateResult<bool>;

    async fn list_keywords(&self) -> GateResult<Vec<KeywordRule>>;

    async fn counts(&self) -> GateResult<ListCounts>;

    /// Backing files, if any.
    async fn files(&self) -> Vec<StoreFile> {
        Vec::new()
    }

    /// Cheap liveness check used by `/health`.
    async fn probe(&self) -> GateResult<()> {
        Ok(())
    }
}
