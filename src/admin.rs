//! Operational control over the reputation lists.
//!
//! Every operation takes raw strings from the outside world, validates them
//! and only then touches the store. Removing something that is not there is
//! a successful no-op.

use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::metrics::ADMIN_OPS_TOTAL;
use crate::models::{
    EntryStatus, KeywordRule, ListCounts, ReputationEntry, StoreFile, normalize_keyword,
    normalize_reason, parse_ip,
};
use crate::rate_limit::RateTracker;
use crate::store::ReputationStore;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub protection_enabled: bool,
    pub storage_type: &'static str,
    pub configuration: GateConfig,
    pub files: Vec<StoreFile>,
    pub counts: ListCounts,
    pub tracked_ips: usize,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn ReputationStore>,
    tracker: Arc<RateTracker>,
    config: GateConfig,
}

impl AdminService {
    pub fn new(store: Arc<dyn ReputationStore>, tracker: Arc<RateTracker>, config: GateConfig) -> Self {
        Self { store, tracker, config }
    }

    pub fn storage_type(&self) -> &'static str {
        self.store.storage_type()
    }

    pub async fn status(&self) -> GateResult<StatusReport> {
        Ok(StatusReport {
            protection_enabled: self.config.protection_enabled,
            storage_type: self.store.storage_type(),
            configuration: self.config.clone(),
            files: self.store.files().await,
            counts: self.store.counts().await?,
            tracked_ips: self.tracker.tracked_ips(),
        })
    }

    pub async fn probe(&self) -> GateResult<()> {
        self.store.probe().await
    }

    // Blacklisted clients may not curate the lists either
    pub async fn refuses(&self, ip: IpAddr) -> bool {
        if !self.config.protection_enabled {
            return false;
        }
        match self.store.is_blacklisted(ip).await {
            Ok(blacklisted) => blacklisted,
            Err(err) => {
                error!(%ip, error = %err, "blacklist lookup failed");
                false
            }
        }
    }

    pub async fn list(&self, status: EntryStatus) -> GateResult<Vec<ReputationEntry>> {
        match status {
            EntryStatus::Whitelisted => self.store.list_whitelist().await,
            EntryStatus::Blacklisted => self.store.list_blacklist().await,
        }
    }

    pub async fn lookup(&self, status: EntryStatus, raw_ip: &str) -> GateResult<ReputationEntry> {
        let ip = parse_ip(raw_ip)?;
        self.store
            .get_entry(status, ip)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("{ip} is not on the {}", status.list_name())))
    }

    pub async fn add_whitelist(&self, raw_ip: &str) -> GateResult<ReputationEntry> {
        let ip = parse_ip(raw_ip)?;
        let entry = self.store.add_whitelist(ip).await?;
        ADMIN_OPS_TOTAL.with_label_values(&["whitelist_add"]).inc();
        info!(%ip, "whitelisted");
        Ok(entry)
    }

    pub async fn add_blacklist(&self, raw_ip: &str, reason: Option<&str>) -> GateResult<ReputationEntry> {
        let ip = parse_ip(raw_ip)?;
        let reason = normalize_reason(reason)?;
        let entry = self.store.add_blacklist(ip, &reason).await?;
        ADMIN_OPS_TOTAL.with_label_values(&["blacklist_add"]).inc();
        info!(%ip, %reason, "blacklisted");
        Ok(entry)
    }

    pub async fn remove(&self, status: EntryStatus, raw_ip: &str) -> GateResult<bool> {
        let ip = parse_ip(raw_ip)?;
        let removed = match status {
            EntryStatus::Whitelisted => self.store.remove_whitelist(ip).await?,
            EntryStatus::Blacklisted => {
                let removed = self.store.remove_blacklist(ip).await?;
                // a cleared IP starts with an empty window
                self.tracker.forget(ip);
                removed
            }
        };
        let op = format!("{}_remove", status.list_name());
        ADMIN_OPS_TOTAL.with_label_values(&[op.as_str()]).inc();
        info!(%ip, list = status.list_name(), removed, "removed");
        Ok(removed)
    }

    pub async fn list_keywords(&self) -> GateResult<Vec<KeywordRule>> {
        self.store.list_keywords().await
    }

    pub async fn add_keyword(&self, raw: &str) -> GateResult<KeywordRule> {
        let keyword = normalize_keyword(raw)?;
        let rule = self.store.add_keyword(&keyword).await?;
        ADMIN_OPS_TOTAL.with_label_values(&["keyword_add"]).inc();
        info!(%keyword, "keyword added");
        Ok(rule)
    }

    pub async fn remove_keyword(&self, raw: &str) -> GateResult<bool> {
        let keyword = normalize_keyword(raw)?;
        let removed = self.store.remove_keyword(&keyword).await?;
        ADMIN_OPS_TOTAL.with_label_values(&["keyword_remove"]).inc();
        info!(%keyword, removed, "keyword removed");
        Ok(removed)
    }
}
