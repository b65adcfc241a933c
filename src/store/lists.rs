//! In-memory list state shared by every store backend.
//!
//! All mutations go through [`Lists`] so the whitelist/blacklist mutual
//! exclusion is enforced in one place. Each mutation reports which lists it
//! touched so file-backed stores only rewrite what changed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;

use crate::error::GateResult;
use crate::models::{EntryStatus, KeywordRule, ListCounts, ReputationEntry, normalize_keyword};

// Lists touched by a mutation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Dirty {
    pub whitelist: bool,
    pub blacklist: bool,
    pub keywords: bool,
}

impl Dirty {
    pub fn is_empty(&self) -> bool {
        !(self.whitelist || self.blacklist || self.keywords)
    }
}

// Insertion sequence keeps listings in the order entries were first added
#[derive(Debug, Clone)]
struct Slot<T> {
    seq: u64,
    value: T,
}

#[derive(Debug, Clone, Default)]
pub struct Lists {
    whitelist: HashMap<IpAddr, Slot<ReputationEntry>>,
    blacklist: HashMap<IpAddr, Slot<ReputationEntry>>,
    keywords: HashMap<String, Slot<KeywordRule>>,
    next_seq: u64,
}

impl Lists {
    /// Rebuild state from persisted rows, in file order.
    ///
    /// An IP found on both lists stays blacklisted.
    pub fn from_rows(
        whitelist: Vec<ReputationEntry>,
        blacklist: Vec<ReputationEntry>,
        keywords: Vec<KeywordRule>,
    ) -> Self {
        let mut lists = Lists::default();
        for mut entry in blacklist {
            entry.status = EntryStatus::Blacklisted;
            let seq = lists.bump();
            lists.blacklist.entry(entry.ip).or_insert(Slot { seq, value: entry });
        }
        for mut entry in whitelist {
            if lists.blacklist.contains_key(&entry.ip) {
                tracing::warn!(ip = %entry.ip, "ip present on both lists; keeping blacklist entry");
                continue;
            }
            entry.status = EntryStatus::Whitelisted;
            let seq = lists.bump();
            lists.whitelist.entry(entry.ip).or_insert(Slot { seq, value: entry });
        }
        for rule in keywords {
            let Ok(keyword) = normalize_keyword(&rule.keyword) else {
                tracing::warn!(keyword = %rule.keyword, "skipping unusable keyword row");
                continue;
            };
            let seq = lists.bump();
            lists.keywords.entry(keyword.clone()).or_insert(Slot {
                seq,
                value: KeywordRule { keyword, created_at: rule.created_at },
            });
        }
        lists
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn entry(&self, status: EntryStatus, ip: IpAddr) -> Option<&ReputationEntry> {
        let list = match status {
            EntryStatus::Whitelisted => &self.whitelist,
            EntryStatus::Blacklisted => &self.blacklist,
        };
        list.get(&ip).map(|slot| &slot.value)
    }

    pub fn add_whitelist(&mut self, ip: IpAddr, now: DateTime<Utc>) -> (ReputationEntry, Dirty) {
        let mut dirty = Dirty::default();
        if self.blacklist.remove(&ip).is_some() {
            dirty.blacklist = true;
        }
        if let Some(slot) = self.whitelist.get(&ip) {
            return (slot.value.clone(), dirty);
        }
        let entry = ReputationEntry {
            ip,
            status: EntryStatus::Whitelisted,
            reason: String::new(),
            created_at: now,
        };
        let seq = self.bump();
        self.whitelist.insert(ip, Slot { seq, value: entry.clone() });
        dirty.whitelist = true;
        (entry, dirty)
    }

    // Re-adding refreshes reason and timestamp but keeps the original position
    pub fn add_blacklist(
        &mut self,
        ip: IpAddr,
        reason: &str,
        now: DateTime<Utc>,
    ) -> (ReputationEntry, Dirty) {
        let mut dirty = Dirty { blacklist: true, ..Dirty::default() };
        if self.whitelist.remove(&ip).is_some() {
            dirty.whitelist = true;
        }
        let entry = ReputationEntry {
            ip,
            status: EntryStatus::Blacklisted,
            reason: reason.to_string(),
            created_at: now,
        };
        match self.blacklist.get_mut(&ip) {
            Some(slot) => slot.value = entry.clone(),
            None => {
                let seq = self.bump();
                self.blacklist.insert(ip, Slot { seq, value: entry.clone() });
            }
        }
        (entry, dirty)
    }

    pub fn remove(&mut self, status: EntryStatus, ip: IpAddr) -> (bool, Dirty) {
        let mut dirty = Dirty::default();
        let removed = match status {
            EntryStatus::Whitelisted => {
                dirty.whitelist = self.whitelist.remove(&ip).is_some();
                dirty.whitelist
            }
            EntryStatus::Blacklisted => {
                dirty.blacklist = self.blacklist.remove(&ip).is_some();
                dirty.blacklist
            }
        };
        (removed, dirty)
    }

    pub fn add_keyword(&mut self, raw: &str, now: DateTime<Utc>) -> GateResult<(KeywordRule, Dirty)> {
        let keyword = normalize_keyword(raw)?;
        if let Some(slot) = self.keywords.get(&keyword) {
            return Ok((slot.value.clone(), Dirty::default()));
        }
        let rule = KeywordRule { keyword: keyword.clone(), created_at: now };
        let seq = self.bump();
        self.keywords.insert(keyword, Slot { seq, value: rule.clone() });
        Ok((rule, Dirty { keywords: true, ..Dirty::default() }))
    }

    pub fn remove_keyword(&mut self, raw: &str) -> GateResult<(bool, Dirty)> {
        let keyword = normalize_keyword(raw)?;
        let removed = self.keywords.remove(&keyword).is_some();
        Ok((removed, Dirty { keywords: removed, ..Dirty::default() }))
    }

    pub fn list(&self, status: EntryStatus) -> Vec<ReputationEntry> {
        match status {
            EntryStatus::Whitelisted => ordered(&self.whitelist),
            EntryStatus::Blacklisted => ordered(&self.blacklist),
        }
    }

    pub fn keywords(&self) -> Vec<KeywordRule> {
        ordered(&self.keywords)
    }

    pub fn counts(&self) -> ListCounts {
        ListCounts {
            whitelist: self.whitelist.len(),
            blacklist: self.blacklist.len(),
            keywords: self.keywords.len(),
        }
    }
}

fn ordered<K: Eq + Hash, T: Clone>(map: &HashMap<K, Slot<T>>) -> Vec<T> {
    let mut slots: Vec<&Slot<T>> = map.values().collect();
    slots.sort_by_key(|slot| slot.seq);
    slots.into_iter().map(|slot| slot.value.clone()).collect()
}
