use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::{GateError, GateResult};

// Which list an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Whitelisted,
    Blacklisted,
}

impl EntryStatus {
    pub fn list_name(self) -> &'static str {
        match self {
            EntryStatus::Whitelisted => "whitelist",
            EntryStatus::Blacklisted => "blacklist",
        }
    }
}

// One row of whitelist.csv / blacklist.csv
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationEntry {
    pub ip: IpAddr,
    pub status: EntryStatus,
    #[serde(default)]
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// One row of keywords.csv, stored lowercase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub created_at: DateTime<Utc>,
}

// Outcome of the sliding window check for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    Within { count: u32 },
    SoftLimit { count: u32 },
    Flood { count: u32 },
}

/// Per-request gating result. Denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allow: bool,
    pub reason: Option<String>,
    /// Allowed, but over the soft rate limit.
    pub soft_limited: bool,
}

impl Verdict {
    pub fn allow() -> Self {
        Self { allow: true, reason: None, soft_limited: false }
    }

    pub fn soft_limited() -> Self {
        Self { allow: true, reason: Some("rate_limit".to_string()), soft_limited: true }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allow: false, reason: Some(reason.into()), soft_limited: false }
    }
}

// What the gate needs to know about an inbound request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub ip: IpAddr,
    pub path: String,  // decoded path and query
    pub body: String,  // decoded body text, empty when absent
    pub form_age: Option<f64>, // seconds since the submitted form was rendered
}

impl RequestInfo {
    pub fn new(ip: IpAddr, path: impl Into<String>) -> Self {
        Self { ip, path: path.into(), body: String::new(), form_age: None }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_form_age(mut self, secs: f64) -> Self {
        self.form_age = Some(secs);
        self
    }
}

// Admin payloads
#[derive(Debug, Deserialize)]
pub struct AddWhitelistRequest {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct AddBlacklistRequest {
    pub ip: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddKeywordRequest {
    pub keyword: String,
}

// A persisted list file, as reported by /status
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoreFile {
    pub name: String,
    pub path: String,
    pub exists: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ListCounts {
    pub whitelist: usize,
    pub blacklist: usize,
    pub keywords: usize,
}

const MAX_KEYWORD_LEN: usize = 200;
const MAX_REASON_LEN: usize = 200;

// Parse an IPv4/IPv6 literal; anything else never reaches a store
pub fn parse_ip(raw: &str) -> GateResult<IpAddr> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GateError::Validation("ip must not be empty".into()));
    }
    trimmed
        .parse()
        .map_err(|_| GateError::Validation(format!("'{trimmed}' is not a valid IP address")))
}

// Keywords compare case-insensitively, so they are stored lowercase
pub fn normalize_keyword(raw: &str) -> GateResult<String> {
    let keyword = raw.trim().to_lowercase();
    if keyword.is_empty() {
        return Err(GateError::Validation("keyword must not be empty".into()));
    }
    if keyword.chars().count() > MAX_KEYWORD_LEN {
        return Err(GateError::Validation(format!(
            "keyword longer than {MAX_KEYWORD_LEN} characters"
        )));
    }
    if keyword.chars().any(char::is_control) {
        return Err(GateError::Validation("keyword contains control characters".into()));
    }
    Ok(keyword)
}

pub fn normalize_reason(raw: Option<&str>) -> GateResult<String> {
    let reason = raw.map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return Ok("manual".to_string());
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(GateError::Validation(format!(
            "reason longer than {MAX_REASON_LEN} characters"
        )));
    }
    Ok(reason.to_string())
}
