//! Request gating.
//!
//! [`DecisionEngine`] runs a fixed sequence of checks and stops at the first
//! terminal answer:
//!
//! 1. whitelisted IP: allow, nothing else is evaluated (not even the rate window)
//! 2. blacklisted IP: deny with the stored reason
//! 3. keyword found in path or body: deny and blacklist as `keyword:<kw>`
//! 4. rate window: the request is recorded, over `rate_flood` denies and
//!    blacklists as `flood`
//! 5. form submitted faster than `min_form_time`: deny, no blacklist
//! 6. over `rate_max`: allow with a soft-limit flag
//!
//! Fast form posts are counted before they are turned away, so a bot that
//! keeps posting ends up on the blacklist like any other flood.
//!
//! A store read that fails skips its check; the request is never failed
//! because a list could not be read.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::GateConfig;
use crate::metrics::{DENIED_TOTAL, SOFT_LIMITED_TOTAL, TRACKED_IPS};
use crate::models::{EntryStatus, KeywordRule, RateVerdict, RequestInfo, Verdict};
use crate::rate_limit::RateTracker;
use crate::store::ReputationStore;

pub const FLOOD_REASON: &str = "flood";
pub const FORM_TOO_FAST_REASON: &str = "form_too_fast";

#[async_trait]
pub trait Gate: Send + Sync {
    async fn evaluate(&self, request: &RequestInfo, now: Instant) -> Verdict;
}

pub struct DecisionEngine {
    store: Arc<dyn ReputationStore>,
    tracker: Arc<RateTracker>,
    config: GateConfig,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn ReputationStore>, tracker: Arc<RateTracker>, config: GateConfig) -> Self {
        Self { store, tracker, config }
    }

    // Denials that should stick: persist the blacklist entry, but deny even if that fails
    async fn deny_and_blacklist(&self, ip: IpAddr, reason: String, rule: &str) -> Verdict {
        if let Err(err) = self.store.add_blacklist(ip, &reason).await {
            error!(%ip, %reason, error = %err, "could not persist blacklist entry");
        }
        self.tracker.forget(ip);
        TRACKED_IPS.set(self.tracker.tracked_ips() as i64);
        DENIED_TOTAL.with_label_values(&[rule]).inc();
        warn!(%ip, %reason, "request denied; ip blacklisted");
        Verdict::deny(reason)
    }
}

#[async_trait]
impl Gate for DecisionEngine {
    async fn evaluate(&self, request: &RequestInfo, now: Instant) -> Verdict {
        if !self.config.protection_enabled {
            return Verdict::allow();
        }
        let ip = request.ip;

        match self.store.is_whitelisted(ip).await {
            Ok(true) => return Verdict::allow(),
            Ok(false) => {}
            Err(err) => error!(%ip, error = %err, "whitelist lookup failed"),
        }

        match self.store.get_entry(EntryStatus::Blacklisted, ip).await {
            Ok(Some(entry)) => {
                DENIED_TOTAL.with_label_values(&["blacklist"]).inc();
                warn!(%ip, reason = %entry.reason, "blacklisted ip denied");
                return Verdict::deny(entry.reason);
            }
            Ok(None) => {}
            Err(err) => error!(%ip, error = %err, "blacklist lookup failed"),
        }

        match self.store.list_keywords().await {
            Ok(keywords) => {
                if let Some(hit) = match_keyword(&keywords, &request.path, &request.body) {
                    return self.deny_and_blacklist(ip, format!("keyword:{hit}"), "keyword").await;
                }
            }
            Err(err) => error!(%ip, error = %err, "keyword lookup failed"),
        }

        let soft_limited = match self.tracker.record_and_check(ip, now) {
            RateVerdict::Flood { count } => {
                info!(%ip, count, "flood threshold crossed");
                return self.deny_and_blacklist(ip, FLOOD_REASON.to_string(), FLOOD_REASON).await;
            }
            RateVerdict::SoftLimit { count } => Some(count),
            RateVerdict::Within { .. } => None,
        };
        TRACKED_IPS.set(self.tracker.tracked_ips() as i64);

        if let Some(age) = request.form_age {
            if age < self.config.min_form_time {
                DENIED_TOTAL.with_label_values(&[FORM_TOO_FAST_REASON]).inc();
                warn!(%ip, age, "form submitted too fast");
                return Verdict::deny(FORM_TOO_FAST_REASON);
            }
        }

        match soft_limited {
            Some(count) => {
                SOFT_LIMITED_TOTAL.inc();
                info!(%ip, count, limit = self.config.rate_max, "soft rate limit exceeded");
                Verdict::soft_limited()
            }
            None => Verdict::allow(),
        }
    }
}

// First keyword (in insertion order) contained in the path or body, ignoring case
pub fn match_keyword<'a>(keywords: &'a [KeywordRule], path: &str, body: &str) -> Option<&'a str> {
    if keywords.is_empty() {
        return None;
    }
    let path = path.to_lowercase();
    let body = body.to_lowercase();
    keywords
        .iter()
        .map(|rule| rule.keyword.as_str())
        .find(|keyword| !keyword.is_empty() && (path.contains(keyword) || body.contains(keyword)))
}
