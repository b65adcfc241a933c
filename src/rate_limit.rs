use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::config::GateConfig;
use crate::models::RateVerdict;

// Sliding window rate tracker - one timestamp queue per IP
//
// The DashMap entry guard holds the shard lock for the whole
// push/evict/count step, so concurrent requests from one IP never lose updates.
// Eviction is lazy: an idle IP keeps its queue until its next request or forget().
pub struct RateTracker {
    windows: DashMap<IpAddr, VecDeque<Instant>>,
    window: Duration,
    rate_max: u32,
    rate_flood: u32,
}

impl RateTracker {
    pub fn new(window: Duration, rate_max: u32, rate_flood: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            rate_max,
            rate_flood,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.window(), config.rate_max, config.rate_flood)
    }

    // Record one request at `now` and classify the resulting count.
    // Entries older than `window` are dropped; thresholds are strict (count > limit).
    pub fn record_and_check(&self, ip: IpAddr, now: Instant) -> RateVerdict {
        let mut entry = self.windows.entry(ip).or_default();
        let timestamps = entry.value_mut();

        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        timestamps.push_back(now);

        // Past the flood line the exact count no longer matters; keep memory bounded
        let cap = self.rate_flood as usize + 1;
        while timestamps.len() > cap {
            timestamps.pop_front();
        }

        let count = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        if count > self.rate_flood {
            RateVerdict::Flood { count }
        } else if count > self.rate_max {
            RateVerdict::SoftLimit { count }
        } else {
            RateVerdict::Within { count }
        }
    }

    // Drop an IP's window, e.g. once it has been blacklisted
    pub fn forget(&self, ip: IpAddr) {
        self.windows.remove(&ip);
    }

    pub fn tracked_ips(&self) -> usize {
        self.windows.len()
    }

    pub fn window_len(&self, ip: IpAddr) -> usize {
        self.windows.get(&ip).map(|w| w.len()).unwrap_or(0)
    }
}
