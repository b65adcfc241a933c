use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use std::time::Duration;

use crate::error::{GateError, GateResult};

// Where reputation lists live
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    File,
    Memory,
}

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "ipgate")]
#[command(about = "Request-gating gateway with IP reputation and rate limiting")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Address to bind
    #[arg(long, env = "IPGATE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    // Site being protected, e.g. "http://127.0.0.1:5000"
    #[arg(short, long, env = "IPGATE_UPSTREAM")]
    pub upstream: Option<String>,

    // List storage backend
    #[arg(long, env = "IPGATE_STORAGE", value_enum, default_value_t = StorageKind::File)]
    pub storage: StorageKind,

    // Directory holding whitelist.csv, blacklist.csv and keywords.csv
    #[arg(short, long, env = "IPGATE_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    // Upper bound for a single list write (and for waiting on the writer lock)
    #[arg(long, env = "IPGATE_IO_TIMEOUT_MS", default_value_t = 2000)]
    pub io_timeout_ms: u64,

    // Turn gating on or off without removing the gateway
    #[arg(long, env = "IPGATE_PROTECTION", default_value_t = true, action = ArgAction::Set)]
    pub protection: bool,

    // Sliding window length in seconds
    #[arg(long, env = "IPGATE_RATE_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // Requests per window before a request is flagged
    #[arg(long, env = "IPGATE_RATE_MAX", default_value_t = 100)]
    pub rate_max: u32,

    // Requests per window before the client is blacklisted
    #[arg(long, env = "IPGATE_RATE_FLOOD", default_value_t = 200)]
    pub rate_flood: u32,

    // Minimum seconds between form render and submission
    #[arg(long, env = "IPGATE_MIN_FORM_TIME", default_value_t = 2.0)]
    pub min_form_time: f64,

    // Bearer token for the admin endpoints; open when unset
    #[arg(long, env = "IPGATE_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    // Take the client address from the last X-Forwarded-For hop. Only enable
    // behind a proxy that appends it; a client reaching us directly could
    // otherwise claim any address, a whitelisted one included.
    #[arg(long, env = "IPGATE_TRUST_FORWARDED", default_value_t = false)]
    pub trust_forwarded: bool,

    // Largest request body the gate will buffer and inspect
    #[arg(long, env = "IPGATE_MAX_BODY_BYTES", default_value_t = crate::state::DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

impl Args {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms.max(1))
    }

    // Thresholds handed to the decision engine at construction
    pub fn gate_config(&self) -> GateResult<GateConfig> {
        let config = GateConfig {
            protection_enabled: self.protection,
            rate_window: self.rate_window,
            rate_max: self.rate_max,
            rate_flood: self.rate_flood,
            min_form_time: self.min_form_time,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Gating thresholds. Immutable once the engine is built.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GateConfig {
    #[serde(skip)]
    pub protection_enabled: bool,
    /// Window length in seconds.
    pub rate_window: u64,
    /// Soft limit: `count > rate_max` flags the request.
    pub rate_max: u32,
    /// Hard limit: `count > rate_flood` denies and blacklists.
    pub rate_flood: u32,
    /// Seconds.
    pub min_form_time: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            protection_enabled: true,
            rate_window: 60,
            rate_max: 100,
            rate_flood: 200,
            min_form_time: 2.0,
        }
    }
}

impl GateConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.rate_window == 0 {
            return Err(GateError::Validation("rate_window must be at least 1 second".into()));
        }
        if self.rate_flood < self.rate_max {
            return Err(GateError::Validation(format!(
                "rate_flood ({}) must not be below rate_max ({})",
                self.rate_flood, self.rate_max
            )));
        }
        if !self.min_form_time.is_finite() || self.min_form_time < 0.0 {
            return Err(GateError::Validation("min_form_time must be a non-negative number".into()));
        }
        Ok(())
    }
}
