use std::sync::Arc;

use crate::admin::AdminService;
use crate::config::GateConfig;
use crate::engine::{DecisionEngine, Gate};
use crate::rate_limit::RateTracker;
use crate::store::ReputationStore;

pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

// app's shared state
pub struct AppState {
    pub gate: Arc<dyn Gate>,
    pub admin: AdminService,
    pub client: reqwest::Client,         // forwards allowed requests
    pub upstream: Option<String>,        // base URL of the protected site
    pub admin_token: Option<String>,     // bearer token for admin routes
    pub trust_forwarded: bool,           // read client IP from X-Forwarded-For
    pub max_body_bytes: usize,           // body buffered for inspection
}

impl AppState {
    // Wire engine and admin service around one store and one rate tracker
    pub fn new(store: Arc<dyn ReputationStore>, config: GateConfig, client: reqwest::Client) -> Self {
        let tracker = Arc::new(RateTracker::from_config(&config));
        let gate = Arc::new(DecisionEngine::new(
            Arc::clone(&store),
            Arc::clone(&tracker),
            config.clone(),
        ));
        Self {
            gate,
            admin: AdminService::new(store, tracker, config),
            client,
            upstream: None,
            admin_token: None,
            trust_forwarded: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}
