use lazy_static::lazy_static;
use prometheus::{
    Histogram, IntCounter, IntCounterVec, IntGauge, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    pub static ref REQUESTS_TOTAL: IntCounter =
        register_int_counter!("ipgate_requests_total", "Requests seen by the gate").unwrap();
    pub static ref DENIED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ipgate_denied_total",
        "Denied requests by rule",
        &["rule"]
    )
    .unwrap();
    pub static ref SOFT_LIMITED_TOTAL: IntCounter = register_int_counter!(
        "ipgate_soft_limited_total",
        "Requests allowed over the soft rate limit"
    )
    .unwrap();
    pub static ref ADMIN_OPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ipgate_admin_ops_total",
        "Admin list operations",
        &["op"]
    )
    .unwrap();
    pub static ref TRACKED_IPS: IntGauge =
        register_int_gauge!("ipgate_tracked_ips", "IPs with a live rate window").unwrap();
    pub static ref GATE_LATENCY: Histogram = register_histogram!(
        "ipgate_gate_latency_seconds",
        "Time spent deciding a request"
    )
    .unwrap();
}
