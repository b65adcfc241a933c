mod common;

use reqwest::StatusCode;
use serde_json::{Value, json};

use ipgate::config::GateConfig;

fn tight_limits() -> GateConfig {
    GateConfig { rate_max: 2, rate_flood: 4, ..GateConfig::default() }
}

#[tokio::test]
async fn allowed_requests_reach_the_upstream() {
    let upstream = common::spawn_upstream().await;
    let mut state = common::memory_state(GateConfig::default());
    state.upstream = Some(format!("http://{upstream}"));
    let addr = common::spawn_gateway(state).await;

    let resp = common::client()
        .get(format!("http://{addr}/docs/django?page=2"))
        .send()
        .await
        .expect("gated request");
    assert_eq!(resp.status(), StatusCode::OK);
    let text = resp.text().await.unwrap();
    assert_eq!(text, "upstream GET /docs/django?page=2 from 127.0.0.1");
}

#[tokio::test]
async fn blacklisted_clients_get_a_bare_403() {
    let mut state = common::memory_state(GateConfig::default());
    state.trust_forwarded = true;
    let addr = common::spawn_gateway(state).await;
    let client = common::client();

    client
        .post(format!("http://{addr}/blacklist"))
        .json(&json!({"ip": "203.0.113.50", "reason": "secret heuristic"}))
        .send()
        .await
        .expect("blacklist add");

    let resp = client
        .get(format!("http://{addr}/docs"))
        .header("x-forwarded-for", "203.0.113.50")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let text = resp.text().await.unwrap();
    assert_eq!(text, "Forbidden");
}

#[tokio::test]
async fn keyword_in_query_denies_and_blacklists() {
    let mut state = common::memory_state(GateConfig::default());
    state.trust_forwarded = true;
    let addr = common::spawn_gateway(state).await;
    let client = common::client();

    client
        .post(format!("http://{addr}/keywords"))
        .json(&json!({"keyword": "select"}))
        .send()
        .await
        .expect("keyword add");

    let resp = client
        .get(format!("http://{addr}/docs?id=SELECT%201=1"))
        .header("x-forwarded-for", "203.0.113.51")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let entry: Value = client
        .get(format!("http://{addr}/blacklist/203.0.113.51"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry["entry"]["reason"], "keyword:select");
}

#[tokio::test]
async fn flood_turns_into_a_blacklist_entry() {
    let mut state = common::memory_state(tight_limits());
    state.trust_forwarded = true;
    let addr = common::spawn_gateway(state).await;
    let client = common::client();
    let url = format!("http://{addr}/docs");

    // no upstream: allowed requests fall through to 404
    for _ in 0..4 {
        let resp = client
            .get(&url)
            .header("x-forwarded-for", "203.0.113.52")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
    let resp = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.52")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // a different client is unaffected
    let resp = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.53")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let black: Value = client
        .get(format!("http://{addr}/blacklist"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(black["count"], 1);
    assert_eq!(black["entries"][0]["ip"], "203.0.113.52");
    assert_eq!(black["entries"][0]["reason"], "flood");
}

#[tokio::test]
async fn whitelisted_clients_skip_every_check() {
    let mut state = common::memory_state(tight_limits());
    state.trust_forwarded = true;
    let addr = common::spawn_gateway(state).await;
    let client = common::client();

    client
        .post(format!("http://{addr}/keywords"))
        .json(&json!({"keyword": "drop table"}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("http://{addr}/whitelist"))
        .json(&json!({"ip": "203.0.113.54"}))
        .send()
        .await
        .unwrap();

    for _ in 0..10 {
        let resp = client
            .get(format!("http://{addr}/search?q=DROP+TABLE"))
            .header("x-forwarded-for", "203.0.113.54")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn quick_form_posts_are_rejected() {
    let upstream = common::spawn_upstream().await;
    let mut state = common::memory_state(GateConfig::default());
    state.upstream = Some(format!("http://{upstream}"));
    let addr = common::spawn_gateway(state).await;
    let client = common::client();

    let now = chrono::Utc::now().timestamp() as f64;
    let resp = client
        .post(format!("http://{addr}/feedback"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!("rating=5&form_rendered_at={now}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let earlier = now - 30.0;
    let resp = client
        .post(format!("http://{addr}/feedback"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!("rating=5&form_rendered_at={earlier}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "upstream POST /feedback from 127.0.0.1");
}

#[tokio::test]
async fn disabled_protection_lets_blacklisted_clients_through() {
    let config = GateConfig { protection_enabled: false, ..GateConfig::default() };
    let addr = common::spawn_gateway(common::memory_state(config)).await;
    let client = common::client();

    client
        .post(format!("http://{addr}/blacklist"))
        .json(&json!({"ip": "127.0.0.1"}))
        .send()
        .await
        .unwrap();
    let resp = client.get(format!("http://{addr}/docs")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let status: Value = client.get(format!("http://{addr}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["status"]["protection_enabled"], false);
}

#[tokio::test]
async fn metrics_expose_denials() {
    let mut state = common::memory_state(GateConfig::default());
    state.trust_forwarded = true;
    let addr = common::spawn_gateway(state).await;
    let client = common::client();

    client
        .post(format!("http://{addr}/blacklist"))
        .json(&json!({"ip": "203.0.113.55"}))
        .send()
        .await
        .unwrap();
    client
        .get(format!("http://{addr}/"))
        .header("x-forwarded-for", "203.0.113.55")
        .send()
        .await
        .unwrap();

    let text = client.get(format!("http://{addr}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(text.contains("ipgate_requests_total"));
    assert!(text.contains("ipgate_denied_total{rule=\"blacklist\"}"));
}

#[tokio::test]
async fn oversized_bodies_still_count_toward_flood() {
    let mut state = common::memory_state(tight_limits());
    state.trust_forwarded = true;
    state.max_body_bytes = 16;
    let addr = common::spawn_gateway(state).await;
    let client = common::client();
    let big = "x".repeat(64);

    let mut codes = Vec::new();
    for _ in 0..6 {
        let resp = client
            .post(format!("http://{addr}/upload"))
            .header("x-forwarded-for", "203.0.113.60")
            .body(big.clone())
            .send()
            .await
            .unwrap();
        codes.push(resp.status());
    }
    assert_eq!(codes[..4], [StatusCode::PAYLOAD_TOO_LARGE; 4]);
    assert_eq!(codes[4..], [StatusCode::FORBIDDEN; 2]);

    let entry: Value = client
        .get(format!("http://{addr}/blacklist/203.0.113.60"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry["entry"]["reason"], "flood");
}

#[tokio::test]
async fn blacklisted_clients_get_403_for_oversized_bodies_too() {
    let mut state = common::memory_state(GateConfig::default());
    state.trust_forwarded = true;
    state.max_body_bytes = 16;
    let addr = common::spawn_gateway(state).await;
    let client = common::client();

    client
        .post(format!("http://{addr}/blacklist"))
        .json(&json!({"ip": "203.0.113.61"}))
        .send()
        .await
        .expect("blacklist add");

    let resp = client
        .post(format!("http://{addr}/upload"))
        .header("x-forwarded-for", "203.0.113.61")
        .body("x".repeat(64))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.text().await.unwrap(), "Forbidden");
}
