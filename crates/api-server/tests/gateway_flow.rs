use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use domaingate_api::ApiServer;
use domaingate_cache::CacheManager;
use domaingate_core::{AppConfig, TenantConfig};
use domaingate_platform::{DomainWhitelist, RateLimiter, TenantRegistry};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    cache: Arc<CacheManager>,
}

fn harness() -> Harness {
    harness_with_config_path(None)
}

fn harness_with_config_path(config_path: Option<PathBuf>) -> Harness {
    let mut config = AppConfig::default();
    config.rate_limit.burst_limit = 3;
    let mut acme = TenantConfig::new("acme.example.com", "Acme Corp", 120);
    acme.data_source_id = "sheet-acme".into();
    config.tenants.insert("acme.example.com".into(), acme);
    let mut beta = TenantConfig::new("beta.example.com", "Beta", 60);
    beta.data_source_id = "sheet-beta".into();
    config.tenants.insert("beta.example.com".into(), beta);

    let registry = Arc::new(TenantRegistry::from_config(&config));
    let whitelist = Arc::new(DomainWhitelist::new(["acme.example.com"], true));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let cache = Arc::new(CacheManager::new(&config.cache));

    let server =
        ApiServer::new(config, cache.clone(), limiter, whitelist, registry).with_config_path(config_path);
    Harness {
        app: server.router(),
        cache,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str, host: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(host) = host {
        builder = builder.header("host", host);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_is_exempt_from_gate() {
    let h = harness();
    let (status, body) = send(&h.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tenants"], 2);
}

#[tokio::test]
async fn test_domain_info_for_resolved_tenant() {
    let h = harness();
    let (status, body) = send(&h.app, get("/api/domain-info", Some("acme.example.com:8080"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain"], "acme.example.com");
    assert_eq!(body["client_name"], "Acme Corp");
    assert_eq!(body["cache_timeout_secs"], 120);
    assert_eq!(body["resolved_from"], "host");
    assert_eq!(body["rate_limit"]["burst_requests"], 1);
}

#[tokio::test]
async fn test_rejection_statuses() {
    let h = harness();

    let (status, body) = send(&h.app, get("/api/domain-info", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no_tenant_specified");

    let (status, body) = send(&h.app, get("/api/domain-info?domain=bad..name", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_tenant_format");

    let (status, body) = send(&h.app, get("/api/domain-info", Some("unknown.example.com"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_tenant");
    assert_eq!(body["domain"], "unknown.example.com");

    let (status, body) = send(&h.app, get("/api/domain-info", Some("beta.example.com"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not_whitelisted");
}

#[tokio::test]
async fn test_burst_limit_then_admin_reset() {
    let h = harness();
    for _ in 0..3 {
        let (status, _) = send(&h.app, get("/api/domain-info", Some("acme.example.com"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&h.app, get("/api/domain-info", Some("acme.example.com"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "rate_limited");
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Burst rate limit exceeded"), "{message}");

    let (status, body) = send(&h.app, post_json("/api/admin/rate-limits/acme.example.com/reset", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reset"], true);

    let (status, _) = send(&h.app, get("/api/domain-info", Some("acme.example.com"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_whitelist_admin_round_trip() {
    let h = harness();

    let (status, body) = send(&h.app, post_json("/api/admin/whitelist", json!({"domain": "beta.example.com"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (status, _) = send(&h.app, get("/api/domain-info", Some("beta.example.com"))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&h.app, get("/api/admin/whitelist", None)).await;
    assert_eq!(body["domains"], json!(["acme.example.com", "beta.example.com"]));

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/admin/whitelist/beta.example.com")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (status, _) = send(&h.app, get("/api/domain-info", Some("beta.example.com"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&h.app, post_json("/api/admin/whitelist", json!({"domain": "a..b"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_tenant_format");
}

#[tokio::test]
async fn test_cache_admin_stats_and_clear() {
    let h = harness();
    h.cache.set("acme.example.com", "report", "rows", None).unwrap();
    h.cache.set("acme.example.com", "summary", "totals", None).unwrap();
    h.cache.set("beta.example.com", "report", "other", None).unwrap();

    let (status, body) = send(&h.app, get("/api/admin/cache/stats", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_entries"], 3);
    assert_eq!(body["domains"]["acme.example.com"]["total_entries"], 2);

    let (status, body) = send(&h.app, get("/api/admin/cache/stats/acme.example.com", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_entries"], 2);
    assert_eq!(body["keys"].as_array().unwrap().len(), 2);

    let (status, body) = send(&h.app, post_json("/api/admin/cache/clear", json!({"domain": "acme.example.com"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 2);

    let (_, body) = send(&h.app, get("/api/admin/cache/stats/acme.example.com", None)).await;
    assert_eq!(body["total_entries"], 0);
    assert_eq!(body["keys"], json!([]));
    assert_eq!(body["total_sets"], 2);
    assert_eq!(body["total_deletes"], 2);

    let (_, body) = send(&h.app, post_json("/api/admin/cache/clear", json!({}))).await;
    assert_eq!(body["cleared"], 1);
    assert_eq!(h.cache.total_entry_count(), 0);
}

#[tokio::test]
async fn test_domain_listing_and_status() {
    let h = harness();
    let (status, body) = send(&h.app, get("/api/admin/domains", None)).await;
    assert_eq!(status, StatusCode::OK);
    let domains = body["domains"].as_array().unwrap();
    assert_eq!(domains.len(), 2);
    assert_eq!(domains[0]["domain"], "acme.example.com");
    assert_eq!(domains[0]["whitelisted"], true);
    assert_eq!(domains[1]["whitelisted"], false);
    assert_eq!(body["has_default"], false);

    let (status, body) = send(&h.app, get("/api/admin/domains/acme.example.com/status", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], true);
    assert_eq!(body["rate_limit"]["burst_limit"], 3);

    let (status, _) = send(&h.app, get("/api/admin/domains/bad..name/status", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_config_validate_and_reload() {
    let path = std::env::temp_dir().join(format!("domaingate-reload-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
            [tenants."acme.example.com"]
            client_name = "Acme Corp"
            data_source_id = "sheet-acme"
            cache_timeout_secs = 120

            [tenants."gamma.example.com"]
            client_name = "Gamma"

            [tenants."gamma.example.com".rate_limit]
            burst_limit = 1
        "#,
    )
    .unwrap();
    let h = harness_with_config_path(Some(path.clone()));

    let (status, body) = send(&h.app, post_json("/api/admin/config/validate", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["tenants"], 2);

    let (status, body) = send(&h.app, post_json("/api/admin/config/reload", json!({}))).await;
    std::fs::remove_file(&path).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenants"], 2);
    assert_eq!(body["added_domains"], json!(["gamma.example.com"]));
    assert_eq!(body["removed_domains"], json!(["beta.example.com"]));
    assert_eq!(body["rate_limit_overrides"], 1);

    let (status, _) = send(&h.app, get("/api/domain-info", Some("gamma.example.com"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&h.app, get("/api/domain-info", Some("gamma.example.com"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "rate_limited");

    let (status, body) = send(&h.app, get("/api/domain-info", Some("beta.example.com"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_tenant");

    let (_, body) = send(&h.app, post_json("/api/admin/config/validate", json!({}))).await;
    assert_eq!(body["valid"], false);
    assert!(body["errors"]["gamma.example.com"].is_array());
}
