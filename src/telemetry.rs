//! Telemetry module for Grantry
//!
//! Prometheus counters for grant/token issuance, protocol rejections and HTTP
//! traffic. Metrics live in a crate-owned registry rendered by `/metrics`.

use crate::{GrantryError, Result};
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{CounterVec, Encoder, IntCounter, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

struct Metrics {
    grants_issued: IntCounter,
    tokens_issued: CounterVec,
    oauth_errors: CounterVec,
    http_requests: CounterVec,
}

static METRICS: OnceCell<Metrics> = OnceCell::new();

fn build_metrics() -> prometheus::Result<Metrics> {
    let grants_issued = IntCounter::new(
        "grantry_grants_issued_total",
        "Total number of authorization codes issued",
    )?;
    let tokens_issued = CounterVec::new(
        Opts::new(
            "grantry_tokens_issued_total",
            "Total number of access tokens issued",
        ),
        &["grant_type"],
    )?;
    let oauth_errors = CounterVec::new(
        Opts::new(
            "grantry_oauth_errors_total",
            "Total number of rejected protocol requests",
        ),
        &["error"],
    )?;
    let http_requests = CounterVec::new(
        Opts::new(
            "grantry_http_requests_total",
            "Total number of HTTP requests received",
        ),
        &["handler", "method", "code"],
    )?;

    REGISTRY.register(Box::new(grants_issued.clone()))?;
    REGISTRY.register(Box::new(tokens_issued.clone()))?;
    REGISTRY.register(Box::new(oauth_errors.clone()))?;
    REGISTRY.register(Box::new(http_requests.clone()))?;

    Ok(Metrics {
        grants_issued,
        tokens_issued,
        oauth_errors,
        http_requests,
    })
}

fn metrics() -> Option<&'static Metrics> {
    match METRICS.get_or_try_init(build_metrics) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!("Failed to register metrics: {}", e);
            None
        }
    }
}

/// Register all metrics up front so `/metrics` lists them before first use
pub fn init() -> Result<()> {
    METRICS
        .get_or_try_init(build_metrics)
        .map_err(|e| GrantryError::config(format!("Failed to register metrics: {}", e)))?;
    Ok(())
}

/// Record an issued authorization code
pub fn record_grant_issued() {
    if let Some(m) = metrics() {
        m.grants_issued.inc();
    }
}

/// Record an issued access token
pub fn record_token_issued(grant_type: &str) {
    if let Some(m) = metrics() {
        m.tokens_issued.with_label_values(&[grant_type]).inc();
    }
}

/// Record a protocol rejection by its wire code
pub fn record_oauth_error(code: &str) {
    if let Some(m) = metrics() {
        m.oauth_errors.with_label_values(&[code]).inc();
    }
}

/// Record HTTP request metric
pub fn record_http_request(handler: &str, method: &str, status_code: u16) {
    if let Some(m) = metrics() {
        let code = status_code.to_string();
        m.http_requests
            .with_label_values(&[handler, method, code.as_str()])
            .inc();
    }
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| GrantryError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| GrantryError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}
