//! HTTP server for Grantry
//!
//! Mounts the OAuth endpoints next to health and metrics, and maps crate
//! errors onto OAuth-style JSON error bodies.

use crate::auth::{AuthorizationProvider, OAuthServerState, create_oauth_routes};
use crate::config::{Config, HttpConfig};
use crate::{GrantryError, Result};
use axum::{
    Router,
    extract::{Json, MatchedPath, Request},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<AuthorizationProvider>,
    pub http: HttpConfig,
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct AppError(GrantryError);

impl AppError {
    pub fn inner(&self) -> &GrantryError {
        &self.0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, description) = match &self.0 {
            GrantryError::OAuth(e) => (e.status(), e.code(), e.description()),
            GrantryError::Validation(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone()),
            GrantryError::Storage(crate::error::StorageError::NotFound { entity, id }) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} not found: {}", entity, id),
            ),
            other => {
                // Log full error details internally
                tracing::error!("Internal error: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        tracing::debug!(error, status = %status, "HTTP request error response");

        let body = json!({
            "error": error,
            "error_description": description,
        });
        let mut response = (status, Json(body)).into_response();

        // RFC 6750 challenge for protected-resource failures
        if let Some(challenge) = self.0.oauth().and_then(bearer_challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

fn bearer_challenge(err: crate::error::OAuthError) -> Option<HeaderValue> {
    use crate::error::OAuthError;
    match err {
        OAuthError::NotAuthorized => Some(HeaderValue::from_static("Bearer")),
        OAuthError::InvalidToken => Some(HeaderValue::from_static(
            "Bearer error=\"invalid_token\"",
        )),
        _ => None,
    }
}

impl<E> From<E> for AppError
where
    E: Into<GrantryError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    crate::telemetry::init()?;

    let http_config = config.http_config();
    let storage = crate::storage::create_storage_from_config(&config.storage).await?;
    let provider = Arc::new(AuthorizationProvider::new(
        storage,
        config.provider_config(),
    ));

    let state = AppState {
        provider,
        http: http_config.clone(),
    };
    let app = build_router(state)?;

    let addr = format!("{}:{}", http_config.host, http_config.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| GrantryError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!("Starting HTTP server on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GrantryError::config(format!("Server error: {}", e)))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Build the router with all endpoints
pub fn build_router(state: AppState) -> Result<Router> {
    let oauth_state = OAuthServerState::new(state.provider.clone(), &state.http.user_header)?;

    let router = Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(create_oauth_routes(oauth_state))
        .layer(axum::middleware::from_fn(track_requests))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new())
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors_layer(&state.http)),
        );

    Ok(router)
}

/// CORS from `http.allowedOrigins`, localhost on the configured port otherwise
fn cors_layer(http_config: &HttpConfig) -> CorsLayer {
    let origins: Vec<String> = match &http_config.allowed_origins {
        Some(origins) => origins.clone(),
        None => vec![
            format!("http://localhost:{}", http_config.port),
            format!("http://127.0.0.1:{}", http_config.port),
        ],
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Count requests per matched route
async fn track_requests(req: Request, next: Next) -> Response {
    let handler = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();

    let response = next.run(req).await;
    crate::telemetry::record_http_request(&handler, &method, response.status().as_u16());
    response
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}
