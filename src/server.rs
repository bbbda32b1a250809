//! HTTP surface of the registry
//!
//! A single warp filter collects method, path, query, client address and
//! body, then hands them to [`AppState::handle`], which does the routing.
//!
//! Endpoints (`{base}` is `server.api_base_path`):
//!
//! - `GET /tags`, `GET {base}/tags`
//! - `GET {base}/agents/{id|wallet|slug}`
//! - `GET {base}/agents?tags=a,b&match=all|any&page=1&limit=20&q=&interface=&access=`
//! - `POST {base}/agents` with a signed submission
//! - `GET /health`, `GET /metrics`
//!
//! POST bodies must declare a `Content-Length` of at most [`MAX_BODY_BYTES`];
//! larger ones are refused with 413 before the body is read.

use crate::catalog::{CatalogService, ListQuery};
use crate::config::{DataMode, RegistryConfig};
use crate::error::{RegistryError, RegistryResult};
use crate::observability::metrics;
use crate::rate_limit::FixedWindowLimiter;
use crate::store::{open_store, AgentStore};
use crate::submission::{SignedSubmission, SubmissionService};
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, Instrument};
use warp::http::{Method, StatusCode};
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Client key used when the peer address is unknown
const UNKNOWN_CLIENT: &str = "local";

/// Status and JSON body of one answered request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(status: StatusCode, body: &T) -> RegistryResult<Self> {
        let body = serde_json::to_value(body)
            .map_err(|e| RegistryError::internal(format!("failed to encode response: {e}")))?;
        Ok(Self { status, body })
    }

    fn from_error(e: &RegistryError) -> Self {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_value(e.to_body())
            .unwrap_or_else(|_| json!({ "error": "Server error" }));
        Self { status, body }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({ "error": "Not found" }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    data_mode: &'static str,
    backend: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Health,
    Metrics,
    Tags,
    Agent(&'a str),
    ListAgents,
    CreateAgent,
    Unknown,
}

fn match_route<'a>(base: &str, method: &Method, path: &'a str) -> Route<'a> {
    let api = path.strip_prefix(base);
    if *method == Method::POST {
        return match api {
            Some("/agents") => Route::CreateAgent,
            _ => Route::Unknown,
        };
    }
    if *method != Method::GET {
        return Route::Unknown;
    }

    match (path, api) {
        ("/health", _) => Route::Health,
        ("/metrics", _) => Route::Metrics,
        ("/tags", _) | (_, Some("/tags")) => Route::Tags,
        (_, Some("/agents")) => Route::ListAgents,
        (_, Some(rest)) => rest
            .strip_prefix("/agents/")
            .map_or(Route::Unknown, Route::Agent),
        _ => Route::Unknown,
    }
}

/// Everything a request handler needs
pub struct AppState {
    base_path: String,
    data_mode: DataMode,
    catalog: CatalogService,
    submissions: SubmissionService,
    limiter: FixedWindowLimiter,
}

impl AppState {
    pub fn new(config: &RegistryConfig, store: Arc<dyn AgentStore>) -> Self {
        Self {
            base_path: config.server.api_base_path.clone(),
            data_mode: config.data.mode,
            catalog: CatalogService::new(
                Arc::clone(&store),
                config.server.strict_tags,
                config.server.max_page_size,
            ),
            submissions: SubmissionService::new(store, &config.submission),
            limiter: FixedWindowLimiter::new(config.server.requests_per_minute),
        }
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    /// Answer one request
    ///
    /// Health and metrics probes are not rate limited.
    pub async fn handle(
        &self,
        method: &Method,
        path: &str,
        query: &str,
        client: &str,
        body: &[u8],
    ) -> ApiResponse {
        let route = match_route(&self.base_path, method, path);
        if !matches!(route, Route::Health | Route::Metrics) && !self.limiter.check(client) {
            debug!(client, "Rate limit exceeded");
            return ApiResponse::from_error(&RegistryError::RateLimited);
        }

        match self.dispatch(route, query, body).await {
            Ok(response) => response,
            Err(e) => {
                if e.status_code() >= 500 {
                    error!(error = %e, path, "Request failed");
                } else {
                    debug!(error = %e, path, "Request rejected");
                }
                ApiResponse::from_error(&e)
            }
        }
    }

    async fn dispatch(&self, route: Route<'_>, query: &str, body: &[u8]) -> RegistryResult<ApiResponse> {
        match route {
            Route::Health => ApiResponse::ok(
                StatusCode::OK,
                &HealthResponse {
                    status: "ok",
                    data_mode: self.data_mode.as_str(),
                    backend: self.catalog.store().backend(),
                    uptime_seconds: metrics().uptime_seconds(),
                },
            ),
            Route::Metrics => ApiResponse::ok(StatusCode::OK, &metrics().get_metrics()),
            Route::Tags => ApiResponse::ok(StatusCode::OK, &self.catalog.list_tags().await?),
            Route::Agent(raw_key) => {
                let key = percent_decode_str(raw_key)
                    .decode_utf8()
                    .map_err(|_| RegistryError::invalid_input("Agent key is not valid UTF-8"))?;
                ApiResponse::ok(StatusCode::OK, &self.catalog.lookup_agent(&key).await?)
            }
            Route::ListAgents => {
                let query = ListQuery::from_pairs(url::form_urlencoded::parse(query.as_bytes()))?;
                ApiResponse::ok(StatusCode::OK, &self.catalog.list_agents(&query).await?)
            }
            Route::CreateAgent => {
                if body.len() > MAX_BODY_BYTES {
                    return Err(RegistryError::invalid_input("Request body too large"));
                }
                let signed: SignedSubmission = serde_json::from_slice(body)
                    .map_err(|e| RegistryError::invalid_input(format!("Malformed submission: {e}")))?;
                let created = self.submissions.submit(signed).await?;
                ApiResponse::ok(StatusCode::CREATED, &created)
            }
            Route::Unknown => Ok(ApiResponse::not_found()),
        }
    }
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

async fn handle_request(
    method: Method,
    path: FullPath,
    query: String,
    remote: Option<SocketAddr>,
    body: Bytes,
    state: Arc<AppState>,
) -> Result<Response, Infallible> {
    let started = Instant::now();
    let client = remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    let span = crate::request_span!(method = %method, path = %path.as_str(), client = %client);

    let response = state
        .handle(&method, path.as_str(), &query, &client, &body)
        .instrument(span)
        .await;

    let elapsed = started.elapsed();
    metrics().request_completed(response.status.as_u16(), elapsed);
    debug!(
        status = response.status.as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        path = %path.as_str(),
        "Request completed"
    );

    Ok(warp::reply::with_status(warp::reply::json(&response.body), response.status).into_response())
}

/// Request body, read only for POST and only up to [`MAX_BODY_BYTES`]
///
/// Oversized or unsized POST bodies are rejected before any byte is buffered.
fn request_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    let limited = warp::post()
        .and(warp::body::content_length_limit(MAX_BODY_BYTES as u64))
        .and(warp::body::bytes());
    let bodiless = warp::method().and_then(|method: Method| async move {
        if method == Method::POST {
            Err(warp::reject::not_found())
        } else {
            Ok(Bytes::new())
        }
    });
    limited.or(bodiless).unify()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required")
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        (StatusCode::BAD_REQUEST, "Bad request")
    };
    debug!(status = status.as_u16(), ?rejection, "Request rejected before dispatch");
    metrics().request_completed(status.as_u16(), std::time::Duration::ZERO);

    Ok(warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status).into_response())
}

/// The complete warp filter for the registry
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .and(warp::addr::remote())
        .and(request_body())
        .and(with_state(state))
        .and_then(handle_request)
        .recover(handle_rejection)
        .unify()
}

/// Resolves on SIGINT or, on unix, SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
                }
                return;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, shutting down gracefully..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

/// Open the configured store and serve until a shutdown signal
pub async fn serve(config: RegistryConfig) -> RegistryResult<()> {
    let store = open_store(&config).await?;
    let state = Arc::new(AppState::new(&config, store));

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);
    let filter = routes(state).with(cors);

    let (addr, server) = warp::serve(filter)
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], config.server.port), shutdown_signal())
        .map_err(|e| RegistryError::internal(format!("failed to bind: {e}")))?;

    info!(
        %addr,
        base_path = %config.server.api_base_path,
        data_mode = config.data.mode.as_str(),
        rpm = config.server.requests_per_minute,
        "Registry listening"
    );
    server.await;
    info!("Registry stopped");
    Ok(())
}
