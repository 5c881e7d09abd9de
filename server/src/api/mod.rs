use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use fairroll_execution::{SettlementOracle, Store};
use governor::middleware::NoOpMiddleware;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Service;

mod actions;

/// HTTP surface settings.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Allowed browser origins; `*` allows any.
    pub allowed_origins: HashSet<String>,
    /// Accept requests without an `Origin` header (non-browser clients).
    pub allow_no_origin: bool,
    pub rate_limit_per_second: Option<u64>,
    pub rate_limit_burst: Option<u32>,
    pub body_limit_bytes: Option<usize>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            allowed_origins: HashSet::from(["*".to_string()]),
            allow_no_origin: true,
            rate_limit_per_second: None,
            rate_limit_burst: None,
            body_limit_bytes: Some(64 * 1024),
        }
    }
}

pub struct Api<S: Store, O: SettlementOracle> {
    service: Arc<Service<S, O>>,
    config: ApiConfig,
}

#[derive(Clone)]
struct OriginConfig {
    allowed_origins: Arc<HashSet<String>>,
    allow_any_origin: bool,
    allow_no_origin: bool,
}

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

/// Per-client-IP limiter. Enabled only when both rate and burst are positive.
fn rate_limiter(config: &ApiConfig) -> Option<Arc<IpGovernorConfig>> {
    let rate = config.rate_limit_per_second.filter(|rate| *rate > 0)?;
    let burst = config.rate_limit_burst.filter(|burst| *burst > 0)?;
    let period = Duration::from_nanos((1_000_000_000 / rate).max(1));
    let Some(limiter) = GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
    else {
        tracing::warn!(rate, burst, "rate limit rejected by governor; serving unlimited");
        return None;
    };
    tracing::info!(rate, burst, "HTTP rate limit configured");
    Some(Arc::new(limiter))
}

impl<S: Store, O: SettlementOracle> Api<S, O> {
    pub fn new(service: Arc<Service<S, O>>, config: ApiConfig) -> Self {
        Self { service, config }
    }

    pub fn router(&self) -> Router {
        let allowed_origins = self.config.allowed_origins.clone();
        let allow_any_origin = allowed_origins.contains("*");
        if allowed_origins.is_empty() {
            tracing::warn!("no allowed HTTP origins configured; all browser origins will be rejected");
        }
        let cors_origins = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid allowed origin: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();
        let origin_config = OriginConfig {
            allowed_origins: Arc::new(allowed_origins),
            allow_any_origin,
            allow_no_origin: self.config.allow_no_origin,
        };

        // Configure CORS
        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, REQUEST_ID])
        .expose_headers([REQUEST_ID]);

        let router = Router::new()
            .route("/", post(actions::dispatch::<S, O>))
            .route("/healthz", get(actions::healthz));

        let router = match rate_limiter(&self.config) {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };

        let router = router.layer(cors);
        let router = router.layer(middleware::from_fn(move |req, next| {
            let origin_config = origin_config.clone();
            async move { enforce_origin(origin_config, req, next).await }
        }));
        let router = match self.config.body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn(request_id_middleware));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.service.clone())
    }
}

async fn enforce_origin(config: OriginConfig, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if let Some(origin) = origin {
        if !config.allow_any_origin && !config.allowed_origins.contains(origin) {
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    } else if !config.allow_no_origin {
        return (StatusCode::FORBIDDEN, "Origin required").into_response();
    }
    next.run(req).await
}

/// Echo the caller's request id (or mint one) and log one line per request.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(&REQUEST_ID).cloned() {
        Some(value) => value,
        None => HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    };
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(req).await;
    tracing::info!(
        request_id = request_id.to_str().unwrap_or("<binary>"),
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response.headers_mut().insert(REQUEST_ID, request_id);
    response
}
