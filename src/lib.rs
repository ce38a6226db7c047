//! binwise tracks garbage sorting: disposal of QR-coded bags by citizens,
//! verification by managers, reputation and a reward store.

#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod database;
pub mod domain;
pub mod error;
pub mod kiosk;
pub mod persistence;
pub mod repository;
mod router;
pub mod service;
pub mod telemetry;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::config::Configuration;
use crate::crypto::IdentityHasher;
use crate::persistence::MemoryStore;
use crate::persistence::postgres::{PgGarbageRepository, PgStoreRepository, PgUserRepository};
use crate::repository::{Clock, GarbageRepository, StoreRepository, SystemClock, UserRepository};
use crate::token::TokenManager;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub users: Arc<dyn UserRepository>,
    pub garbage: Arc<dyn GarbageRepository>,
    pub store: Arc<dyn StoreRepository>,
    pub hasher: Arc<IdentityHasher>,
    pub token: TokenManager,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State backed by a fresh [`MemoryStore`].
    pub fn in_memory(
        config: Arc<Configuration>,
        hasher: IdentityHasher,
        token: TokenManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            config,
            users: store.clone(),
            garbage: store.clone(),
            store,
            hasher: Arc::new(hasher),
            token,
            clock,
            metrics: None,
        }
    }

    /// State backed by PostgreSQL.
    pub fn postgres(
        config: Arc<Configuration>,
        db: &database::Database,
        hasher: IdentityHasher,
        token: TokenManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            users: Arc::new(PgUserRepository::new(db.postgres.clone())),
            garbage: Arc::new(PgGarbageRepository::new(db.postgres.clone())),
            store: Arc::new(PgStoreRepository::new(db.postgres.clone())),
            hasher: Arc::new(hasher),
            token,
            clock,
            metrics: None,
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Tag every request with an `x-request-id`, traced and echoed back.
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .route("/ranking", get(router::users::ranking))
        .nest("/users", router::users::router(state.clone()))
        .nest("/garbage", router::garbage::router(state.clone()))
        .nest("/store", router::store::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file.
    let config = Configuration::default().read()?;

    let salt = std::env::var("SALT").map_err(|_| "missing `SALT` environment variable")?;
    let secret = std::env::var("TOKEN_SECRET")
        .map_err(|_| "missing `TOKEN_SECRET` environment variable")?;

    // handle jwt.
    let mut token = TokenManager::new(&config.name, secret.as_bytes());
    if let Some(cfg) = &config.token {
        if let Some(audience) = &cfg.audience {
            token.audience(audience);
        }
        token.lifetimes(
            chrono::Duration::seconds(cfg.access_ttl),
            chrono::Duration::seconds(cfg.order_ttl),
        );
    }

    let hasher = IdentityHasher::new(salt);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut state = match &config.postgres {
        Some(postgres) => {
            let db = database::Database::from_config(postgres).await?;
            // execute migrations scripts on start.
            db.migrate().await?;
            AppState::postgres(Arc::clone(&config), &db, hasher, token, clock)
        },
        None => {
            tracing::warn!("missing `postgres` entry on `config.yaml` file, data is kept in memory");
            AppState::in_memory(Arc::clone(&config), hasher, token, clock)
        },
    };

    state.metrics = Some(telemetry::setup_metrics_recorder()?);

    Ok(state)
}

/// Memory-backed state with a frozen clock.
#[cfg(test)]
pub(crate) fn test_state() -> (AppState, Arc<repository::FixedClock>) {
    let clock = Arc::new(repository::FixedClock::new(chrono::Utc::now()));
    let state = AppState::in_memory(
        Arc::new(Configuration::default()),
        IdentityHasher::new(b"pepper"),
        TokenManager::new("binwise.test", b"secret"),
        clock.clone(),
    );
    (state, clock)
}

/// Insert a user named `name` (secret: `name`) and return its id.
#[cfg(test)]
pub(crate) async fn seed_user(
    state: &AppState,
    name: &str,
    role: domain::Role,
    standing: domain::Standing,
) -> domain::UserId {
    let id = state.hasher.make_uid(name, name);
    let user = match role {
        domain::Role::Normal => domain::User::normal(id.clone(), name, standing),
        domain::Role::Manager => domain::User::manager(id.clone(), name),
    };
    state.users.insert(&user).await.expect("cannot seed user");
    id
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}
