use std::env;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    extract::DefaultBodyLimit,
    extract::State,
    http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    http::Method,
    http::Request,
    middleware,
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use dotenvy::dotenv;
use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::keyed::DashMapStateStore, Quota,
    RateLimiter,
};
use sm_common::db::{create_pool_from_url, run_migrations, MatchStore, MemoryStore, PgStore};
use sm_common::embedding::{create_embedder, load_config_from_env, DisabledEmbedder, SkillVectorBuilder};
use sm_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use sm_common::MatchingService;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod auth;
pub mod error;
pub mod handlers;

use auth::{AuthConfig, AuthMode, ACTOR_HEADER};
use error::ApiError;
use handlers::{employees, feedback, health, matches, projects};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);
const DEFAULT_METRICS_PORT: u16 = 9464;

#[derive(Debug, Clone, Parser)]
#[command(name = "sm-api", about = "HTTP API for skill-based project staffing")]
struct Cli {
    /// PostgreSQL connection string; the in-memory store is used when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// API key for X-API-Key authentication
    #[arg(long, env = "SM_API_KEY")]
    api_key: Option<String>,

    /// Authentication mode: api_key | jwt
    #[arg(long, env = "AUTH_MODE", default_value = "api_key", value_enum)]
    auth_mode: AuthMode,

    /// HS256 secret for AUTH_MODE=jwt
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "SM_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub auth: AuthConfig,
}

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct RateLimits {
    global: Arc<IpRateLimiter>,
    recompute: Arc<IpRateLimiter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub global_per_sec: u64,
    pub global_burst: u32,
    pub recompute_per_sec: u64,
    pub recompute_burst: u32,
}

impl RateLimitConfig {
    fn parse_env<T: std::str::FromStr + PartialOrd + Default>(name: &str) -> Option<T> {
        env::var(name)
            .ok()
            .and_then(|value| value.trim().parse::<T>().ok())
            .filter(|value| *value > T::default())
    }

    fn from_env() -> Self {
        Self {
            global_per_sec: Self::parse_env("SM_RATE_LIMIT_GLOBAL_PER_SEC").unwrap_or(20),
            global_burst: Self::parse_env("SM_RATE_LIMIT_GLOBAL_BURST").unwrap_or(40),
            recompute_per_sec: Self::parse_env("SM_RATE_LIMIT_RECOMPUTE_PER_SEC").unwrap_or(2),
            recompute_burst: Self::parse_env("SM_RATE_LIMIT_RECOMPUTE_BURST").unwrap_or(5),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

impl AppConfig {
    fn from_cli(cli: Cli) -> Result<Self, ApiError> {
        let cors_origins = parse_origins(&cli.cors_origins);

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::BadRequest(
                "SM_CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        let auth = AuthConfig {
            mode: cli.auth_mode,
            api_key: cli.api_key,
            jwt_secret: cli.jwt_secret,
        };

        match auth.mode {
            AuthMode::ApiKey if auth.api_key.is_none() => {
                return Err(ApiError::BadRequest(
                    "SM_API_KEY is required when AUTH_MODE=api_key".into(),
                ));
            }
            AuthMode::Jwt if auth.jwt_secret.is_none() => {
                return Err(ApiError::BadRequest(
                    "JWT_SECRET is required when AUTH_MODE=jwt".into(),
                ));
            }
            _ => {}
        }

        Ok(Self {
            database_url: cli.database_url.filter(|url| !url.trim().is_empty()),
            port: cli.port,
            cors_origins,
            auth,
        })
    }

    pub fn for_tests(auth: AuthConfig) -> Self {
        Self {
            database_url: None,
            port: 3001,
            cors_origins: vec!["http://localhost:3000".into()],
            auth,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MatchingService>,
    pub config: AppConfig,
    pub(crate) rate_limits: RateLimits,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

impl axum::extract::FromRef<SharedState> for AuthConfig {
    fn from_ref(input: &SharedState) -> AuthConfig {
        input.config.auth.clone()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static(ACTOR_HEADER),
        ])
        .allow_credentials(true)
}

fn build_ip_limiter(per_second: u64, burst_size: u32) -> Arc<IpRateLimiter> {
    let nanos_per_token = 1_000_000_000u64 / per_second.max(1);
    let burst = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(Duration::from_nanos(nanos_per_token.max(1)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst);

    Arc::new(RateLimiter::keyed(quota))
}

pub fn default_rate_limits() -> RateLimits {
    let cfg = RateLimitConfig::from_env();
    RateLimits {
        global: build_ip_limiter(cfg.global_per_sec, cfg.global_burst),
        recompute: build_ip_limiter(cfg.recompute_per_sec, cfg.recompute_burst),
    }
}

fn request_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

fn enforce_rate_limit(limiter: &IpRateLimiter, ip: Option<IpAddr>) -> Result<(), ApiError> {
    if let Some(client_ip) = ip {
        if limiter.check_key(&client_ip).is_err() {
            return Err(ApiError::TooManyRequests("rate limit exceeded".into()));
        }
    }

    Ok(())
}

async fn global_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state.rate_limits.global, request_ip(&req))?;
    Ok(next.run(req).await)
}

async fn recompute_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state.rate_limits.recompute, request_ip(&req))?;
    Ok(next.run(req).await)
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    Ok(error::with_request_id(request_id, next.run(req)).await)
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            status = tracing::field::Empty,
        )
    });

    let api_routes = Router::new()
        .route("/employees", post(employees::create_employee))
        .route("/employees/:id/skills", put(employees::update_skills))
        .route(
            "/employees/:id/current-project",
            get(employees::current_project),
        )
        .route("/projects", post(projects::create_project))
        .route("/projects/:id", put(projects::update_project))
        .route(
            "/projects/:id/recompute",
            post(projects::recompute).route_layer(middleware::from_fn_with_state(
                state.clone(),
                recompute_rate_limit,
            )),
        )
        .route("/projects/:id/matches", get(projects::list_matches))
        .route("/matches/:id/transition", post(matches::transition))
        .route(
            "/matches/:id/feedback",
            post(feedback::submit_feedback).get(feedback::list_feedback),
        );

    Router::new()
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid,
        ))
        .layer(cors)
        .with_state(state)
}

fn build_state(service: MatchingService, config: AppConfig) -> SharedState {
    Arc::new(AppState {
        service: Arc::new(service),
        config,
        rate_limits: default_rate_limits(),
        readiness: Arc::new(AtomicBool::new(true)),
    })
}

/// In-memory state with API-key auth and no embedding oracle, so every score
/// is skill coverage.
pub fn test_state(api_key: &str) -> SharedState {
    let auth = AuthConfig {
        mode: AuthMode::ApiKey,
        api_key: Some(api_key.to_string()),
        jwt_secret: None,
    };
    let service = MatchingService::new(
        Arc::new(MemoryStore::new()),
        SkillVectorBuilder::new(Arc::new(DisabledEmbedder), Duration::from_secs(1)),
    );

    build_state(service, AppConfig::for_tests(auth))
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn MatchStore>, ApiError> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = create_pool_from_url(url)
        .map_err(|err| ApiError::Storage(format!("failed to create pool: {err}")))?;
    run_migrations(&pool)
        .await
        .map_err(|err| ApiError::Storage(format!("failed to run migrations: {err}")))?;

    Ok(Arc::new(PgStore::new(pool)))
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;

    if sm_metrics::init_metrics("SM_METRICS_PORT", DEFAULT_METRICS_PORT).is_none() {
        warn!("metrics exporter unavailable; continuing without metrics");
    }

    let store = open_store(&config).await?;
    let embedding = load_config_from_env();
    let vectors = SkillVectorBuilder::new(create_embedder(&embedding), embedding.timeout);
    info!(
        store = store.backend(),
        embedder = vectors.embedder_name(),
        "matching service ready"
    );

    let state = build_state(MatchingService::new(store, vectors), config.clone());

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(%addr, auth_mode = ?config.auth.mode, "sm-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    state
        .readiness
        .store(false, std::sync::atomic::Ordering::SeqCst);

    // Load balancers need a moment to see /readyz fail before the listener closes.
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sm-api"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[tokio::test]
    async fn sets_request_id_when_missing() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static("x-request-id"),
                MakeRequestUuid,
            ));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn wildcard_cors_origin_is_rejected() {
        let err = AppConfig::from_cli(cli(&["--api-key", "k", "--cors-origins", "*"])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn auth_mode_requires_its_secret() {
        let err = AppConfig::from_cli(cli(&["--auth-mode", "jwt", "--api-key", "k"])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref msg) if msg.contains("JWT_SECRET")));

        let config = AppConfig::from_cli(cli(&[
            "--auth-mode",
            "jwt",
            "--jwt-secret",
            "s",
            "--cors-origins",
            "http://a.test, http://b.test",
        ]))
        .unwrap();
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn limiter_tolerates_zero_settings() {
        let limiter = build_ip_limiter(0, 0);
        let ip: IpAddr = [127, 0, 0, 1].into();
        assert!(enforce_rate_limit(&limiter, Some(ip)).is_ok());
        assert!(enforce_rate_limit(&limiter, Some(ip)).is_err());
        assert!(enforce_rate_limit(&limiter, None).is_ok());
    }
}
