//! StudyBuddy API Gateway
//!
//! The single HTTP entry point for the learning platform. Handles:
//! - Bearer authentication and user scoping
//! - Rate limiting on the AI-proxying routes
//! - Routing to quiz, midterm, progress, and resource handlers
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use studybuddy_common::auth::JwtManager;
use studybuddy_common::clients::{
    create_completion_model, create_resource_search, create_text_extractor, create_weakness_store,
    CompletionModel, ResourceSearch, TextExtractor, WeaknessStore,
};
use studybuddy_common::config::{AppConfig, ObservabilityConfig};
use studybuddy_common::db::DbPool;
use studybuddy_common::metrics::{self, METRICS_PREFIX};
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Maximum concurrent in-flight requests (backpressure control)
const MAX_CONCURRENT_REQUESTS: usize = 100;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: Option<Arc<JwtManager>>,
    pub model: Arc<dyn CompletionModel>,
    pub extractor: Arc<dyn TextExtractor>,
    pub search: Arc<dyn ResourceSearch>,
    pub weaknesses: Arc<dyn WeaknessStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!(
        "Starting StudyBuddy API Gateway v{}",
        studybuddy_common::VERSION
    );

    // Initialize metrics
    metrics::register_metrics();
    let prometheus = install_prometheus()?;

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    // Token verification (tokens are issued by the auth provider)
    let jwt = match config.auth.jwt_secret.as_deref() {
        Some(secret) if !secret.is_empty() => Some(Arc::new(JwtManager::new(
            secret,
            &config.auth.jwt_audience,
        ))),
        _ => {
            if config.auth.require_auth {
                warn!("auth.require_auth is set but no jwt_secret is configured; /api requests will be rejected");
            }
            None
        }
    };

    // External service clients
    let state = AppState {
        model: create_completion_model(&config.llm),
        extractor: create_text_extractor(&config.ocr),
        search: create_resource_search(&config.search),
        weaknesses: create_weakness_store(&config.weakness_store),
        db,
        jwt,
        config: Arc::new(config),
    };

    // Build the router
    let app = create_router(state.clone(), prometheus);

    // Start the server
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    )
    .parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Install the Prometheus recorder with the SLO-aligned buckets
fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{METRICS_PREFIX}_request_duration_seconds")),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{METRICS_PREFIX}_ai_request_duration_seconds")),
            metrics::AI_BUCKETS,
        )?
        .install_recorder()?;
    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState, prometheus: PrometheusHandle) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Bearer-gated API routes
    let mut api_routes = Router::new()
        // Midterm analysis
        .route("/midterm/analyze", post(handlers::midterm::analyze_midterm))
        // Quiz generation
        .route("/quiz/generate", post(handlers::quiz::generate_quiz))
        .route(
            "/quiz/generate-from-errors",
            post(handlers::quiz::generate_quiz_from_errors),
        )
        // Quiz result writes
        .route("/quiz/results", post(handlers::results::save_quiz_result))
        .route("/quiz/summary", post(handlers::results::save_quiz_summary))
        // Quiz & analysis reads
        .route("/quiz/{quiz_id}", get(handlers::quiz::get_quiz))
        .route("/quiz/{quiz_id}/result", get(handlers::quiz::get_quiz_result))
        .route(
            "/quiz-result/{result_id}",
            get(handlers::results::get_quiz_result_by_id),
        )
        .route(
            "/midterm-analysis/{analysis_id}",
            get(handlers::results::get_midterm_analysis_by_id),
        )
        .route("/user/{user_id}/quizzes", get(handlers::quiz::get_user_quizzes))
        // Study materials
        .route(
            "/resources/search",
            post(handlers::resources::search_study_materials),
        )
        .route(
            "/materials/extract-topics",
            post(handlers::materials::extract_topics),
        )
        // Weaknesses
        .route(
            "/user/{user_id}/weaknesses",
            get(handlers::weaknesses::get_user_weaknesses),
        )
        .route(
            "/user/{user_id}/weaknesses/update",
            post(handlers::weaknesses::update_user_weaknesses),
        )
        // Dashboard & personalization
        .route(
            "/user/{user_id}/progress",
            get(handlers::progress::get_user_progress),
        )
        .route(
            "/user/{user_id}/rag-progress",
            get(handlers::rag::get_rag_progress),
        )
        .route(
            "/user/{user_id}/rag-resources",
            get(handlers::rag::get_rag_resources),
        )
        .route(
            "/user/{user_id}/rag-quiz/generate",
            post(handlers::rag::generate_rag_quiz),
        )
        .route(
            "/user/{user_id}/rag-quiz/report",
            get(handlers::rag::rag_quiz_report),
        )
        .route(
            "/user/{user_id}/comprehensive-study-report",
            get(handlers::rag::comprehensive_study_report),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        let limit = state.config.rate_limit.requests_per_second;
        api_routes = api_routes.layer(axum::middleware::from_fn(move |request, next| {
            middleware::rate_limit::rate_limit(request, next, limiter.clone(), limit)
        }));
    }

    // Health stays open; added after the layers so it skips auth and
    // rate limiting.
    let api_routes = api_routes.route("/health", get(handlers::health::api_health));

    // Compose the app
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route(
            "/metrics",
            get(move || std::future::ready(prometheus.render())),
        )
        .nest("/api", api_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .layer(CompressionLayer::new())
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let list: Vec<_> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(list))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
