mod config;
mod metrics;
mod validate;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use config::{AppConfig, LogFormat};
use extract::{AnalysisResult, Analyzer, CustomSearchClient, GeminiClient, MemorySink, TraceRecord};
use metrics::{Metrics, MetricsSnapshot, TimedOperation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
    metrics: Arc<Metrics>,
    limiter: Arc<Semaphore>,
    config: Arc<AppConfig>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    custom_search: bool,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    identifier: String,
    /// Omitted means the default attribute set.
    attributes: Option<Vec<String>>,
    #[serde(default)]
    include_trace: bool,
}

#[derive(Deserialize)]
struct WamRequest {
    identifier: String,
    #[serde(default)]
    include_trace: bool,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    request_id: Uuid,
    result: AnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<Vec<TraceRecord>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(LogFormat::from_env()?);

    let config = AppConfig::from_env()?;
    let analyzer = build_analyzer(&config)?;
    tracing::info!(
        model = analyzer.model(),
        custom_search = analyzer.uses_custom_search(),
        max_concurrent = config.concurrency.max_concurrent_analyses,
        "analyzer ready"
    );

    let bind_addr = config.bind_addr.clone();
    let app = router(AppState::new(analyzer, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!("Server listening on http://{bind_addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_analyzer(config: &AppConfig) -> anyhow::Result<Analyzer> {
    let timeout = Duration::from_secs(config.concurrency.request_timeout_secs);

    let llm = GeminiClient::with_base_url(
        config.model.base_url.clone(),
        config.model.api_key.clone(),
        config.model.model.clone(),
    )
    .with_timeout(timeout)?;
    let mut analyzer = Analyzer::new(llm);

    if config.search.enabled {
        if let (Some(api_key), Some(engine_id)) =
            (&config.search.api_key, &config.search.engine_id)
        {
            let search = CustomSearchClient::with_base_url(
                config.search.base_url.clone(),
                api_key.clone(),
                engine_id.clone(),
            )
            .with_timeout(timeout)?;
            analyzer = analyzer.with_search(search);
        }
    }

    Ok(analyzer)
}

impl AppState {
    fn new(analyzer: Analyzer, config: AppConfig) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            metrics: Metrics::new(),
            limiter: Arc::new(Semaphore::new(config.concurrency.max_concurrent_analyses)),
            config: Arc::new(config),
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/analyze", post(analyze))
        .route("/analyze/wam", post(analyze_wam))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.analyzer.model().to_string(),
        custom_search: state.analyzer.uses_custom_search(),
    })
}

async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    run_analysis(&state, &req.identifier, req.attributes, req.include_trace).await
}

async fn analyze_wam(
    State(state): State<AppState>,
    Json(req): Json<WamRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let names = extract::AttributeSchema::wam_only();
    run_analysis(&state, &req.identifier, Some(names), req.include_trace).await
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn run_analysis(
    state: &AppState,
    identifier: &str,
    attributes: Option<Vec<String>>,
    include_trace: bool,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let request_id = Uuid::new_v4();

    let cusip = validate::validate_cusip(identifier).map_err(|message| {
        state.metrics.record_rejected();
        tracing::info!(%request_id, identifier, %message, "rejected identifier");
        api_error(StatusCode::BAD_REQUEST, message)
    })?;

    let _permit = state.limiter.acquire().await.map_err(|_| {
        state.metrics.record_rejected();
        api_error(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down")
    })?;

    let deadline = state.config.concurrency.analysis_deadline();
    let sink = MemorySink::new();
    let timer = TimedOperation::start();

    let outcome = tokio::time::timeout(
        deadline,
        state.analyzer.analyze(&cusip, attributes.as_deref(), &sink),
    )
    .await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            state.metrics.record_rejected();
            tracing::error!(%request_id, cusip = %cusip, error = %e, "analysis failed");
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")));
        }
        Err(_) => {
            state.metrics.record_rejected();
            tracing::warn!(%request_id, cusip = %cusip, "analysis timed out");
            return Err(api_error(
                StatusCode::GATEWAY_TIMEOUT,
                format!("analysis of {cusip} timed out"),
            ));
        }
    };

    let elapsed = timer.elapsed();
    state.metrics.record_analysis(&result, elapsed);
    tracing::info!(
        %request_id,
        cusip = %cusip,
        success = result.is_success(),
        elapsed_ms = elapsed.as_millis() as u64,
        "request complete"
    );

    Ok(Json(AnalyzeResponse {
        request_id,
        result,
        trace: include_trace.then(|| sink.records()),
    }))
}
