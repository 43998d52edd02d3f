//! Request surface: routes and handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use quizhive_jobs::{JobStatus, StatusOutcome};
use quizhive_store::{NewQuestion, Question, QuestionFilter};
use quizhive_telemetry::alerts::status_from_alerts;
use quizhive_telemetry::SystemStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;

/// Active jobs above this make the detailed health probe report a
/// warning for the job system.
const HEALTHY_ACTIVE_JOBS: usize = 10;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/questions", get(get_questions))
        .route("/questions/import", post(import_questions))
        .route("/generate_questions_async", post(generate_questions_async))
        .route("/generation_status/{job_id}", get(generation_status))
        .route("/metrics", get(metrics))
        .route("/alerts", get(alerts))
        .route("/performance/summary", get(performance_summary))
        .route("/health", get(health))
        .route("/health/ready", get(health_ready))
        .route("/health/detailed", get(health_detailed))
        .route("/admin/cleanup_jobs", post(cleanup_jobs))
        .route("/ws/{recipient}", get(ws::ws_handler))
        .with_state(state)
}

/// Serve until SIGINT/SIGTERM; in-flight requests finish first.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(bind).await?;
    tracing::info!("listening on {bind} (Ctrl+C/SIGTERM to stop)");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Quizhive backend is running!" }))
}

// ---------------------------------------------------------------------------
// Supply read path
// ---------------------------------------------------------------------------

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct QuestionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub age: Option<i64>,
    pub topic: Option<String>,
}

/// A question as returned to clients.
#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub id: i64,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
    pub topic: String,
    pub min_age: i64,
    pub max_age: i64,
    pub created_at: String,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt,
            options: q.options,
            answer: q.answer,
            topic: q.topic,
            min_age: q.min_age,
            max_age: q.max_age,
            created_at: q.created_at,
        }
    }
}

/// Supply read: atomic claim plus the auto-trigger policy. Low supply is
/// never an error, only a short list.
async fn get_questions(
    State(state): State<AppState>,
    Query(params): Query<QuestionsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let identity = state.auth.authorize(&headers)?;
    if params.limit < 0 {
        return Err(ApiError::BadRequest("limit must be non-negative".into()));
    }

    let filter = QuestionFilter {
        age: params.age,
        topic: params.topic,
    };
    let questions = state
        .supply
        .fetch_questions(&identity.email, params.limit, &filter)
        .await?;

    Ok(Json(questions.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: u64,
    pub skipped: u64,
    pub total: i64,
    pub message: String,
}

async fn import_questions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    state.auth.authorize(&headers)?;

    let outcome = state.store.import_batch(&request.questions).await?;
    let total = state.store.count_questions().await?;
    let message = format!(
        "Successfully imported {} questions, skipped {} duplicates. Total questions in database: {}",
        outcome.imported, outcome.skipped, total
    );
    Ok(Json(ImportResponse {
        imported: outcome.imported,
        skipped: outcome.skipped,
        total,
        message,
    }))
}

// ---------------------------------------------------------------------------
// Generation jobs
// ---------------------------------------------------------------------------

fn default_target_count() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default = "default_target_count")]
    pub target_count: u32,
    #[serde(default)]
    pub age_range: Option<(i64, i64)>,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

async fn generate_questions_async(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let identity = state.auth.authorize(&headers)?;

    if let Some((min_age, max_age)) = request.age_range {
        if min_age > max_age {
            return Err(ApiError::BadRequest(format!(
                "invalid age_range: {min_age} exceeds {max_age}"
            )));
        }
    }

    let job_id = state.jobs.enqueue(
        &identity.email,
        request.target_count,
        request.age_range,
        request.topic,
        false,
    );

    Ok(Json(GenerateResponse {
        job_id,
        status: JobStatus::Pending,
        message: format!("Question generation job started. Job ID: {job_id}"),
    }))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub target_count: u32,
    pub generated_count: u32,
    pub message: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

async fn generation_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let identity = state.auth.authorize(&headers)?;

    match state.jobs.status(job_id, &identity.email) {
        StatusOutcome::NotFound => Err(ApiError::NotFound("Job not found".into())),
        StatusOutcome::Forbidden => Err(ApiError::Forbidden("Access denied".into())),
        StatusOutcome::Job(snapshot) => Ok(Json(JobStatusResponse {
            job_id: snapshot.job_id,
            status: snapshot.status,
            target_count: snapshot.target_count,
            generated_count: snapshot.generated_count,
            message: snapshot.message,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
        })),
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

async fn metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.authorize(&headers)?;

    let m = state.metrics.snapshot();
    let total_questions = state.store.count_questions().await?;
    let total_recipients = state.store.count_recipients().await?;

    Ok(Json(json!({
        "jobs_enqueued": m.jobs_enqueued,
        "jobs_completed": m.jobs_completed,
        "jobs_failed": m.jobs_failed,
        "questions_generated": m.questions_generated,
        "duplicates_skipped": m.duplicates_skipped,
        "auto_triggers": m.auto_triggers,
        "manual_triggers": m.manual_triggers,
        "success_rate": m.success_rate(),
        "uptime_seconds": m.uptime_seconds,
        "questions_per_minute": m.questions_per_minute(),
        "total_questions_in_db": total_questions,
        "total_recipients": total_recipients,
        "active_jobs": state.jobs.active_jobs(),
        "total_job_history": state.jobs.total_jobs(),
    })))
}

async fn alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.authorize(&headers)?;

    let sample = state.sample();
    let alerts = state.thresholds.check(&sample);
    let critical = alerts
        .iter()
        .filter(|a| a.level == quizhive_telemetry::AlertLevel::Critical)
        .count();
    let system_status = status_from_alerts(&alerts);

    Ok(Json(json!({
        "timestamp": Utc::now().to_rfc3339(),
        "alert_count": alerts.len(),
        "critical_alerts": critical,
        "warning_alerts": alerts.len() - critical,
        "alerts": alerts,
        "system_status": system_status.as_str(),
    })))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn performance_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.authorize(&headers)?;

    let sample = state.sample();
    let m = &sample.metrics;
    let alerts = state.thresholds.check(&sample);

    Ok(Json(json!({
        "timestamp": Utc::now().to_rfc3339(),
        "performance_score": m.success_rate().clamp(0.0, 100.0),
        "key_metrics": {
            "questions_per_minute": m.questions_per_minute(),
            "success_rate": m.success_rate(),
            "active_jobs": sample.active_jobs,
            "duplicate_ratio": round2(m.duplicate_ratio()),
            "push_streams": sample.push_streams,
            "uptime_hours": round2(m.uptime_seconds / 3600.0),
        },
        "thresholds": {
            "max_active_jobs": state.thresholds.max_active_jobs,
            "min_success_rate": state.thresholds.min_success_rate,
            "max_duplicate_ratio": state.thresholds.max_duplicate_ratio,
            "max_push_streams": state.thresholds.max_push_streams,
        },
        "alerts": alerts,
    })))
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "quizhive",
    }))
}

async fn health_ready(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({
            "status": "ready",
            "timestamp": Utc::now().to_rfc3339(),
            "message": "Service ready to handle requests",
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "message": format!("Service not ready: {e}"),
            })),
        )
            .into_response(),
    }
}

async fn health_detailed(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut overall = SystemStatus::Healthy;
    let mut checks = serde_json::Map::new();

    match state.store.ping().await {
        Ok(()) => {
            checks.insert(
                "database".into(),
                json!({ "status": "healthy", "message": "Database connection successful" }),
            );
        }
        Err(e) => {
            overall = SystemStatus::Unhealthy;
            checks.insert(
                "database".into(),
                json!({ "status": "unhealthy", "message": format!("Database connection failed: {e}") }),
            );
        }
    }

    if state.generator_configured {
        checks.insert(
            "generator".into(),
            json!({ "status": "healthy", "message": "Generation service configured" }),
        );
    } else {
        checks.insert(
            "generator".into(),
            json!({ "status": "warning", "message": "Generation API key not configured" }),
        );
    }

    let active_jobs = state.jobs.active_jobs();
    let total_jobs = state.jobs.total_jobs();
    if active_jobs > HEALTHY_ACTIVE_JOBS {
        overall = overall.worst(SystemStatus::Warning);
        checks.insert(
            "job_system".into(),
            json!({
                "status": "warning",
                "message": format!("High number of active jobs: {active_jobs}"),
                "active_jobs": active_jobs,
                "total_jobs": total_jobs,
            }),
        );
    } else {
        checks.insert(
            "job_system".into(),
            json!({
                "status": "healthy",
                "message": "Job system operating normally",
                "active_jobs": active_jobs,
                "total_jobs": total_jobs,
            }),
        );
    }

    checks.insert(
        "push".into(),
        json!({
            "status": "healthy",
            "message": "Push hub operational",
            "active_streams": state.push.stream_count(),
            "connected_recipients": state.push.recipient_count(),
        }),
    );

    let m = state.metrics.snapshot();
    if m.success_rate() < 80.0 && m.jobs_completed > 10 {
        overall = overall.worst(SystemStatus::Warning);
        checks.insert(
            "performance".into(),
            json!({
                "status": "warning",
                "message": format!("Low success rate: {:.1}%", m.success_rate()),
            }),
        );
    } else {
        checks.insert(
            "performance".into(),
            json!({
                "status": "healthy",
                "message": "Performance metrics within normal range",
                "success_rate": m.success_rate(),
                "questions_per_minute": m.questions_per_minute(),
            }),
        );
    }

    Json(json!({
        "status": overall.as_str(),
        "timestamp": Utc::now().to_rfc3339(),
        "service": "quizhive",
        "checks": checks,
    }))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

async fn cleanup_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth.authorize(&headers)?;

    let removed = state.jobs.cleanup(state.admin_cleanup_ttl);
    Ok(Json(json!({
        "message": format!("Cleaned up {removed} old jobs"),
        "removed_count": removed,
        "remaining_jobs": state.jobs.total_jobs(),
    })))
}
