use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::coverage::{CoverageRecord, HealthMessage, MetricCoverage};
use crate::dashboard::{chart_data_within_range, chart_points, result_summary, ChartPoint, JobCoverage};
use crate::db::Database;
use crate::history::last_result;

pub const DEFAULT_CHART_DAYS: u32 = 30;

pub struct AppState {
    pub db_path: std::path::PathBuf,
}

impl AppState {
    pub fn get_db(&self) -> Result<Database> {
        Database::open(&self.db_path)
    }
}

/// Health of one build's coverage
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub job: String,
    pub build: u64,
    /// `None` when health reporting was disabled for the build
    pub score: Option<i32>,
    pub description: Option<String>,
    pub messages: Vec<HealthMessage>,
    pub metrics: Vec<MetricCoverage>,
}

impl HealthResponse {
    pub fn from_record(record: &CoverageRecord) -> Self {
        let report = record.report();
        Self {
            job: record.job.clone(),
            build: record.build,
            score: report.health.as_ref().map(|h| h.score),
            description: report.health.as_ref().map(|h| h.description()),
            messages: report.health.as_ref().map(|h| h.messages.clone()).unwrap_or_default(),
            metrics: report.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartResponse {
    pub days: u32,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub statement: f64,
    pub branch: f64,
    #[serde(rename = "loop")]
    pub loops: f64,
    pub condition: f64,
    pub job_count: usize,
    pub results: Vec<JobCoverage>,
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub days: Option<u32>,
}

pub fn job_health(db: &Database, job: &str) -> Result<Option<HealthResponse>> {
    let history = db.load_job(job)?;
    Ok(last_result(&history).map(|record| HealthResponse::from_record(&record)))
}

pub fn build_health(db: &Database, job: &str, number: u64) -> Result<Option<HealthResponse>> {
    Ok(db
        .get_coverage(job, number)?
        .map(|record| HealthResponse::from_record(&record)))
}

pub fn chart(db: &Database, days: u32) -> Result<ChartResponse> {
    let jobs = db.load_jobs()?;
    let points = chart_data_within_range(&jobs, days)
        .map(|summaries| chart_points(&summaries))
        .unwrap_or_default();
    Ok(ChartResponse { days, points })
}

pub fn summary(db: &Database) -> Result<SummaryResponse> {
    use crate::coverage::Metric;

    let jobs = db.load_jobs()?;
    let summary = result_summary(&jobs);
    Ok(SummaryResponse {
        statement: summary.average(Metric::Statement),
        branch: summary.average(Metric::Branch),
        loops: summary.average(Metric::Loop),
        condition: summary.average(Metric::Condition),
        job_count: summary.count(),
        results: summary.results,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/jobs", get(get_jobs))
        .route("/api/jobs/:job/health", get(get_job_health))
        .route("/api/jobs/:job/builds/:number/health", get(get_build_health))
        .route("/api/dashboard/chart", get(get_chart))
        .route("/api/dashboard/summary", get(get_summary))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(port: u16, db_path: std::path::PathBuf) -> Result<()> {
    let state = Arc::new(AppState { db_path });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    println!("Coverage API running at http://localhost:{}", port);
    println!("   Press Ctrl+C to stop\n");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n✓ Server stopped via Ctrl+C");
        }
    }

    Ok(())
}

fn internal_error(e: anyhow::Error) -> Response {
    error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

async fn get_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.get_db().and_then(|db| db.job_names()) {
        Ok(names) => Json(names).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_job_health(State(state): State<Arc<AppState>>, Path(job): Path<String>) -> impl IntoResponse {
    debug!(job = %job, "job health requested");
    match state.get_db().and_then(|db| job_health(&db, &job)) {
        Ok(Some(health)) => Json(health).into_response(),
        Ok(None) => not_found("No coverage result for job"),
        Err(e) => internal_error(e),
    }
}

async fn get_build_health(
    State(state): State<Arc<AppState>>,
    Path((job, number)): Path<(String, u64)>,
) -> impl IntoResponse {
    match state.get_db().and_then(|db| build_health(&db, &job, number)) {
        Ok(Some(health)) => Json(health).into_response(),
        Ok(None) => not_found("No coverage result for build"),
        Err(e) => internal_error(e),
    }
}

async fn get_chart(State(state): State<Arc<AppState>>, Query(query): Query<ChartQuery>) -> impl IntoResponse {
    let days = query.days.unwrap_or(DEFAULT_CHART_DAYS);
    match state.get_db().and_then(|db| chart(&db, days)) {
        Ok(chart) => Json(chart).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.get_db().and_then(|db| summary(&db)) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}
