//! HTTP surface: task lifecycle, SSE progress streams and position analysis.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use augur_agents::PositionError;
use augur_models::{AnalysisTask, Holding, TaskFilter, TaskStatus};
use augur_tasks::TaskError;
use chrono::NaiveDate;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::{Engine, EngineError, PositionAnalysis};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{0}")]
    BadRequest(String),
}

fn task_status_code(err: &TaskError) -> StatusCode {
    match err {
        TaskError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskError::InvalidSymbol(_) => StatusCode::BAD_REQUEST,
        TaskError::Aggregation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TaskError::DeadlineExceeded(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Task(e) | ApiError::Engine(EngineError::Task(e)) => task_status_code(e),
            ApiError::Engine(EngineError::Analysis { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Engine(EngineError::Position(PositionError::MissingPrice(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Engine(EngineError::Position(PositionError::InvalidHolding(_))) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Engine(EngineError::Data(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub symbol: String,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub symbol: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionRequest {
    pub symbol: String,
    pub holding: Holding,
    /// Defaults to today.
    #[serde(default)]
    pub trade_date: Option<NaiveDate>,
}

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route("/api/tasks/{task_id}", get(get_task).delete(cancel_task))
        .route("/api/tasks/{task_id}/stream", get(stream_task))
        .route("/api/positions/analyze", post(analyze_position))
        .with_state(engine)
}

async fn health(State(engine): State<Engine>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "agents": engine.tasks().registry().names(),
    }))
}

async fn create_task(
    State(engine): State<Engine>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), ApiError> {
    let task_id = engine.tasks().create(&request.symbol, request.as_of).await?;
    Ok((StatusCode::ACCEPTED, Json(CreateTaskResponse { task_id })))
}

async fn list_tasks(
    State(engine): State<Engine>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<AnalysisTask>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let filter = TaskFilter {
        status,
        symbol: query.symbol,
        limit: query.limit,
    };
    Ok(Json(engine.tasks().list(&filter)))
}

async fn get_task(
    State(engine): State<Engine>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<AnalysisTask>, ApiError> {
    Ok(Json(engine.tasks().get(task_id).await?))
}

async fn cancel_task(
    State(engine): State<Engine>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<AnalysisTask>, ApiError> {
    Ok(Json(engine.tasks().cancel(task_id).await?))
}

/// SSE stream; each event is named after its type and carries the event JSON.
async fn stream_task(
    State(engine): State<Engine>,
    Path(task_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = engine.tasks().subscribe(task_id).await?;
    info!(%task_id, "Progress subscriber connected");

    let stream = events.map(|event| {
        let sse = Event::default().event(event.event_name());
        Ok(sse.json_data(&event).unwrap_or_else(|e| {
            error!(error = %e, "Failed to encode task event");
            Event::default().event("error").data("encoding failure")
        }))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

async fn analyze_position(
    State(engine): State<Engine>,
    Json(request): Json<PositionRequest>,
) -> Result<Json<PositionAnalysis>, ApiError> {
    let analysis = engine
        .analyze_position(&request.symbol, request.holding, request.trade_date)
        .await?;
    Ok(Json(analysis))
}
