// HTTP request handlers
use crate::application::chart_grid::{GridError, PointerEvent};
use crate::application::question_overlay::QuestionError;
use crate::application::trial_session::SessionError;
use crate::infrastructure::frame_stream::stream_from_broadcast;
use crate::infrastructure::http_response::{accepts_brotli, svg_response};
use crate::infrastructure::svg_renderer::{render_chart, render_grid};
use crate::presentation::app_state::AppState;
use crate::runtime::RunnerError;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        let status = match &self {
            RunnerError::NoSession => StatusCode::CONFLICT,
            RunnerError::Load(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RunnerError::Session(e) => match e {
                SessionError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SessionError::NotFinished(_) => StatusCode::CONFLICT,
                SessionError::Grid(GridError::UnknownCell(_)) => StatusCode::NOT_FOUND,
                SessionError::Grid(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SessionError::Question(
                    QuestionError::NotActive(_) | QuestionError::UnknownOption { .. },
                ) => StatusCode::NOT_FOUND,
                SessionError::Question(QuestionError::Incomplete(_)) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                SessionError::Question(_) => StatusCode::CONFLICT,
            },
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct ResizeRequest {
    pub width: f64,
    pub height: f64,
}

#[derive(Deserialize)]
pub struct PointerRequest {
    pub kind: PointerEvent,
}

#[derive(Deserialize)]
pub struct SelectRequest {
    pub option: String,
    #[serde(default = "checked_by_default")]
    pub checked: bool,
}

fn checked_by_default() -> bool {
    true
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn trial_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runner.status().await)
}

/// Current grid as SVG
pub async fn trial_scene(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let Some(frame) = state.runner.frame().await else {
        return (StatusCode::NOT_FOUND, "no trial loaded").into_response();
    };
    match svg_response(render_grid(&frame), accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// One chart as a standalone SVG
pub async fn chart_scene(
    Path(index): Path<usize>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let cell = state
        .runner
        .frame()
        .await
        .and_then(|grid| grid.cells.into_iter().find(|c| c.frame.id == index));
    let Some(cell) = cell else {
        return (StatusCode::NOT_FOUND, "no such chart").into_response();
    };
    match svg_response(render_chart(&cell.frame), accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Per-tick frames as a chunked stream
pub async fn trial_frames(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let compress = accepts_brotli(&headers);
    stream_from_broadcast(state.runner.subscribe(), compress).await
}

pub async fn toggle_pause(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, RunnerError> {
    let clock_state = state.runner.toggle_pause().await?;
    Ok(Json(json!({ "state": clock_state })))
}

pub async fn restart(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, RunnerError> {
    let step = state.runner.restart().await?;
    Ok(Json(json!({ "restarted": step.is_some(), "step": step })))
}

pub async fn resize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResizeRequest>,
) -> Result<impl IntoResponse, RunnerError> {
    let resized = state.runner.resize(body.width, body.height).await?;
    Ok(Json(json!({ "resized": resized })))
}

pub async fn pointer(
    Path(index): Path<usize>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PointerRequest>,
) -> Result<impl IntoResponse, RunnerError> {
    state.runner.pointer(index, body.kind).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_option(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectRequest>,
) -> Result<impl IntoResponse, RunnerError> {
    state
        .runner
        .select_option(&id, &body.option, body.checked)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, RunnerError> {
    Ok(Json(state.runner.submit(&id).await?))
}

/// Export the finished trial and move on
pub async fn next_trial(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, RunnerError> {
    let advance = state.runner.next().await?;
    Ok(Json(advance))
}
