use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;

use crate::alert::{Severity, TimeWindows};
use crate::analyzer::AnalyzerHandle;
use crate::monitor::MonitorState;

use super::types::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

fn find_analyzer<'a>(
    state: &'a AppState,
    name: &str,
) -> Result<&'a AnalyzerHandle, (StatusCode, Json<ErrorResponse>)> {
    state
        .analyzers
        .iter()
        .find(|a| a.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown analyzer: {}", name)))
}

async fn analyzer_status(handle: &AnalyzerHandle) -> AnalyzerStatus {
    AnalyzerStatus {
        name: handle.name().to_string(),
        active: handle.is_active(),
        tracked_entities: handle.tracked_entities().await,
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let monitor_state = *state.state.borrow();

    let mut analyzers = Vec::with_capacity(state.analyzers.len());
    for handle in &state.analyzers {
        analyzers.push(analyzer_status(handle).await);
    }

    let status = match monitor_state {
        MonitorState::Running => "ok",
        MonitorState::Created | MonitorState::Connecting => "starting",
        MonitorState::ShuttingDown | MonitorState::Stopped => "stopped",
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        state: monitor_state,
        analyzers,
    }))
}

// ============================================================
// Alerts
// ============================================================

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertParams>,
) -> ApiResult<AlertsResponse> {
    let window = match params.window_secs {
        Some(secs) => i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "window_secs out of range"))?,
        None => TimeWindows::HOUR,
    };

    let min_severity = match params.min_severity.as_deref() {
        Some(s) => Some(Severity::parse(s).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, format!("Invalid severity: {}", s))
        })?),
        None => None,
    };

    let handles: Vec<&AnalyzerHandle> = match params.monitor.as_deref() {
        Some(name) => vec![find_analyzer(&state, name)?],
        None => state.analyzers.iter().collect(),
    };

    let now = Utc::now();
    let since = now
        .checked_sub_signed(window)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "window_secs out of range"))?;

    let mut alerts = Vec::new();
    for handle in handles {
        alerts.extend(handle.get_alerts(window, now).await);
    }

    if let Some(min) = min_severity {
        alerts.retain(|a| a.severity >= min);
    }

    // Newest first
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let total = alerts.len();
    alerts.truncate(params.limit.unwrap_or(100).min(1000));

    Ok(Json(AlertsResponse {
        since,
        total,
        alerts,
    }))
}

// ============================================================
// Analyzer control
// ============================================================

pub async fn pause_analyzer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<AnalyzerStatus> {
    let handle = find_analyzer(&state, &name)?;
    handle.pause();
    Ok(Json(analyzer_status(handle).await))
}

pub async fn resume_analyzer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<AnalyzerStatus> {
    let handle = find_analyzer(&state, &name)?;
    if matches!(
        *state.state.borrow(),
        MonitorState::ShuttingDown | MonitorState::Stopped
    ) {
        return Err(api_error(
            StatusCode::CONFLICT,
            "Monitor is shutting down; analyzers cannot be resumed",
        ));
    }
    handle.resume();
    Ok(Json(analyzer_status(handle).await))
}
