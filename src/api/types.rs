use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::Alert;
use crate::monitor::MonitorState;

// ============================================================
// Query params
// ============================================================

#[derive(Debug, Deserialize)]
pub struct AlertParams {
    /// Look-back window in seconds. Defaults to one hour.
    pub window_secs: Option<u64>,
    pub monitor: Option<String>,
    pub min_severity: Option<String>,
    pub limit: Option<usize>,
}

// ============================================================
// Response types
// ============================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: MonitorState,
    pub analyzers: Vec<AnalyzerStatus>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzerStatus {
    pub name: String,
    pub active: bool,
    pub tracked_entities: usize,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub since: DateTime<Utc>,
    pub total: usize,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
