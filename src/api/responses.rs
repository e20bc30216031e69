use crate::estimation::Urgency;
use crate::state::ConnectionStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LevelSuccessResponse {
    pub level_in: f64,
    pub level_percent: f64,
    pub volume_liters: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_rate_percent_per_hour: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumption_rate_percent_per_hour: Option<f64>,
    pub fill_level_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_fill: Option<TimeToFillResponse>,
    pub interval: String,
    pub fill_mode: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TimeToFillResponse {
    pub days: u64,
    pub hours: u64,
    pub text: String,
    pub urgency: Urgency,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChartResponse {
    pub samples: Vec<ChartPoint>,
    pub fit: Vec<FitPoint>,
    /// Hours shown on the x axis; absent means auto range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_range: Option<[f64; 2]>,
    pub fill_mode: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChartPoint {
    pub hours: f64,
    pub percent: f64,
    pub inches: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FitPoint {
    pub hours: f64,
    pub percent: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub interval: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct IntervalResponse {
    pub interval: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FillModeResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MeasureResponse {
    pub requested: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoData,
    InvalidInterval,
    MeterError,
    InternalError,
}
