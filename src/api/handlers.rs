use crate::api::ApiState;
use crate::api::responses::{
    ChartPoint, ChartResponse, ErrorCode, ErrorResponse, FillModeResponse, FitPoint,
    HealthSuccessResponse, IntervalRequest, IntervalResponse, LevelSuccessResponse,
    MeasureResponse, TimeToFillResponse,
};
use crate::error::AppError;
use crate::estimation::geometry::{VesselGeometry, round_to};
use crate::estimation::{self, TimeToFill};
use crate::monitor::interval::SampleInterval;
use crate::state::{AppState, ConnectionStatus};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_level(State(api): State<ApiState>) -> impl IntoResponse {
    build_level_response(&api.state, &api.geometry, SystemTime::now())
}

pub async fn get_chart(State(api): State<ApiState>) -> impl IntoResponse {
    build_chart_response(&api.state, SystemTime::now())
}

pub async fn get_health(State(api): State<ApiState>) -> impl IntoResponse {
    build_health_response(&api.state, SystemTime::now())
}

pub async fn put_interval(
    State(api): State<ApiState>,
    body: Result<Json<IntervalRequest>, JsonRejection>,
) -> impl IntoResponse {
    match body {
        Ok(Json(request)) => apply_interval(&api, request).await,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected sample interval body");
            error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidInterval,
                rejection.body_text(),
                SystemTime::now(),
            )
        }
    }
}

pub async fn post_fill_mode(State(api): State<ApiState>) -> impl IntoResponse {
    toggle_fill_mode(&api).await
}

pub async fn post_measure(State(api): State<ApiState>) -> impl IntoResponse {
    measure_now(&api).await
}

fn build_level_response(
    state: &Arc<RwLock<AppState>>,
    geometry: &VesselGeometry,
    now: SystemTime,
) -> ApiResponse<LevelSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/level", "state lock poisoned while reading level");
        }
    };
    let Some(level) = guard.level().cloned() else {
        drop(guard);
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NoData,
            "No level reading available".to_string(),
            now,
        );
    };
    let fill_mode = guard.fill_mode().active;
    let consumption_rate = guard.fit().map(|fit| fit.rate());
    let time_to_fill = guard.time_to_fill().map(time_to_fill_response);
    let interval = guard
        .interval()
        .map(|interval| interval.to_string())
        .unwrap_or_default();
    drop(guard);

    let timestamp = match format_timestamp(level.timestamp) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/level", "timestamp formatting failure"),
    };

    ApiResponse::Success {
        status: StatusCode::OK,
        body: LevelSuccessResponse {
            level_in: round_to(level.inches, 2),
            level_percent: round_to(level.percent, 2),
            volume_liters: level.volume_liters,
            recent_rate_percent_per_hour: level.recent_rate.map(|rate| round_to(rate, 2)),
            consumption_rate_percent_per_hour: consumption_rate.map(|rate| round_to(rate, 2)),
            fill_level_percent: geometry.fill_level_percent(),
            time_to_fill,
            interval,
            fill_mode,
            timestamp,
        },
    }
}

fn time_to_fill_response(remaining: &TimeToFill) -> TimeToFillResponse {
    TimeToFillResponse {
        days: remaining.days(),
        hours: remaining.hours_part(),
        text: remaining.to_string(),
        urgency: remaining.urgency(),
    }
}

fn build_chart_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<ChartResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/chart", "state lock poisoned while reading samples");
        }
    };
    let samples = guard.samples();
    let fill_mode = guard.fill_mode().active;

    let points = samples
        .iter()
        .map(|s| ChartPoint {
            hours: s.elapsed_hours,
            percent: s.percent,
            inches: s.inches,
        })
        .collect();
    // The fit line is hidden while filling.
    let fit = match guard.fit() {
        Some(fit) if !fill_mode => estimation::fit_line(samples, fit)
            .into_iter()
            .map(|(hours, percent)| FitPoint { hours, percent })
            .collect(),
        _ => Vec::new(),
    };
    let x_range = estimation::chart_window(samples, fill_mode).map(|(start, end)| [start, end]);
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/chart", "timestamp formatting failure"),
    };

    ApiResponse::Success {
        status: StatusCode::OK,
        body: ChartResponse {
            samples: points,
            fit,
            x_range,
            fill_mode,
            timestamp,
        },
    }
}

fn build_health_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading status");
        }
    };
    let status = guard.status();
    let dataset = guard.dataset().map(str::to_string);
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/health", "timestamp formatting failure"),
    };

    let status_code = match status {
        ConnectionStatus::Connected => StatusCode::OK,
        ConnectionStatus::Disconnected | ConnectionStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
    };

    ApiResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            dataset,
            timestamp,
        },
    }
}

async fn apply_interval(api: &ApiState, request: IntervalRequest) -> ApiResponse<IntervalResponse> {
    let interval: SampleInterval = match request.interval.parse() {
        Ok(interval) => interval,
        Err(err) => {
            warn!(error = %err, "Rejected sample interval");
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidInterval,
                "Expected HH:MM:SS with fields up to 59, or manual".to_string(),
                SystemTime::now(),
            );
        }
    };

    match api.monitor.set_interval(interval).await {
        Ok(applied) => match format_timestamp(SystemTime::now()) {
            Ok(timestamp) => ApiResponse::Success {
                status: StatusCode::OK,
                body: IntervalResponse {
                    interval: applied.to_string(),
                    timestamp,
                },
            },
            Err(_) => internal_error("/api/interval", "timestamp formatting failure"),
        },
        Err(err) => command_error("/api/interval", err),
    }
}

async fn toggle_fill_mode(api: &ApiState) -> ApiResponse<FillModeResponse> {
    match api.monitor.toggle_fill_mode().await {
        Ok(status) => {
            let since = match status.since.map(format_timestamp).transpose() {
                Ok(since) => since,
                Err(_) => return internal_error("/api/fill-mode", "timestamp formatting failure"),
            };
            match format_timestamp(SystemTime::now()) {
                Ok(timestamp) => ApiResponse::Success {
                    status: StatusCode::OK,
                    body: FillModeResponse {
                        active: status.active,
                        since,
                        timestamp,
                    },
                },
                Err(_) => internal_error("/api/fill-mode", "timestamp formatting failure"),
            }
        }
        Err(err) => command_error("/api/fill-mode", err),
    }
}

async fn measure_now(api: &ApiState) -> ApiResponse<MeasureResponse> {
    match api.monitor.measure_now().await {
        Ok(()) => match format_timestamp(SystemTime::now()) {
            Ok(timestamp) => ApiResponse::Success {
                status: StatusCode::OK,
                body: MeasureResponse {
                    requested: true,
                    timestamp,
                },
            },
            Err(_) => internal_error("/api/measure", "timestamp formatting failure"),
        },
        Err(err) => command_error("/api/measure", err),
    }
}

fn command_error<T>(route: &str, err: AppError) -> ApiResponse<T> {
    match err {
        AppError::MonitorStopped | AppError::StateLock => {
            internal_error(route, &err.to_string())
        }
        AppError::InvalidInterval(_) => error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidInterval,
            err.to_string(),
            SystemTime::now(),
        ),
        other => {
            warn!(route, error = %other, "Meter command failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                ErrorCode::MeterError,
                other.to_string(),
                SystemTime::now(),
            )
        }
    }
}

fn error_response<T>(
    status: StatusCode,
    error_code: ErrorCode,
    error_message: String,
    now: SystemTime,
) -> ApiResponse<T> {
    let timestamp = format_timestamp(now).unwrap_or_else(|_| fallback_timestamp());
    ApiResponse::Error {
        status,
        body: ErrorResponse {
            error_code,
            error_message,
            timestamp,
        },
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(message = message, "Internal error while handling {route}");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        fallback_timestamp()
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn fallback_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::linear::LinearFit;
    use crate::estimation::{ConsumptionFit, FitWindow, Sample, Urgency};
    use crate::monitor::{Command, MonitorHandle};
    use crate::state::{FillModeStatus, LevelReport};
    use std::time::{Duration, UNIX_EPOCH};
    use tokio::sync::mpsc;

    fn geometry() -> VesselGeometry {
        VesselGeometry {
            active_length_in: 29.53,
            belly_bottom_in: 8.27,
            belly_top_in: 26.58,
            belly_liters_per_in: 3.84,
            tail_liters_per_in: 0.6,
            fill_level_in: 8.27,
        }
    }

    fn poisoned_state() -> Arc<RwLock<AppState>> {
        let state = Arc::new(RwLock::new(AppState::new()));
        let state_for_thread = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = state_for_thread.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();
        state
    }

    fn state_with_level() -> Arc<RwLock<AppState>> {
        let mut app_state = AppState::new();
        app_state.set_samples(vec![
            Sample {
                elapsed_hours: 0.0,
                percent: 50.0,
                inches: 14.77,
            },
            Sample {
                elapsed_hours: 2.0,
                percent: 49.0,
                inches: 14.47,
            },
        ]);
        app_state.set_level(LevelReport {
            inches: 14.47,
            percent: 49.001,
            volume_liters: 30,
            recent_rate: Some(-0.5),
            timestamp: UNIX_EPOCH + Duration::from_secs(1),
        });
        app_state.set_fit(Some(ConsumptionFit {
            line: LinearFit {
                slope: -0.5,
                intercept: 50.0,
            },
            window: FitWindow::LastSamples,
            start_index: 0,
        }));
        app_state.set_time_to_fill(Some(TimeToFill { hours: 52.7 }));
        app_state.set_interval(SampleInterval::Every {
            hours: 5,
            minutes: 0,
            seconds: 0,
        });
        Arc::new(RwLock::new(app_state))
    }

    /// Handle backed by a task that answers every command with `reply`.
    fn scripted_monitor(fail: bool) -> MonitorHandle {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let meter_error = || AppError::Meter("meter offline".to_string());
                match command {
                    Command::ToggleFillMode { reply } => {
                        let _ = reply.send(if fail {
                            Err(meter_error())
                        } else {
                            Ok(FillModeStatus {
                                active: true,
                                since: Some(UNIX_EPOCH + Duration::from_secs(60)),
                            })
                        });
                    }
                    Command::SetInterval { interval, reply } => {
                        let _ = reply.send(if fail { Err(meter_error()) } else { Ok(interval) });
                    }
                    Command::MeasureNow { reply } => {
                        let _ = reply.send(if fail { Err(meter_error()) } else { Ok(()) });
                    }
                }
            }
        });
        MonitorHandle::new(tx)
    }

    fn api_state(monitor: MonitorHandle) -> ApiState {
        ApiState {
            state: Arc::new(RwLock::new(AppState::new())),
            monitor,
            geometry: Arc::new(geometry()),
        }
    }

    #[test]
    fn level_handler_reports_latest_level() {
        let state = state_with_level();

        let response = build_level_response(&state, &geometry(), UNIX_EPOCH);

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.level_in, 14.47);
                assert_eq!(body.level_percent, 49.0);
                assert_eq!(body.volume_liters, 30);
                assert_eq!(body.recent_rate_percent_per_hour, Some(-0.5));
                assert_eq!(body.consumption_rate_percent_per_hour, Some(-0.5));
                assert_eq!(body.fill_level_percent, 28.0);
                assert_eq!(
                    body.time_to_fill,
                    Some(TimeToFillResponse {
                        days: 2,
                        hours: 4,
                        text: "2 days, 4 hours".to_string(),
                        urgency: Urgency::Comfortable,
                    })
                );
                assert_eq!(body.interval, "05:00:00");
                assert!(!body.fill_mode);
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn level_handler_returns_no_data_before_first_sample() {
        let state = Arc::new(RwLock::new(AppState::new()));

        let response = build_level_response(&state, &geometry(), UNIX_EPOCH);

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, ErrorCode::NoData);
            }
            ApiResponse::Success { .. } => panic!("expected no data response"),
        }
    }

    #[test]
    fn level_handler_returns_internal_error_when_lock_poisoned() {
        let response = build_level_response(&poisoned_state(), &geometry(), UNIX_EPOCH);

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
                assert_eq!(body.error_message, "Internal server error");
            }
            ApiResponse::Success { .. } => panic!("expected internal error response"),
        }
    }

    #[test]
    fn chart_handler_includes_fit_line() {
        let state = state_with_level();

        let response = build_chart_response(&state, UNIX_EPOCH + Duration::from_secs(2));

        match response {
            ApiResponse::Success { body, .. } => {
                assert_eq!(body.samples.len(), 2);
                assert_eq!(
                    body.fit,
                    vec![
                        FitPoint {
                            hours: 0.0,
                            percent: 50.0
                        },
                        FitPoint {
                            hours: 2.0,
                            percent: 49.0
                        },
                    ]
                );
                assert_eq!(body.x_range, None);
                assert_eq!(body.timestamp, "1970-01-01T00:00:02Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn chart_handler_hides_fit_and_zooms_in_fill_mode() {
        let state = state_with_level();
        state
            .write()
            .expect("state lock")
            .set_fill_mode(FillModeStatus {
                active: true,
                since: Some(UNIX_EPOCH),
            });

        let response = build_chart_response(&state, UNIX_EPOCH);

        match response {
            ApiResponse::Success { body, .. } => {
                assert!(body.fit.is_empty());
                assert_eq!(body.x_range, Some([0.0, 2.0]));
                assert!(body.fill_mode);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_handler_maps_connection_status() {
        let state = Arc::new(RwLock::new(AppState::new()));
        {
            let mut guard = state.write().expect("state lock");
            guard.set_status(ConnectionStatus::Connected);
            guard.set_dataset(Some("00001 - LHe Level".to_string()));
        }

        match build_health_response(&state, UNIX_EPOCH + Duration::from_secs(3)) {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.status, ConnectionStatus::Connected);
                assert_eq!(body.dataset.as_deref(), Some("00001 - LHe Level"));
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }

        state
            .write()
            .expect("state lock")
            .set_status(ConnectionStatus::Error);

        match build_health_response(&state, UNIX_EPOCH) {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.status, ConnectionStatus::Error);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_handler_returns_internal_error_when_lock_poisoned() {
        match build_health_response(&poisoned_state(), UNIX_EPOCH) {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
            }
            ApiResponse::Success { .. } => panic!("expected internal error response"),
        }
    }

    async fn serve(api: ApiState) -> std::io::Result<std::net::SocketAddr> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, crate::api::router(api)).await;
        });
        Ok(addr)
    }

    #[tokio::test]
    async fn malformed_interval_body_uses_error_shape() -> Result<(), Box<dyn std::error::Error>> {
        let (tx, _rx) = mpsc::channel(1);
        let addr = serve(api_state(MonitorHandle::new(tx))).await?;

        let response = reqwest::Client::new()
            .put(format!("http://{addr}/api/interval"))
            .header("content-type", "application/json")
            .body("{\"interval\": ")
            .send()
            .await?;

        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["error_code"], "INVALID_INTERVAL");
        assert!(body["timestamp"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn interval_route_applies_valid_body() -> Result<(), Box<dyn std::error::Error>> {
        let addr = serve(api_state(scripted_monitor(false))).await?;

        let response = reqwest::Client::new()
            .put(format!("http://{addr}/api/interval"))
            .json(&serde_json::json!({"interval": "manual"}))
            .send()
            .await?;

        assert_eq!(response.status().as_u16(), 200);
        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["interval"], "manual");
        Ok(())
    }

    #[tokio::test]
    async fn interval_handler_rejects_bad_input_without_contacting_monitor() {
        let (tx, _rx) = mpsc::channel(1);
        let api = api_state(MonitorHandle::new(tx));

        let response = apply_interval(
            &api,
            IntervalRequest {
                interval: "99:00:00".to_string(),
            },
        )
        .await;

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body.error_code, ErrorCode::InvalidInterval);
            }
            ApiResponse::Success { .. } => panic!("expected bad request"),
        }
    }

    #[tokio::test]
    async fn interval_handler_returns_normalized_interval() {
        let api = api_state(scripted_monitor(false));

        let response = apply_interval(
            &api,
            IntervalRequest {
                interval: "0:30:0".to_string(),
            },
        )
        .await;

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.interval, "00:30:00");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[tokio::test]
    async fn fill_mode_handler_reports_start_time() {
        let api = api_state(scripted_monitor(false));

        match toggle_fill_mode(&api).await {
            ApiResponse::Success { body, .. } => {
                assert!(body.active);
                assert_eq!(body.since.as_deref(), Some("1970-01-01T00:01:00Z"));
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[tokio::test]
    async fn meter_failures_map_to_bad_gateway() {
        let api = api_state(scripted_monitor(true));

        match measure_now(&api).await {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body.error_code, ErrorCode::MeterError);
                assert_eq!(body.error_message, "meter error: meter offline");
            }
            ApiResponse::Success { .. } => panic!("expected meter error"),
        }
    }

    #[tokio::test]
    async fn stopped_monitor_is_internal_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let api = api_state(MonitorHandle::new(tx));

        match measure_now(&api).await {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
            }
            ApiResponse::Success { .. } => panic!("expected internal error"),
        }
    }
}
