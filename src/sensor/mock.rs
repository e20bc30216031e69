use crate::error::AppError;
use crate::sensor::{LevelMeter, MeterMode, SampleMode};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Scripted answer for one `get_measure` call.
#[derive(Debug, Clone)]
pub enum MockReading {
    Value(String),
    Fail,
}

impl MockReading {
    pub fn percent(percent: f64) -> Self {
        MockReading::Value(format!("{percent} %"))
    }
}

#[derive(Debug, Default)]
struct MockMeterState {
    readings: VecDeque<MockReading>,
    last_value: Option<String>,
    mode: Option<MeterMode>,
    fail_setup: bool,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// In-memory level meter.
///
/// Readings are replayed in order; once the queue is empty the last value
/// repeats. Clones share state so tests can inspect calls after handing the
/// meter to a monitor.
#[derive(Debug, Clone, Default)]
pub struct MockMeter {
    inner: Arc<Mutex<MockMeterState>>,
}

impl MockMeter {
    pub fn new(readings: Vec<MockReading>) -> Self {
        let meter = Self::default();
        meter.with_state(|state| state.readings = readings.into());
        meter
    }

    /// Every call except `get_measure` and `get_mode` fails.
    pub fn failing_setup() -> Self {
        let meter = Self::default();
        meter.with_state(|state| state.fail_setup = true);
        meter
    }

    /// Makes every later call to the named setup operation fail.
    pub fn fail_call(&self, name: &str) {
        self.with_state(|state| {
            state.failing.insert(name.to_string());
        });
    }

    pub fn clear_failures(&self) {
        self.with_state(|state| state.failing.clear());
    }

    pub fn push_reading(&self, reading: MockReading) {
        self.with_state(|state| state.readings.push_back(reading));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.with_state(|state| {
            state
                .calls
                .iter()
                .filter(|call| call.split('(').next() == Some(name))
                .count()
        })
    }

    pub fn mode(&self) -> MeterMode {
        self.with_state(|state| state.mode.clone().unwrap_or(MeterMode::Off))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockMeterState) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn setup_call(&self, call: String, apply: impl FnOnce(&mut MockMeterState)) -> Result<(), AppError> {
        self.with_state(|state| {
            state.calls.push(call.clone());
            let name = call.split('(').next().unwrap_or_default();
            if state.fail_setup || state.failing.contains(name) {
                return Err(AppError::Meter(format!("mock {call} failed")));
            }
            apply(state);
            Ok(())
        })
    }
}

#[async_trait]
impl LevelMeter for MockMeter {
    async fn select_device(&self) -> Result<(), AppError> {
        self.setup_call("select_device".to_string(), |_| {})
    }

    async fn set_sample_mode(&self, mode: SampleMode) -> Result<(), AppError> {
        self.setup_call(format!("set_sample_mode({})", mode.code()), |state| {
            state.mode = Some(MeterMode::Other(mode.code().to_string()));
        })
    }

    async fn set_sample_interval(&self, interval: &str) -> Result<(), AppError> {
        self.setup_call(format!("set_sample_interval({interval})"), |_| {})
    }

    async fn set_off_mode(&self) -> Result<(), AppError> {
        self.setup_call("set_off_mode".to_string(), |state| {
            state.mode = Some(MeterMode::Off);
        })
    }

    async fn set_units(&self, units: &str) -> Result<(), AppError> {
        self.setup_call(format!("set_units({units})"), |_| {})
    }

    async fn prep_measure(&self) -> Result<(), AppError> {
        self.setup_call("prep_measure".to_string(), |_| {})
    }

    async fn get_measure(&self) -> Result<String, AppError> {
        self.with_state(|state| {
            state.calls.push("get_measure".to_string());
            match state.readings.pop_front() {
                Some(MockReading::Value(value)) => {
                    state.last_value = Some(value.clone());
                    Ok(value)
                }
                Some(MockReading::Fail) => {
                    Err(AppError::Meter("mock get_measure failed".to_string()))
                }
                None => state
                    .last_value
                    .clone()
                    .ok_or_else(|| AppError::Meter("mock has no reading".to_string())),
            }
        })
    }

    async fn get_mode(&self) -> Result<MeterMode, AppError> {
        self.with_state(|state| {
            state.calls.push("get_mode".to_string());
            Ok(state.mode.clone().unwrap_or(MeterMode::Off))
        })
    }
}
