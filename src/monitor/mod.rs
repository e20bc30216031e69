//! Polling loop for the level meter.
//!
//! One task owns the meter, the sample history and the fill mode. It polls on
//! a fixed period and, between polls, serves operator commands sent through a
//! [`MonitorHandle`]. Results are published into the shared [`AppState`].
//!
//! A failed poll stops polling for good and marks the connection as errored;
//! commands are still served afterwards, and fill mode still times out.

use crate::error::AppError;
use crate::estimation::geometry::VesselGeometry;
use crate::estimation::{self, Sample, SampleLog};
use crate::sensor::{LevelMeter, MeterMode, PERCENT_UNITS, SampleMode, parse_percent_reading};
use crate::sink::{
    COMPACT_FORMAT, DATESTAMP_FORMAT, DataLog, DatasetSpec, StatusRow, StatusStore, format_local,
    local_now,
};
use crate::state::{AppState, ConnectionStatus, FillModeStatus, LevelReport};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

pub mod fill;
pub mod interval;

use fill::FillMode;
use interval::SampleInterval;

/// Pause between the two preps of a manual measurement.
pub const MANUAL_PREP_GAP: Duration = Duration::from_secs(5);
/// Pause before switching the meter back off after a manual measurement.
pub const MANUAL_SETTLE: Duration = Duration::from_secs(2);
const COMMAND_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_period: Duration,
    pub settle_period: Duration,
    pub fill_mode_timeout: Duration,
    pub default_interval: SampleInterval,
    pub fill_mode_interval: SampleInterval,
    pub datavault_system: Option<String>,
}

impl MonitorSettings {
    pub fn from_config(config: &crate::config::Config) -> Result<Self, crate::config::ConfigError> {
        Ok(Self {
            poll_period: config.poll_period(),
            settle_period: config.settle_period(),
            fill_mode_timeout: config.fill_mode_timeout(),
            default_interval: config.default_interval()?,
            fill_mode_interval: config.fill_mode_interval()?,
            datavault_system: config.datavault_system().map(str::to_string),
        })
    }
}

#[derive(Debug)]
pub enum Command {
    ToggleFillMode {
        reply: oneshot::Sender<Result<FillModeStatus, AppError>>,
    },
    SetInterval {
        interval: SampleInterval,
        reply: oneshot::Sender<Result<SampleInterval, AppError>>,
    },
    MeasureNow {
        reply: oneshot::Sender<Result<(), AppError>>,
    },
}

/// Sends operator commands to a running monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
}

impl MonitorHandle {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    pub async fn toggle_fill_mode(&self) -> Result<FillModeStatus, AppError> {
        self.request(|reply| Command::ToggleFillMode { reply }).await
    }

    pub async fn set_interval(&self, interval: SampleInterval) -> Result<SampleInterval, AppError> {
        self.request(|reply| Command::SetInterval { interval, reply })
            .await
    }

    pub async fn measure_now(&self) -> Result<(), AppError> {
        self.request(|reply| Command::MeasureNow { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, AppError>>) -> Command,
    ) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| AppError::MonitorStopped)?;
        response.await.map_err(|_| AppError::MonitorStopped)?
    }
}

pub struct Monitor {
    meter: Box<dyn LevelMeter>,
    datalog: Box<dyn DataLog>,
    store: Option<Box<dyn StatusStore>>,
    geometry: VesselGeometry,
    settings: MonitorSettings,
    state: Arc<RwLock<AppState>>,
    samples: SampleLog,
    fit: Option<estimation::ConsumptionFit>,
    fill: FillMode,
    interval: SampleInterval,
    started: Instant,
    polling: bool,
}

impl Monitor {
    pub fn new(
        meter: Box<dyn LevelMeter>,
        datalog: Box<dyn DataLog>,
        store: Option<Box<dyn StatusStore>>,
        geometry: VesselGeometry,
        settings: MonitorSettings,
        state: Arc<RwLock<AppState>>,
    ) -> Result<Self, AppError> {
        state
            .write()
            .map_err(|_| AppError::StateLock)?
            .set_interval(settings.default_interval);
        Ok(Self {
            meter,
            datalog,
            store,
            geometry,
            interval: settings.default_interval,
            settings,
            state,
            samples: SampleLog::new(),
            fit: None,
            fill: FillMode::default(),
            started: Instant::now(),
            polling: false,
        })
    }

    /// Spawns the loop and returns the command handle and task.
    pub fn spawn(self, stop: watch::Receiver<bool>) -> (MonitorHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let task = tokio::spawn(self.run(rx, stop));
        (MonitorHandle::new(tx), task)
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut stop: watch::Receiver<bool>) {
        self.started = Instant::now();
        let mut next_poll = self.start().await;

        loop {
            let fill_deadline = self.fill.expires_at();
            tokio::select! {
                _ = sleep_until(next_poll), if self.polling => {
                    self.tick().await;
                    next_poll = Instant::now() + self.settings.poll_period;
                }
                _ = sleep_until(fill_deadline.unwrap_or(next_poll)), if fill_deadline.is_some() => {
                    self.expire_fill_mode().await;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        self.polling = false;
        if let Some(store) = self.store.as_ref()
            && let Err(err) = store.close().await
        {
            warn!(error = %err, "Failed to close status database");
        }
        self.set_status(ConnectionStatus::Disconnected);
        info!("Level monitor stopped");
    }

    /// Connects and primes the first measurement; returns when to poll first.
    async fn start(&mut self) -> Instant {
        if let Err(err) = self.connect().await {
            error!(error = %err, "Failed to connect to level meter");
            self.set_status(ConnectionStatus::Error);
            return Instant::now();
        }
        info!("Starting initial sample");
        if let Err(err) = self.meter.prep_measure().await {
            error!(error = %err, "Initial measurement request failed");
            self.set_status(ConnectionStatus::Error);
            return Instant::now();
        }
        self.polling = true;
        Instant::now() + self.settings.settle_period
    }

    async fn connect(&mut self) -> Result<(), AppError> {
        self.meter.select_device().await?;
        if self.interval.is_manual() {
            self.meter.set_off_mode().await?;
        } else {
            self.meter.set_sample_mode(SampleMode::Sample).await?;
            self.meter
                .set_sample_interval(&self.interval.to_string())
                .await?;
        }
        self.meter.set_units(PERCENT_UNITS).await?;

        let datestamp = format_local(local_now(), DATESTAMP_FORMAT);
        let spec = DatasetSpec::level_log(self.settings.datavault_system.as_deref(), &datestamp);
        let dataset = self.datalog.open_dataset(&spec).await?;
        info!(dataset = %dataset, interval = %self.interval, "Connected to level meter");

        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_dataset(Some(dataset));
        guard.set_status(ConnectionStatus::Connected);
        Ok(())
    }

    /// One polling iteration.
    async fn tick(&mut self) {
        let now = Instant::now();
        match self.sample(now).await {
            Ok(true) => {
                if let Err(err) = self.refresh_level() {
                    warn!(error = %err, "Failed to publish level");
                }
            }
            Ok(false) => {}
            Err(err) => {
                error!(error = %err, "Level polling failed, stopping");
                self.set_status(ConnectionStatus::Error);
                self.polling = false;
            }
        }

        self.refresh_time_to_fill(now);
    }

    /// Leaves fill mode after the timeout, even when polling has stopped.
    async fn expire_fill_mode(&mut self) {
        info!("Fill mode timed out");
        if let Err(err) = self.set_fill_mode(false).await {
            warn!(error = %err, "Failed to leave fill mode, retrying");
            self.fill.postpone(Instant::now() + self.settings.poll_period);
        }
    }

    /// Reads the meter and records the level if it changed.
    async fn sample(&mut self, now: Instant) -> Result<bool, AppError> {
        let raw = self.meter.get_measure().await?;
        let percent = parse_percent_reading(&raw)?;
        let inches = self.geometry.percent_to_inches(percent);
        if !self.samples.is_new_level(inches) {
            debug!(percent, inches, "Level unchanged");
            return Ok(false);
        }

        let sample = Sample {
            elapsed_hours: self.elapsed_hours(now),
            percent,
            inches,
        };
        self.datalog
            .add_row(&[sample.elapsed_hours, sample.percent, sample.inches])
            .await?;
        self.samples.record(sample);
        self.upload(&sample).await;
        info!(
            elapsed_hours = sample.elapsed_hours,
            percent, inches, "Recorded level sample"
        );
        Ok(true)
    }

    /// Writes the status row; failures are logged only.
    async fn upload(&self, sample: &Sample) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let row = StatusRow {
            percent: self.geometry.inches_to_percent(sample.inches),
            inches: sample.inches,
            volume_liters: self.geometry.whole_liters(sample.inches),
            recorded_at: format_local(local_now(), COMPACT_FORMAT),
        };
        if let Err(err) = store.insert(&row).await {
            warn!(error = %err, "Failed to upload status row");
        }
    }

    fn refresh_level(&mut self) -> Result<(), AppError> {
        let samples = self.samples.samples();
        let Some(last) = samples.last() else {
            return Ok(());
        };

        if !self.fill.is_active()
            && let Some(fit) = estimation::consumption_fit(samples)
        {
            debug!(rate = fit.rate(), window = ?fit.window, "Consumption fit updated");
            self.fit = Some(fit);
        }

        let report = LevelReport {
            inches: last.inches,
            percent: self.geometry.inches_to_percent(last.inches),
            volume_liters: self.geometry.whole_liters(last.inches),
            recent_rate: estimation::recent_rate(samples),
            timestamp: SystemTime::now(),
        };

        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_samples(samples.to_vec());
        guard.set_fit(self.fit);
        guard.set_level(report);
        Ok(())
    }

    fn refresh_time_to_fill(&self, now: Instant) {
        let Some(fit) = self.fit.as_ref() else {
            return;
        };
        let remaining = estimation::time_to_fill(fit, self.elapsed_hours(now), &self.geometry);
        match self.state.write() {
            Ok(mut guard) => guard.set_time_to_fill(remaining),
            Err(_) => warn!("State lock poisoned while updating time to fill"),
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::ToggleFillMode { reply } => {
                let result = self.set_fill_mode(!self.fill.is_active()).await;
                let _ = reply.send(result);
            }
            Command::SetInterval { interval, reply } => {
                let result = self.apply_interval(interval).await.map(|()| interval);
                let _ = reply.send(result);
            }
            Command::MeasureNow { reply } => {
                let _ = reply.send(self.measure_now().await);
            }
        }
    }

    /// Switches the meter interval first; fill mode only changes if the meter accepted it.
    async fn set_fill_mode(&mut self, active: bool) -> Result<FillModeStatus, AppError> {
        let interval = if active {
            self.settings.fill_mode_interval
        } else {
            self.settings.default_interval
        };
        self.apply_interval(interval).await?;

        if active {
            self.fill.engage(Instant::now(), self.settings.fill_mode_timeout);
        } else {
            self.fill.release();
        }
        let status = FillModeStatus {
            active,
            since: active.then(SystemTime::now),
        };
        self.state
            .write()
            .map_err(|_| AppError::StateLock)?
            .set_fill_mode(status);
        info!(active, interval = %interval, "Fill mode changed");
        Ok(status)
    }

    async fn apply_interval(&mut self, interval: SampleInterval) -> Result<(), AppError> {
        match interval {
            SampleInterval::Manual => self.meter.set_off_mode().await?,
            SampleInterval::Every { .. } => {
                if self.interval.is_manual() {
                    self.meter.set_sample_mode(SampleMode::Sample).await?;
                }
                self.meter
                    .set_sample_interval(&interval.to_string())
                    .await?;
            }
        }
        self.interval = interval;
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_interval(interval);
        info!(interval = %interval, "Sample interval applied");
        Ok(())
    }

    async fn measure_now(&self) -> Result<(), AppError> {
        match self.meter.get_mode().await? {
            MeterMode::Off => {
                self.meter.set_sample_mode(SampleMode::Sample).await?;
                self.meter.prep_measure().await?;
                sleep(MANUAL_PREP_GAP).await;
                self.meter.prep_measure().await?;
                sleep(MANUAL_SETTLE).await;
                self.meter.set_off_mode().await
            }
            MeterMode::Other(_) => self.meter.prep_measure().await,
        }
    }

    fn elapsed_hours(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started).as_secs_f64() / 3600.0
    }

    fn set_status(&self, status: ConnectionStatus) {
        match self.state.write() {
            Ok(mut guard) => guard.set_status(status),
            Err(_) => warn!("State lock poisoned while updating connection status"),
        }
    }
}
