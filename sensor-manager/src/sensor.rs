//! Per-sensor polling handler.
//!
//! Each sensor runs two periodic jobs, both starting immediately:
//! - water use: gallons over the last N minutes, plus whether water is running
//! - device status: battery level
//!
//! A third task follows the account's status so the sensor reports
//! bridge-offline while the account cannot authorize.

use crate::account::AccountHandler;
use crate::source::DeviceSource;
use crate::status::{sensor_thing_id, StatusDetail, StatusReporter, ThingStatus};
use chrono::{DateTime, Utc};
use flumewater::config::SensorConfig;
use flumewater::model::battery_percent;
use flumewater::ApiError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, trace, warn};

/// Latest values read for a sensor.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SensorReadings {
    /// Gallons used over the last water-use interval
    pub water_use: Option<f64>,
    pub water_on: Option<bool>,
    /// Battery percentage (25, 50 or 75)
    pub battery_level: Option<u8>,
    pub last_water_use: Option<DateTime<Utc>>,
    pub last_device_status: Option<DateTime<Utc>>,
    /// Total number of successful polls
    pub poll_count: u64,
    /// Total number of failed polls
    pub error_count: u64,
    pub last_error: Option<String>,
}

/// Handler for one Flume water sensor.
pub struct SensorHandler {
    config: SensorConfig,
    thing_id: String,
    source: Arc<dyn DeviceSource>,
    account: Arc<AccountHandler>,
    reporter: Arc<dyn StatusReporter>,
    status: Mutex<ThingStatus>,
    readings: Arc<tokio::sync::Mutex<SensorReadings>>,
    jobs: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl SensorHandler {
    pub fn new(
        config: SensorConfig,
        source: Arc<dyn DeviceSource>,
        account: Arc<AccountHandler>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            thing_id: sensor_thing_id(config.device_id),
            config,
            source,
            account,
            reporter,
            status: Mutex::new(ThingStatus::Unknown),
            readings: Arc::new(tokio::sync::Mutex::new(SensorReadings::default())),
            jobs: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn device_id(&self) -> u64 {
        self.config.device_id
    }

    pub fn thing_id(&self) -> &str {
        &self.thing_id
    }

    pub fn status(&self) -> ThingStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn readings(&self) -> SensorReadings {
        self.readings.lock().await.clone()
    }

    /// Reports Unknown and starts the jobs; the first completed poll decides
    /// the real status.
    pub fn initialize(self: &Arc<Self>) {
        let device_id = self.config.device_id;
        debug!(device_id, "Initializing Flume sensor");
        self.update(ThingStatus::Unknown);
        self.disposed.store(false, Ordering::SeqCst);

        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if !jobs.is_empty() {
            debug!(device_id, "Jobs already running");
            return;
        }

        info!(
            device_id,
            minutes = self.config.device_status_interval_minutes,
            "Starting device status job"
        );
        let handler = Arc::clone(self);
        let period = minutes(self.config.device_status_interval_minutes);
        jobs.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                handler.poll_device_status().await;
            }
        }));

        info!(
            device_id,
            minutes = self.config.water_use_interval_minutes,
            "Starting water use job"
        );
        let handler = Arc::clone(self);
        let period = minutes(self.config.water_use_interval_minutes);
        jobs.push(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                handler.poll_water_use().await;
            }
        }));

        let handler = Arc::clone(self);
        let mut account_status = self.account.subscribe();
        jobs.push(tokio::spawn(async move {
            loop {
                let status = account_status.borrow_and_update().clone();
                handler.account_status_changed(&status);
                if account_status.changed().await.is_err() {
                    break;
                }
            }
        }));
    }

    /// One water-use cycle. Failures are mapped to a status, never returned.
    pub async fn poll_water_use(&self) {
        if self.should_skip() {
            trace!(device_id = self.config.device_id, "Will not update water use");
            return;
        }
        trace!(device_id = self.config.device_id, "Polling for water use");

        match self
            .source
            .water_use(self.config.device_id, self.config.water_use_interval_minutes)
            .await
        {
            Ok(usage) => {
                self.account.set_online();
                self.update(ThingStatus::Online);

                let mut readings = self.readings.lock().await;
                readings.water_use = Some(usage);
                readings.water_on = Some(usage > 0.0);
                readings.last_water_use = Some(Utc::now());
                readings.last_error = None;
                readings.poll_count += 1;
            }
            Err(e) => self.handle_failure(e).await,
        }
    }

    /// One device-status cycle. Failures are mapped to a status, never returned.
    pub async fn poll_device_status(&self) {
        if self.should_skip() {
            trace!(device_id = self.config.device_id, "Will not update battery level");
            return;
        }
        trace!(device_id = self.config.device_id, "Polling for device status");

        match self.source.device(self.config.device_id).await {
            Ok(device) => {
                self.account.set_online();
                self.update(ThingStatus::Online);

                let mut readings = self.readings.lock().await;
                readings.last_device_status = Some(Utc::now());
                readings.last_error = None;
                readings.poll_count += 1;
                match device.battery_level.as_deref() {
                    Some(level) => match battery_percent(level) {
                        Some(percent) => readings.battery_level = Some(percent),
                        None => debug!(level = %level, "Unrecognized battery level"),
                    },
                    None => info!(
                        device_id = self.config.device_id,
                        "No battery information in the device response"
                    ),
                }
            }
            Err(e) => self.handle_failure(e).await,
        }
    }

    /// Stops all jobs. Calling it again is harmless.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(device_id = self.config.device_id, "Disposing Flume sensor handler");
        }
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for job in jobs.drain(..) {
            job.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn should_skip(&self) -> bool {
        self.is_disposed() || self.status().has_detail(StatusDetail::ConfigurationError)
    }

    fn account_status_changed(&self, account: &ThingStatus) {
        if self.is_disposed() {
            return;
        }
        let current = self.status();
        match account {
            ThingStatus::Offline { .. } => {
                if !current.has_detail(StatusDetail::ConfigurationError) {
                    self.update(ThingStatus::offline(
                        StatusDetail::BridgeOffline,
                        "Flume account is offline",
                    ));
                }
            }
            ThingStatus::Online => {
                if current.has_detail(StatusDetail::BridgeOffline) {
                    self.update(ThingStatus::Online);
                }
            }
            ThingStatus::Unknown => {}
        }
    }

    async fn handle_failure(&self, error: ApiError) {
        let device_id = self.config.device_id;
        {
            let mut readings = self.readings.lock().await;
            readings.error_count += 1;
            readings.last_error = Some(error.to_string());
        }

        match error {
            ApiError::Cancelled => {
                warn!(device_id, "Flume API request was cancelled unexpectedly");
            }
            ApiError::Authorization(message) => {
                warn!(device_id, "Flume API request resulted in an authorization error");
                self.account.apply_authorization_error(&message);
            }
            ApiError::NotFound(message) => {
                self.update(ThingStatus::offline(StatusDetail::ConfigurationError, message));
            }
            other => {
                self.update(ThingStatus::offline(
                    StatusDetail::CommunicationError,
                    other.message(),
                ));
            }
        }
    }

    fn update(&self, status: ThingStatus) {
        let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        *current = status.clone();
        self.reporter.report(&self.thing_id, status);
    }
}

fn minutes(count: u32) -> Duration {
    Duration::from_secs(u64::from(count.max(1)) * 60)
}
