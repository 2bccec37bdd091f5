//! Sensor discovery for the account.
//!
//! Lists every device registered to the account and keeps the sensors.
//! Bridges are never reported.

use crate::source::DeviceSource;
use crate::status::ACCOUNT_THING_ID;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flumewater::model::DeviceType;
use flumewater::ApiResult;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, trace, warn};

pub const SENSOR_LABEL: &str = "Flume Water Sensor";

/// A sensor found on the account.
#[derive(Clone, Debug, Serialize)]
pub struct DiscoveredSensor {
    pub device_id: u64,
    pub label: String,
    /// Thing id of the account the sensor belongs to
    pub bridge: String,
    pub location_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

pub struct DiscoveryService {
    source: Arc<dyn DeviceSource>,
    rescan_interval: Duration,
    results: DashMap<u64, DiscoveredSensor>,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryService {
    pub fn new(source: Arc<dyn DeviceSource>, rescan_interval_hours: u64) -> Arc<Self> {
        Arc::new(Self {
            source,
            rescan_interval: Duration::from_secs(rescan_interval_hours.max(1) * 3600),
            results: DashMap::new(),
            job: Mutex::new(None),
        })
    }

    /// Runs one scan. Returns how many sensors it found.
    pub async fn scan(&self) -> ApiResult<usize> {
        debug!("Start scan for Flume devices");
        let devices = self.source.devices().await?;
        if devices.is_empty() {
            debug!("No discovery results returned");
            return Ok(0);
        }

        let mut found = 0;
        for device in devices {
            if device.id == 0 || device.device_type != DeviceType::Sensor {
                continue;
            }
            trace!(device_id = device.id, "Found a Flume sensor");
            found += 1;
            self.results
                .entry(device.id)
                .and_modify(|known| {
                    known.location_id = device.location_id;
                    known.product = device.product.clone();
                })
                .or_insert_with(|| DiscoveredSensor {
                    device_id: device.id,
                    label: SENSOR_LABEL.to_string(),
                    bridge: ACCOUNT_THING_ID.to_string(),
                    location_id: device.location_id,
                    product: device.product.clone(),
                    discovered_at: Utc::now(),
                });
        }
        Ok(found)
    }

    /// Everything discovered so far, sorted by device id.
    pub fn results(&self) -> Vec<DiscoveredSensor> {
        let mut results: Vec<_> = self.results.iter().map(|r| r.value().clone()).collect();
        results.sort_by_key(|r| r.device_id);
        results
    }

    /// Scans now and then every rescan interval.
    pub fn start_background(self: &Arc<Self>) {
        let mut job = self.job.lock().unwrap_or_else(PoisonError::into_inner);
        if job.is_some() {
            return;
        }

        let service = Arc::clone(self);
        *job = Some(tokio::spawn(async move {
            let mut ticker = interval(service.rescan_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = service.scan().await {
                    warn!(error = %e, "Device discovery failed");
                }
            }
        }));
    }

    pub fn stop_background(&self) {
        if let Some(job) = self
            .job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            job.abort();
        }
    }
}
