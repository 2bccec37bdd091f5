//! Sensor manager - Wires the account, its sensors and discovery together.

use crate::account::AccountHandler;
use crate::discovery::DiscoveryService;
use crate::sensor::SensorHandler;
use crate::source::DeviceSource;
use crate::status::{StatusBoard, StatusReporter};
use flumewater::{Authenticator, FlumeApi, FlumeConfig, Transport};
use std::sync::Arc;
use tracing::info;

/// Sensor manager - Owns every handler for one account.
///
/// # Responsibilities
/// - Build the transport, authenticator and API client from configuration
/// - Start the account check and the polling jobs of each configured sensor
/// - Run background discovery when enabled
/// - Graceful shutdown
pub struct SensorManager {
    config: FlumeConfig,
    board: StatusBoard,
    api: FlumeApi,
    account: Arc<AccountHandler>,
    sensors: Vec<Arc<SensorHandler>>,
    discovery: Option<Arc<DiscoveryService>>,
}

impl SensorManager {
    /// Builds all handlers without starting anything.
    pub fn new(config: FlumeConfig) -> Self {
        let board = StatusBoard::new();
        let reporter: Arc<dyn StatusReporter> = Arc::new(board.clone());

        let transport = Arc::new(Transport::from_config(&config.account));
        let authenticator = Authenticator::new(config.account.clone(), transport);
        let api = FlumeApi::new(authenticator.clone());
        let source: Arc<dyn DeviceSource> = Arc::new(api.clone());

        let account = AccountHandler::new(authenticator, Arc::clone(&reporter));
        let sensors = config
            .sensors
            .iter()
            .map(|sensor| {
                SensorHandler::new(
                    sensor.clone(),
                    Arc::clone(&source),
                    Arc::clone(&account),
                    Arc::clone(&reporter),
                )
            })
            .collect();
        let discovery = config
            .discovery
            .enabled
            .then(|| DiscoveryService::new(source, config.discovery.rescan_interval_hours));

        Self {
            config,
            board,
            api,
            account,
            sensors,
            discovery,
        }
    }

    pub fn config(&self) -> &FlumeConfig {
        &self.config
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn api(&self) -> &FlumeApi {
        &self.api
    }

    pub fn account(&self) -> &Arc<AccountHandler> {
        &self.account
    }

    pub fn sensors(&self) -> &[Arc<SensorHandler>] {
        &self.sensors
    }

    pub fn sensor(&self, device_id: u64) -> Option<&Arc<SensorHandler>> {
        self.sensors.iter().find(|s| s.device_id() == device_id)
    }

    pub fn discovery(&self) -> Option<&Arc<DiscoveryService>> {
        self.discovery.as_ref()
    }

    /// Starts the account check, every sensor and discovery.
    ///
    /// # Returns
    /// Number of sensors started
    pub fn start(&self) -> usize {
        info!(
            sensor_count = self.sensors.len(),
            discovery = self.discovery.is_some(),
            "Starting sensor manager"
        );

        self.account.initialize();
        for sensor in &self.sensors {
            sensor.initialize();
        }
        if let Some(discovery) = &self.discovery {
            discovery.start_background();
        }
        self.sensors.len()
    }

    /// Stops every job and the shared HTTP client.
    pub fn shutdown(&self) {
        info!("Shutting down sensor manager");
        for sensor in &self.sensors {
            sensor.dispose();
        }
        if let Some(discovery) = &self.discovery {
            discovery.stop_background();
        }
        self.account.dispose();
        info!("All sensor jobs stopped");
    }
}

impl Drop for SensorManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
