use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Base URL for every API call, token requests included.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.flumetech.com/";

/// Complete configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FlumeConfig {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Cloud account credentials and connection settings
#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_request_timeout() -> u64 {
    3
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            api_endpoint: default_api_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_endpoint", &self.api_endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// One water sensor to poll
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub device_id: u64,
    /// How often to query water use (minutes); also the query window
    #[serde(default = "default_interval_minutes")]
    pub water_use_interval_minutes: u32,
    /// How often to refresh device status, i.e. battery level (minutes)
    #[serde(default = "default_interval_minutes")]
    pub device_status_interval_minutes: u32,
}

fn default_interval_minutes() -> u32 {
    1
}

/// Device discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_enabled")]
    pub enabled: bool,
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_hours: u64,
}

fn default_discovery_enabled() -> bool {
    true
}

fn default_rescan_interval() -> u64 {
    48
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_discovery_enabled(),
            rescan_interval_hours: default_rescan_interval(),
        }
    }
}

/// Status API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    3002
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl FlumeConfig {
    /// Parses a TOML document without env overrides or validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration")
    }

    /// Applies `FLUME_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FLUME_USERNAME") {
            self.account.username = v;
        }
        if let Some(v) = lookup("FLUME_PASSWORD") {
            self.account.password = v;
        }
        if let Some(v) = lookup("FLUME_CLIENT_ID") {
            self.account.client_id = v;
        }
        if let Some(v) = lookup("FLUME_CLIENT_SECRET") {
            self.account.client_secret = v;
        }
        if let Some(v) = lookup("FLUME_API_ENDPOINT") {
            self.account.api_endpoint = v;
        }
        if let Some(v) = lookup("FLUME_STATUS_API_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.api.port = port;
            }
        }
    }

    /// Rejects configurations that cannot authenticate or poll.
    pub fn validate(&self) -> Result<()> {
        let account = &self.account;
        for (name, value) in [
            ("username", &account.username),
            ("password", &account.password),
            ("client_id", &account.client_id),
            ("client_secret", &account.client_secret),
        ] {
            if value.trim().is_empty() {
                bail!("account.{} is required", name);
            }
        }
        if account.request_timeout_secs == 0 {
            bail!("account.request_timeout_secs must be greater than zero");
        }
        for sensor in &self.sensors {
            if sensor.device_id == 0 {
                bail!("sensors.device_id must be a non-zero device id");
            }
            if sensor.water_use_interval_minutes == 0 || sensor.device_status_interval_minutes == 0
            {
                bail!(
                    "polling intervals for sensor {} must be at least one minute",
                    sensor.device_id
                );
            }
        }
        if self.discovery.rescan_interval_hours == 0 {
            bail!("discovery.rescan_interval_hours must be greater than zero");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file, apply env overrides, validate
pub fn load_config(path: &str) -> Result<FlumeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path))?;
    let mut config = FlumeConfig::from_toml_str(&contents)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
