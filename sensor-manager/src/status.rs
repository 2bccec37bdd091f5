//! Connectivity status of the account and its sensors.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Thing id of the account (bridge) on the status board.
pub const ACCOUNT_THING_ID: &str = "account";

/// Thing id of a sensor on the status board.
pub fn sensor_thing_id(device_id: u64) -> String {
    format!("sensor:{}", device_id)
}

/// Why a thing is offline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusDetail {
    /// Credentials rejected or the configured device does not exist.
    ConfigurationError,
    /// The service could not be reached or answered with an error.
    CommunicationError,
    /// The account the sensor depends on is offline.
    BridgeOffline,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThingStatus {
    Unknown,
    Online,
    Offline {
        detail: StatusDetail,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ThingStatus {
    pub fn offline(detail: StatusDetail, reason: impl Into<String>) -> Self {
        ThingStatus::Offline {
            detail,
            reason: Some(reason.into()),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ThingStatus::Online)
    }

    pub fn has_detail(&self, expected: StatusDetail) -> bool {
        matches!(self, ThingStatus::Offline { detail, .. } if *detail == expected)
    }
}

impl std::fmt::Display for ThingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThingStatus::Unknown => write!(f, "UNKNOWN"),
            ThingStatus::Online => write!(f, "ONLINE"),
            ThingStatus::Offline {
                detail,
                reason: Some(reason),
            } => write!(f, "OFFLINE ({:?}): {}", detail, reason),
            ThingStatus::Offline {
                detail,
                reason: None,
            } => write!(f, "OFFLINE ({:?})", detail),
        }
    }
}

/// Receives connectivity changes from the handlers.
pub trait StatusReporter: Send + Sync {
    fn report(&self, thing_id: &str, status: ThingStatus);
}

/// Last reported status of a thing.
#[derive(Clone, Debug, Serialize)]
pub struct StatusEntry {
    #[serde(flatten)]
    pub status: ThingStatus,
    /// When the thing entered this status.
    pub since: DateTime<Utc>,
}

/// In-memory [`StatusReporter`] keyed by thing id.
#[derive(Clone, Default)]
pub struct StatusBoard {
    entries: Arc<DashMap<String, StatusEntry>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, thing_id: &str) -> Option<StatusEntry> {
        self.entries.get(thing_id).map(|entry| entry.value().clone())
    }

    pub fn status(&self, thing_id: &str) -> Option<ThingStatus> {
        self.get(thing_id).map(|entry| entry.status)
    }

    /// All entries, sorted by thing id.
    pub fn snapshot(&self) -> Vec<(String, StatusEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn remove(&self, thing_id: &str) {
        self.entries.remove(thing_id);
    }
}

impl StatusReporter for StatusBoard {
    fn report(&self, thing_id: &str, status: ThingStatus) {
        let mut entry = self
            .entries
            .entry(thing_id.to_string())
            .or_insert_with(|| StatusEntry {
                status: ThingStatus::Unknown,
                since: Utc::now(),
            });
        if entry.status != status {
            info!(thing = %thing_id, status = %status, "Status changed");
            entry.status = status;
            entry.since = Utc::now();
        }
    }
}
