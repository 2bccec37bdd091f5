//! Value objects decoded from the `data` payload of API envelopes.

mod device;
mod query;

pub use device::{battery_percent, Device, DeviceType};
pub use query::{QueryResult, UsageQuery, ValuePair, QUERY_DATETIME_FORMAT, QUERY_REQUEST_ID};

use serde::{Deserialize, Serialize};

/// One element of the token endpoint's `data` array.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenData {
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Seconds until the access token expires.
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Links to neighbouring result pages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub prev: Option<String>,
}
