//! Water usage query body and result.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request id echoed back by the server as the key of the result set.
pub const QUERY_REQUEST_ID: &str = "flumewaterRequest";

/// Datetime layout used by the query endpoint, both ways.
pub const QUERY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Body of `POST users/{uid}/devices/{id}/query`.
#[derive(Clone, Debug, Serialize)]
pub struct UsageQuery {
    pub queries: Vec<QuerySpec>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuerySpec {
    pub request_id: String,
    pub since_datetime: String,
    pub until_datetime: String,
    pub bucket: String,
    pub group_multiplier: u32,
    pub operation: String,
    pub sort_direction: String,
}

impl UsageQuery {
    /// Sum of usage over the last `minutes` minutes, as one bucket.
    ///
    /// The start is truncated to the minute so a server whose clock runs
    /// slightly behind does not reject it as being in the future.
    pub fn last_minutes(now: NaiveDateTime, minutes: u32) -> Self {
        let since = now - Duration::minutes(i64::from(minutes));
        Self {
            queries: vec![QuerySpec {
                request_id: QUERY_REQUEST_ID.to_string(),
                since_datetime: since.format("%Y-%m-%d %H:%M:00").to_string(),
                until_datetime: now.format(QUERY_DATETIME_FORMAT).to_string(),
                bucket: "MIN".to_string(),
                group_multiplier: minutes,
                operation: "SUM".to_string(),
                sort_direction: "ASC".to_string(),
            }],
        }
    }
}

/// One bucket of a query result.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ValuePair {
    #[serde(default)]
    pub datetime: Option<String>,
    /// Gallons used in the bucket.
    #[serde(default)]
    pub value: f64,
}

impl ValuePair {
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let raw = self.datetime.as_deref()?;
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()
    }
}

/// Query results keyed by request id.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct QueryResult {
    results: HashMap<String, Option<Vec<Option<ValuePair>>>>,
}

impl QueryResult {
    /// Value pairs answered for `request_id`, if the key is present and non-null.
    pub fn value_pairs(&self, request_id: &str) -> Option<&[Option<ValuePair>]> {
        self.results
            .get(request_id)
            .and_then(|pairs| pairs.as_deref())
    }
}
