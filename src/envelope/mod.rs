//! Response envelope parsing and classification.
//!
//! Every API response is wrapped in the same envelope:
//!
//! ```text
//! {
//!   "success": true,
//!   "code": 200,
//!   "message": "Request OK",
//!   "http_message": "OK",
//!   "detailed": null | [...] | {...} | "text",
//!   "data": [...] | {...} | "[...]" | null,
//!   "count": 1,
//!   "pagination": null | {"next": ..., "prev": ...}
//! }
//! ```
//!
//! Decoding happens in two passes. The first pass reads the envelope-level
//! fields and keeps `detailed` and `data` as [`RawDocument`]s without
//! committing to a shape; it also decides the outcome. The second pass,
//! [`Envelope::decode_data`], runs at the call site that knows which element
//! type it expects.

use crate::error::ApiError;
use crate::model::Pagination;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, trace, warn};

/// Status code assumed when the envelope carries none.
pub const MISSING_CODE: i64 = 503;

/// A sub-document kept in raw form until its shape is known.
#[derive(Clone, Debug, PartialEq)]
pub enum RawDocument {
    /// A JSON object, serialized.
    Object(String),
    /// A JSON array, serialized.
    Array(String),
    /// A string's contents, or the text of a number or boolean.
    ///
    /// The service sometimes sends JSON encoded inside a string, so the
    /// contents are kept unquoted and re-parsed on decode.
    Scalar(String),
}

impl RawDocument {
    /// Captures a JSON value; `null` captures nothing.
    pub fn capture(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(_) => Some(RawDocument::Object(value.to_string())),
            Value::Array(_) => Some(RawDocument::Array(value.to_string())),
            Value::String(s) => Some(RawDocument::Scalar(s.clone())),
            Value::Bool(_) | Value::Number(_) => Some(RawDocument::Scalar(value.to_string())),
        }
    }

    /// Raw text of the document.
    pub fn as_str(&self) -> &str {
        match self {
            RawDocument::Object(s) | RawDocument::Array(s) | RawDocument::Scalar(s) => s,
        }
    }

    /// Second-pass decode into a non-empty list of `T`.
    ///
    /// - not an array, or zero elements → [`ApiError::NotFound`]
    /// - a `null` element or one that does not decode as `T` →
    ///   [`ApiError::MalformedResponse`]
    pub fn decode_array<T: DeserializeOwned>(&self) -> Result<Vec<T>, ApiError> {
        let value: Value = serde_json::from_str(self.as_str()).map_err(|e| {
            ApiError::NotFound(format!("Result data is not valid JSON: {}", e))
        })?;

        let items = match value {
            Value::Array(items) => items,
            Value::Object(_) => {
                warn!("Unexpected JSON object in the data portion of the envelope, expected an array");
                return Err(ApiError::NotFound(
                    "Result data is an object, expected an array".to_string(),
                ));
            }
            _ => {
                return Err(ApiError::NotFound(
                    "Result data is not an array".to_string(),
                ))
            }
        };

        if items.is_empty() {
            return Err(ApiError::NotFound("No results in the array".to_string()));
        }
        trace!(count = items.len(), "Decoding result array");

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                if item.is_null() {
                    trace!(index = i, "Result is null");
                    return Err(ApiError::MalformedResponse(format!(
                        "Malformed array, result {} is null",
                        i
                    )));
                }
                serde_json::from_value(item).map_err(|e| {
                    ApiError::MalformedResponse(format!("Result {} could not be decoded: {}", i, e))
                })
            })
            .collect()
    }
}

/// First-pass view of a response envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub success: bool,
    pub code: i64,
    pub message: Option<String>,
    pub http_message: Option<String>,
    pub detailed: Option<RawDocument>,
    pub data: Option<RawDocument>,
    pub count: u64,
    pub pagination: Option<Pagination>,
}

impl Envelope {
    /// Reads the envelope-level fields of a response body.
    ///
    /// Only fails when the body is not a JSON object; every field has a
    /// default (`success` false, `code` 503).
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ApiError::transport(format!("Response is not valid JSON: {}", e)))?;
        let Value::Object(fields) = value else {
            return Err(ApiError::transport("Response is not a JSON object"));
        };

        let envelope = Self {
            success: read_bool(&fields, "success"),
            code: read_code(&fields),
            message: read_text(&fields, "message"),
            http_message: read_text(&fields, "http_message"),
            detailed: fields.get("detailed").and_then(RawDocument::capture),
            data: fields.get("data").and_then(RawDocument::capture),
            count: fields.get("count").and_then(Value::as_u64).unwrap_or(0),
            pagination: fields
                .get("pagination")
                .filter(|p| p.is_object())
                .and_then(|p| serde_json::from_value(p.clone()).ok()),
        };
        trace!(
            success = envelope.success,
            code = envelope.code,
            count = envelope.count,
            "Parsed response envelope"
        );
        Ok(envelope)
    }

    /// Classifies the envelope-level outcome.
    ///
    /// Fixed priority: 401/403/503, then 400, then 404, then `success`.
    pub fn check(&self) -> Result<(), ApiError> {
        let message = self.failure_message();
        match self.code {
            401 | 403 | 503 => {
                error!(code = self.code, detailed = ?self.detailed_text(), "Authorization problem! {}", message);
                Err(ApiError::Authorization(message))
            }
            400 => {
                warn!(detailed = ?self.detailed_text(), "Issue with request. {}", message);
                Err(ApiError::MalformedRequest(message))
            }
            404 => {
                error!(detailed = ?self.detailed_text(), "Resource not found! {}", message);
                Err(ApiError::NotFound(message))
            }
            _ if !self.success => {
                warn!(code = self.code, detailed = ?self.detailed_text(), "Request failed. {}", message);
                Err(ApiError::Io(message))
            }
            _ => Ok(()),
        }
    }

    /// Second-pass decode of `data` into the caller's element type.
    ///
    /// An absent `data` field and an empty array both mean "no usable data".
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<Vec<T>, ApiError> {
        match &self.data {
            Some(raw) => raw.decode_array(),
            None => Err(ApiError::NotFound(
                "No result data returned in the response".to_string(),
            )),
        }
    }

    fn detailed_text(&self) -> Option<&str> {
        self.detailed.as_ref().map(RawDocument::as_str)
    }

    fn failure_message(&self) -> String {
        match (&self.http_message, &self.message) {
            (Some(http), Some(message)) => format!("{}: {}", http, message),
            (Some(http), None) => http.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => format!("response code {}", self.code),
        }
    }
}

/// Parses and classifies a response body in one step.
///
/// On success the returned envelope's `data` is still raw.
pub fn classify(body: &[u8]) -> Result<Envelope, ApiError> {
    let envelope = Envelope::parse(body)?;
    envelope.check()?;
    debug!(code = envelope.code, "Response envelope classified as success");
    Ok(envelope)
}

fn read_bool(fields: &Map<String, Value>, key: &str) -> bool {
    match fields.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn read_code(fields: &Map<String, Value>) -> i64 {
    match fields.get("code") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(MISSING_CODE),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(MISSING_CODE),
        _ => MISSING_CODE,
    }
}

fn read_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}
