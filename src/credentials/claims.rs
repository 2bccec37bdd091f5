//! Access token claims extraction.
//!
//! Access tokens are three dot-separated base64 segments; the middle one is
//! a JSON claims object. Signatures are not verified here, the server does
//! that on every request.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine as _;
use serde::Deserialize;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded middle segment of an access token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenClaims {
    /// Numeric account identifier used in every data path.
    pub user_id: u64,
    /// Token type, normally "USER".
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    /// Issued-at, epoch seconds.
    #[serde(default)]
    pub iat: i64,
    /// Expires-at, epoch seconds.
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<String>,
}

impl TokenClaims {
    /// Parses the claims carried by `access_token`.
    pub fn from_access_token(access_token: &str) -> Result<Self, ClaimsError> {
        let segments: Vec<&str> = access_token.split('.').collect();
        if segments.len() != 3 {
            return Err(ClaimsError::SegmentCount(segments.len()));
        }

        let payload = URL_SAFE_LENIENT
            .decode(segments[1])
            .or_else(|_| STANDARD_LENIENT.decode(segments[1]))
            .map_err(ClaimsError::Base64)?;

        serde_json::from_slice(&payload).map_err(|e| ClaimsError::Json(e.to_string()))
    }
}

/// Why an access token's claims could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimsError {
    /// Token did not split into exactly three segments.
    SegmentCount(usize),
    /// Middle segment is not valid base64.
    Base64(base64::DecodeError),
    /// Middle segment is not a valid claims object.
    Json(String),
    /// `expires_in` puts the expiry outside the representable range.
    Lifetime(i64),
}

impl std::fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimsError::SegmentCount(n) => {
                write!(f, "Access token has {} segments, expected 3", n)
            }
            ClaimsError::Base64(e) => write!(f, "Access token payload is not base64: {}", e),
            ClaimsError::Json(e) => write!(f, "Access token payload is not valid JSON: {}", e),
            ClaimsError::Lifetime(secs) => {
                write!(f, "Access token lifetime of {} seconds is out of range", secs)
            }
        }
    }
}

impl std::error::Error for ClaimsError {}
