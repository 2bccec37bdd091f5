//! Client core for the Flume cloud water-monitor API.
//!
//! Owns the OAuth credential lifecycle of one account and turns API
//! exchanges into typed results with categorized failures.

// Authenticator with single-flight token refresh
pub mod auth;

// Transport, authorized requests, response pipeline and typed calls
pub mod api;

// Configuration file and environment overrides
pub mod config;

// Token store and parsed claims
pub mod credentials;

// Response envelope classification
pub mod envelope;

pub mod error;

// Values decoded from response payloads
pub mod model;

#[cfg(test)]
mod test_support;

pub use api::{AuthorizedRequests, FlumeApi, PendingExchange, Transport};
pub use auth::Authenticator;
pub use config::{load_config, FlumeConfig};
pub use credentials::{AuthState, Credentials, TokenStore};
pub use error::{ApiError, ApiResult};
