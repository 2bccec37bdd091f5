//! Shared outbound HTTP client for one account.

use crate::config::AccountConfig;
use crate::error::ApiError;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Lazily-started HTTP client bound to the API base URL.
///
/// `start` and `stop` are idempotent and may be called from any lifecycle
/// callback; a stopped transport starts again on the next request.
pub struct Transport {
    base_url: String,
    timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl Transport {
    /// Creates a stopped transport for `api_endpoint`.
    pub fn new(api_endpoint: &str, timeout: Duration) -> Self {
        let mut base_url = api_endpoint.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            timeout,
            client: Mutex::new(None),
        }
    }

    pub fn from_config(account: &AccountConfig) -> Self {
        Self::new(
            &account.api_endpoint,
            Duration::from_secs(account.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the running client, starting it first if needed.
    pub fn start(&self) -> Result<Client, ApiError> {
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("flumewater/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                error!(error = %e, "Could not start HTTP client for communication with the Flume server");
                ApiError::from_reqwest("Could not start HTTP client", e)
            })?;
        info!(base_url = %self.base_url, "HTTP client started");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Drops the client. No-op when already stopped.
    pub fn stop(&self) {
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            info!(base_url = %self.base_url, "HTTP client stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Resolves `path` against the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Builds a request that carries no credentials.
    ///
    /// Used for the token endpoint itself, and as the base of every
    /// authorized request.
    pub fn build_unauthenticated(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<RequestBuilder, ApiError> {
        let client = self.start()?;
        let url = self.url(path);
        debug!(url = %url, method = %method, has_body = body.is_some(), "Creating request");

        let request = client
            .request(method, &url)
            .timeout(self.timeout)
            .header("content-type", "application/json");
        Ok(match body {
            Some(body) => {
                trace!(url = %url, "Request has a JSON body");
                request.json(&body)
            }
            None => request,
        })
    }
}
