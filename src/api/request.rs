//! Builds requests that carry the account's current bearer token.

use super::Transport;
use crate::auth::Authenticator;
use crate::error::ApiError;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Request factory bound to one account.
#[derive(Clone)]
pub struct AuthorizedRequests {
    authenticator: Authenticator,
    transport: Arc<Transport>,
}

impl AuthorizedRequests {
    pub fn new(authenticator: Authenticator) -> Self {
        let transport = Arc::clone(authenticator.transport());
        Self {
            authenticator,
            transport,
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Builds `users/{user_id}{path}` with the bearer header set, or `None`
    /// when authorization is refused.
    ///
    /// `None` means "do not send": the caller should report an authorization
    /// problem, not a transport one.
    pub async fn build_authorized(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Option<RequestBuilder> {
        if !self.authenticator.ensure_authorized().await {
            return None;
        }
        self.signed(path, method, body).ok()
    }

    /// Like [`AuthorizedRequests::build_authorized`], keeping the reason a
    /// request could not be built.
    pub async fn try_build_authorized(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<RequestBuilder, ApiError> {
        self.authenticator.authorize().await?;
        self.signed(path, method, body)
    }

    /// Request without credentials, for the token endpoint itself.
    pub fn build_unauthenticated(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<RequestBuilder, ApiError> {
        self.transport.build_unauthenticated(path, method, body)
    }

    fn signed(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<RequestBuilder, ApiError> {
        // One snapshot for both the path and the header
        let credentials = self.authenticator.credentials();
        if credentials.is_empty() {
            return Err(ApiError::Authorization(
                "no access token available".to_string(),
            ));
        }
        let full_path = format!("users/{}{}", credentials.user_id(), path);
        debug!(path = %full_path, "Building authorized request");
        Ok(self
            .transport
            .build_unauthenticated(&full_path, method, body)?
            .bearer_auth(credentials.access_token()))
    }
}
