//! OAuth token lifecycle for one Flume account.
//!
//! `authorize` is the single entry point every API call goes through. It
//! checks the current credentials and, when they are missing or expired,
//! runs one token request that all concurrent callers share:
//!
//! ```text
//! Unauthenticated ──password grant──► Valid ──(time)──► Expired
//!        ▲                              ▲                  │
//!        └──────── failure (cleared) ───┴── refresh grant ─┘
//! ```

use crate::api::{PendingExchange, Transport};
use crate::config::AccountConfig;
use crate::credentials::{AuthState, Credentials, TokenStore};
use crate::error::ApiError;
use crate::model::TokenData;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// Token endpoint, relative to the API base URL.
pub const TOKEN_PATH: &str = "oauth/token";

type SharedRefresh = Shared<BoxFuture<'static, Result<(), ApiError>>>;

/// The token request currently in flight, if any.
struct RefreshSlot {
    next_id: u64,
    current: Option<(u64, SharedRefresh)>,
}

/// One caller's share of an in-flight token request.
///
/// On drop the slot entry is removed once the request has finished or no
/// other caller still waits on it. Cancelled and panicked callers go
/// through the same path.
struct Waiter<'a> {
    slot: &'a Mutex<RefreshSlot>,
    id: u64,
    refresh: SharedRefresh,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((id, running)) = slot.current.as_ref() else {
            return;
        };
        if *id != self.id {
            return;
        }
        // Only the slot and this waiter still hold handles
        let abandoned = running.strong_count().map_or(true, |count| count <= 2);
        if running.peek().is_some() || abandoned {
            slot.current = None;
        }
    }
}

struct Inner {
    store: TokenStore,
    transport: Arc<Transport>,
    account: AccountConfig,
    slot: Mutex<RefreshSlot>,
    token_requests: AtomicU64,
}

/// Keeps the account's bearer credentials valid.
///
/// Cloning shares the same store and the same in-flight request.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<Inner>,
}

impl Authenticator {
    pub fn new(account: AccountConfig, transport: Arc<Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: TokenStore::new(),
                transport,
                account,
                slot: Mutex::new(RefreshSlot {
                    next_id: 0,
                    current: None,
                }),
                token_requests: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.inner.transport
    }

    /// Snapshot of the current credential set.
    pub fn credentials(&self) -> Arc<Credentials> {
        self.inner.store.get()
    }

    /// Last successfully parsed access token, or empty.
    ///
    /// Call [`Authenticator::ensure_authorized`] first to get an up-to-date value.
    pub fn access_token(&self) -> String {
        self.inner.store.get().access_token().to_string()
    }

    /// Account id from the last parsed claims, or 0.
    pub fn user_id(&self) -> u64 {
        self.inner.store.get().user_id()
    }

    /// Number of token endpoint exchanges started so far.
    pub fn token_requests(&self) -> u64 {
        self.inner.token_requests.load(Ordering::SeqCst)
    }

    /// `true` when valid credentials are held afterwards; `false` means
    /// "do not proceed". The failure itself is logged.
    pub async fn ensure_authorized(&self) -> bool {
        match self.authorize().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Authorization refused");
                false
            }
        }
    }

    /// Makes sure valid credentials are held, requesting or refreshing
    /// tokens if needed.
    ///
    /// At most one token request runs at a time; callers arriving while one
    /// is in flight wait for it and get its outcome.
    pub async fn authorize(&self) -> Result<(), ApiError> {
        if self.inner.store.get().state_at(Utc::now()) == AuthState::Valid {
            return Ok(());
        }

        let mut waiter = {
            let mut slot = self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner);

            // Re-check: a request may have completed while we waited
            let credentials = self.inner.store.get();
            let state = credentials.state_at(Utc::now());
            if state == AuthState::Valid {
                return Ok(());
            }

            let (id, refresh) = match slot.current.as_ref().filter(|(_, f)| f.peek().is_none()) {
                Some((id, running)) => {
                    debug!("Token request already in flight, waiting for it");
                    (*id, running.clone())
                }
                None => {
                    let id = slot.next_id;
                    slot.next_id += 1;
                    let inner = Arc::clone(&self.inner);
                    let refresh = async move { inner.request_tokens(state, &credentials).await }
                        .boxed()
                        .shared();
                    slot.current = Some((id, refresh.clone()));
                    (id, refresh)
                }
            };
            Waiter {
                slot: &self.inner.slot,
                id,
                refresh,
            }
        };

        (&mut waiter.refresh).await
    }
}

impl Inner {
    async fn request_tokens(&self, state: AuthState, current: &Credentials) -> Result<(), ApiError> {
        let refreshing = state == AuthState::Expired;
        let body = if refreshing {
            info!(user_id = current.user_id(), "Refreshing access token");
            json!({
                "grant_type": "refresh_token",
                "refresh_token": current.refresh_token(),
                "client_id": self.account.client_id,
                "client_secret": self.account.client_secret,
            })
        } else {
            info!(username = %self.account.username, "Requesting new tokens");
            json!({
                "grant_type": "password",
                "client_id": self.account.client_id,
                "client_secret": self.account.client_secret,
                "username": self.account.username,
                "password": self.account.password,
            })
        };
        self.token_requests.fetch_add(1, Ordering::SeqCst);

        let outcome = match self.exchange(body).await {
            Ok(token) => self.install(token, current),
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => {
                let credentials = self.store.get();
                info!(
                    user_id = credentials.user_id(),
                    expires_at = %credentials.expires_at(),
                    "Access token updated"
                );
            }
            Err(e) => {
                error!(error = %e, refreshing, "Token request failed, credentials cleared");
                self.store.clear();
            }
        }
        outcome
    }

    async fn exchange(&self, body: serde_json::Value) -> Result<TokenData, ApiError> {
        let request = self
            .transport
            .build_unauthenticated(TOKEN_PATH, Method::POST, Some(body))?;
        let tokens = PendingExchange::<TokenData>::dispatch(request)
            .all()
            .await
            .map_err(token_failure)?;
        tokens
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound("no token returned".to_string()))
    }

    fn install(&self, token: TokenData, current: &Credentials) -> Result<(), ApiError> {
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::MalformedResponse("token response has no access token".to_string()))?;
        // The server may omit the refresh token on renewal; keep the one we have
        let refresh_token = token
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| current.refresh_token().to_string());

        let credentials = Credentials::issue(access_token, refresh_token, token.expires_in, Utc::now())
            .map_err(|e| ApiError::MalformedResponse(format!("Unusable access token: {}", e)))?;
        self.store.replace(credentials);
        Ok(())
    }
}

/// Any rejection from the token endpoint means the account cannot authorize.
fn token_failure(err: ApiError) -> ApiError {
    match err {
        ApiError::MalformedRequest(m) | ApiError::NotFound(m) | ApiError::Io(m) => {
            ApiError::Authorization(m)
        }
        other => other,
    }
}
