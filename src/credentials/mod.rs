//! In-memory credential state for one Flume account.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Authenticator                      │
//! │  - only writer (replace / clear)         │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!     (replace)              (get)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenStore                         │
//! │  - whole-set swaps behind one lock       │
//! │  - readers hold an immutable snapshot    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Credentials are never persisted; a restart starts from an empty set.

use chrono::{DateTime, Duration, Utc};

mod claims;
mod storage;

pub use claims::{ClaimsError, TokenClaims};
pub use storage::TokenStore;

/// Access tokens are treated as expired this long before the server says so.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// Where a credential set sits in the authorization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No usable tokens; a password grant is required.
    Unauthenticated,
    /// Access token present and inside its validity window.
    Valid,
    /// Access token past its (margin-adjusted) expiry, refresh token held.
    Expired,
}

/// One complete set of bearer credentials.
///
/// A non-empty access token always comes with parsed claims and an expiry;
/// the only way to build one is [`Credentials::issue`], which derives both.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    access_token: String,
    refresh_token: String,
    claims: Option<TokenClaims>,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    /// The voided set: no tokens, expiry pinned to `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: String::new(),
            claims: None,
            expires_at: now,
        }
    }

    /// Builds a set from a token endpoint response received at `now`.
    ///
    /// Fails without producing a partial set if the access token's claims
    /// cannot be read or the declared lifetime does not fit a timestamp.
    pub fn issue(
        access_token: String,
        refresh_token: String,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, ClaimsError> {
        let claims = TokenClaims::from_access_token(&access_token)?;
        let expires_at = expires_in_secs
            .checked_sub(EXPIRY_MARGIN_SECS)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or(ClaimsError::Lifetime(expires_in_secs))?;
        Ok(Self {
            access_token,
            refresh_token,
            claims: Some(claims),
            expires_at,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn claims(&self) -> Option<&TokenClaims> {
        self.claims.as_ref()
    }

    /// Margin-adjusted expiry instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Account id from the claims, or 0 when no claims are held.
    pub fn user_id(&self) -> u64 {
        self.claims.as_ref().map(|c| c.user_id).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }

    /// Lifecycle state as seen at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> AuthState {
        if self.access_token.is_empty() {
            return AuthState::Unauthenticated;
        }
        if now > self.expires_at {
            if self.refresh_token.is_empty() {
                AuthState::Unauthenticated
            } else {
                AuthState::Expired
            }
        } else {
            AuthState::Valid
        }
    }
}
