//! Token store shared between the authenticator and request builders.

use super::Credentials;
use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};

/// Holds the account's current [`Credentials`].
///
/// # Thread Safety
/// - Every write swaps the whole set, so a reader sees either the previous
///   complete set or the next one
/// - `get` hands out an `Arc` snapshot; later swaps do not affect it
/// - Cloning the store shares the same underlying state
#[derive(Clone)]
pub struct TokenStore {
    current: Arc<RwLock<Arc<Credentials>>>,
}

impl TokenStore {
    /// Creates a store holding the empty set.
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(Credentials::empty(Utc::now())))),
        }
    }

    /// Current credential set (possibly empty).
    pub fn get(&self) -> Arc<Credentials> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the whole set.
    pub fn replace(&self, credentials: Credentials) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(credentials);
    }

    /// Voids the set: all tokens dropped, expiry set to now.
    pub fn clear(&self) {
        self.replace(Credentials::empty(Utc::now()));
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
