//! Turns an in-flight HTTP exchange into a typed, single-resolution result.
//!
//! ```text
//! send ──► bytes ──► classify envelope ──► decode data as [T] ──► Vec<T>
//!   │         │              │                     │
//!   └─────────┴── Transport  └── Authorization /   └── NotFound (empty)
//!                                MalformedRequest /     MalformedResponse (null)
//!                                NotFound / Io
//! ```
//!
//! The outcome is computed once and shared, so any number of consumers can
//! await [`PendingExchange::all`] or [`PendingExchange::first`] and see the
//! same result without a second network call.

use crate::envelope::classify;
use crate::error::ApiError;
use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt, Shared};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<Vec<T>, ApiError>>>;

/// One in-flight request and its eventual typed result.
///
/// Resolves exactly once, with a non-empty list or a categorized failure.
/// Nothing runs until a consumer awaits it.
pub struct PendingExchange<T>
where
    T: Clone,
{
    outcome: SharedOutcome<T>,
    abort: AbortHandle,
}

impl<T> PendingExchange<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Wraps a ready-to-send request.
    pub fn dispatch(request: RequestBuilder) -> Self {
        Self::from_future(exchange(request))
    }

    /// An exchange that already failed, e.g. because no request could be built.
    pub fn failed(error: ApiError) -> Self {
        Self::from_future(async move { Err(error) })
    }

    fn from_future<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<Vec<T>, ApiError>> + Send + 'static,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let outcome = Abortable::new(future, registration)
            .map(|result| result.unwrap_or(Err(ApiError::Cancelled)))
            .boxed()
            .shared();
        Self { outcome, abort }
    }

    /// Cancels the exchange; pending and future consumers see
    /// [`ApiError::Cancelled`] unless it had already resolved.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// The full, non-empty result list.
    pub async fn all(&self) -> Result<Vec<T>, ApiError> {
        self.outcome.clone().await
    }

    /// The first result, or `None`.
    ///
    /// May complete with nothing: every failure is logged and collapsed into
    /// `None`, so callers must treat absence as non-fatal.
    pub async fn first(&self) -> Option<T> {
        match self.outcome.clone().await {
            Ok(results) => results.into_iter().next(),
            Err(e) => {
                debug!(error = %e, "Exchange failed, first-element view is empty");
                None
            }
        }
    }
}

async fn exchange<T: DeserializeOwned>(request: RequestBuilder) -> Result<Vec<T>, ApiError> {
    let response = request
        .send()
        .await
        .map_err(|e| {
            debug!(error = %e, "Failed request");
            ApiError::from_reqwest("Failed request", e)
        })?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::from_reqwest("Failed to read response body", e))?;
    trace!(status = %status, body = %String::from_utf8_lossy(&body), "Content returned by request");

    resolve(&body)
}

/// Classifies a response body and decodes its data as a list of `T`.
pub fn resolve<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, ApiError> {
    let envelope = classify(body)?;
    let results: Vec<T> = envelope.decode_data()?;
    trace!(count = results.len(), "result(s) returned");
    Ok(results)
}
