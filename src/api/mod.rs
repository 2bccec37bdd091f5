//! Typed calls against the Flume cloud API.
//!
//! Every call goes through [`AuthorizedRequests`] and resolves through a
//! [`PendingExchange`], so failures always arrive as an [`ApiError`] kind.

mod pipeline;
mod request;
mod transport;

pub use pipeline::{resolve, PendingExchange};
pub use request::AuthorizedRequests;
pub use transport::Transport;

use crate::auth::Authenticator;
use crate::error::{ApiError, ApiResult};
use crate::model::{Device, DeviceType, QueryResult, UsageQuery, QUERY_REQUEST_ID};
use chrono::Local;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Device and usage calls for one account.
#[derive(Clone)]
pub struct FlumeApi {
    requests: AuthorizedRequests,
}

impl FlumeApi {
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            requests: AuthorizedRequests::new(authenticator),
        }
    }

    pub fn requests(&self) -> &AuthorizedRequests {
        &self.requests
    }

    pub fn authenticator(&self) -> &Authenticator {
        self.requests.authenticator()
    }

    /// Every device registered to the account, bridges included.
    pub async fn get_all_devices(&self) -> ApiResult<Vec<Device>> {
        self.pending("/devices", Method::GET, None).await.all().await
    }

    /// Exchange for one device, for callers that want the raw projections.
    pub async fn device_exchange(&self, device_id: u64) -> PendingExchange<Device> {
        self.pending(&format!("/devices/{}", device_id), Method::GET, None)
            .await
    }

    /// One sensor. A bridge id is reported as not found.
    pub async fn get_device(&self, device_id: u64) -> ApiResult<Device> {
        let device = self
            .device_exchange(device_id)
            .await
            .all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::transport("No device returned"))?;

        if device.device_type == DeviceType::Bridge {
            return Err(ApiError::NotFound(
                "Expecting a flume sensor and got a bridge".to_string(),
            ));
        }
        Ok(device)
    }

    /// Gallons used by `device_id` over the last `minutes` minutes.
    pub async fn get_water_use(&self, device_id: u64, minutes: u32) -> ApiResult<f64> {
        let query = UsageQuery::last_minutes(Local::now().naive_local(), minutes);
        let body = serde_json::to_value(&query)
            .map_err(|e| ApiError::MalformedRequest(format!("Unable to encode query: {}", e)))?;

        let results: Vec<QueryResult> = self
            .pending(
                &format!("/devices/{}/query", device_id),
                Method::POST,
                Some(body),
            )
            .await
            .all()
            .await?;

        let value = results
            .first()
            .and_then(|result| result.value_pairs(QUERY_REQUEST_ID))
            .and_then(|pairs| pairs.first())
            .and_then(|pair| pair.as_ref())
            .map(|pair| pair.value)
            .ok_or_else(|| {
                ApiError::NotFound(format!("No water use returned for device {}", device_id))
            })?;
        debug!(device_id, value, minutes, "Water use received");
        Ok(value)
    }

    async fn pending<T>(&self, path: &str, method: Method, body: Option<Value>) -> PendingExchange<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        match self.requests.try_build_authorized(path, method, body).await {
            Ok(request) => PendingExchange::dispatch(request),
            Err(e) => PendingExchange::failed(e),
        }
    }
}
