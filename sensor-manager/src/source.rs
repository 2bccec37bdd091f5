use async_trait::async_trait;
use flumewater::model::Device;
use flumewater::{ApiResult, FlumeApi};

/// Where handlers read device data from.
///
/// Implemented by [`FlumeApi`]; tests substitute scripted sources.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Every device registered to the account.
    async fn devices(&self) -> ApiResult<Vec<Device>>;

    /// Current state of one sensor.
    async fn device(&self, device_id: u64) -> ApiResult<Device>;

    /// Gallons used over the last `minutes` minutes.
    async fn water_use(&self, device_id: u64, minutes: u32) -> ApiResult<f64>;
}

#[async_trait]
impl DeviceSource for FlumeApi {
    async fn devices(&self) -> ApiResult<Vec<Device>> {
        self.get_all_devices().await
    }

    async fn device(&self, device_id: u64) -> ApiResult<Device> {
        self.get_device(device_id).await
    }

    async fn water_use(&self, device_id: u64, minutes: u32) -> ApiResult<f64> {
        self.get_water_use(device_id, minutes).await
    }
}
