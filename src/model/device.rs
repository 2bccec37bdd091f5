use serde::{Deserialize, Deserializer};

/// Kind of Flume hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceType {
    /// Radio-to-WiFi bridge (wire value 1).
    Bridge,
    /// Water sensor on the meter (wire value 2).
    Sensor,
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(u64),
            Text(String),
        }

        let code = match Wire::deserialize(deserializer)? {
            Wire::Number(n) => n,
            Wire::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("unknown device type {:?}", s)))?,
        };
        match code {
            1 => Ok(DeviceType::Bridge),
            2 => Ok(DeviceType::Sensor),
            other => Err(serde::de::Error::custom(format!(
                "unknown device type {}",
                other
            ))),
        }
    }
}

fn default_device_type() -> DeviceType {
    DeviceType::Sensor
}

/// A device registered to the account.
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub id: u64,
    #[serde(rename = "type", default = "default_device_type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub location_id: u64,
    #[serde(default)]
    pub user_id: u64,
    /// Bridge serving a sensor; absent on bridges.
    #[serde(default)]
    pub bridge_id: Option<u64>,
    /// Whether a sensor is mounted correctly; absent on bridges.
    #[serde(default)]
    pub oriented: Option<bool>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub connected: bool,
    /// "LOW", "MEDIUM" or "HIGH"; absent on bridges.
    #[serde(default)]
    pub battery_level: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

/// Maps the textual battery level to a percentage.
pub fn battery_percent(level: &str) -> Option<u8> {
    match level {
        "LOW" => Some(25),
        "MEDIUM" => Some(50),
        "HIGH" => Some(75),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_deserialization() {
        let json = r#"{
            "id": 6248148189204194987,
            "bridge_id": 6248148189204155555,
            "type": 2,
            "user_id": 1234,
            "location_id": 5678,
            "oriented": true,
            "last_seen": "2020-08-11T17:46:30.000Z",
            "connected": true,
            "battery_level": "HIGH",
            "product": "flume1"
        }"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.id, 6248148189204194987);
        assert_eq!(device.device_type, DeviceType::Sensor);
        assert_eq!(device.bridge_id, Some(6248148189204155555));
        assert_eq!(device.oriented, Some(true));
        assert!(device.connected);
        assert_eq!(device.battery_level.as_deref(), Some("HIGH"));
    }

    #[test]
    fn test_bridge_with_string_type() {
        let json = r#"{"id": 11, "type": "1", "connected": true}"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.device_type, DeviceType::Bridge);
        assert!(device.battery_level.is_none());
        assert!(device.bridge_id.is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"id": 11, "type": 9}"#;
        assert!(serde_json::from_str::<Device>(json).is_err());
    }

    #[test]
    fn test_battery_percent() {
        assert_eq!(battery_percent("LOW"), Some(25));
        assert_eq!(battery_percent("MEDIUM"), Some(50));
        assert_eq!(battery_percent("HIGH"), Some(75));
        assert_eq!(battery_percent("UNKNOWN"), None);
    }
}
