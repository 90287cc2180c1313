//! Domain types shared between the provisioning tool and the storage layer.

use serde::{Deserialize, Deserializer, Serialize};

/// Identity and hardware report sent by a freshly flashed device.
///
/// Firmware builds disagree on whether versions are numbers or strings, so
/// every field accepts both and is normalised to a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub uuid: String,
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub mac_address: String,
    #[serde(deserialize_with = "string_or_number")]
    pub pcb_version: String,
    #[serde(deserialize_with = "string_or_number")]
    pub firmware_version: String,
    #[serde(deserialize_with = "string_or_number")]
    pub chip_model: String,
    #[serde(deserialize_with = "string_or_number")]
    pub chip_revision: String,
    /// Any additional keys the firmware reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}
