//! Device info payload parsing.

use cloudmouse_shared::{CloudMouseError, DeviceInfo, Result};

/// Parse the captured info lines as one JSON object.
pub fn parse_device_info(lines: &[String]) -> Result<DeviceInfo> {
    if lines.is_empty() {
        return Err(CloudMouseError::DeviceInfo("no device info received".into()));
    }
    let payload = lines.join("\n");
    serde_json::from_str(&payload).map_err(|e| {
        CloudMouseError::DeviceInfo(format!("malformed device info: {e}\nraw payload: {payload}"))
    })
}
