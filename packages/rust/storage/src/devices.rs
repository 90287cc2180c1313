//! Production device registry.

use cloudmouse_shared::{DeviceInfo, Result};
use tracing::{info, instrument, warn};

use crate::{Database, inserted_id, storage_err};

/// A device about to be registered.
#[derive(Debug, Clone)]
pub struct NewDevice<'a> {
    pub info: &'a DeviceInfo,
    pub production_batch: &'a str,
    /// UTC timestamp, `YYYY-MM-DD HH:MM:SS`.
    pub manufactured_at: &'a str,
    pub manufactured_by: &'a str,
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Stored under this row id.
    Inserted(i64),
    /// The device identity is already present.
    AlreadyRegistered,
}

/// Fleet counters shown after each registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCounts {
    pub total: i64,
    pub batch: i64,
}

impl Database {
    /// Insert a device row. A unique-key violation is reported as
    /// [`Registration::AlreadyRegistered`] rather than an error.
    #[instrument(skip(self, device), fields(uuid = %device.info.uuid, batch = device.production_batch))]
    pub async fn register_device(&self, device: &NewDevice<'_>) -> Result<Registration> {
        let info = device.info;
        let result = sqlx::query(
            "INSERT INTO devices
                 (uuid, device_id, mac_address, pcb_version, firmware_version,
                  chip_model, chip_revision, production_batch, manufactured_at, manufactured_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&info.uuid)
        .bind(&info.device_id)
        .bind(&info.mac_address)
        .bind(&info.pcb_version)
        .bind(&info.firmware_version)
        .bind(&info.chip_model)
        .bind(&info.chip_revision)
        .bind(device.production_batch)
        .bind(device.manufactured_at)
        .bind(device.manufactured_by)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let id = inserted_id(&done, "devices")?;
                info!(id, "device registered");
                Ok(Registration::Inserted(id))
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                warn!("device already registered");
                Ok(Registration::AlreadyRegistered)
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Total devices and devices in `batch`, read fresh.
    pub async fn device_counts(&self, batch: &str) -> Result<DeviceCounts> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        let batch = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM devices WHERE production_batch = ?",
        )
        .bind(batch)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(DeviceCounts { total, batch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sandbox;

    fn device(uuid: &str, mac: &str) -> DeviceInfo {
        serde_json::from_value(serde_json::json!({
            "uuid": uuid,
            "device_id": "CM-0001",
            "mac_address": mac,
            "pcb_version": "1.2",
            "firmware_version": "0.9.0",
            "chip_model": "ESP32-S3",
            "chip_revision": 0
        }))
        .unwrap()
    }

    fn new_device<'a>(info: &'a DeviceInfo, batch: &'a str) -> NewDevice<'a> {
        NewDevice {
            info,
            production_batch: batch,
            manufactured_at: "2026-10-19 08:30:00",
            manufactured_by: "line1@example.com",
        }
    }

    #[tokio::test]
    async fn duplicate_is_soft() {
        let db = sandbox().await;
        let info = device("uuid-1", "AA:BB:CC:00:00:01");

        let first = db.register_device(&new_device(&info, "BATCH-2026-10-19")).await.unwrap();
        assert!(matches!(first, Registration::Inserted(_)));

        let second = db.register_device(&new_device(&info, "BATCH-2026-10-19")).await.unwrap();
        assert_eq!(second, Registration::AlreadyRegistered);
    }

    #[tokio::test]
    async fn counts_split_by_batch() {
        let db = sandbox().await;
        let a = device("uuid-a", "AA:BB:CC:00:00:0A");
        let b = device("uuid-b", "AA:BB:CC:00:00:0B");
        let c = device("uuid-c", "AA:BB:CC:00:00:0C");

        db.register_device(&new_device(&a, "BATCH-2026-10-18")).await.unwrap();
        db.register_device(&new_device(&b, "BATCH-2026-10-19")).await.unwrap();
        db.register_device(&new_device(&c, "BATCH-2026-10-19")).await.unwrap();

        let counts = db.device_counts("BATCH-2026-10-19").await.unwrap();
        assert_eq!(counts, DeviceCounts { total: 3, batch: 2 });
    }
}
