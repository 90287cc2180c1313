//! Production line provisioning: flash a device, read its identity over
//! serial, register it, report fleet counts.

pub mod device;
pub mod flash;
pub mod serial;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use tracing::{info, instrument};

use cloudmouse_shared::{CloudMouseError, DeviceInfo, Result};
use cloudmouse_storage::{Database, DeviceCounts, NewDevice, Registration};

pub use device::parse_device_info;
pub use flash::{DEFAULT_ESPTOOL, FLASH_SETTLE, FlashConfig, esptool_args, flash, parse_percent};
pub use serial::{DeviceLink, SerialTiming, read_info_block};

/// Provisioning stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Flash,
    SerialConnect,
    RequestInfo,
    ParseInfo,
    Persist,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Flash => "Flashing firmware",
            Stage::SerialConnect => "Connecting to serial port",
            Stage::RequestInfo => "Reading device info",
            Stage::ParseInfo => "Parsing device info",
            Stage::Persist => "Saving to database",
            Stage::Report => "Reading production stats",
        };
        f.write_str(label)
    }
}

/// Receives stage changes and flasher progress.
pub trait ProvisionObserver: Send + Sync {
    fn stage(&self, stage: Stage);
    fn flash_progress(&self, percent: u8);
    /// Whether flasher output should be streamed to `flash_progress`.
    /// When false the output is captured and shown only on failure.
    fn wants_flash_progress(&self) -> bool {
        false
    }
}

/// Observer that ignores everything.
pub struct QuietObserver;

impl ProvisionObserver for QuietObserver {
    fn stage(&self, _stage: Stage) {}
    fn flash_progress(&self, _percent: u8) {}
}

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub port: String,
    /// Absolute firmware path; `None` skips flashing.
    pub firmware: Option<PathBuf>,
    pub esptool: String,
    /// Recorded as `manufactured_by`.
    pub operator: String,
    pub serial: SerialTiming,
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub device: DeviceInfo,
    pub registration: Registration,
    pub batch: String,
    pub counts: DeviceCounts,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run every stage for the device on `opts.port`. The first failing stage
/// ends the run; an already registered device is not a failure.
#[instrument(skip_all, fields(port = %opts.port))]
pub async fn provision(
    db: &Database,
    opts: &ProvisionOptions,
    observer: &dyn ProvisionObserver,
) -> Result<ProvisionReport> {
    if let Some(firmware) = &opts.firmware {
        observer.stage(Stage::Flash);
        let config = FlashConfig {
            esptool: opts.esptool.clone(),
            port: opts.port.clone(),
            firmware: firmware.clone(),
        };
        let report_percent = |percent: u8| observer.flash_progress(percent);
        let on_percent: Option<&(dyn Fn(u8) + Send + Sync)> = if observer.wants_flash_progress() {
            Some(&report_percent)
        } else {
            None
        };
        flash(&config, on_percent).await?;
        tokio::time::sleep(FLASH_SETTLE).await;
    }

    observer.stage(Stage::SerialConnect);
    let link = DeviceLink::open(&opts.port, opts.serial).await?;

    observer.stage(Stage::RequestInfo);
    let lines = link.request_info().await?;

    observer.stage(Stage::ParseInfo);
    let device = parse_device_info(&lines)?;
    info!(uuid = %device.uuid, device_id = %device.device_id, mac = %device.mac_address, "device identified");

    observer.stage(Stage::Persist);
    let batch = current_batch();
    let manufactured_at = timestamp(Utc::now());
    let registration = db
        .register_device(&NewDevice {
            info: &device,
            production_batch: &batch,
            manufactured_at: &manufactured_at,
            manufactured_by: &opts.operator,
        })
        .await?;

    observer.stage(Stage::Report);
    let counts = db.device_counts(&batch).await?;

    Ok(ProvisionReport {
        device,
        registration,
        batch,
        counts,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Batch label for a production day.
pub fn batch_for(date: NaiveDate) -> String {
    format!("BATCH-{}", date.format("%Y-%m-%d"))
}

/// Batch label for today, local time.
pub fn current_batch() -> String {
    batch_for(Local::now().date_naive())
}

/// Database timestamp, `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Expand `~` and make `raw` absolute.
pub fn resolve_firmware_path(raw: &str) -> Result<PathBuf> {
    let expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let home = dirs::home_dir()
                .ok_or_else(|| CloudMouseError::validation("cannot determine home directory"))?;
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(raw),
    };
    std::path::absolute(&expanded).map_err(|e| CloudMouseError::io(Path::new(raw), e))
}

/// Check the argument combination before anything touches hardware.
pub fn validate_args(port: Option<&str>, firmware: Option<&str>, skip_flash: bool, stats: bool) -> Result<()> {
    if stats {
        return Ok(());
    }
    if port.is_none_or(str::is_empty) {
        return Err(CloudMouseError::validation("--port is required"));
    }
    if !skip_flash && firmware.is_none_or(str::is_empty) {
        return Err(CloudMouseError::validation("--bin is required (or use --skip-flash)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct StageLog(Mutex<Vec<Stage>>);

    impl ProvisionObserver for StageLog {
        fn stage(&self, stage: Stage) {
            self.0.lock().unwrap().push(stage);
        }
        fn flash_progress(&self, _percent: u8) {}
    }

    async fn sandbox() -> Database {
        let path = std::env::temp_dir().join(format!("cloudmouse_provision_{}.db", Uuid::now_v7()));
        Database::open_sandbox(&path).await.unwrap()
    }

    fn options(firmware: Option<PathBuf>) -> ProvisionOptions {
        ProvisionOptions {
            port: "/dev/cloudmouse-no-such-port".to_string(),
            firmware,
            esptool: "true".to_string(),
            operator: "tester".to_string(),
            serial: SerialTiming::default(),
        }
    }

    #[tokio::test]
    async fn flash_failure_stops_the_run() {
        let db = sandbox().await;
        let log = StageLog::default();
        let opts = options(Some(PathBuf::from("/nonexistent/firmware.bin")));

        let result = provision(&db, &opts, &log).await;
        assert!(matches!(result, Err(CloudMouseError::Flash(_))));
        assert_eq!(*log.0.lock().unwrap(), vec![Stage::Flash]);

        let counts = db.device_counts(&current_batch()).await.unwrap();
        assert_eq!((counts.total, counts.batch), (0, 0));
    }

    #[tokio::test]
    async fn serial_failure_stops_the_run() {
        let db = sandbox().await;
        let log = StageLog::default();

        let result = provision(&db, &options(None), &log).await;
        assert!(matches!(result, Err(CloudMouseError::Serial(_))));
        assert_eq!(*log.0.lock().unwrap(), vec![Stage::SerialConnect]);
        assert_eq!(db.device_counts(&current_batch()).await.unwrap().total, 0);
    }

    #[test]
    fn batch_label_uses_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(batch_for(date), "BATCH-2026-03-07");
        assert!(current_batch().starts_with("BATCH-20"));
    }

    #[test]
    fn timestamps_are_second_precision() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 5, 9).unwrap();
        assert_eq!(timestamp(at), "2026-10-19 08:05:09");
    }

    #[test]
    fn firmware_paths_become_absolute() {
        let path = resolve_firmware_path("build/firmware.bin").unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("build/firmware.bin"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_firmware_path("~/fw.bin").unwrap(), home.join("fw.bin"));
        }
        assert_eq!(
            resolve_firmware_path("/opt/fw/~weird.bin").unwrap(),
            PathBuf::from("/opt/fw/~weird.bin")
        );
    }

    #[test]
    fn argument_rules() {
        assert!(validate_args(None, None, false, true).is_ok());
        assert!(validate_args(Some("/dev/ttyUSB0"), None, true, false).is_ok());
        assert!(validate_args(Some("/dev/ttyUSB0"), Some("fw.bin"), false, false).is_ok());

        let err = validate_args(None, Some("fw.bin"), false, false).unwrap_err();
        assert!(err.to_string().contains("--port"));
        let err = validate_args(Some("/dev/ttyUSB0"), None, false, false).unwrap_err();
        assert!(err.to_string().contains("--bin"));
    }

    #[test]
    fn stages_have_labels() {
        assert_eq!(Stage::Persist.to_string(), "Saving to database");
        assert_eq!(Stage::Flash.to_string(), "Flashing firmware");
    }
}
