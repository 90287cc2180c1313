//! Firmware flashing through `esptool.py`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use cloudmouse_shared::{CloudMouseError, Result};

/// Flasher command used when none is configured.
pub const DEFAULT_ESPTOOL: &str = "esptool.py";

/// Pause after a successful flash while the device reboots.
pub const FLASH_SETTLE: Duration = Duration::from_secs(3);

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*(\d{1,3})\s*%\s*\)").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct FlashConfig {
    pub esptool: String,
    pub port: String,
    pub firmware: PathBuf,
}

/// Arguments for writing `firmware` to an ESP32-S3 on `port`.
pub fn esptool_args(port: &str, firmware: &Path) -> Vec<String> {
    [
        "--chip", "esp32s3",
        "--port", port,
        "--baud", "921600",
        "--before", "default_reset",
        "--after", "hard_reset",
        "write_flash", "-z",
        "--flash_mode", "dio",
        "--flash_freq", "80m",
        "--flash_size", "detect",
        "0x10000",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(firmware.display().to_string()))
    .collect()
}

/// Percentage from a flasher progress line (`Writing at 0x… (42 %)`).
pub fn parse_percent(line: &str) -> Option<u8> {
    let caps = PERCENT_RE.captures(line)?;
    let value: u8 = caps[1].parse().ok()?;
    (value <= 100).then_some(value)
}

/// Run the flasher.
///
/// With `on_percent`, both output streams are read line by line and every
/// progress token is forwarded. Without it, output is captured and only
/// shown in the error when the flasher fails.
#[instrument(skip_all, fields(port = %config.port, firmware = %config.firmware.display()))]
pub async fn flash(config: &FlashConfig, on_percent: Option<&(dyn Fn(u8) + Send + Sync)>) -> Result<()> {
    if !config.firmware.is_file() {
        return Err(CloudMouseError::Flash(format!(
            "firmware binary not found: {}",
            config.firmware.display()
        )));
    }
    let size_kb = std::fs::metadata(&config.firmware)
        .map(|m| m.len() as f64 / 1024.0)
        .unwrap_or_default();
    info!(size_kb = %format!("{size_kb:.2}"), "flashing firmware");

    let mut command = Command::new(&config.esptool);
    command.args(esptool_args(&config.port, &config.firmware));

    match on_percent {
        Some(callback) => run_streamed(command, &config.esptool, callback).await,
        None => run_captured(command, &config.esptool).await,
    }?;

    info!("firmware flashed");
    Ok(())
}

async fn run_streamed(mut command: Command, tool: &str, on_percent: &(dyn Fn(u8) + Send + Sync)) -> Result<()> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(tool, e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    tokio::join!(forward_lines(stdout, on_percent), forward_lines(stderr, on_percent));

    let status = child
        .wait()
        .await
        .map_err(|e| CloudMouseError::Flash(format!("{tool} did not finish: {e}")))?;
    if !status.success() {
        return Err(CloudMouseError::Flash(format!("{tool} exited with {status}")));
    }
    Ok(())
}

async fn forward_lines<R>(stream: Option<R>, on_percent: &(dyn Fn(u8) + Send + Sync))
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_percent(&line) {
            Some(percent) => on_percent(percent),
            None => debug!(line = %line, "esptool"),
        }
    }
}

async fn run_captured(mut command: Command, tool: &str) -> Result<()> {
    let output = command.output().await.map_err(|e| spawn_error(tool, e))?;
    if output.status.success() {
        return Ok(());
    }
    Err(CloudMouseError::Flash(format!(
        "{tool} exited with {}\n=== STDOUT ===\n{}\n=== STDERR ===\n{}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )))
}

fn spawn_error(tool: &str, e: std::io::Error) -> CloudMouseError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CloudMouseError::Flash(format!("{tool} not found (install with: pip install esptool)"))
    } else {
        CloudMouseError::Flash(format!("failed to start {tool}: {e}"))
    }
}
