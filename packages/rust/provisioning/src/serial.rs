//! Serial exchange with a freshly flashed device.
//!
//! The port API is blocking, so every call runs on tokio's blocking pool.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, instrument};

use cloudmouse_shared::{CloudMouseError, Result};

pub const BAUD_RATE: u32 = 115_200;
pub const INFO_START: &str = "DEVICE_INFO_START";
pub const INFO_END: &str = "DEVICE_INFO_END";
const INFO_REQUEST: &[u8] = b"get uuid\n";

/// Delays used while talking to the device.
#[derive(Debug, Clone, Copy)]
pub struct SerialTiming {
    /// After opening, before clearing buffers.
    pub open_settle: Duration,
    /// After sending the request, before reading.
    pub reply_wait: Duration,
    /// Total time allowed for the info block.
    pub read_window: Duration,
    /// Sleep between reads when nothing is waiting.
    pub poll: Duration,
}

impl Default for SerialTiming {
    fn default() -> Self {
        Self {
            open_settle: Duration::from_secs(2),
            reply_wait: Duration::from_secs(1),
            read_window: Duration::from_secs(5),
            poll: Duration::from_millis(100),
        }
    }
}

/// An open serial connection. Closed when dropped.
pub struct DeviceLink {
    port: Box<dyn SerialPort>,
    timing: SerialTiming,
}

impl DeviceLink {
    /// Open `path`, wait for the device to settle, then clear both buffers.
    #[instrument(skip(timing))]
    pub async fn open(path: &str, timing: SerialTiming) -> Result<Self> {
        let path = path.to_string();
        blocking(move || {
            let port = serialport::new(&path, BAUD_RATE)
                .timeout(timing.poll)
                .open()
                .map_err(|e| CloudMouseError::Serial(format!("cannot open {path}: {e}")))?;
            std::thread::sleep(timing.open_settle);
            port.clear(ClearBuffer::All)
                .map_err(|e| CloudMouseError::Serial(format!("cannot clear buffers: {e}")))?;
            debug!(port = %path, baud = BAUD_RATE, "serial connected");
            Ok(Self { port, timing })
        })
        .await
    }

    /// Send the info request and collect the lines between the sentinels.
    pub async fn request_info(self) -> Result<Vec<String>> {
        blocking(move || {
            let Self { mut port, timing } = self;
            port.write_all(INFO_REQUEST)
                .and_then(|()| port.flush())
                .map_err(|e| CloudMouseError::Serial(format!("cannot send request: {e}")))?;
            std::thread::sleep(timing.reply_wait);
            read_info_block(&mut port, timing.read_window, timing.poll)
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CloudMouseError::Serial(format!("serial task failed: {e}")))?
}

/// Read lines from `reader` until [`INFO_END`] or until `window` elapses.
///
/// Everything before the line containing [`INFO_START`] is discarded. An
/// end sentinel that never arrives is an error, whatever was captured.
pub fn read_info_block<R: Read + ?Sized>(reader: &mut R, window: Duration, poll: Duration) -> Result<Vec<String>> {
    let deadline = Instant::now() + window;
    let mut pending = Vec::new();
    let mut captured = Vec::new();
    let mut capturing = false;
    let mut chunk = [0u8; 256];

    while Instant::now() < deadline {
        let read = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => 0,
            Err(e) => return Err(CloudMouseError::Serial(format!("read failed: {e}"))),
        };
        if read == 0 {
            std::thread::sleep(poll);
            continue;
        }
        pending.extend_from_slice(&chunk[..read]);

        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();

            if line.contains(INFO_START) {
                capturing = true;
                continue;
            }
            if line.contains(INFO_END) {
                return Ok(captured);
            }
            if capturing && !line.is_empty() {
                captured.push(line);
            }
        }
    }

    Err(CloudMouseError::DeviceInfo(format!(
        "no {INFO_END} within {}s ({} lines captured)",
        window.as_secs_f32(),
        captured.len()
    )))
}
