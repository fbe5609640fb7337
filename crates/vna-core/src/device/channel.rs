//! [`DeviceChannel`]: one open serial port shared by a reader and a writer.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;

use super::{lock, DeviceError, DeviceOpener, SerialDevice};

/// Result of a single [`DeviceChannel::read_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were written into the caller's buffer.
    Data(usize),
    /// The read timed out with nothing available.  Not an error.
    Idle,
    /// The device reported end-of-stream (it went away).
    EndOfStream,
}

/// An open serial port.
///
/// The channel keeps two OS handles to the same port: one used only by the
/// [`crate::DeviceReader`] thread and one used by the session for writes.
/// This way a blocking read never delays a write.
///
/// Closing drops both handles and is idempotent; every later `write` or
/// `read_chunk` fails with [`DeviceError::Closed`].
pub struct DeviceChannel {
    port: String,
    baud_rate: u32,
    open: AtomicBool,
    reader: Mutex<Option<Box<dyn SerialDevice>>>,
    writer: Mutex<Option<Box<dyn SerialDevice>>>,
}

impl DeviceChannel {
    /// Opens `port` at `baud_rate` through `opener`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unavailable`] if the port cannot be opened, or
    /// if the second (reader) handle cannot be cloned from the first.
    pub fn open(opener: &dyn DeviceOpener, port: &str, baud_rate: u32) -> Result<Self, DeviceError> {
        let writer = opener.open(port, baud_rate)?;
        let reader = writer
            .try_clone_device()
            .map_err(|source| DeviceError::Unavailable {
                port: port.to_string(),
                source,
            })?;

        debug!("opened device {port} at {baud_rate} baud");

        Ok(Self {
            port: port.to_string(),
            baud_rate,
            open: AtomicBool::new(true),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// The port identifier this channel was opened on.
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Returns `true` until [`close`](Self::close) has been called.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Writes exactly `bytes` to the device and flushes.
    ///
    /// The payload is opaque: no buffering, framing, or translation.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Closed`] after `close`, [`DeviceError::Io`] if the OS
    /// write fails.  A failed write may have been partially transmitted.
    pub fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut writer = lock(&self.writer);
        let device = writer.as_mut().ok_or(DeviceError::Closed)?;
        device.write_all(bytes)?;
        device.flush()?;
        Ok(())
    }

    /// Blocks until some bytes are available, the read timeout elapses, or
    /// the device goes away.
    ///
    /// No message boundaries are assumed: whatever the OS returns is handed
    /// back as one chunk.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Closed`] after `close`, [`DeviceError::Io`] for any
    /// read failure other than a timeout.
    pub fn read_chunk(&self, buf: &mut [u8]) -> Result<ReadOutcome, DeviceError> {
        let mut reader = lock(&self.reader);
        let device = reader.as_mut().ok_or(DeviceError::Closed)?;
        match device.read(buf) {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::Idle)
            }
            Err(e) => Err(DeviceError::Io(e)),
        }
    }

    /// Closes the channel, releasing both OS handles.
    ///
    /// Returns `true` if this call performed the close, `false` if the
    /// channel was already closed.
    pub fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        // Writer first: a write in progress finishes before the handle drops.
        lock(&self.writer).take();
        lock(&self.reader).take();
        debug!("closed device {}", self.port);
        true
    }
}

impl std::fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("port", &self.port)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
