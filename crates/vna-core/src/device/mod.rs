//! Serial device abstraction and the [`DeviceChannel`] resource wrapper.
//!
//! The OS-facing part is split into two small traits so that everything above
//! them (the reader thread, the arbiter, the web session) can be tested
//! without hardware:
//!
//! - [`SerialDevice`] – one open handle: `Read + Write` plus `try_clone`.
//! - [`DeviceOpener`] – opens a handle for a port name and baud rate.
//!
//! The production implementation is [`SerialPortOpener`] (backed by the
//! `serialport` crate); tests use [`mock::MockOpener`].

pub mod channel;
pub mod mock;
pub mod serial;

use std::io::{self, Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

pub use channel::{DeviceChannel, ReadOutcome};
pub use serial::SerialPortOpener;

/// The NanoVNA's USB CDC port always runs at 115200 baud.
pub const BAUD_RATE: u32 = 115_200;

/// Errors raised by device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The port could not be opened or configured (missing, permission
    /// denied, or already exclusively locked by another process).
    #[error("device {port} is unavailable: {source}")]
    Unavailable {
        port: String,
        #[source]
        source: io::Error,
    },

    /// A read or write on an open port failed.
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),

    /// The channel has already been closed.
    #[error("device channel is closed")]
    Closed,

    /// The background reader thread could not be spawned.
    #[error("failed to spawn device reader thread: {0}")]
    ReaderSpawn(#[source] io::Error),
}

/// One open handle to a serial device.
///
/// Reads are expected to honour a short timeout and report it as
/// [`io::ErrorKind::TimedOut`] so that a reader thread can notice a stop
/// request without the port ever producing data.
pub trait SerialDevice: Read + Write + Send {
    /// Opens a second handle to the same underlying port.
    fn try_clone_device(&self) -> io::Result<Box<dyn SerialDevice>>;
}

/// Opens [`SerialDevice`] handles by port name.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceOpener: Send + Sync {
    /// Opens and configures `port` at `baud_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unavailable`] if the OS refuses the port.
    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialDevice>, DeviceError>;
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
///
/// Device teardown is best-effort: a panic on some other thread must never
/// make the port impossible to close.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
