//! In-memory serial device for tests.
//!
//! [`MockOpener`] hands out [`MockLine`]-backed devices instead of touching
//! the OS.  Each successful `open` creates a new line; tests drive the line
//! through its controller methods:
//!
//! ```rust
//! use vna_core::device::mock::MockOpener;
//! use vna_core::device::{DeviceChannel, ReadOutcome, BAUD_RATE};
//!
//! let opener = MockOpener::new();
//! let channel = DeviceChannel::open(&opener, "vna", BAUD_RATE).unwrap();
//! let line = opener.last_line().unwrap();
//!
//! line.push_inbound(b"ch> ");
//! let mut buf = [0u8; 16];
//! assert_eq!(channel.read_chunk(&mut buf).unwrap(), ReadOutcome::Data(4));
//!
//! channel.write(b"info\r").unwrap();
//! assert_eq!(line.written_bytes(), b"info\r");
//! ```
//!
//! The opener also counts how many ports are open right now and the peak
//! number ever open at once, which is how tests check mutual exclusion.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::{lock, DeviceError, DeviceOpener, SerialDevice};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadEnd {
    EndOfStream,
    Error,
}

#[derive(Default)]
struct LineState {
    inbound: VecDeque<Vec<u8>>,
    read_end: Option<ReadEnd>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
}

#[derive(Default)]
struct OpenCounters {
    now: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

/// One simulated physical port.  Shared by every handle cloned from it.
pub struct MockLine {
    port: String,
    state: Mutex<LineState>,
    data_ready: Condvar,
    open: AtomicBool,
    read_timeout: Duration,
}

impl MockLine {
    /// The port name this line was opened for.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Queues bytes for the next read, as if the analyzer had sent them.
    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state).inbound.push_back(bytes.to_vec());
        self.data_ready.notify_all();
    }

    /// Makes the next read (after queued data drains) return end-of-stream.
    pub fn end_of_stream(&self) {
        lock(&self.state).read_end = Some(ReadEnd::EndOfStream);
        self.data_ready.notify_all();
    }

    /// Makes the next read (after queued data drains) fail with an I/O error.
    pub fn fail_reads(&self) {
        lock(&self.state).read_end = Some(ReadEnd::Error);
        self.data_ready.notify_all();
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Every successful `write` call, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.state).writes.clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        lock(&self.state).writes.concat()
    }

    /// `false` once every handle to this line has been dropped.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn read_into(&self, buf: &mut [u8]) -> io::Result<usize> {
        let state = lock(&self.state);
        let (mut state, _) = self
            .data_ready
            .wait_timeout_while(state, self.read_timeout, |s| {
                s.inbound.is_empty() && s.read_end.is_none()
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(mut chunk) = state.inbound.pop_front() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                state.inbound.push_front(chunk.split_off(n));
            }
            return Ok(n);
        }

        match state.read_end {
            Some(ReadEnd::EndOfStream) => Ok(0),
            Some(ReadEnd::Error) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device disconnected",
            )),
            None => Err(io::Error::from(io::ErrorKind::TimedOut)),
        }
    }

    fn record_write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device rejected write",
            ));
        }
        state.writes.push(buf.to_vec());
        Ok(buf.len())
    }
}

/// Dropped when the last handle to a line goes away.
struct OpenToken {
    line: Arc<MockLine>,
    counters: Arc<OpenCounters>,
}

impl Drop for OpenToken {
    fn drop(&mut self) {
        self.line.open.store(false, Ordering::Release);
        self.counters.now.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A handle to a [`MockLine`].
pub struct MockDevice {
    token: Arc<OpenToken>,
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.token.line.read_into(buf)
    }
}

impl Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.token.line.record_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialDevice for MockDevice {
    fn try_clone_device(&self) -> io::Result<Box<dyn SerialDevice>> {
        Ok(Box::new(MockDevice {
            token: Arc::clone(&self.token),
        }))
    }
}

/// A [`DeviceOpener`] producing [`MockDevice`]s.
pub struct MockOpener {
    counters: Arc<OpenCounters>,
    lines: Mutex<Vec<Arc<MockLine>>>,
    unavailable: AtomicBool,
    read_timeout: Duration,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::with_read_timeout(DEFAULT_READ_TIMEOUT)
    }

    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Self {
            counters: Arc::new(OpenCounters::default()),
            lines: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            read_timeout,
        }
    }

    /// While set, every `open` fails with [`DeviceError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Number of lines with at least one live handle.
    pub fn open_devices(&self) -> usize {
        self.counters.now.load(Ordering::Acquire)
    }

    /// The most lines ever open at the same time.
    pub fn peak_open_devices(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }

    /// Number of successful opens.
    pub fn total_opens(&self) -> usize {
        self.counters.total.load(Ordering::Acquire)
    }

    /// The line created by the `index`-th successful open.
    pub fn line(&self, index: usize) -> Option<Arc<MockLine>> {
        lock(&self.lines).get(index).cloned()
    }

    /// The line created by the most recent successful open.
    pub fn last_line(&self) -> Option<Arc<MockLine>> {
        lock(&self.lines).last().cloned()
    }
}

impl Default for MockOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceOpener for MockOpener {
    fn open(&self, port: &str, _baud_rate: u32) -> Result<Box<dyn SerialDevice>, DeviceError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(DeviceError::Unavailable {
                port: port.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }

        let line = Arc::new(MockLine {
            port: port.to_string(),
            state: Mutex::new(LineState::default()),
            data_ready: Condvar::new(),
            open: AtomicBool::new(true),
            read_timeout: self.read_timeout,
        });
        lock(&self.lines).push(Arc::clone(&line));

        let now = self.counters.now.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.peak.fetch_max(now, Ordering::AcqRel);
        self.counters.total.fetch_add(1, Ordering::AcqRel);

        Ok(Box::new(MockDevice {
            token: Arc::new(OpenToken {
                line,
                counters: Arc::clone(&self.counters),
            }),
        }))
    }
}
