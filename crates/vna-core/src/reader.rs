//! Background byte pump from a [`DeviceChannel`] into a session.
//!
//! The serial port is a blocking resource, so each [`DeviceReader`] owns one
//! dedicated OS thread.  That thread never touches the async runtime
//! directly: it hands every chunk to the session through an unbounded Tokio
//! channel ([`DeviceSink`]), whose `send` is a non-blocking, thread-safe
//! enqueue.
//!
//! # Stopping
//!
//! [`DeviceReader::stop`] raises a flag and *joins* the thread.  Because the
//! channel's reads time out every few tens of milliseconds, the thread always
//! notices the flag promptly.  Once `stop` returns, the sink will never be
//! called again, and the thread's clone of the sink has been dropped, so the
//! session's receiver observes the channel closing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::device::{DeviceChannel, DeviceError, ReadOutcome};

/// Size of the scratch buffer handed to each `read_chunk` call.
const READ_CHUNK_SIZE: usize = 4096;

/// Why the device side of a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEnd {
    /// The device reported end-of-stream (unplugged, reset).
    EndOfStream,
    /// A read failed; carries the error's display text.
    Failed(String),
}

/// Something the reader thread reports to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Raw bytes read from the device, exactly as returned by the OS.
    Data(Vec<u8>),
    /// The device side is finished; no more events follow.
    Ended(DeviceEnd),
}

/// Where a reader delivers its events.
pub type DeviceSink = mpsc::UnboundedSender<DeviceEvent>;

/// A running background reader bound to one channel and one sink.
pub struct DeviceReader {
    port: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceReader {
    /// Spawns the reader thread.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ReaderSpawn`] if the OS refuses a new thread.
    pub fn start(channel: Arc<DeviceChannel>, sink: DeviceSink) -> Result<Self, DeviceError> {
        let port = channel.port().to_string();
        let stop = Arc::new(AtomicBool::new(false));

        let thread = thread::Builder::new()
            .name(format!("device-reader {port}"))
            .spawn({
                let stop = Arc::clone(&stop);
                move || pump(&channel, &sink, &stop)
            })
            .map_err(DeviceError::ReaderSpawn)?;

        debug!("device reader started on {port}");

        Ok(Self {
            port,
            stop,
            thread: Some(thread),
        })
    }

    /// `true` while the thread has not yet exited.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the thread and waits for it to exit.  Idempotent.
    ///
    /// After this returns no further sink invocations happen.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("device reader on {} panicked", self.port);
            } else {
                debug!("device reader on {} stopped", self.port);
            }
        }
    }
}

impl Drop for DeviceReader {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DeviceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceReader")
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish()
    }
}

/// The reader thread's body.
fn pump(channel: &DeviceChannel, sink: &DeviceSink, stop: &AtomicBool) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    while !stop.load(Ordering::Acquire) {
        match channel.read_chunk(&mut buf) {
            Ok(ReadOutcome::Data(n)) => {
                if sink.send(DeviceEvent::Data(buf[..n].to_vec())).is_err() {
                    debug!("{}: session receiver dropped; reader exiting", channel.port());
                    return;
                }
            }
            Ok(ReadOutcome::Idle) => {}
            Ok(ReadOutcome::EndOfStream) => {
                debug!("{}: end of stream", channel.port());
                let _ = sink.send(DeviceEvent::Ended(DeviceEnd::EndOfStream));
                return;
            }
            // Closed underneath us during teardown.
            Err(DeviceError::Closed) => return,
            Err(e) => {
                warn!("{}: read failed: {e}", channel.port());
                let _ = sink.send(DeviceEvent::Ended(DeviceEnd::Failed(e.to_string())));
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::mock::MockOpener;
    use crate::device::BAUD_RATE;

    fn open_channel(opener: &MockOpener) -> Arc<DeviceChannel> {
        Arc::new(DeviceChannel::open(opener, "vna", BAUD_RATE).unwrap())
    }

    /// Polls `rx` for up to one second.
    fn recv_blocking(rx: &mut mpsc::UnboundedReceiver<DeviceEvent>) -> Option<DeviceEvent> {
        for _ in 0..200 {
            match rx.try_recv() {
                Ok(event) => return Some(event),
                Err(mpsc::error::TryRecvError::Disconnected) => return None,
                Err(mpsc::error::TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
            }
        }
        None
    }

    #[test]
    fn test_reader_forwards_chunks_in_order() {
        // Arrange
        let opener = MockOpener::new();
        let channel = open_channel(&opener);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reader = DeviceReader::start(Arc::clone(&channel), tx).unwrap();
        let line = opener.last_line().unwrap();

        // Act
        line.push_inbound(b"first");
        line.push_inbound(&[0x00, 0xFF]);

        // Assert
        assert_eq!(recv_blocking(&mut rx), Some(DeviceEvent::Data(b"first".to_vec())));
        assert_eq!(recv_blocking(&mut rx), Some(DeviceEvent::Data(vec![0x00, 0xFF])));
        reader.stop();
    }

    #[test]
    fn test_end_of_stream_is_signalled_and_reader_exits() {
        let opener = MockOpener::new();
        let channel = open_channel(&opener);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _reader = DeviceReader::start(channel, tx).unwrap();

        opener.last_line().unwrap().end_of_stream();

        assert_eq!(
            recv_blocking(&mut rx),
            Some(DeviceEvent::Ended(DeviceEnd::EndOfStream))
        );
        // The thread dropped its sender on exit.
        assert_eq!(recv_blocking(&mut rx), None);
    }

    #[test]
    fn test_read_error_is_signalled_as_failed() {
        let opener = MockOpener::new();
        let channel = open_channel(&opener);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _reader = DeviceReader::start(channel, tx).unwrap();

        opener.last_line().unwrap().fail_reads();

        assert!(matches!(
            recv_blocking(&mut rx),
            Some(DeviceEvent::Ended(DeviceEnd::Failed(_)))
        ));
    }

    #[test]
    fn test_stop_joins_thread_and_closes_sink() {
        // Arrange
        let opener = MockOpener::new();
        let channel = open_channel(&opener);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reader = DeviceReader::start(Arc::clone(&channel), tx).unwrap();
        assert!(reader.is_running());

        // Act
        reader.stop();

        // Assert: thread gone, sender dropped, nothing delivered afterwards
        assert!(!reader.is_running());
        opener.last_line().unwrap().push_inbound(b"late");
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let opener = MockOpener::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut reader = DeviceReader::start(open_channel(&opener), tx).unwrap();

        reader.stop();
        reader.stop();

        assert!(!reader.is_running());
    }

    #[test]
    fn test_reader_exits_when_receiver_dropped() {
        let opener = MockOpener::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = DeviceReader::start(open_channel(&opener), tx).unwrap();
        drop(rx);

        opener.last_line().unwrap().push_inbound(b"nobody listening");

        for _ in 0..200 {
            if !reader.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!reader.is_running());
    }

    #[test]
    fn test_reader_exits_quietly_when_channel_closed() {
        let opener = MockOpener::new();
        let channel = open_channel(&opener);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _reader = DeviceReader::start(Arc::clone(&channel), tx).unwrap();

        channel.close();

        // No Ended event: a closed channel is a teardown, not a device fault.
        assert_eq!(recv_blocking(&mut rx), None);
    }
}
