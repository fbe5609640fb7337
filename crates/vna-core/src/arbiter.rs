//! Exclusive control of the serial device.
//!
//! The [`Arbiter`] owns a single slot holding the current occupant: an open
//! [`DeviceChannel`] plus the [`DeviceReader`] feeding one session.  The
//! policy is "newest client wins":
//!
//! ```text
//! acquire(B) while A occupies the slot:
//!   lock ─► stop A's reader ─► close A's channel ─► open B ─► start B's reader
//!        ─► install B ─► unlock ─► return guard(B)
//!
//! release(A) afterwards:
//!   lock ─► slot holds B, not A ─► no-op ─► unlock
//! ```
//!
//! Every slot mutation happens under one mutex, so an acquisition is atomic
//! with respect to other acquisitions and releases, and the previous
//! occupant is fully stopped and closed before the next port open.  Holding
//! the lock across device open/close makes `acquire` a blocking call bounded
//! by device latency; async callers should run it on a blocking thread.
//!
//! Each occupant is identified by a [`ControlHandle`] carrying a
//! monotonically increasing generation number.  `release` only acts if the
//! handle still names the current occupant, so a slow-to-exit old session can
//! never tear down the session that replaced it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::device::{lock, DeviceChannel, DeviceError, DeviceOpener, SerialPortOpener, BAUD_RATE};
use crate::reader::{DeviceReader, DeviceSink};

/// Identifies one occupant generation of the arbiter's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlHandle(u64);

impl ControlHandle {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Running totals, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    /// Successful acquisitions.
    pub acquisitions: u64,
    /// Occupants retired because a newer acquisition replaced them.
    pub evictions: u64,
    /// Releases that retired the current occupant.
    pub releases: u64,
    /// Releases that were no-ops because the handle had been superseded.
    pub stale_releases: u64,
}

struct Occupant {
    handle: ControlHandle,
    channel: Arc<DeviceChannel>,
    reader: DeviceReader,
}

impl Occupant {
    /// Stops the reader, then closes the channel.  Best effort, never fails.
    fn retire(mut self) {
        if !self.reader.is_running() {
            debug!(
                "generation {}: reader on {} had already finished",
                self.handle.0,
                self.channel.port()
            );
        }
        self.reader.stop();
        if !self.channel.close() {
            debug!(
                "generation {}: channel {} was already closed",
                self.handle.0,
                self.channel.port()
            );
        }
    }
}

#[derive(Default)]
struct Slot {
    last_generation: u64,
    occupant: Option<Occupant>,
}

#[derive(Default)]
struct Counters {
    acquisitions: AtomicU64,
    evictions: AtomicU64,
    releases: AtomicU64,
    stale_releases: AtomicU64,
}

/// Grants exclusive control of the device to one session at a time.
///
/// Construct one per process and share it (behind an `Arc`) with every
/// session.
pub struct Arbiter {
    opener: Arc<dyn DeviceOpener>,
    slot: Mutex<Slot>,
    counters: Counters,
}

impl Arbiter {
    pub fn new(opener: Arc<dyn DeviceOpener>) -> Self {
        Self {
            opener,
            slot: Mutex::new(Slot::default()),
            counters: Counters::default(),
        }
    }

    /// An arbiter that opens real serial ports.
    pub fn with_serial_ports() -> Self {
        Self::new(Arc::new(SerialPortOpener::default()))
    }

    /// Takes exclusive control of `port`, evicting any current occupant.
    ///
    /// Blocks until the previous occupant's reader has stopped and its
    /// channel is closed, then opens `port` and starts a reader delivering to
    /// `sink`.  The returned guard releases control when dropped.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Unavailable`] if the port cannot be opened, or
    /// [`DeviceError::ReaderSpawn`] if the reader thread cannot start.  On
    /// error nothing is installed; a previous occupant will already have been
    /// evicted, since the port cannot be opened twice.
    pub fn acquire(
        self: &Arc<Self>,
        port: &str,
        sink: DeviceSink,
    ) -> Result<ControlGuard, DeviceError> {
        let mut slot = lock(&self.slot);

        if let Some(previous) = slot.occupant.take() {
            info!(
                "evicting controller generation {} of {}",
                previous.handle.0,
                previous.channel.port()
            );
            previous.retire();
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }

        let channel = Arc::new(DeviceChannel::open(self.opener.as_ref(), port, BAUD_RATE)?);
        let reader = match DeviceReader::start(Arc::clone(&channel), sink) {
            Ok(reader) => reader,
            Err(e) => {
                channel.close();
                return Err(e);
            }
        };

        slot.last_generation += 1;
        let handle = ControlHandle(slot.last_generation);
        slot.occupant = Some(Occupant {
            handle,
            channel: Arc::clone(&channel),
            reader,
        });
        self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);

        debug!("generation {} now controls {port}", handle.0);

        Ok(ControlGuard {
            arbiter: Arc::clone(self),
            handle,
            channel,
            released: false,
        })
    }

    /// Retires the occupant named by `handle`, if it is still current.
    ///
    /// Returns `true` if the occupant was retired, `false` if `handle` had
    /// already been superseded (or released), in which case nothing changes.
    pub fn release(&self, handle: ControlHandle) -> bool {
        let mut slot = lock(&self.slot);

        let is_current = slot
            .occupant
            .as_ref()
            .is_some_and(|occupant| occupant.handle == handle);
        if !is_current {
            debug!("generation {}: stale release ignored", handle.0);
            self.counters.stale_releases.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if let Some(occupant) = slot.occupant.take() {
            occupant.retire();
        }
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
        debug!("generation {}: released", handle.0);
        true
    }

    /// The handle of the current occupant, if any.
    pub fn current(&self) -> Option<ControlHandle> {
        lock(&self.slot).occupant.as_ref().map(|o| o.handle)
    }

    pub fn stats(&self) -> ArbiterStats {
        ArbiterStats {
            acquisitions: self.counters.acquisitions.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            releases: self.counters.releases.load(Ordering::Relaxed),
            stale_releases: self.counters.stale_releases.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Arbiter {
    fn drop(&mut self) {
        if let Some(occupant) = lock(&self.slot).occupant.take() {
            warn!(
                "arbiter dropped while generation {} still held the device",
                occupant.handle.0
            );
            occupant.retire();
        }
    }
}

/// Scoped control of the device.
///
/// Dropping the guard (or calling [`release`](Self::release)) releases the
/// arbiter slot exactly once.  Release joins the reader thread, so in async
/// code move the guard onto a blocking thread before dropping it.
pub struct ControlGuard {
    arbiter: Arc<Arbiter>,
    handle: ControlHandle,
    channel: Arc<DeviceChannel>,
    released: bool,
}

impl ControlGuard {
    pub fn handle(&self) -> ControlHandle {
        self.handle
    }

    /// The channel this guard was granted.  Writes fail with
    /// [`DeviceError::Closed`] once the guard has been superseded.
    pub fn channel(&self) -> &Arc<DeviceChannel> {
        &self.channel
    }

    /// `true` while no newer acquisition has replaced this one.
    pub fn is_current(&self) -> bool {
        self.arbiter.current() == Some(self.handle)
    }

    /// Releases control now.  See [`Arbiter::release`] for the return value.
    pub fn release(mut self) -> bool {
        self.release_once()
    }

    fn release_once(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.arbiter.release(self.handle)
    }
}

impl Drop for ControlGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for ControlGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlGuard")
            .field("handle", &self.handle)
            .field("channel", &self.channel)
            .field("released", &self.released)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
