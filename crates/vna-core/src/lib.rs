//! # vna-core
//!
//! Device-side building blocks for the NanoVNA web bridge: everything that
//! touches the serial port, and nothing that touches a socket.
//!
//! # Architecture overview (for beginners)
//!
//! A NanoVNA is a small vector network analyzer that talks to its host over a
//! USB serial port.  The web bridge lets exactly one browser at a time drive
//! that port.  This crate provides the pieces that make the "exactly one"
//! guarantee hold:
//!
//! - **`device`** – The [`DeviceChannel`]: one open serial port with
//!   `open` / `write` / `read_chunk` / `close`.  The OS handle is hidden
//!   behind the [`SerialDevice`] and [`DeviceOpener`] traits so tests can
//!   substitute the in-memory [`device::mock`] device.
//!
//! - **`reader`** – The [`DeviceReader`]: a dedicated OS thread that pumps
//!   bytes from a channel into a session's [`DeviceSink`].
//!
//! - **`arbiter`** – The [`Arbiter`]: a single slot holding the current
//!   (channel, reader) pair.  A new [`Arbiter::acquire`] evicts the previous
//!   occupant; a stale [`Arbiter::release`] is a no-op.
//!
//! - **`codec`** – The lossless byte ↔ code-point mapping used to carry raw
//!   serial bytes inside WebSocket text frames.
//!
//! ```text
//!  session ──acquire──► Arbiter ──open──► DeviceChannel ◄──read_chunk── DeviceReader
//!     ▲                                        ▲                           │
//!     │                                        └──────── write ◄───────────┤ (session)
//!     └──────────────── DeviceEvent (mpsc) ◄───────────────────────────────┘
//! ```

pub mod arbiter;
pub mod codec;
pub mod device;
pub mod reader;

pub use arbiter::{Arbiter, ArbiterStats, ControlGuard, ControlHandle};
pub use codec::{decode_payload, encode_payload, CodecError};
pub use device::{
    DeviceChannel, DeviceError, DeviceOpener, ReadOutcome, SerialDevice, SerialPortOpener,
    BAUD_RATE,
};
pub use reader::{DeviceEnd, DeviceEvent, DeviceReader, DeviceSink};
