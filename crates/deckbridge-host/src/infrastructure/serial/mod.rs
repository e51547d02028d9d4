//! Serial transport infrastructure.
//!
//! Owns the single byte channel to the peripheral: port enumeration, opening
//! at 9600 8N1, a dedicated reader thread, and paced one-byte writes.
//!
//! # Layering
//!
//! - [`SerialDriver`] is the OS seam: list ports and open raw read/write
//!   halves.  Production uses [`serialport_driver::SerialPortDriver`]; tests
//!   use [`mock::MockSerialDriver`].
//! - [`transport::SerialTransport`] is the connection state machine on top of
//!   a driver.  It is the only type that writes to the port.
//!
//! # Testability
//!
//! The mock driver records every written byte with a `tokio::time::Instant`
//! timestamp, so tests running on tokio's paused clock can assert the
//! settle delay and inter-byte gaps exactly.

use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

pub mod mock;
pub mod serialport_driver;
pub mod transport;

pub use transport::SerialTransport;

/// Status text published whenever an open link fails.
pub const LOST_CONNECTION_STATUS: &str = "Lost connection to peripheral";

// ── Settings ──────────────────────────────────────────────────────────────────

/// Line and pacing settings for one serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    /// Read quantum.  A read that times out is not an error.
    pub read_timeout: Duration,
    /// Delay between open and the first write, while the peripheral resets.
    pub settle_delay: Duration,
    /// Minimum gap between consecutive writes.
    pub inter_byte_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_secs(2),
            inter_byte_delay: Duration::from_millis(10),
        }
    }
}

// ── State and events ──────────────────────────────────────────────────────────

/// Connection state of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Open { port: String },
    /// The open link failed; writes are rejected until the next close/open.
    Lost { reason: String },
}

impl LinkState {
    pub fn is_open(&self) -> bool {
        matches!(self, LinkState::Open { .. })
    }
}

/// Delivered by the reader thread, in read order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Every byte returned by one read call.
    Bytes(Vec<u8>),
    /// The read failed fatally; the link is already marked lost.
    ReadFailed(String),
}

/// Stream of inbound chunks for one open connection.
pub type InboundStream = mpsc::UnboundedReceiver<TransportEvent>;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors produced by the serial transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {port}: {reason}")]
    PortUnavailable { port: String, reason: String },

    #[error("serial link is not connected")]
    NotConnected,

    #[error("serial link was lost")]
    ConnectionLost,

    #[error("serial write failed: {0}")]
    Io(#[source] std::io::Error),
}

// ── Driver seam ───────────────────────────────────────────────────────────────

/// Raw halves of an opened port.
///
/// The reader half is moved onto the reader thread; the writer half stays
/// with the transport.
pub struct PortHalves {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// Trait abstracting serial port access.
pub trait SerialDriver: Send + Sync {
    /// Stable system names of the ports present right now.
    fn list_ports(&self) -> Vec<String>;

    /// Opens `name` with the given line settings (always 8N1, no flow control).
    ///
    /// The reader half must return `ErrorKind::TimedOut` (or `WouldBlock`)
    /// when no byte arrives within `settings.read_timeout`.
    fn open(&self, name: &str, settings: &LinkSettings) -> Result<PortHalves, TransportError>;
}
