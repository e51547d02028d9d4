//! SerialTransport: the connection state machine over a [`SerialDriver`].
//!
//! ```text
//! Closed ──open()──▶ Open ──read/write error──▶ Lost
//!   ▲                 │                          │
//!   └────close()──────┴─────────close()──────────┘
//! ```
//!
//! Opening while `Open` or `Lost` closes first.  The transport never
//! reconnects on its own.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    InboundStream, LinkSettings, LinkState, SerialDriver, TransportError, TransportEvent,
};

/// Size of the reader thread's read buffer.  At 9600 baud one 100 ms quantum
/// carries at most ~96 bytes.
const READ_BUFFER_SIZE: usize = 128;

/// Link state shared between the transport and its reader thread.
struct LinkShared {
    state: watch::Sender<LinkState>,
    transitions: mpsc::UnboundedSender<LinkState>,
}

impl LinkShared {
    fn set(&self, next: LinkState) {
        self.state.send_replace(next.clone());
        let _ = self.transitions.send(next);
    }

    /// Moves `Open → Lost`.  Returns `false` if the link was not open, so a
    /// read failure and a write failure racing each other report only once.
    fn mark_lost(&self, reason: &str) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if state.is_open() {
                *state = LinkState::Lost {
                    reason: reason.to_string(),
                };
                true
            } else {
                false
            }
        });
        if changed {
            let _ = self.transitions.send(LinkState::Lost {
                reason: reason.to_string(),
            });
        }
        changed
    }

    fn snapshot(&self) -> LinkState {
        self.state.borrow().clone()
    }
}

/// Owns one serial connection at a time.
pub struct SerialTransport {
    driver: Arc<dyn SerialDriver>,
    settings: LinkSettings,
    shared: Arc<LinkShared>,
    writer: Option<Box<dyn Write + Send>>,
    reader_stop: Option<Arc<AtomicBool>>,
    /// Earliest instant the next write may go out (settle deadline or inter-byte gap).
    next_write_at: Instant,
}

impl SerialTransport {
    /// Creates a closed transport and returns it together with the receiver
    /// of every link state transition.
    pub fn new(
        driver: Arc<dyn SerialDriver>,
        settings: LinkSettings,
    ) -> (Self, mpsc::UnboundedReceiver<LinkState>) {
        let (state, _) = watch::channel(LinkState::Closed);
        let (transitions, transitions_rx) = mpsc::unbounded_channel();
        let transport = Self {
            driver,
            settings,
            shared: Arc::new(LinkShared { state, transitions }),
            writer: None,
            reader_stop: None,
            next_write_at: Instant::now(),
        };
        (transport, transitions_rx)
    }

    /// A watch on the link state, readable without any lock on the transport.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> LinkState {
        self.shared.snapshot()
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.borrow().is_open()
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Lists available ports.  Never fails; the driver logs enumeration errors.
    pub fn list_ports(&self) -> Vec<String> {
        self.driver.list_ports()
    }

    /// Opens `port` and starts the reader thread.
    ///
    /// The first write after a successful open waits for the settle delay.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PortUnavailable`] if the driver cannot open
    /// the port or the reader thread cannot be spawned.  The transport is then
    /// `Closed`.
    pub fn open(&mut self, port: &str) -> Result<InboundStream, TransportError> {
        self.close();

        let halves = self.driver.open(port, &self.settings)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let reader_stop = Arc::clone(&stop);
        let reader_shared = Arc::clone(&self.shared);
        let reader_port = port.to_string();
        let reader = halves.reader;
        std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || run_reader(reader, tx, reader_stop, reader_shared, reader_port))
            .map_err(|e| TransportError::PortUnavailable {
                port: port.to_string(),
                reason: format!("failed to start reader thread: {e}"),
            })?;

        self.writer = Some(halves.writer);
        self.reader_stop = Some(stop);
        self.next_write_at = Instant::now() + self.settings.settle_delay;
        self.shared.set(LinkState::Open {
            port: port.to_string(),
        });
        info!(
            port,
            baud = self.settings.baud_rate,
            settle_ms = self.settings.settle_delay.as_millis() as u64,
            "serial link opened"
        );
        Ok(rx)
    }

    /// Stops the reader and drops the port.  Idempotent.
    pub fn close(&mut self) {
        if let Some(stop) = self.reader_stop.take() {
            stop.store(true, Ordering::Release);
        }
        self.writer = None;
        if self.shared.snapshot() != LinkState::Closed {
            self.shared.set(LinkState::Closed);
            info!("serial link closed");
        }
    }

    /// Writes and flushes one byte, honouring the settle deadline and the
    /// inter-byte gap.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`] while closed.
    /// - [`TransportError::ConnectionLost`] once the link has failed.
    /// - [`TransportError::Io`] for the write that fails; the link becomes `Lost`.
    pub async fn write(&mut self, byte: u8) -> Result<(), TransportError> {
        self.ensure_open()?;
        tokio::time::sleep_until(self.next_write_at).await;
        // The reader may have lost the link while we waited.
        self.ensure_open()?;

        let Some(writer) = self.writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        // Blocking: one byte at 9600 baud drains in about a millisecond.
        match writer.write_all(&[byte]).and_then(|()| writer.flush()) {
            Ok(()) => {
                self.next_write_at = Instant::now() + self.settings.inter_byte_delay;
                Ok(())
            }
            Err(e) => {
                let reason = format!("write failed: {e}");
                error!(byte = %char::from(byte), error = %e, "serial write failed");
                self.shared.mark_lost(&reason);
                Err(TransportError::Io(e))
            }
        }
    }

    /// Fails fast with the error a write would return right now.
    pub fn ensure_open(&self) -> Result<(), TransportError> {
        match self.shared.snapshot() {
            LinkState::Open { .. } => Ok(()),
            LinkState::Lost { .. } => Err(TransportError::ConnectionLost),
            LinkState::Closed => Err(TransportError::NotConnected),
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(stop) = self.reader_stop.take() {
            stop.store(true, Ordering::Release);
        }
    }
}

/// Reader thread body.  Blocks only on the port read.
fn run_reader(
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::UnboundedSender<TransportEvent>,
    stop: Arc<AtomicBool>,
    shared: Arc<LinkShared>,
    port: String,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    debug!(port = %port, "serial reader started");
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match reader.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                if tx.send(TransportEvent::Bytes(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => {
                // A close() racing the read surfaces here as an error; that is not a loss.
                if stop.load(Ordering::Acquire) {
                    break;
                }
                let reason = format!("read from {port} failed: {e}");
                warn!(port = %port, error = %e, "serial read failed");
                shared.mark_lost(&reason);
                let _ = tx.send(TransportEvent::ReadFailed(reason));
                break;
            }
        }
    }
    debug!(port = %port, "serial reader stopped");
}
