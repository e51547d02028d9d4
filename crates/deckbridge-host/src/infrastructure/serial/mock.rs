//! Mock serial driver for unit and integration testing.
//!
//! Records every byte written with the tokio clock's timestamp and lets tests
//! inject inbound bytes or failures, as if produced by a real peripheral.
//! Clones share state, so a test keeps one handle while the transport owns
//! another.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::{LinkSettings, PortHalves, SerialDriver, TransportError};

/// One byte seen on the mock wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenByte {
    pub byte: u8,
    pub at: Instant,
}

enum MockRead {
    Bytes(Vec<u8>),
    Fail(String),
}

#[derive(Default)]
struct MockState {
    ports: Mutex<Vec<String>>,
    written: Mutex<Vec<WrittenByte>>,
    inbound: Mutex<Option<mpsc::Sender<MockRead>>>,
    fail_writes: AtomicBool,
    open_count: AtomicUsize,
}

/// A mock implementation of [`SerialDriver`].
#[derive(Clone, Default)]
pub struct MockSerialDriver {
    state: Arc<MockState>,
}

impl MockSerialDriver {
    /// Creates a driver exposing the given port names.
    pub fn new(ports: &[&str]) -> Self {
        let driver = Self::default();
        driver.set_ports(ports);
        driver
    }

    pub fn set_ports(&self, ports: &[&str]) {
        *self.state.ports.lock().expect("lock poisoned") =
            ports.iter().map(|p| p.to_string()).collect();
    }

    /// Injects bytes as one read chunk on the currently open port.
    ///
    /// Panics if no port has been opened.
    pub fn inject_inbound(&self, bytes: &[u8]) {
        self.send(MockRead::Bytes(bytes.to_vec()));
    }

    /// Makes the next read on the open port fail with `reason`.
    pub fn inject_read_failure(&self, reason: &str) {
        self.send(MockRead::Fail(reason.to_string()));
    }

    /// When `true`, every write fails with `BrokenPipe`.
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<WrittenByte> {
        self.state.written.lock().expect("lock poisoned").clone()
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.written().iter().map(|w| w.byte).collect()
    }

    /// The written bytes as text, convenient for comparing against `"DDV"`.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written_bytes()).into_owned()
    }

    pub fn clear_written(&self) {
        self.state.written.lock().expect("lock poisoned").clear();
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.state.open_count.load(Ordering::SeqCst)
    }

    fn send(&self, read: MockRead) {
        let guard = self.state.inbound.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sender) => sender
                .send(read)
                .expect("reader has gone away; is the port still open?"),
            None => panic!("MockSerialDriver: inject called before open()"),
        }
    }
}

impl SerialDriver for MockSerialDriver {
    fn list_ports(&self) -> Vec<String> {
        self.state.ports.lock().expect("lock poisoned").clone()
    }

    fn open(&self, name: &str, settings: &LinkSettings) -> Result<PortHalves, TransportError> {
        if !self.list_ports().iter().any(|p| p == name) {
            return Err(TransportError::PortUnavailable {
                port: name.to_string(),
                reason: "no such port".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel();
        *self.state.inbound.lock().expect("lock poisoned") = Some(tx);
        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(PortHalves {
            reader: Box::new(MockReader {
                rx,
                timeout: settings.read_timeout,
                pending: VecDeque::new(),
            }),
            writer: Box::new(MockWriter {
                state: Arc::clone(&self.state),
            }),
        })
    }
}

struct MockReader {
    rx: mpsc::Receiver<MockRead>,
    timeout: Duration,
    pending: VecDeque<u8>,
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.timeout) {
                Ok(MockRead::Bytes(bytes)) => self.pending.extend(bytes),
                Ok(MockRead::Fail(reason)) => return Err(io::Error::other(reason)),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock port closed"))
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

struct MockWriter {
    state: Arc<MockState>,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        let now = Instant::now();
        let mut written = self.state.written.lock().expect("lock poisoned");
        written.extend(buf.iter().map(|&byte| WrittenByte { byte, at: now }));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
