//! Production [`SerialDriver`] backed by the `serialport` crate.

use std::io::{self, Read, Write};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, warn};

use super::{LinkSettings, PortHalves, SerialDriver, TransportError};

/// Opens real serial ports at 8N1 without flow control.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortDriver;

impl SerialPortDriver {
    pub fn new() -> Self {
        Self
    }
}

impl SerialDriver for SerialPortDriver {
    fn list_ports(&self) -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => {
                let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
                debug!(count = names.len(), "enumerated serial ports");
                names
            }
            Err(e) => {
                warn!(error = %e, "serial port enumeration failed");
                Vec::new()
            }
        }
    }

    fn open(&self, name: &str, settings: &LinkSettings) -> Result<PortHalves, TransportError> {
        let unavailable = |e: serialport::Error| TransportError::PortUnavailable {
            port: name.to_string(),
            reason: e.to_string(),
        };

        let port = serialport::new(name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(unavailable)?;
        let reader = port.try_clone().map_err(unavailable)?;

        Ok(PortHalves {
            reader: Box::new(PortIo(reader)),
            writer: Box::new(PortIo(port)),
        })
    }
}

/// Adapts a boxed [`SerialPort`] to plain `Read`/`Write` trait objects.
struct PortIo(Box<dyn SerialPort>);

impl Read for PortIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PortIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
