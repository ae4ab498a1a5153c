// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Byte transports to the radio modem.
//!
//! The modem speaks ESP3 over a local serial device (TCM310 on a UART, USB300
//! stick) or over TCP (serial-to-LAN gateways). Both are exposed through the
//! [`Transport`] trait as independently owned reader/writer halves, so the
//! reader can live on the I/O driver thread while the engine keeps the
//! writer. The supervisor owns the transport lifetime (open, close, reset,
//! reopen); the codec only borrows a half for a single read or write.

use crate::config::{ESP3_BAUD_RATE, VdcConfig};
use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Poll granularity of the blocking reader half.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Transport establishment / teardown faults.
#[derive(Debug)]
pub enum TransportError {
    /// Opening the serial device or TCP connection failed.
    Open(String),
    /// Cloning a transport half failed.
    Split(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(detail) => write!(f, "cannot open transport: {}", detail),
            Self::Split(detail) => write!(f, "cannot clone transport half: {}", detail),
        }
    }
}

impl std::error::Error for TransportError {}

/// A connected modem transport, splittable into reader and writer halves.
pub trait Transport: Send {
    /// An independently owned blocking reader half. Reads time out after
    /// [`READ_TIMEOUT`] so the driver thread stays interruptible; a timeout
    /// surfaces as `Ok(0)` or `ErrorKind::TimedOut`/`WouldBlock`.
    fn reader(&self) -> Result<Box<dyn Read + Send>, TransportError>;

    /// An independently owned writer half.
    fn writer(&self) -> Result<Box<dyn Write + Send>, TransportError>;

    /// Human-readable endpoint for logging.
    fn endpoint(&self) -> String;
}

/// Open the transport named by the configuration.
pub fn open(config: &VdcConfig) -> Result<Box<dyn Transport>, TransportError> {
    if config.is_tcp() {
        Ok(Box::new(TcpTransport::open(
            &config.connection,
            config.default_port,
        )?))
    } else {
        Ok(Box::new(SerialTransport::open(&config.connection)?))
    }
}

/// Local serial device, 57600 8N1 as ESP3 mandates.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialTransport {
    pub fn open(path: &str) -> Result<Self, TransportError> {
        let port = serialport::new(path, ESP3_BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Open(format!("{}: {}", path, e)))?;
        log::info!("[transport] serial {} open at {} baud", path, ESP3_BAUD_RATE);
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn reader(&self) -> Result<Box<dyn Read + Send>, TransportError> {
        self.port
            .try_clone()
            .map(|p| Box::new(p) as Box<dyn Read + Send>)
            .map_err(|e| TransportError::Split(e.to_string()))
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>, TransportError> {
        self.port
            .try_clone()
            .map(|p| Box::new(p) as Box<dyn Write + Send>)
            .map_err(|e| TransportError::Split(e.to_string()))
    }

    fn endpoint(&self) -> String {
        self.path.clone()
    }
}

/// TCP connection to a serial-to-LAN radio gateway.
pub struct TcpTransport {
    stream: TcpStream,
    endpoint: String,
}

impl TcpTransport {
    pub fn open(spec: &str, default_port: u16) -> Result<Self, TransportError> {
        let endpoint = if spec.contains(':') {
            spec.to_string()
        } else {
            format!("{}:{}", spec, default_port)
        };
        let stream = TcpStream::connect(&endpoint)
            .map_err(|e| TransportError::Open(format!("{}: {}", endpoint, e)))?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| TransportError::Open(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Open(e.to_string()))?;
        log::info!("[transport] tcp {} connected", endpoint);
        Ok(Self { stream, endpoint })
    }
}

impl Transport for TcpTransport {
    fn reader(&self) -> Result<Box<dyn Read + Send>, TransportError> {
        self.stream
            .try_clone()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
            .map_err(|e| TransportError::Split(e.to_string()))
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>, TransportError> {
        self.stream
            .try_clone()
            .map(|s| Box::new(s) as Box<dyn Write + Send>)
            .map_err(|e| TransportError::Split(e.to_string()))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// Hardware reset line of the modem (active high).
pub trait ResetPin: Send {
    fn set_asserted(&mut self, asserted: bool);
}

/// Reset line driven through the sysfs GPIO interface.
pub struct GpioResetPin {
    value_path: String,
}

impl GpioResetPin {
    /// Export and configure the GPIO as an output, initially released.
    pub fn new(gpio: u32) -> std::io::Result<Self> {
        let base = format!("/sys/class/gpio/gpio{}", gpio);
        if !std::path::Path::new(&base).exists() {
            std::fs::write("/sys/class/gpio/export", gpio.to_string())?;
        }
        std::fs::write(format!("{}/direction", base), "out")?;
        let pin = Self {
            value_path: format!("{}/value", base),
        };
        std::fs::write(&pin.value_path, "0")?;
        Ok(pin)
    }
}

impl ResetPin for GpioResetPin {
    fn set_asserted(&mut self, asserted: bool) {
        let value = if asserted { "1" } else { "0" };
        if let Err(e) = std::fs::write(&self.value_path, value) {
            log::error!("[transport] cannot drive reset pin {}: {}", self.value_path, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Loopback transport for exercising the modem link without hardware.

    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Writer half that appends into a shared buffer the test inspects.
    #[derive(Clone, Default)]
    pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Reset pin recording its transitions.
    #[derive(Clone, Default)]
    pub struct RecordingResetPin(pub Arc<Mutex<Vec<bool>>>);

    impl ResetPin for RecordingResetPin {
        fn set_asserted(&mut self, asserted: bool) {
            self.0.lock().unwrap().push(asserted);
        }
    }
}
