//! Production [`DeviceOpener`] backed by the `serialport` crate.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::{DeviceError, DeviceOpener, SerialDevice};

/// How long a single read may block before reporting "idle".
///
/// Bounds how long [`crate::DeviceReader::stop`] can take.
pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Opens real serial ports (8N1, no flow control).
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    read_timeout: Duration,
}

impl SerialPortOpener {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for SerialPortOpener {
    fn default() -> Self {
        Self::new(READ_TIMEOUT)
    }
}

impl DeviceOpener for SerialPortOpener {
    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialDevice>, DeviceError> {
        let handle = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| DeviceError::Unavailable {
                port: port.to_string(),
                source: io::Error::from(e),
            })?;
        Ok(Box::new(SerialPortDevice(handle)))
    }
}

struct SerialPortDevice(Box<dyn SerialPort>);

impl Read for SerialPortDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for SerialPortDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl SerialDevice for SerialPortDevice {
    fn try_clone_device(&self) -> io::Result<Box<dyn SerialDevice>> {
        let clone = self.0.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SerialPortDevice(clone)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BAUD_RATE;

    #[test]
    fn test_default_read_timeout_is_short() {
        let opener = SerialPortOpener::default();
        assert_eq!(opener.read_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_open_missing_port_is_unavailable() {
        // Act: a path that cannot be a serial device on any platform
        let result = SerialPortOpener::default().open("/nonexistent/vna-port", BAUD_RATE);

        // Assert
        assert!(matches!(
            result,
            Err(DeviceError::Unavailable { ref port, .. }) if port == "/nonexistent/vna-port"
        ));
    }
}
