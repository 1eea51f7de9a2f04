//! A [serialport] backed transport for [`Mhs5200`](crate::mhs5200::Mhs5200).
//!
//! The port is opened at 57600 8N1 with a short read timeout. The session does
//! its own response timing, a read timing out here only means no byte has
//! arrived yet.

use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::config::{BAUD_RATE, Config};

/// An open serial port, usable as an [embedded_io] transport.
pub struct SerialTransport(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                embedded_io::ErrorKind::TimedOut
            }
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for SerialTransport {
    type Error = IoError;
}

impl embedded_io::Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

impl SerialTransport {
    /// Open the port named in the config.
    pub fn open(config: &Config) -> Result<Self, serialport::Error> {
        log::debug!("opening {} at {} baud", config.port, BAUD_RATE);
        let port = serialport::new(&config.port, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(config.read_timeout)
            .open()?;
        Ok(Self(port))
    }

    pub fn name(&self) -> Option<String> {
        self.0.name()
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, serialport::Error> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, ErrorKind};

    #[test]
    fn test_read_timeouts_are_not_fatal() {
        let timeout = IoError(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(timeout.kind(), ErrorKind::TimedOut);
        let would_block = IoError(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        assert_eq!(would_block.kind(), ErrorKind::TimedOut);
        let gone = IoError(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert_eq!(gone.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = Config::new("/dev/this-port-does-not-exist");
        assert!(SerialTransport::open(&config).is_err());
    }
}
