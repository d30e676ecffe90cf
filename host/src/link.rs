//! Serial transport to the lighting controller

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Serial write timed out")]
    Timeout,

    #[error("Serial I/O error: {0}")]
    Io(io::Error),

    #[error("Failed to open serial port: {0}")]
    Open(#[from] serialport::Error),
}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout,
            _ => LinkError::Io(e),
        }
    }
}

/// A line-oriented output to the actuator
pub trait ActuatorPort: Send {
    /// Write one complete frame
    fn send(&mut self, frame: &str) -> Result<(), LinkError>;
}

pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    /// Open a port; writes block for at most `timeout`
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, LinkError> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        info!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(Self { port })
    }
}

impl ActuatorPort for SerialLink {
    fn send(&mut self, frame: &str) -> Result<(), LinkError> {
        self.port.write_all(frame.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let e: LinkError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(e, LinkError::Timeout));

        let e: LinkError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(e, LinkError::Io(_)));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialLink::open("/dev/does-not-exist-chromalight", 115200, Duration::from_millis(50));
        assert!(result.is_err());
    }
}
