use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use sr700_common::RoasterConfig;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("transport is not open")]
    NotOpen,
}

/// An open byte channel to the roaster.
pub trait Transport: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Blocks for at most the configured read timeout. `Ok(None)` means
    /// nothing arrived in time.
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError>;

    fn close(&mut self);
}

/// Opens transports; one call per connection attempt.
pub trait Connector: Send {
    fn open(&mut self) -> Result<Box<dyn Transport>, TransportError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout,
        }
    }

    pub fn from_config(config: &RoasterConfig) -> Self {
        Self::new(
            config.device_path.clone(),
            config.baud_rate,
            Duration::from_millis(config.read_timeout_ms),
        )
    }
}

impl Connector for SerialConnector {
    fn open(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.read_timeout)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|source| TransportError::Open {
                path: self.path.clone(),
                source,
            })?;

        info!(
            "opened {} at {} baud ({}ms read timeout)",
            self.path,
            self.baud_rate,
            self.read_timeout.as_millis()
        );
        Ok(Box::new(SerialTransport { port: Some(port) }))
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(bytes.len())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        let mut buf = [0u8; 1];
        match port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("serial port closed");
        }
    }
}
