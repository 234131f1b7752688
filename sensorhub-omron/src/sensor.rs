//! Serial port poll source.

use tokio_serial::SerialStream;
use tracing::debug;

use sensorhub_framework::{FetchError, Fields, PollSource};

use crate::frame;

/// Baud rate of the 2JCIE-BU USB serial interface.
pub const BAUD_RATE: u32 = 115_200;

/// One sensor on a serial port.
#[derive(Debug, Clone)]
pub struct SerialSensor {
    port: String,
    baud_rate: u32,
}

impl SerialSensor {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: BAUD_RATE,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl PollSource for SerialSensor {
    type Session = SerialStream;

    async fn connect(&self) -> Result<SerialStream, FetchError> {
        let builder = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One);

        let stream = SerialStream::open(&builder).map_err(|e| {
            FetchError::Connection(format!("Serial open failed on {}: {}", self.port, e))
        })?;
        debug!(port = %self.port, baud = self.baud_rate, "Serial port opened");
        Ok(stream)
    }

    async fn read(&self, session: &mut SerialStream) -> Result<Fields, FetchError> {
        frame::exchange(session).await
    }
}
