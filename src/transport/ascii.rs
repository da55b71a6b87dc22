//! ASCII transport over a serial line
//!
//! ASCII frames are self-delimiting: the response is everything up to and
//! including CR LF, so the reader collects bytes until it sees the
//! terminator or the read deadline fires.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::SerialStream;
use tracing::{debug, info, trace, warn};

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::transport::serial::{Parity, SerialSettings};
use crate::transport::{with_deadline, ModbusTransport};

struct AsciiSession {
    port: Option<SerialStream>,
}

/// Transport over one ASCII serial connection
pub struct AsciiTransport {
    device: String,
    settings: SerialSettings,
    timeout: Duration,
    session: Mutex<AsciiSession>,
}

impl AsciiTransport {
    /// Create a transport for `device` with the default line parameters
    /// (19200 baud, 8 data bits, even parity, 1 stop bit)
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            settings: SerialSettings::default(),
            timeout: DEFAULT_SERIAL_TIMEOUT,
            session: Mutex::new(AsciiSession { port: None }),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: u8) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Read timeout for the whole response line. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Device path this transport opens
    pub fn device(&self) -> &str {
        &self.device
    }

    async fn read_line(&self, port: &mut SerialStream) -> ModbusResult<Vec<u8>> {
        let read = async {
            let mut response: Vec<u8> = Vec::with_capacity(64);
            let mut byte = [0u8; 1];
            loop {
                port.read_exact(&mut byte).await.map_err(ModbusError::from)?;
                response.push(byte[0]);
                if response.len() > ASCII_MAX_ADU_SIZE {
                    return Err(ModbusError::frame(
                        "ASCII response exceeds maximum frame size",
                    ));
                }
                if response.ends_with(ASCII_END) {
                    return Ok(response);
                }
            }
        };

        let response = if self.timeout.is_zero() {
            read.await?
        } else {
            match tokio::time::timeout(self.timeout, read).await {
                Ok(result) => result?,
                Err(_) => return Err(ModbusError::timeout("read ASCII response")),
            }
        };

        if response.first() != Some(&ASCII_START) {
            return Err(ModbusError::frame(
                "ASCII response does not start with ':'",
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ModbusTransport for AsciiTransport {
    async fn send(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
        let mut session = self.session.lock().await;
        if session.port.is_none() {
            session.port = Some(self.settings.open(&self.device)?);
            info!("opened {}", self.device);
        }
        let Some(port) = session.port.as_mut() else {
            return Err(ModbusError::connection("not connected"));
        };

        trace!("ascii tx: {}", String::from_utf8_lossy(request).trim_end());
        let outcome: ModbusResult<Vec<u8>> = async {
            with_deadline(self.timeout, "write request", port.write_all(request)).await?;
            with_deadline(self.timeout, "flush request", port.flush()).await?;
            self.read_line(port).await
        }
        .await;

        match &outcome {
            Ok(response) => {
                trace!("ascii rx: {}", String::from_utf8_lossy(response).trim_end());
            }
            Err(ModbusError::Io(_)) | Err(ModbusError::Timeout(_)) => {
                warn!("closing {} after transport error", self.device);
                session.port = None;
            }
            Err(_) => {}
        }
        outcome
    }

    async fn connect(&self) -> ModbusResult<()> {
        let mut session = self.session.lock().await;
        if session.port.is_none() {
            session.port = Some(self.settings.open(&self.device)?);
            info!("opened {}", self.device);
        }
        Ok(())
    }

    async fn close(&self) -> ModbusResult<()> {
        let mut session = self.session.lock().await;
        if session.port.take().is_some() {
            debug!("closed {}", self.device);
        }
        Ok(())
    }
}
