//! RTU transport over a serial line
//!
//! RTU frames carry no length field, so the reader discovers the response
//! size from the function code: first the address and function code, then a
//! per-function data plan, then the CRC. The transport also enforces the
//! 3.5-character silent interval between consecutive frames on the bus.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_serial::SerialStream;
use tracing::{debug, info, trace, warn};

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::transport::serial::{Parity, SerialSettings};
use crate::transport::{with_deadline, ModbusTransport};

/// Size of the data portion of a normal response, between the function code
/// and the CRC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseDataPlan {
    /// Fixed number of data bytes
    Fixed(usize),
    /// One leading byte announces how many bytes follow it
    BytePrefixed,
    /// A two-byte big-endian count announces how many bytes follow it
    WordPrefixed,
    /// Device identification object list, walked entry by entry
    DeviceIdentification,
}

/// Dispatch table from function code to response length rule
pub(crate) fn response_data_plan(function_code: u8) -> ModbusResult<ResponseDataPlan> {
    match function_code {
        FC_WRITE_SINGLE_COIL
        | FC_WRITE_SINGLE_REGISTER
        | FC_WRITE_MULTIPLE_COILS
        | FC_WRITE_MULTIPLE_REGISTERS => Ok(ResponseDataPlan::Fixed(4)),
        FC_MASK_WRITE_REGISTER => Ok(ResponseDataPlan::Fixed(6)),
        FC_READ_COILS
        | FC_READ_DISCRETE_INPUTS
        | FC_READ_HOLDING_REGISTERS
        | FC_READ_INPUT_REGISTERS
        | FC_READ_WRITE_MULTIPLE_REGISTERS
        | FC_WRITE_FILE_RECORD => Ok(ResponseDataPlan::BytePrefixed),
        FC_READ_FIFO_QUEUE => Ok(ResponseDataPlan::WordPrefixed),
        FC_READ_DEVICE_IDENTIFICATION => Ok(ResponseDataPlan::DeviceIdentification),
        other => Err(ModbusError::frame(format!(
            "no response length rule for function code {other:#04X}"
        ))),
    }
}

struct RtuSession {
    port: Option<SerialStream>,
    /// When the previous request/response cycle finished on the bus
    last_frame_end: Option<Instant>,
}

/// Transport over one RTU serial connection
pub struct RtuTransport {
    device: String,
    settings: SerialSettings,
    timeout: Duration,
    session: Mutex<RtuSession>,
}

impl RtuTransport {
    /// Create a transport for `device` with the default line parameters
    /// (19200 baud, 8 data bits, even parity, 1 stop bit)
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            settings: SerialSettings::default(),
            timeout: DEFAULT_SERIAL_TIMEOUT,
            session: Mutex::new(RtuSession {
                port: None,
                last_frame_end: None,
            }),
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

    /// Base read timeout. Zero disables deadlines entirely.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Device path this transport opens
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Deadline for moving `bytes` characters: configured timeout plus the
    /// time the line itself needs, plus one silent interval of margin
    fn read_limit(&self, bytes: usize) -> Duration {
        if self.timeout.is_zero() {
            return Duration::ZERO;
        }
        self.timeout + self.settings.transmission_time(bytes) + self.settings.silent_interval()
    }

    fn check_remaining(&self, current: usize, incoming: usize) -> ModbusResult<()> {
        // Two CRC bytes still follow whatever is announced
        if current + incoming + 2 > RTU_MAX_ADU_SIZE {
            return Err(ModbusError::frame(format!(
                "announced response length {} exceeds maximum ADU size {}",
                current + incoming + 2,
                RTU_MAX_ADU_SIZE
            )));
        }
        Ok(())
    }

    async fn read_bytes(
        &self,
        port: &mut SerialStream,
        adu: &mut Vec<u8>,
        count: usize,
    ) -> ModbusResult<()> {
        let start = adu.len();
        adu.resize(start + count, 0);
        with_deadline(
            self.read_limit(count),
            "read RTU response",
            port.read_exact(&mut adu[start..]),
        )
        .await?;
        Ok(())
    }

    async fn read_response(&self, port: &mut SerialStream) -> ModbusResult<Vec<u8>> {
        let mut adu = Vec::with_capacity(RTU_MAX_ADU_SIZE);

        // Slave address + function code
        self.read_bytes(port, &mut adu, 2).await?;
        let function_code = adu[1];

        if function_code & EXCEPTION_FLAG != 0 {
            // Exception code + CRC
            self.read_bytes(port, &mut adu, 3).await?;
            return Ok(adu);
        }

        match response_data_plan(function_code)? {
            ResponseDataPlan::Fixed(data_len) => {
                self.read_bytes(port, &mut adu, data_len).await?;
            }
            ResponseDataPlan::BytePrefixed => {
                self.read_bytes(port, &mut adu, 1).await?;
                let count = usize::from(adu[2]);
                self.check_remaining(adu.len(), count)?;
                self.read_bytes(port, &mut adu, count).await?;
            }
            ResponseDataPlan::WordPrefixed => {
                self.read_bytes(port, &mut adu, 2).await?;
                let count = usize::from(u16::from_be_bytes([adu[2], adu[3]]));
                self.check_remaining(adu.len(), count)?;
                self.read_bytes(port, &mut adu, count).await?;
            }
            ResponseDataPlan::DeviceIdentification => {
                // MEI type, device id code, conformity level, more follows,
                // next object id, number of objects
                self.read_bytes(port, &mut adu, 6).await?;
                let object_count = usize::from(adu[7]);
                for _ in 0..object_count {
                    self.read_bytes(port, &mut adu, 2).await?;
                    let value_len = usize::from(adu[adu.len() - 1]);
                    self.check_remaining(adu.len(), value_len)?;
                    self.read_bytes(port, &mut adu, value_len).await?;
                }
            }
        }

        // CRC
        self.read_bytes(port, &mut adu, 2).await?;
        Ok(adu)
    }
}

#[async_trait]
impl ModbusTransport for RtuTransport {
    async fn send(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
        let mut session = self.session.lock().await;
        if session.port.is_none() {
            session.port = Some(self.settings.open(&self.device)?);
            info!("opened {}", self.device);
        }

        // Leave the bus silent between frames
        if let Some(last_frame_end) = session.last_frame_end {
            let interval = self.settings.silent_interval();
            let elapsed = last_frame_end.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }

        let Some(port) = session.port.as_mut() else {
            return Err(ModbusError::connection("not connected"));
        };

        trace!("rtu tx: {request:02X?}");
        let outcome: ModbusResult<Vec<u8>> = async {
            with_deadline(
                self.read_limit(request.len()),
                "write request",
                port.write_all(request),
            )
            .await?;
            with_deadline(self.read_limit(0), "flush request", port.flush()).await?;
            self.read_response(port).await
        }
        .await;

        session.last_frame_end = Some(Instant::now());
        match &outcome {
            Ok(adu) => trace!("rtu rx: {adu:02X?}"),
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
