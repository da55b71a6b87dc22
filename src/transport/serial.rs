//! Serial line configuration shared by the RTU and ASCII transports

use std::str::FromStr;
use std::time::Duration;

use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};

/// Serial parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    /// Bits added to each character frame by the parity setting
    fn bit_count(self) -> u32 {
        match self {
            Parity::None => 0,
            Parity::Even | Parity::Odd => 1,
        }
    }
}

impl FromStr for Parity {
    type Err = ModbusError;

    fn from_str(s: &str) -> ModbusResult<Self> {
        match s {
            "N" | "n" | "None" | "none" => Ok(Parity::None),
            "E" | "e" | "Even" | "even" => Ok(Parity::Even),
            "O" | "o" | "Odd" | "odd" => Ok(Parity::Odd),
            other => Err(ModbusError::config(format!(
                "unknown parity '{other}', expected N, E or O"
            ))),
        }
    }
}

/// Line parameters for an RTU or ASCII serial connection
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::Even,
            stop_bits: DEFAULT_STOP_BITS,
        }
    }
}

impl SerialSettings {
    /// Time one character occupies on the line (start bit included)
    pub fn character_time(&self) -> Duration {
        let bits =
            1 + u32::from(self.data_bits) + self.parity.bit_count() + u32::from(self.stop_bits);
        Duration::from_secs_f64(f64::from(bits) / f64::from(self.baud_rate.max(1)))
    }

    /// Inter-frame silent interval: 3.5 character times, at least 1.75 ms
    pub fn silent_interval(&self) -> Duration {
        self.character_time().mul_f64(3.5).max(MIN_SILENT_INTERVAL)
    }

    /// Time needed to move `bytes` characters over the line
    pub fn transmission_time(&self, bytes: usize) -> Duration {
        self.character_time()
            .mul_f64(bytes as f64)
    }

    /// Open the device with these line parameters
    pub(crate) fn open(&self, device: &str) -> ModbusResult<tokio_serial::SerialStream> {
        let data_bits = match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let parity = match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };
        let stop_bits = match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        debug!(
            "opening serial port {} @{} baud, {:?} parity",
            device, self.baud_rate, self.parity
        );
        tokio_serial::new(device, self.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .open_native_async()
            .map_err(|e| {
                ModbusError::connection(format!("failed to open serial port {device}: {e}"))
            })
    }
}
