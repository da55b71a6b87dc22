//! RTU framing for Modbus over serial lines
//!
//! ADU layout: slave address (1) + function code (1) + data + CRC-16 (2,
//! little-endian). The CRC covers everything before it.

use tracing::debug;

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::FrameCodec;
use crate::pdu::ModbusPdu;

/// CRC-16/MODBUS: reflected polynomial 0xA001, initial value 0xFFFF
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// RTU codec bound to one slave address
#[derive(Debug, Clone)]
pub struct RtuCodec {
    slave_id: u8,
}

impl RtuCodec {
    pub fn new(slave_id: u8) -> Self {
        Self { slave_id }
    }

    /// Slave address stamped into outgoing frames
    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }
}

impl Default for RtuCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SLAVE_ID)
    }
}

impl FrameCodec for RtuCodec {
    fn encode(&self, pdu: &ModbusPdu) -> ModbusResult<Vec<u8>> {
        let adu_len = 1 + 1 + pdu.data.len() + 2;
        if adu_len > RTU_MAX_ADU_SIZE {
            return Err(ModbusError::frame(format!(
                "ADU length {adu_len} exceeds maximum {RTU_MAX_ADU_SIZE}"
            )));
        }

        let mut adu = Vec::with_capacity(adu_len);
        adu.push(self.slave_id);
        adu.push(pdu.function_code);
        adu.extend_from_slice(&pdu.data);
        let crc = crc16(&adu);
        adu.extend_from_slice(&crc.to_le_bytes());

        debug!(
            "rtu encode: slave={} fc={:02X} crc={:04X}",
            self.slave_id, pdu.function_code, crc
        );
        Ok(adu)
    }

    fn decode(&self, adu: &[u8]) -> ModbusResult<ModbusPdu> {
        if adu.len() < RTU_MIN_ADU_SIZE {
            return Err(ModbusError::frame(format!(
                "RTU ADU length {} is below minimum {}",
                adu.len(),
                RTU_MIN_ADU_SIZE
            )));
        }

        let crc_offset = adu.len() - 2;
        let received = u16::from_le_bytes([adu[crc_offset], adu[crc_offset + 1]]);
        let computed = crc16(&adu[..crc_offset]);
        if received != computed {
            return Err(ModbusError::frame(format!(
                "CRC mismatch: computed {computed:04X}, received {received:04X}"
            )));
        }

        Ok(ModbusPdu::new(adu[1], adu[2..crc_offset].to_vec()))
    }

    fn verify(&self, request: &[u8], response: &[u8]) -> ModbusResult<()> {
        if request.is_empty() || response.len() < RTU_MIN_ADU_SIZE {
            return Err(ModbusError::frame("RTU ADU too short to verify"));
        }

        if request[0] != response[0] {
            return Err(ModbusError::frame(format!(
                "response slave address '{}' does not match request '{}'",
                response[0], request[0]
            )));
        }

        let crc_offset = response.len() - 2;
        let received = u16::from_le_bytes([response[crc_offset], response[crc_offset + 1]]);
        let computed = crc16(&response[..crc_offset]);
        if received != computed {
            return Err(ModbusError::frame(format!(
                "CRC mismatch: computed {computed:04X}, received {received:04X}"
            )));
        }

        Ok(())
    }
}
