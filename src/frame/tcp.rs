//! MBAP framing for Modbus TCP
//!
//! ADU layout: transaction id (2) + protocol id (2) + length (2) +
//! unit id (1) + function code (1) + data. The length field counts the unit
//! id and everything after it.

use std::sync::atomic::{AtomicU16, Ordering};

use tracing::debug;

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::FrameCodec;
use crate::pdu::ModbusPdu;

/// MBAP codec with a per-codec wrapping transaction counter
#[derive(Debug)]
pub struct TcpCodec {
    unit_id: u8,
    /// Last assigned transaction id. The first encode stamps 1; the counter
    /// wraps through 0 at 2^16.
    transaction_id: AtomicU16,
}

impl TcpCodec {
    /// Create a codec stamping the given unit identifier
    ///
    /// 0xFF is conventional for plain TCP devices, 0x01 is typical when
    /// addressing a serial slave behind a gateway.
    pub fn new(unit_id: u8) -> Self {
        Self {
            unit_id,
            transaction_id: AtomicU16::new(0),
        }
    }

    /// Unit identifier stamped into outgoing frames
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    fn next_transaction_id(&self) -> u16 {
        self.transaction_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }
}

impl Default for TcpCodec {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_UNIT_ID)
    }
}

impl FrameCodec for TcpCodec {
    fn encode(&self, pdu: &ModbusPdu) -> ModbusResult<Vec<u8>> {
        let adu_len = TCP_HEADER_SIZE + 1 + pdu.data.len();
        if adu_len > TCP_MAX_ADU_SIZE {
            return Err(ModbusError::frame(format!(
                "ADU length {adu_len} exceeds maximum {TCP_MAX_ADU_SIZE}"
            )));
        }

        let transaction_id = self.next_transaction_id();
        let length = (pdu.data.len() + 2) as u16;

        let mut adu = Vec::with_capacity(adu_len);
        adu.extend_from_slice(&transaction_id.to_be_bytes());
        adu.extend_from_slice(&TCP_PROTOCOL_ID.to_be_bytes());
        adu.extend_from_slice(&length.to_be_bytes());
        adu.push(self.unit_id);
        adu.push(pdu.function_code);
        adu.extend_from_slice(&pdu.data);

        debug!(
            "mbap encode: txn={:04X} unit={} fc={:02X} len={}",
            transaction_id, self.unit_id, pdu.function_code, length
        );
        Ok(adu)
    }

    fn decode(&self, adu: &[u8]) -> ModbusResult<ModbusPdu> {
        if adu.len() < TCP_MIN_ADU_SIZE {
            return Err(ModbusError::frame(format!(
                "TCP ADU length {} is below minimum {}",
                adu.len(),
                TCP_MIN_ADU_SIZE
            )));
        }
        Ok(ModbusPdu::new(
            adu[TCP_HEADER_SIZE],
            adu[TCP_HEADER_SIZE + 1..].to_vec(),
        ))
    }

    fn verify(&self, request: &[u8], response: &[u8]) -> ModbusResult<()> {
        if request.len() < TCP_HEADER_SIZE || response.len() < TCP_HEADER_SIZE {
            return Err(ModbusError::frame("ADU shorter than MBAP header"));
        }

        let req_transaction = u16::from_be_bytes([request[0], request[1]]);
        let resp_transaction = u16::from_be_bytes([response[0], response[1]]);
        if req_transaction != resp_transaction {
            return Err(ModbusError::frame(format!(
                "response transaction id '{resp_transaction}' does not match request '{req_transaction}'"
            )));
        }

        let resp_protocol = u16::from_be_bytes([response[2], response[3]]);
        if resp_protocol != TCP_PROTOCOL_ID {
            return Err(ModbusError::frame(format!(
                "response protocol id '{resp_protocol}' must be {TCP_PROTOCOL_ID}"
            )));
        }

        if request[6] != response[6] {
            return Err(ModbusError::frame(format!(
                "response unit id '{}' does not match request '{}'",
                response[6], request[6]
            )));
        }

        let resp_length = u16::from_be_bytes([response[4], response[5]]) as usize;
        if resp_length != response.len() - (TCP_HEADER_SIZE - 1) {
            return Err(ModbusError::frame(format!(
                "response length field '{}' does not match frame size '{}'",
                resp_length,
                response.len()
            )));
        }

        Ok(())
    }
}
