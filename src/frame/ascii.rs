//! ASCII framing for Modbus over serial lines
//!
//! The binary frame (slave address + function code + data + LRC) travels as
//! upper-case hex characters between a start colon and CR LF. The LRC is the
//! two's complement of the 8-bit sum of the binary bytes before it.

use tracing::debug;

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::FrameCodec;
use crate::pdu::ModbusPdu;

/// Longitudinal redundancy check over raw binary bytes
pub fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

fn hex_value(c: u8) -> ModbusResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(ModbusError::frame(format!(
            "invalid hex character {:#04X} in ASCII frame",
            c
        ))),
    }
}

fn decode_hex(chars: &[u8]) -> ModbusResult<Vec<u8>> {
    if chars.len() % 2 != 0 {
        return Err(ModbusError::frame(format!(
            "ASCII frame carries an odd number of hex characters ({})",
            chars.len()
        )));
    }
    let mut bytes = Vec::with_capacity(chars.len() / 2);
    for pair in chars.chunks_exact(2) {
        bytes.push(hex_value(pair[0])? << 4 | hex_value(pair[1])?);
    }
    Ok(bytes)
}

/// Strip the start colon and CR LF, returning the hex body
fn frame_body(adu: &[u8]) -> ModbusResult<&[u8]> {
    if adu.first() != Some(&ASCII_START) {
        return Err(ModbusError::frame("ASCII frame does not start with ':'"));
    }
    if !adu.ends_with(ASCII_END) {
        return Err(ModbusError::frame("ASCII frame does not end with CR LF"));
    }
    Ok(&adu[1..adu.len() - ASCII_END.len()])
}

/// ASCII codec bound to one slave address
#[derive(Debug, Clone)]
pub struct AsciiCodec {
    slave_id: u8,
}

impl AsciiCodec {
    pub fn new(slave_id: u8) -> Self {
        Self { slave_id }
    }

    /// Slave address stamped into outgoing frames
    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    fn decode_binary(adu: &[u8]) -> ModbusResult<Vec<u8>> {
        let binary = decode_hex(frame_body(adu)?)?;
        if binary.len() < 3 {
            return Err(ModbusError::frame(format!(
                "ASCII frame too short: {} binary bytes",
                binary.len()
            )));
        }
        let lrc_offset = binary.len() - 1;
        let computed = lrc(&binary[..lrc_offset]);
        if binary[lrc_offset] != computed {
            return Err(ModbusError::frame(format!(
                "LRC mismatch: computed {:02X}, received {:02X}",
                computed, binary[lrc_offset]
            )));
        }
        Ok(binary)
    }
}

impl Default for AsciiCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SLAVE_ID)
    }
}

impl FrameCodec for AsciiCodec {
    fn encode(&self, pdu: &ModbusPdu) -> ModbusResult<Vec<u8>> {
        let adu_len = 1 + 2 * (2 + pdu.data.len() + 1) + ASCII_END.len();
        if adu_len > ASCII_MAX_ADU_SIZE {
            return Err(ModbusError::frame(format!(
                "ADU length {adu_len} exceeds maximum {ASCII_MAX_ADU_SIZE}"
            )));
        }

        let mut binary = Vec::with_capacity(2 + pdu.data.len());
        binary.push(self.slave_id);
        binary.push(pdu.function_code);
        binary.extend_from_slice(&pdu.data);
        let check = lrc(&binary);

        let mut adu = Vec::with_capacity(adu_len);
        adu.push(ASCII_START);
        for byte in binary.iter().chain(std::iter::once(&check)) {
            adu.extend_from_slice(format!("{byte:02X}").as_bytes());
        }
        adu.extend_from_slice(ASCII_END);

        debug!(
            "ascii encode: slave={} fc={:02X} lrc={:02X}",
            self.slave_id, pdu.function_code, check
        );
        Ok(adu)
    }

    fn decode(&self, adu: &[u8]) -> ModbusResult<ModbusPdu> {
        let binary = Self::decode_binary(adu)?;
        Ok(ModbusPdu::new(
            binary[1],
            binary[2..binary.len() - 1].to_vec(),
        ))
    }

    fn verify(&self, request: &[u8], response: &[u8]) -> ModbusResult<()> {
        let request_binary = decode_hex(frame_body(request)?)?;
        let response_binary = Self::decode_binary(response)?;

        if request_binary.is_empty() {
            return Err(ModbusError::frame("empty request frame"));
        }
        if request_binary[0] != response_binary[0] {
            return Err(ModbusError::frame(format!(
                "response slave address '{}' does not match request '{}'",
                response_binary[0], request_binary[0]
            )));
        }
        Ok(())
    }
}
