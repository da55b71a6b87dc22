//! Framing codecs
//!
//! A codec wraps a PDU into the application data unit of one wire framing
//! and back. All three framings share the same three-step contract, so the
//! dispatcher never needs to know which one is in use.

mod ascii;
mod rtu;
mod tcp;

pub use ascii::{lrc, AsciiCodec};
pub use rtu::{crc16, RtuCodec};
pub use tcp::TcpCodec;

use crate::error::ModbusResult;
use crate::pdu::ModbusPdu;

/// Encoding, decoding and cross-checking of one ADU format
pub trait FrameCodec: Send + Sync {
    /// Wrap a PDU into an ADU ready to be written to the wire
    fn encode(&self, pdu: &ModbusPdu) -> ModbusResult<Vec<u8>>;

    /// Unwrap a received ADU back into a PDU, validating the frame checksum
    /// or header along the way
    fn decode(&self, adu: &[u8]) -> ModbusResult<ModbusPdu>;

    /// Cross-check framing-level fields between a request ADU and the ADU
    /// received in response to it
    fn verify(&self, request: &[u8], response: &[u8]) -> ModbusResult<()>;
}
