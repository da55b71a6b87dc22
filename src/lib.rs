//! # Modbus Link - Modbus TCP/RTU/ASCII Client Library
//!
//! A Modbus client protocol engine in pure Rust. The crate converts
//! register, coil, file record and device identification operations into
//! byte-exact application data units, moves them over one of three framings
//! (TCP with MBAP header, RTU with CRC-16, ASCII with LRC), validates the
//! response frame and returns the decoded payload.
//!
//! ## Architecture
//!
//! The engine is split along the protocol's own seams:
//!
//! ```text
//! modbus-link
//!     ├── ModbusClient   (function-code dispatch, argument and response validation)
//!     ├── FrameCodec     (MBAP / RTU / ASCII encoding, decoding, cross-checking)
//!     ├── ModbusTransport(connection-bound request/response exchange)
//!     └── handlers       (one codec + one transport bundled per connection)
//! ```
//!
//! A handler owns exactly one connection and serializes every exchange on it,
//! so a request and its response can never interleave with another caller's
//! traffic. Callers that want parallel traffic open multiple handlers.
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//! | 0x15 | Write File Record |
//! | 0x16 | Mask Write Register |
//! | 0x17 | Read/Write Multiple Registers |
//! | 0x18 | Read FIFO Queue |
//! | 0x2B | Read Device Identification (MEI 0x0E) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_link::{ModbusClient, TcpHandler};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> modbus_link::ModbusResult<()> {
//!     let handler = Arc::new(
//!         TcpHandler::new("127.0.0.1:502").with_timeout(Duration::from_secs(5)),
//!     );
//!     handler.connect().await?;
//!
//!     let client = ModbusClient::new(handler.clone());
//!     let payload = client.read_holding_registers(0x006B, 3).await?;
//!     println!("registers: {payload:02X?}");
//!
//!     handler.close().await?;
//!     Ok(())
//! }
//! ```

/// Protocol constants from the Modbus specification plus crate defaults
pub mod constants;

/// Error types and result handling
pub mod error;

/// Protocol data unit and big-endian block encoding helpers
pub mod pdu;

/// Device identification records (function 0x2B, MEI type 0x0E)
pub mod device_id;

/// Framing codecs for the three application data unit formats
pub mod frame;

/// Connection-bound transports for TCP/TLS and serial lines
pub mod transport;

/// Codec + transport bundles, one per connection
pub mod handler;

/// High-level client dispatcher
pub mod client;

pub use client::ModbusClient;
pub use constants::*;
pub use device_id::{BasicDeviceId, ExtendedDeviceId, ReadDeviceIdCode, RegularDeviceId};
pub use error::{ModbusError, ModbusException, ModbusResult};
pub use frame::{AsciiCodec, FrameCodec, RtuCodec, TcpCodec};
pub use handler::{AsciiHandler, RtuHandler, TcpHandler, TlsHandler};
pub use pdu::{data_block, data_block_suffix, ModbusPdu};
pub use transport::{
    AsciiTransport, ModbusTransport, Parity, RtuTransport, SerialSettings, TcpTransport,
    TlsSettings,
};
