//! Modbus protocol constants based on the official specification
//!
//! Size limits are derived from the classic RS485 frame budget:
//! - Maximum ADU on a serial line: 256 bytes
//! - Maximum PDU: 256 - address (1) - CRC (2) = 253 bytes
//! - Maximum TCP ADU: MBAP header (7) + PDU (253) = 260 bytes

use std::time::Duration;

// ============================================================================
// Frame Size Constants
// ============================================================================

/// MBAP header length for TCP framing
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1)
pub const TCP_HEADER_SIZE: usize = 7;

/// Maximum TCP ADU size (MBAP header + function code + data)
pub const TCP_MAX_ADU_SIZE: usize = 260;

/// Minimum decodable TCP ADU (header + function code + one data byte)
pub const TCP_MIN_ADU_SIZE: usize = 9;

/// Protocol identifier carried in every MBAP header
pub const TCP_PROTOCOL_ID: u16 = 0x0000;

/// Maximum PDU size (function code + data)
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum RTU ADU size (address + PDU + CRC)
pub const RTU_MAX_ADU_SIZE: usize = 256;

/// Minimum decodable RTU ADU, sized by the shortest exception response
/// (address + function code + exception code + CRC)
pub const RTU_MIN_ADU_SIZE: usize = 5;

/// ASCII frame start character
pub const ASCII_START: u8 = b':';

/// ASCII frame terminator
pub const ASCII_END: &[u8] = b"\r\n";

/// Maximum ASCII frame size in characters
/// (start colon + two hex digits per binary byte + CR + LF)
pub const ASCII_MAX_ADU_SIZE: usize = 1 + 2 * RTU_MAX_ADU_SIZE + 2;

// ============================================================================
// Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Write File Record (FC21)
pub const FC_WRITE_FILE_RECORD: u8 = 0x15;

/// Mask Write Register (FC22)
pub const FC_MASK_WRITE_REGISTER: u8 = 0x16;

/// Read/Write Multiple Registers (FC23)
pub const FC_READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;

/// Read FIFO Queue (FC24)
pub const FC_READ_FIFO_QUEUE: u8 = 0x18;

/// Encapsulated Interface Transport (FC43)
pub const FC_READ_DEVICE_IDENTIFICATION: u8 = 0x2B;

/// MEI type for device identification under FC43
pub const MEI_TYPE_DEVICE_IDENTIFICATION: u8 = 0x0E;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// ============================================================================
// Operation Limits
// ============================================================================

/// Maximum coils per FC01/FC02 read
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum registers per FC03/FC04 read
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum coils per FC15 write
pub const MAX_WRITE_COILS: u16 = 1968;

/// Maximum registers per FC16 write
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum registers written by an FC23 read/write request
pub const MAX_READ_WRITE_REGISTERS: u16 = 121;

/// Maximum record length (in registers) per FC21 sub-request
pub const MAX_FILE_RECORD_LENGTH: u16 = 122;

/// Highest addressable file record number for FC21
pub const MAX_FILE_RECORD_NUMBER: u16 = 0x270F;

/// Reference type byte carried by every FC21 sub-request
pub const FILE_RECORD_REFERENCE_TYPE: u8 = 0x06;

/// Maximum FIFO count reported by an FC24 response
pub const MAX_FIFO_COUNT: u16 = 31;

/// FC05 value encoding for ON
pub const COIL_ON: u16 = 0xFF00;

/// FC05 value encoding for OFF
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Device Identification Object Ids
// ============================================================================

/// VendorName (basic category)
pub const OBJECT_VENDOR_NAME: u8 = 0x00;

/// ProductCode (basic category)
pub const OBJECT_PRODUCT_CODE: u8 = 0x01;

/// MajorMinorRevision (basic category)
pub const OBJECT_MAJOR_MINOR_REVISION: u8 = 0x02;

/// VendorUrl (regular category)
pub const OBJECT_VENDOR_URL: u8 = 0x03;

/// ProductName (regular category)
pub const OBJECT_PRODUCT_NAME: u8 = 0x04;

/// ModelName (regular category)
pub const OBJECT_MODEL_NAME: u8 = 0x05;

/// UserApplicationName (regular category)
pub const OBJECT_USER_APPLICATION_NAME: u8 = 0x06;

/// First object id of the extended category
pub const OBJECT_EXTENDED_BASE: u8 = 0x07;

// ============================================================================
// Defaults
// ============================================================================

/// Default connect/read/write timeout for TCP and TLS transports
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default idle period after which an unused TCP connection is closed
pub const DEFAULT_TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default unit identifier stamped into MBAP headers
pub const DEFAULT_TCP_UNIT_ID: u8 = 0xFF;

/// Default slave address on serial lines
pub const DEFAULT_SLAVE_ID: u8 = 0x01;

/// Default serial read timeout
pub const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default serial data bits
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Default serial stop bits
pub const DEFAULT_STOP_BITS: u8 = 1;

/// Floor for the RTU inter-frame silent interval
pub const MIN_SILENT_INTERVAL: Duration = Duration::from_micros(1750);
