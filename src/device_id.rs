//! Device identification records (function 0x2B, MEI type 0x0E)
//!
//! Objects 0x00-0x02 form the basic category, 0x03-0x06 the regular
//! category, and everything from 0x07 upward is vendor-defined extended
//! data. Object values are raw bytes; the protocol does not promise UTF-8.

use std::collections::BTreeMap;

/// Access level requested from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadDeviceIdCode {
    /// Stream the basic category (objects 0x00-0x02)
    Basic = 0x01,
    /// Stream the regular category (objects 0x00-0x06)
    Regular = 0x02,
    /// Stream the extended category (all objects)
    Extended = 0x03,
    /// Fetch one specific object by id
    Specific = 0x04,
}

/// Mandatory identification objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicDeviceId {
    /// Object 0x00
    pub vendor_name: Vec<u8>,
    /// Object 0x01
    pub product_code: Vec<u8>,
    /// Object 0x02
    pub major_minor_revision: Vec<u8>,
}

/// Basic objects plus the optional regular category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegularDeviceId {
    pub basic: BasicDeviceId,
    /// Object 0x03
    pub vendor_url: Vec<u8>,
    /// Object 0x04
    pub product_name: Vec<u8>,
    /// Object 0x05
    pub model_name: Vec<u8>,
    /// Object 0x06
    pub user_application_name: Vec<u8>,
}

/// Regular objects plus vendor-defined extended objects (ids >= 0x07)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedDeviceId {
    pub regular: RegularDeviceId,
    /// Extended objects keyed by object id
    pub extended_objects: BTreeMap<u8, Vec<u8>>,
}
