//! Handler composition
//!
//! A handler bundles one framing codec with one transport so the client can
//! hold a single object that satisfies both contracts. Each handler owns
//! exactly one connection and one unit/slave address.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ModbusResult;
use crate::frame::{AsciiCodec, FrameCodec, RtuCodec, TcpCodec};
use crate::pdu::ModbusPdu;
use crate::transport::{
    AsciiTransport, ModbusTransport, Parity, RtuTransport, TcpTransport, TlsSettings,
};

macro_rules! delegate_codec_and_transport {
    ($handler:ty) => {
        impl FrameCodec for $handler {
            fn encode(&self, pdu: &ModbusPdu) -> ModbusResult<Vec<u8>> {
                self.codec.encode(pdu)
            }

            fn decode(&self, adu: &[u8]) -> ModbusResult<ModbusPdu> {
                self.codec.decode(adu)
            }

            fn verify(&self, request: &[u8], response: &[u8]) -> ModbusResult<()> {
                self.codec.verify(request, response)
            }
        }

        #[async_trait]
        impl ModbusTransport for $handler {
            async fn send(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
                self.transport.send(request).await
            }

            async fn connect(&self) -> ModbusResult<()> {
                self.transport.connect().await
            }

            async fn close(&self) -> ModbusResult<()> {
                self.transport.close().await
            }
        }

        impl $handler {
            /// Open the connection eagerly
            pub async fn connect(&self) -> ModbusResult<()> {
                self.transport.connect().await
            }

            /// Close the connection. The next operation re-dials.
            pub async fn close(&self) -> ModbusResult<()> {
                self.transport.close().await
            }
        }
    };
}

/// MBAP framing over plain TCP
pub struct TcpHandler {
    codec: TcpCodec,
    transport: TcpTransport,
}

impl TcpHandler {
    /// Handler for `address` with a 10 s timeout, 60 s idle close and unit
    /// id 0xFF
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            codec: TcpCodec::default(),
            transport: TcpTransport::new(address),
        }
    }

    /// Connect/read/write deadline. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }

    /// Idle period before the connection is closed. Zero disables the
    /// idle-close watchdog.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.transport = self.transport.with_idle_timeout(idle_timeout);
        self
    }

    /// Unit identifier stamped into MBAP headers (0x01 is typical for
    /// serial devices behind a gateway)
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.codec = TcpCodec::new(unit_id);
        self
    }
}

delegate_codec_and_transport!(TcpHandler);

/// MBAP framing over TLS
pub struct TlsHandler {
    codec: TcpCodec,
    transport: TcpTransport,
}

impl TlsHandler {
    /// Handler for `address` presenting the PEM client keypair at
    /// `key_path` / `cert_path`. Both paths are required; connecting fails
    /// without them.
    pub fn new(
        address: impl Into<String>,
        key_path: impl Into<String>,
        cert_path: impl Into<String>,
        insecure_skip_verify: bool,
    ) -> Self {
        Self {
            codec: TcpCodec::default(),
            transport: TcpTransport::new(address).with_tls(TlsSettings {
                key_path: key_path.into(),
                cert_path: cert_path.into(),
                insecure_skip_verify,
            }),
        }
    }

    /// Connect/read/write deadline. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }

    /// Idle period before the connection is closed. Zero disables the
    /// idle-close watchdog.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.transport = self.transport.with_idle_timeout(idle_timeout);
        self
    }

    /// Unit identifier stamped into MBAP headers
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.codec = TcpCodec::new(unit_id);
        self
    }
}

delegate_codec_and_transport!(TlsHandler);

/// RTU framing over a serial line
pub struct RtuHandler {
    codec: RtuCodec,
    transport: RtuTransport,
}

impl RtuHandler {
    /// Handler for `device` at 19200 8E1, slave 1, 5 s read timeout
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            codec: RtuCodec::default(),
            transport: RtuTransport::new(device),
        }
    }

    pub fn with_slave_id(mut self, slave_id: u8) -> Self {
        self.codec = RtuCodec::new(slave_id);
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.transport = self.transport.with_baud_rate(baud_rate);
        self
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.transport = self.transport.with_data_bits(data_bits);
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.transport = self.transport.with_parity(parity);
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: u8) -> Self {
        self.transport = self.transport.with_stop_bits(stop_bits);
        self
    }

    /// Base read timeout. Zero disables deadlines.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }
}

delegate_codec_and_transport!(RtuHandler);

/// ASCII framing over a serial line
pub struct AsciiHandler {
    codec: AsciiCodec,
    transport: AsciiTransport,
}

impl AsciiHandler {
    /// Handler for `device` at 19200 8E1, slave 1, 5 s read timeout
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            codec: AsciiCodec::default(),
            transport: AsciiTransport::new(device),
        }
    }

    pub fn with_slave_id(mut self, slave_id: u8) -> Self {
        self.codec = AsciiCodec::new(slave_id);
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.transport = self.transport.with_baud_rate(baud_rate);
        self
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.transport = self.transport.with_data_bits(data_bits);
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.transport = self.transport.with_parity(parity);
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: u8) -> Self {
        self.transport = self.transport.with_stop_bits(stop_bits);
        self
    }

    /// Read timeout for a whole response line. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }
}

delegate_codec_and_transport!(AsciiHandler);
