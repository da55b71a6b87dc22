//! Connection-bound transports
//!
//! A transport owns a single lazily opened channel and performs one full
//! request/response exchange per `send` call. Concurrent callers are
//! serialized on an internal mutex held for the whole round trip, so frames
//! from different callers never interleave on the wire.

mod ascii;
mod rtu;
mod serial;
mod tcp;

pub use ascii::AsciiTransport;
pub use rtu::RtuTransport;
pub use serial::{Parity, SerialSettings};
pub use tcp::{TcpTransport, TlsSettings};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::{ModbusError, ModbusResult};

/// Request/response exchange over one connection
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    /// Write a request ADU and read the complete response ADU
    ///
    /// Opens the channel first if it is not connected. The call holds the
    /// transport's session lock for the whole round trip.
    async fn send(&self, request: &[u8]) -> ModbusResult<Vec<u8>>;

    /// Open the channel eagerly
    ///
    /// `send` dials lazily, so calling this is optional. It exists so callers
    /// can surface connection problems before the first operation.
    async fn connect(&self) -> ModbusResult<()>;

    /// Close the channel. The next `send` re-dials.
    async fn close(&self) -> ModbusResult<()>;
}

/// Await an I/O future under an optional deadline
///
/// A zero limit disables the deadline, mirroring the "timeout <= 0 disables"
/// convention of the tuning knobs.
pub(crate) async fn with_deadline<T, F>(limit: Duration, what: &str, fut: F) -> ModbusResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    if limit.is_zero() {
        return fut.await.map_err(ModbusError::from);
    }
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ModbusError::timeout(what.to_string())),
    }
}
