//! TCP and TLS transport
//!
//! One lazily dialed connection per transport, serialized by a session
//! mutex. Every I/O phase runs under the configured deadline, and a
//! watchdog closes the connection once it has been idle for the configured
//! idle timeout.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
    ServerName, UnixTime,
};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, trace, warn};

use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::transport::{with_deadline, ModbusTransport};

/// TLS parameters for a [`TcpTransport`]
///
/// Every TLS connection presents the client keypair; both paths are
/// required and the dial fails without them.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub key_path: String,
    pub cert_path: String,
    /// Accept any server certificate. Intended for bench setups only.
    pub insecure_skip_verify: bool,
}

impl TlsSettings {
    fn load_keypair(&self) -> ModbusResult<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let cert_pem = std::fs::read_to_string(&self.cert_path).map_err(|e| {
            ModbusError::config(format!("failed to read certificate {}: {e}", self.cert_path))
        })?;
        let certs: Vec<CertificateDer<'static>> = pem::parse_many(&cert_pem)
            .map_err(|e| {
                ModbusError::config(format!("failed to parse certificate {}: {e}", self.cert_path))
            })?
            .into_iter()
            .filter(|block| block.tag() == "CERTIFICATE")
            .map(|block| CertificateDer::from(block.into_contents()))
            .collect();
        if certs.is_empty() {
            return Err(ModbusError::config(format!(
                "no certificate found in {}",
                self.cert_path
            )));
        }

        let key_pem = std::fs::read_to_string(&self.key_path).map_err(|e| {
            ModbusError::config(format!("failed to read key {}: {e}", self.key_path))
        })?;
        let block = pem::parse(&key_pem).map_err(|e| {
            ModbusError::config(format!("failed to parse key {}: {e}", self.key_path))
        })?;
        let key = match block.tag() {
            "PRIVATE KEY" => PrivateKeyDer::from(PrivatePkcs8KeyDer::from(block.into_contents())),
            "RSA PRIVATE KEY" => {
                PrivateKeyDer::from(PrivatePkcs1KeyDer::from(block.into_contents()))
            }
            "EC PRIVATE KEY" => PrivateKeyDer::from(PrivateSec1KeyDer::from(block.into_contents())),
            other => {
                return Err(ModbusError::config(format!(
                    "unsupported private key block '{other}' in {}",
                    self.key_path
                )))
            }
        };

        Ok((certs, key))
    }

    fn client_config(&self) -> ModbusResult<Arc<ClientConfig>> {
        if self.cert_path.is_empty() || self.key_path.is_empty() {
            return Err(ModbusError::config(
                "TLS requires both a client certificate path and a key path",
            ));
        }
        let (certs, key) = self.load_keypair()?;

        let builder = ClientConfig::builder();
        let config = if self.insecure_skip_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureVerifier::new()))
                .with_client_auth_cert(certs, key)
        } else {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder
                .with_root_certificates(roots)
                .with_client_auth_cert(certs, key)
        }
        .map_err(|e| ModbusError::config(format!("client certificate rejected: {e}")))?;

        Ok(Arc::new(config))
    }
}

/// Certificate verifier that accepts everything
///
/// Only reachable through `insecure_skip_verify`.
#[derive(Debug)]
struct InsecureVerifier {
    provider: Arc<CryptoProvider>,
}

impl InsecureVerifier {
    fn new() -> Self {
        Self {
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        }
    }
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

enum TcpLink {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl TcpLink {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            TcpLink::Plain(stream) => stream.write_all(buf).await,
            TcpLink::Tls(stream) => stream.write_all(buf).await,
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TcpLink::Plain(stream) => stream.read_exact(buf).await,
            TcpLink::Tls(stream) => stream.read_exact(buf).await,
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TcpLink::Plain(stream) => stream.read(buf).await,
            TcpLink::Tls(stream) => stream.read(buf).await,
        }
    }

    async fn shutdown(&mut self) {
        let _ = match self {
            TcpLink::Plain(stream) => stream.shutdown().await,
            TcpLink::Tls(stream) => stream.shutdown().await,
        };
    }
}

struct TcpSession {
    link: Option<TcpLink>,
    last_activity: Instant,
    watchdog_armed: bool,
}

/// Transport over a single TCP or TLS connection
pub struct TcpTransport {
    address: String,
    timeout: Duration,
    idle_timeout: Duration,
    tls: Option<TlsSettings>,
    session: Arc<Mutex<TcpSession>>,
}

impl TcpTransport {
    /// Create a transport dialing `address` with the default timeouts
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TCP_TIMEOUT,
            idle_timeout: DEFAULT_TCP_IDLE_TIMEOUT,
            tls: None,
            session: Arc::new(Mutex::new(TcpSession {
                link: None,
                last_activity: Instant::now(),
                watchdog_armed: false,
            })),
        }
    }

    /// Combined connect/read/write deadline. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Idle period after which the watchdog closes the connection.
    /// Zero disables the watchdog.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Upgrade the connection to TLS with the given settings
    pub fn with_tls(mut self, settings: TlsSettings) -> Self {
        self.tls = Some(settings);
        self
    }

    /// Remote address this transport dials
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn ensure_connected(&self, session: &mut TcpSession) -> ModbusResult<()> {
        if session.link.is_some() {
            return Ok(());
        }

        debug!("dialing {}", self.address);
        let stream =
            with_deadline(self.timeout, "connect", TcpStream::connect(&self.address)).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY: {e}");
        }

        let link = match &self.tls {
            None => TcpLink::Plain(stream),
            Some(settings) => {
                let connector = TlsConnector::from(settings.client_config()?);
                let server_name = server_name_for(&self.address)?;
                let tls_stream = with_deadline(
                    self.timeout,
                    "TLS handshake",
                    connector.connect(server_name, stream),
                )
                .await?;
                TcpLink::Tls(Box::new(tls_stream))
            }
        };

        info!("connected: {}", self.address);
        session.link = Some(link);
        session.last_activity = Instant::now();
        Ok(())
    }

    /// One full request/response exchange on an open link
    async fn exchange(
        link: &mut TcpLink,
        request: &[u8],
        limit: Duration,
    ) -> ModbusResult<Vec<u8>> {
        trace!("tcp tx: {request:02X?}");
        with_deadline(limit, "write request", link.write_all(request)).await?;

        let mut header = [0u8; TCP_HEADER_SIZE];
        with_deadline(limit, "read MBAP header", link.read_exact(&mut header)).await?;

        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        if length == 0 {
            Self::drain(link).await;
            return Err(ModbusError::frame(
                "length in response header must not be zero",
            ));
        }
        let max_length = TCP_MAX_ADU_SIZE - (TCP_HEADER_SIZE - 1);
        if length > max_length {
            Self::drain(link).await;
            return Err(ModbusError::frame(format!(
                "length in response header '{length}' must not be greater than '{max_length}'"
            )));
        }

        // The length field counts the unit id, which the header read already
        // consumed, so length - 1 bytes remain.
        let mut adu = vec![0u8; TCP_HEADER_SIZE - 1 + length];
        adu[..TCP_HEADER_SIZE].copy_from_slice(&header);
        with_deadline(
            limit,
            "read response body",
            link.read_exact(&mut adu[TCP_HEADER_SIZE..]),
        )
        .await?;

        trace!("tcp rx: {adu:02X?}");
        Ok(adu)
    }

    /// Best-effort read of whatever is pending so a length error does not
    /// leave stale bytes in front of the next response
    async fn drain(link: &mut TcpLink) {
        let mut scratch = [0u8; TCP_MAX_ADU_SIZE];
        let _ = tokio::time::timeout(Duration::from_millis(1), link.read(&mut scratch)).await;
    }

    fn arm_idle_watchdog(&self, session: &mut TcpSession) {
        if self.idle_timeout.is_zero() || session.watchdog_armed {
            return;
        }
        session.watchdog_armed = true;

        let idle_timeout = self.idle_timeout;
        let address = self.address.clone();
        let weak: Weak<Mutex<TcpSession>> = Arc::downgrade(&self.session);

        tokio::spawn(async move {
            loop {
                let deadline = {
                    let Some(session) = weak.upgrade() else { break };
                    let guard = session.lock().await;
                    if guard.link.is_some() {
                        guard.last_activity + idle_timeout
                    } else {
                        Instant::now() + idle_timeout
                    }
                };
                tokio::time::sleep_until(deadline).await;

                let Some(session) = weak.upgrade() else { break };
                let mut guard = session.lock().await;
                if guard.link.is_some() && guard.last_activity.elapsed() >= idle_timeout {
                    debug!(
                        "closing connection to {address} after {:?} idle",
                        guard.last_activity.elapsed()
                    );
                    if let Some(mut link) = guard.link.take() {
                        link.shutdown().await;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn send(&self, request: &[u8]) -> ModbusResult<Vec<u8>> {
        let mut session = self.session.lock().await;
        self.ensure_connected(&mut session).await?;
        session.last_activity = Instant::now();
        self.arm_idle_watchdog(&mut session);

        let Some(link) = session.link.as_mut() else {
            return Err(ModbusError::connection("not connected"));
        };
        let outcome = Self::exchange(link, request, self.timeout).await;

        match &outcome {
            Ok(_) => session.last_activity = Instant::now(),
            Err(ModbusError::Io(_)) | Err(ModbusError::Timeout(_)) => {
                warn!("dropping connection to {} after transport error", self.address);
                if let Some(mut link) = session.link.take() {
                    link.shutdown().await;
                }
            }
            Err(_) => {}
        }
        outcome
    }

    async fn connect(&self) -> ModbusResult<()> {
        let mut session = self.session.lock().await;
        self.ensure_connected(&mut session).await
    }

    async fn close(&self) -> ModbusResult<()> {
        let mut session = self.session.lock().await;
        if let Some(mut link) = session.link.take() {
            link.shutdown().await;
            debug!("closed connection to {}", self.address);
        }
        Ok(())
    }
}

fn server_name_for(address: &str) -> ModbusResult<ServerName<'static>> {
    let host = address.rsplit_once(':').map_or(address, |(host, _)| host);
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string())
        .map_err(|e| ModbusError::config(format!("invalid TLS server name '{host}': {e}")))
}
