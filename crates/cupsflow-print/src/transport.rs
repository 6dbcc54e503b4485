// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Non-blocking connections to the print server.
//
// A `Transport` never blocks: reads and writes either make progress or fail
// with `WouldBlock`, and `poll_ready` registers the task for the readiness a
// request is waiting on.  Connecting is a future as well, so a slow or
// unreachable server never stalls the runtime thread.  Plain TCP, Unix-domain
// sockets, and TLS over TCP (rustls, driven by hand so it stays non-blocking)
// are supported.

use std::future::Future;
use std::io::{self, Read, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tracing::debug;

use cupsflow_core::config::{BackendConfig, Encryption};
use cupsflow_core::error::{self, CupsflowError};

/// Which socket readiness the next driver step needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollState {
    /// Nothing to wait for; drive again directly (or on a timer when there
    /// is no socket yet).
    #[default]
    Idle,
    NeedRead,
    NeedWrite,
}

/// A connected, non-blocking byte stream.
pub trait Transport: Send {
    /// Read what is available.  `Ok(0)` means the peer closed the stream.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Resolve once the stream is ready for `interest`.  `Idle` is always
    /// ready.
    fn poll_ready(&mut self, cx: &mut Context<'_>, interest: PollState) -> Poll<io::Result<()>>;
}

/// A connection attempt in flight.
pub type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<Box<dyn Transport>>> + Send>>;

/// Opens connections for requests.
pub trait Connector: Send + Sync {
    /// Start connecting.  The returned future owns everything it needs, so
    /// the request can poll it alongside its other work.
    fn connect(&self, server: &str, port: u16, encryption: Encryption) -> ConnectFuture;
}

// ---------------------------------------------------------------------------
// Plain sockets
// ---------------------------------------------------------------------------

impl Transport for TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }

    fn poll_ready(&mut self, cx: &mut Context<'_>, interest: PollState) -> Poll<io::Result<()>> {
        match interest {
            PollState::Idle => Poll::Ready(Ok(())),
            PollState::NeedRead => self.poll_read_ready(cx),
            PollState::NeedWrite => self.poll_write_ready(cx),
        }
    }
}

#[cfg(unix)]
impl Transport for tokio::net::UnixStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::UnixStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::UnixStream::try_write(self, buf)
    }

    fn poll_ready(&mut self, cx: &mut Context<'_>, interest: PollState) -> Poll<io::Result<()>> {
        match interest {
            PollState::Idle => Poll::Ready(Ok(())),
            PollState::NeedRead => self.poll_read_ready(cx),
            PollState::NeedWrite => self.poll_write_ready(cx),
        }
    }
}

// ---------------------------------------------------------------------------
// TLS
// ---------------------------------------------------------------------------

/// rustls client session over a non-blocking TCP socket.
///
/// Plaintext writes are refused with `WouldBlock` until the handshake has
/// finished, so nothing is buffered unboundedly and the readiness reported
/// by `poll_ready` always matches what the session is waiting for.
pub struct TlsTransport {
    sock: TcpStream,
    session: ClientConnection,
    /// Decrypted bytes waiting in the session.
    plaintext_pending: usize,
}

/// Adapts the tokio socket's `try_*` calls to the std traits rustls uses.
struct SockIo<'a>(&'a TcpStream);

impl Read for SockIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl Write for SockIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TlsTransport {
    pub fn new(sock: TcpStream, config: Arc<ClientConfig>, server: &str) -> io::Result<Self> {
        let name = ServerName::try_from(server.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let session = ClientConnection::new(config, name).map_err(io::Error::other)?;
        Ok(Self {
            sock,
            session,
            plaintext_pending: 0,
        })
    }

    /// Send queued TLS records.  Stops quietly when the socket is full.
    fn flush_tls(&mut self) -> io::Result<()> {
        while self.session.wants_write() {
            match self.session.write_tls(&mut SockIo(&self.sock)) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Pull one batch of records off the socket.  Returns false on EOF.
    fn read_tls(&mut self) -> io::Result<bool> {
        if self.session.read_tls(&mut SockIo(&self.sock))? == 0 {
            return Ok(false);
        }
        let state = self
            .session
            .process_new_packets()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.plaintext_pending = state.plaintext_bytes_to_read();
        Ok(true)
    }
}

impl Transport for TlsTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.session.reader().read(buf) {
                Ok(n) => {
                    self.plaintext_pending = self.plaintext_pending.saturating_sub(n);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
            self.flush_tls()?;
            if !self.read_tls()? {
                return Ok(0);
            }
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.flush_tls()?;
        if self.session.is_handshaking() {
            if self.session.wants_read() {
                if !self.read_tls()? {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection during the TLS handshake",
                    ));
                }
                self.flush_tls()?;
            }
            if self.session.is_handshaking() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
        }
        if self.session.wants_write() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = self.session.writer().write(buf)?;
        if n == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.flush_tls()?;
        Ok(n)
    }

    fn poll_ready(&mut self, cx: &mut Context<'_>, interest: PollState) -> Poll<io::Result<()>> {
        if interest == PollState::Idle
            || (interest == PollState::NeedRead && self.plaintext_pending > 0)
        {
            return Poll::Ready(Ok(()));
        }
        if self.session.wants_write() {
            return self.sock.poll_write_ready(cx);
        }
        if self.session.is_handshaking() || interest == PollState::NeedRead {
            return self.sock.poll_read_ready(cx);
        }
        self.sock.poll_write_ready(cx)
    }
}

/// Accepts any server certificate while still checking handshake
/// signatures.  CUPS generates self-signed certificates by default.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
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
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the rustls client configuration for `tls_verify`/`tls_ca_file`.
pub fn tls_client_config(
    verify: bool,
    ca_file: Option<&Path>,
) -> error::Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| CupsflowError::Tls(e.to_string()))?;

    let config = if verify {
        let mut roots = RootCertStore::empty();
        if let Some(path) = ca_file {
            let certs = CertificateDer::pem_file_iter(path)
                .map_err(|e| CupsflowError::Tls(format!("{}: {e:?}", path.display())))?;
            for cert in certs {
                let cert = cert.map_err(|e| CupsflowError::Tls(format!("{e:?}")))?;
                roots
                    .add(cert)
                    .map_err(|e| CupsflowError::Tls(e.to_string()))?;
            }
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth()
    };
    Ok(Arc::new(config))
}

// ---------------------------------------------------------------------------
// Default connector
// ---------------------------------------------------------------------------

/// Connects over the network or a local socket.
///
/// Each attempt is bounded by `connect_timeout`.  The futures it returns must
/// be polled from within a tokio runtime.
pub struct NetConnector {
    connect_timeout: Duration,
    tls: Option<Arc<ClientConfig>>,
}

impl NetConnector {
    pub fn new(config: &BackendConfig) -> error::Result<Self> {
        let tls = if config.encryption.uses_tls() {
            Some(tls_client_config(
                config.tls_verify,
                config.tls_ca_file.as_deref(),
            )?)
        } else {
            None
        };
        Ok(Self {
            connect_timeout: config.connect_timeout(),
            tls,
        })
    }
}

async fn connect_tcp(server: &str, port: u16) -> io::Result<TcpStream> {
    let stream = TcpStream::connect((server, port)).await?;
    stream.set_nodelay(true)?;
    debug!(server, port, peer = ?stream.peer_addr().ok(), "connected");
    Ok(stream)
}

#[cfg(unix)]
async fn connect_local(path: &str) -> io::Result<Box<dyn Transport>> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    debug!(path, "connected to local socket");
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_local(path: &str) -> io::Result<Box<dyn Transport>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("local sockets are not supported here: {path}"),
    ))
}

impl Connector for NetConnector {
    fn connect(&self, server: &str, port: u16, encryption: Encryption) -> ConnectFuture {
        let server = server.to_string();
        let limit = self.connect_timeout;
        let tls = if encryption.uses_tls() {
            match &self.tls {
                Some(config) => Some(Ok(config.clone())),
                None => Some(tls_client_config(false, None)),
            }
        } else {
            None
        };

        Box::pin(async move {
            let attempt = async {
                if server.starts_with('/') {
                    return connect_local(&server).await;
                }
                let stream = connect_tcp(&server, port).await?;
                match tls {
                    None => Ok(Box::new(stream) as Box<dyn Transport>),
                    Some(config) => {
                        let config = config.map_err(|e| io::Error::other(e.to_string()))?;
                        let tls = TlsTransport::new(stream, config, &server)?;
                        Ok(Box::new(tls) as Box<dyn Transport>)
                    }
                }
            };
            match tokio::time::timeout(limit, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {server}:{port} timed out after {limit:?}"),
                )),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted transport for tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Shared view of what a `ScriptedTransport` has seen.
    #[derive(Default)]
    pub struct Script {
        /// Bytes the server will send; `None` entries produce `WouldBlock`.
        pub incoming: VecDeque<Option<Vec<u8>>>,
        pub written: Vec<u8>,
        /// Largest single write accepted.
        pub write_limit: Option<usize>,
        pub closed_after_script: bool,
    }

    pub struct ScriptedTransport(pub Arc<Mutex<Script>>);

    impl Transport for ScriptedTransport {
        fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut script = self.0.lock().map_err(|_| io::Error::other("poisoned"))?;
            match script.incoming.pop_front() {
                Some(Some(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        script.incoming.push_front(Some(data.split_off(n)));
                    }
                    Ok(n)
                }
                Some(None) => Err(io::ErrorKind::WouldBlock.into()),
                None if script.closed_after_script => Ok(0),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut script = self.0.lock().map_err(|_| io::Error::other("poisoned"))?;
            let n = script.write_limit.map_or(buf.len(), |limit| buf.len().min(limit));
            script.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn poll_ready(&mut self, _cx: &mut Context<'_>, _interest: PollState) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Fails the first `failures` attempts, then hands out the scripted
    /// transport.
    pub struct ScriptedConnector {
        pub script: Arc<Mutex<Script>>,
        pub failures: usize,
        pub attempts: AtomicUsize,
    }

    impl ScriptedConnector {
        pub fn new(script: Script, failures: usize) -> Self {
            Self {
                script: Arc::new(Mutex::new(script)),
                failures,
                attempts: AtomicUsize::new(0),
            }
        }

        pub fn written(&self) -> Vec<u8> {
            self.script.lock().map(|s| s.written.clone()).unwrap_or_default()
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&self, _: &str, _: u16, _: Encryption) -> ConnectFuture {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome: io::Result<Box<dyn Transport>> = if attempt < self.failures {
                Err(io::ErrorKind::ConnectionRefused.into())
            } else {
                Ok(Box::new(ScriptedTransport(self.script.clone())))
            };
            Box::pin(std::future::ready(outcome))
        }
    }
}
