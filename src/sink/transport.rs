use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::config::Config;

use super::{ConnectError, Error};

/// Opens connections to the sink endpoint.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Stream, ConnectError>> + Send;
}

/// Plain TCP or TLS stream to the ingestion endpoint.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, stream) = match self {
            Transport::Plain(stream) => ("Plain", stream),
            Transport::Tls(stream) => ("Tls", stream.get_ref().0),
        };
        f.debug_tuple(kind).field(&stream.peer_addr().ok()).finish()
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

struct Tls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

/// Connects to the configured `server:port`, over TLS when `secure` is set.
pub struct EndpointConnector {
    server: String,
    port: u16,
    tls: Option<Tls>,
}

impl EndpointConnector {
    /// Prepares the connector without opening any connection.
    ///
    /// # Errors
    ///
    /// For secure endpoints, returns an error if the server is not a valid
    /// TLS server name or if no root certificate could be loaded.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let tls = if config.secure {
            Some(Tls {
                connector: TlsConnector::from(Arc::new(client_config()?)),
                server_name: ServerName::try_from(config.server.clone()).map_err(|source| {
                    Error::ServerName {
                        server: config.server.clone(),
                        source,
                    }
                })?,
            })
        } else {
            None
        };

        Ok(Self {
            server: config.server.clone(),
            port: config.port(),
            tls,
        })
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl std::fmt::Debug for EndpointConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConnector")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("secure", &self.tls.is_some())
            .finish()
    }
}

impl Connector for EndpointConnector {
    type Stream = Transport;

    async fn connect(&self) -> Result<Transport, ConnectError> {
        log::debug!("Connecting to {}...", self.addr());
        let tcp = TcpStream::connect((self.server.as_str(), self.port))
            .await
            .map_err(|source| ConnectError::Io {
                addr: self.addr(),
                source,
            })?;

        let Some(tls) = &self.tls else {
            return Ok(Transport::Plain(tcp));
        };
        let stream = tls
            .connector
            .connect(tls.server_name.clone(), tcp)
            .await
            .map_err(|err| classify_handshake_error(err, &self.server, self.addr()))?;
        Ok(Transport::Tls(Box::new(stream)))
    }
}

fn client_config() -> Result<rustls::ClientConfig, Error> {
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        log::debug!("Failed to load native certificate: {err}");
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    log::debug!("Loaded {added} root certificates ({ignored} ignored)");
    if added == 0 {
        return Err(Error::NoRootCertificates);
    }

    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Separates certificate rejections from ordinary transport failures.
fn classify_handshake_error(err: io::Error, server: &str, addr: String) -> ConnectError {
    let rejected = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .filter(|tls_err| {
            matches!(
                tls_err,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            )
        })
        .cloned();

    match rejected {
        Some(source) => ConnectError::Unauthorized {
            server: server.to_owned(),
            source,
        },
        None => ConnectError::Io { addr, source: err },
    }
}
