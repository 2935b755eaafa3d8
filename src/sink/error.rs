use rustls::pki_types::InvalidDnsNameError;

/// Errors of a single connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to connect to `{addr}`: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("peer certificate of `{server}` is not authorized: {source}")]
    Unauthorized {
        server: String,
        #[source]
        source: rustls::Error,
    },
}

/// Errors that end the sink.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("secure connection to `{server}` not authorized: {source}")]
    Unauthorized {
        server: String,
        #[source]
        source: rustls::Error,
    },
    #[error("`{server}` is not a valid TLS server name: {source}")]
    ServerName {
        server: String,
        #[source]
        source: InvalidDnsNameError,
    },
    #[error("no usable root certificates found in the native certificate store")]
    NoRootCertificates,
}
