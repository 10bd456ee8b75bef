//! TLS-capable session boundary (spec.md §4.4's "secure variant" / §1 Non-goals: no
//! TLS implementation from scratch — wrap an external library instead). Bytes read off
//! a [`TlsServerSession`]/[`TlsClientSession`] are already plaintext HTTP and can be fed
//! straight to [`crate::http::parser::Parser`]; bytes written are encrypted before
//! reaching the underlying transport.

use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection, ServerName, StreamOwned};
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{self, BufReader, Read, Write};
use std::sync::Arc;

/// Build a server TLS config from a PEM certificate chain and PKCS#8 private key.
pub fn server_config(cert_pem: &[u8], key_pem: &[u8]) -> io::Result<Arc<ServerConfig>> {
    let mut cert_reader = BufReader::new(cert_pem);
    let chain = certs(&mut cert_reader)?
        .into_iter()
        .map(rustls::Certificate)
        .collect();

    let mut key_reader = BufReader::new(key_pem);
    let mut keys = pkcs8_private_keys(&mut key_reader)?;
    if keys.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "no pkcs8 private key found"));
    }
    let key = rustls::PrivateKey(keys.remove(0));

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(Arc::new(config))
}

/// Build a client TLS config trusting the given PEM CA certificate chain.
pub fn client_config(ca_pem: &[u8]) -> io::Result<Arc<ClientConfig>> {
    let mut reader = BufReader::new(ca_pem);
    let mut roots = RootCertStore::empty();
    for cert in certs(&mut reader)? {
        roots
            .add(&rustls::Certificate(cert))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    }

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// The server side of a TLS session boundary: wraps any `Read + Write` transport (a
/// TCP stream in production, an in-memory pipe in tests).
pub struct TlsServerSession<S: Read + Write> {
    stream: StreamOwned<ServerConnection, S>,
}

impl<S: Read + Write> TlsServerSession<S> {
    pub fn new(config: Arc<ServerConfig>, transport: S) -> io::Result<Self> {
        let conn = ServerConnection::new(config).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(TlsServerSession { stream: StreamOwned::new(conn, transport) })
    }
}

impl<S: Read + Write> Read for TlsServerSession<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: Read + Write> Write for TlsServerSession<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// The client side of a TLS session boundary.
pub struct TlsClientSession<S: Read + Write> {
    stream: StreamOwned<ClientConnection, S>,
}

impl<S: Read + Write> TlsClientSession<S> {
    pub fn new(config: Arc<ClientConfig>, server_name: &str, transport: S) -> io::Result<Self> {
        let name = ServerName::try_from(server_name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let conn = ClientConnection::new(config, name).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(TlsClientSession { stream: StreamOwned::new(conn, transport) })
    }
}

impl<S: Read + Write> Read for TlsClientSession<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: Read + Write> Write for TlsClientSession<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
