//! # TLS
//! src/server/tls.rs
//!
//! El motor solo conoce el trait [`TlsProvider`]: un handshake que
//! convierte un socket en una sesión que se puede leer, escribir y cerrar.
//! [`RustlsProvider`] es la implementación incluida; el host puede
//! entregar otra vía `Callbacks::init_tls`.
//!
//! rustls no tiene estado global, así que no hace falta ningún arreglo de
//! locks compartido entre threads: cada sesión es propiedad exclusiva de
//! su worker y la configuración es un `Arc` inmutable.

use crate::error::TlsError;
use log::error;
use rustls::{Certificate, PrivateKey, ServerConfig, ServerConnection, StreamOwned};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

/// Sesión TLS ya negociada sobre un socket
pub trait TlsSession: Read + Write + Send {
    /// Socket subyacente (para timeouts, direcciones y shutdown)
    fn socket(&self) -> &TcpStream;

    /// Envía el cierre TLS (close_notify); los errores se ignoran
    fn shutdown(&mut self);
}

/// Proveedor de sesiones TLS del lado servidor
pub trait TlsProvider: Send + Sync {
    fn handshake(&self, socket: TcpStream) -> io::Result<Box<dyn TlsSession>>;
}

/// Proveedor basado en rustls
pub struct RustlsProvider {
    config: Arc<ServerConfig>,
}

impl RustlsProvider {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Carga certificado(s) y clave privada desde un único archivo PEM
    ///
    /// # Errores
    ///
    /// Archivo ilegible, PEM sin certificado o sin clave, o par rechazado
    /// por rustls.
    pub fn from_pem_file(path: &str) -> Result<Self, TlsError> {
        let file = File::open(path).map_err(|err| TlsError::Io(path.to_string(), err))?;
        let items = rustls_pemfile::read_all(&mut BufReader::new(file))
            .map_err(|err| TlsError::Io(path.to_string(), err))?;

        let mut certs = Vec::new();
        let mut key = None;
        for item in items {
            match item {
                rustls_pemfile::Item::X509Certificate(der) => certs.push(Certificate(der)),
                rustls_pemfile::Item::PKCS8Key(der) | rustls_pemfile::Item::RSAKey(der) => {
                    if key.is_none() {
                        key = Some(PrivateKey(der));
                    }
                }
                _ => {}
            }
        }

        if certs.is_empty() {
            return Err(TlsError::NoCertificate(path.to_string()));
        }
        let key = key.ok_or_else(|| TlsError::NoPrivateKey(path.to_string()))?;

        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|err| {
                error!("Failed to create TLS server config from {}: {}", path, err);
                TlsError::Rustls(err.to_string())
            })?;

        Ok(Self::new(Arc::new(config)))
    }
}

impl TlsProvider for RustlsProvider {
    fn handshake(&self, mut socket: TcpStream) -> io::Result<Box<dyn TlsSession>> {
        let mut conn = ServerConnection::new(Arc::clone(&self.config))
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut socket)?;
        }
        Ok(Box::new(RustlsSession {
            stream: StreamOwned::new(conn, socket),
        }))
    }
}

struct RustlsSession {
    stream: StreamOwned<ServerConnection, TcpStream>,
}

impl Read for RustlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for RustlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl TlsSession for RustlsSession {
    fn socket(&self) -> &TcpStream {
        &self.stream.sock
    }

    fn shutdown(&mut self) {
        self.stream.conn.send_close_notify();
        while self.stream.conn.wants_write() {
            if self.stream.conn.write_tls(&mut self.stream.sock).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_certificate_file() {
        let result = RustlsProvider::from_pem_file("/no/such/cert.pem");
        assert!(matches!(result, Err(TlsError::Io(_, _))));
    }

    #[test]
    fn test_pem_without_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "esto no es un PEM\n").unwrap();

        let result = RustlsProvider::from_pem_file(path.to_str().unwrap());
        assert!(matches!(result, Err(TlsError::NoCertificate(_))));
    }
}
