//! # Errores de Arranque
//! src/error.rs
//!
//! Errores que impiden iniciar un contexto. Los errores de cada request
//! no salen del worker: se convierten en un código HTTP y una línea en el
//! log de errores.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Error al parsear `listening_ports`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// Token que no tiene la forma `[ip:]port[s|r]`
    Malformed(String),

    /// Se pidió `s` pero no hay proveedor TLS configurado
    TlsNotConfigured(String),
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::Malformed(token) => write!(f, "Invalid port spec: [{}]", token),
            ListenerError::TlsNotConfigured(token) => {
                write!(f, "Cannot add SSL socket [{}]: no ssl_certificate configured", token)
            }
        }
    }
}

impl std::error::Error for ListenerError {}

/// Error al cargar el certificado TLS
#[derive(Debug)]
pub enum TlsError {
    /// No se pudo leer el archivo PEM
    Io(String, io::Error),

    /// El PEM no contiene certificados
    NoCertificate(String),

    /// El PEM no contiene una clave privada
    NoPrivateKey(String),

    /// rustls rechazó el par certificado/clave
    Rustls(String),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::Io(path, err) => write!(f, "Cannot read {}: {}", path, err),
            TlsError::NoCertificate(path) => write!(f, "No certificate found in {}", path),
            TlsError::NoPrivateKey(path) => write!(f, "No private key found in {}", path),
            TlsError::Rustls(msg) => write!(f, "TLS configuration rejected: {}", msg),
        }
    }
}

impl std::error::Error for TlsError {}

/// Motivos por los que `Context::start` puede fallar
#[derive(Debug)]
pub enum StartError {
    /// Opción inválida (valor fuera de rango, ACL o throttle malformados)
    Config(String),

    /// `listening_ports` inválido
    Listener(ListenerError),

    /// Certificado TLS inválido
    Tls(TlsError),

    /// Falló `bind`/`listen` en una dirección
    Bind(SocketAddr, io::Error),

    /// `global_auth_file` no existe o no es un archivo
    AuthFile(String),

    /// No se pudo cambiar al usuario de `run_as_user`
    RunAsUser(String),

    /// Falló la creación de un thread
    Io(io::Error),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            StartError::Listener(err) => write!(f, "{}", err),
            StartError::Tls(err) => write!(f, "{}", err),
            StartError::Bind(addr, err) => write!(f, "Cannot bind to {}: {}", addr, err),
            StartError::AuthFile(path) => write!(f, "Invalid global passwords file: {}", path),
            StartError::RunAsUser(msg) => write!(f, "Cannot switch user: {}", msg),
            StartError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::Listener(err) => Some(err),
            StartError::Tls(err) => Some(err),
            StartError::Bind(_, err) | StartError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ListenerError> for StartError {
    fn from(err: ListenerError) -> Self {
        StartError::Listener(err)
    }
}

impl From<TlsError> for StartError {
    fn from(err: TlsError) -> Self {
        StartError::Tls(err)
    }
}

impl From<io::Error> for StartError {
    fn from(err: io::Error) -> Self {
        StartError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = StartError::from(ListenerError::Malformed("80x".to_string()));
        assert_eq!(err.to_string(), "Invalid port spec: [80x]");

        let err = StartError::Config("num_threads must be >= 1".to_string());
        assert!(err.to_string().contains("num_threads"));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let err = StartError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(err.source().is_some());
        assert!(StartError::AuthFile("x".to_string()).source().is_none());
    }
}
