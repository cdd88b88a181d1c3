//! # Sockets de Escucha
//! src/server/listener.rs
//!
//! Parseo de `listening_ports` y creación de los sockets. Cada token de
//! la lista separada por comas tiene la forma:
//!
//! ```text
//! [a.b.c.d:]port[s|r]
//! [ipv6]:port[s|r]
//! ```
//!
//! El sufijo `s` marca un puerto TLS; `r` un puerto plano que redirige
//! todo a HTTPS.

use crate::error::{ListenerError, StartError};
use log::info;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, RawFd};

/// Un token de `listening_ports` ya parseado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSpec {
    pub addr: SocketAddr,
    pub is_tls: bool,
    pub tls_redirect: bool,
}

/// Socket en escucha junto con su configuración
#[derive(Debug)]
pub struct ListeningSocket {
    listener: TcpListener,
    spec: ListenerSpec,
}

impl ListeningSocket {
    pub fn listener(&self) -> &TcpListener {
        &self.listener
    }

    /// Configuración con la dirección real (resuelve el puerto 0)
    pub fn spec(&self) -> ListenerSpec {
        self.spec
    }
}

impl AsRawFd for ListeningSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

fn parse_port(value: &str) -> Option<u16> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Parsea un token individual
pub fn parse_listener_spec(token: &str) -> Result<ListenerSpec, ListenerError> {
    let malformed = || ListenerError::Malformed(token.to_string());
    let token = token.trim();

    let (body, is_tls, tls_redirect) = match token.as_bytes().last() {
        Some(b's') => (&token[..token.len() - 1], true, false),
        Some(b'r') => (&token[..token.len() - 1], false, true),
        _ => (token, false, false),
    };

    let (ip, port) = if let Some(rest) = body.strip_prefix('[') {
        let close = rest.find("]:").ok_or_else(malformed)?;
        let ip: Ipv6Addr = rest[..close].parse().map_err(|_| malformed())?;
        (IpAddr::V6(ip), &rest[close + 2..])
    } else if let Some(colon) = body.rfind(':') {
        let ip: Ipv4Addr = body[..colon].parse().map_err(|_| malformed())?;
        (IpAddr::V4(ip), &body[colon + 1..])
    } else {
        (IpAddr::V4(Ipv4Addr::UNSPECIFIED), body)
    };

    let port = parse_port(port).ok_or_else(malformed)?;
    Ok(ListenerSpec {
        addr: SocketAddr::new(ip, port),
        is_tls,
        tls_redirect,
    })
}

/// Parsea la lista completa. Una lista vacía es un error.
pub fn parse_listening_ports(list: &str) -> Result<Vec<ListenerSpec>, ListenerError> {
    let specs = list
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(parse_listener_spec)
        .collect::<Result<Vec<_>, _>>()?;

    if specs.is_empty() {
        return Err(ListenerError::Malformed(list.to_string()));
    }
    Ok(specs)
}

/// Crea los sockets de escucha.
///
/// `TcpListener::bind` ya activa `SO_REUSEADDR` en unix, así que un
/// reinicio rápido no choca con conexiones en TIME_WAIT.
pub fn bind_all(specs: &[ListenerSpec], tls_available: bool) -> Result<Vec<ListeningSocket>, StartError> {
    let mut sockets = Vec::with_capacity(specs.len());
    for spec in specs {
        if spec.is_tls && !tls_available {
            return Err(ListenerError::TlsNotConfigured(spec.addr.to_string()).into());
        }

        let listener = TcpListener::bind(spec.addr).map_err(|err| StartError::Bind(spec.addr, err))?;
        // El aceptador hace poll antes de aceptar; si el cliente se fue
        // entre ambos, accept no debe bloquear.
        listener
            .set_nonblocking(true)
            .map_err(|err| StartError::Bind(spec.addr, err))?;
        let addr = listener
            .local_addr()
            .map_err(|err| StartError::Bind(spec.addr, err))?;

        info!(
            "Escuchando en {}{}",
            addr,
            if spec.is_tls { " (TLS)" } else if spec.tls_redirect { " (redirect)" } else { "" }
        );
        sockets.push(ListeningSocket {
            listener,
            spec: ListenerSpec { addr, ..*spec },
        });
    }
    Ok(sockets)
}
