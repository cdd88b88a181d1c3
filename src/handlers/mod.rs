//! # Handlers
//! src/handlers/mod.rs
//!
//! Cada submódulo genera la respuesta completa para un tipo de recurso.
//! Todos escriben directamente en la [`Connection`]: los archivos y la
//! salida de CGI se transmiten por bloques sin cargarlos en memoria.

pub mod auth;
pub mod cgi;
pub mod dav;
pub mod directory;
pub mod file;
pub mod ssi;
pub mod upload;
pub mod websocket;

use crate::http::StatusCode;
use crate::server::buffer::IO_CHUNK_SIZE;
use crate::server::context::Shared;
use crate::server::Connection;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;

/// Tramo máximo de cada espera sobre la salida de un proceso hijo
const CHILD_POLL_MS: u64 = 200;

/// Copia el body del request a `sink`.
///
/// Exige `Content-Length` (411) y un `Expect` que sea `100-continue`
/// (417); en ese caso envía primero la respuesta interina. Ante un error
/// ya envió la respuesta y retorna `false`.
pub(crate) fn forward_body_data<W: Write + ?Sized>(conn: &mut Connection, sink: &mut W) -> bool {
    let expected = match conn.content_length() {
        Some(len) => len,
        None => {
            conn.send_http_error(StatusCode::LengthRequired, "");
            return false;
        }
    };

    if let Some(expect) = conn.request().header("Expect") {
        if !expect.eq_ignore_ascii_case("100-continue") {
            conn.send_http_error(StatusCode::ExpectationFailed, "");
            return false;
        }
        if conn.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").is_err() {
            return false;
        }
    }

    let mut copied = 0u64;
    let mut buf = [0u8; IO_CHUNK_SIZE];
    let result: io::Result<()> = loop {
        let n = match conn.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(err) => break Err(err),
        };
        if let Err(err) = sink.write_all(&buf[..n]) {
            break Err(err);
        }
        copied += n as u64;
    };

    if let Err(err) = result {
        conn.send_http_error(StatusCode::InternalServerError, &format!("Error handling body data: {}", err));
        return false;
    }
    if copied < expected {
        conn.send_http_error(StatusCode::InternalServerError, "Client closed the connection before the body was complete");
        return false;
    }
    true
}

/// Transmite hasta `len` bytes de `source` (todo si es `None`)
pub(crate) fn send_data<R: Read + ?Sized>(conn: &mut Connection, source: &mut R, len: Option<u64>) -> io::Result<u64> {
    let mut remaining = len.unwrap_or(u64::MAX);
    let mut sent = 0u64;
    let mut buf = [0u8; IO_CHUNK_SIZE];
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = match source.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        conn.write_all(&buf[..n])?;
        sent += n as u64;
        remaining -= n as u64;
    }
    Ok(sent)
}

/// Mata y espera al hijo al salir, por cualquier camino
pub(crate) struct ChildGuard(pub Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
        }
        let _ = self.0.wait();
    }
}

/// Salida de un proceso hijo (CGI o `#exec`).
///
/// Antes de cada lectura espera con `poll` en tramos de
/// [`CHILD_POLL_MS`]: falla con `TimedOut` si pasan `request_timeout_ms`
/// sin datos, y de inmediato si el servidor se está deteniendo.
pub(crate) struct ChildOutput<R> {
    inner: R,
    shared: Arc<Shared>,
    timeout: Duration,
}

impl<R: Read + AsRawFd> ChildOutput<R> {
    pub(crate) fn new(conn: &Connection, inner: R) -> Self {
        Self {
            inner,
            shared: conn.shared(),
            timeout: Duration::from_millis(conn.config().request_timeout_ms),
        }
    }

    fn wait_readable(&self) -> io::Result<()> {
        let mut waited = Duration::ZERO;
        loop {
            if self.shared.is_stopping() {
                return Err(io::Error::new(io::ErrorKind::Other, "server is stopping"));
            }
            if waited >= self.timeout {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "child process timed out"));
            }
            let slice = (self.timeout - waited).min(Duration::from_millis(CHILD_POLL_MS));
            let mut fds = [PollFd::new(self.inner.as_raw_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, slice.as_millis() as i32) {
                Ok(0) => waited += slice,
                // Datos, EOF (POLLHUP) o error: `read` lo resuelve
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => {}
                Err(err) => return Err(io::Error::from_raw_os_error(err as i32)),
            }
        }
    }
}

impl<R: Read + AsRawFd> Read for ChildOutput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wait_readable()?;
        self.inner.read(buf)
    }
}

/// Escapa `<`, `>`, `&` y `"` para insertar texto en HTML o XML
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
        assert_eq!(escape_html("plain.txt"), "plain.txt");
    }
}
