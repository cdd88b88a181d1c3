//! # Conexión
//! src/server/connection.rs
//!
//! Una conexión aceptada, propiedad exclusiva de un worker. Ejecuta el
//! ciclo de requests de la conexión:
//!
//! 1. Reinicia el estado del request anterior
//! 2. Acumula bytes hasta encontrar el fin de la cabecera
//! 3. Parsea y despacha al router
//! 4. Registra el request y decide si la conexión sigue abierta
//! 5. Descarta el body no leído y los bytes de este request del buffer
//!
//! Desde el host, una `Connection` es el canal del request actual: el
//! body se lee con [`std::io::Read`] y la respuesta se escribe con
//! [`std::io::Write`] (`write!` funciona como `printf`).

use super::access_log::AccessEntry;
use super::buffer::{RequestBuffer, IO_CHUNK_SIZE, MAX_REQUEST_SIZE};
use super::context::Shared;
use super::tls::TlsSession;
use crate::config::Config;
use crate::handlers::{file, upload, websocket};
use crate::http::request::{get_request_len, ParseError, RequestLen};
use crate::http::{Method, Request, Response, StatusCode};
use crate::router;
use crate::server::callbacks::Callbacks;
use crate::utils::date::unix_now;
use log::{debug, error};
use nix::libc;
use nix::sys::socket::{setsockopt, sockopt};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Socket aceptado, tal como viaja por la cola
#[derive(Debug)]
pub(crate) struct Accepted {
    pub stream: TcpStream,
    pub remote: SocketAddr,
    pub local: SocketAddr,
    pub is_tls: bool,
    pub tls_redirect: bool,
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<dyn TlsSession>),
}

impl Stream {
    fn socket(&self) -> &TcpStream {
        match self {
            Stream::Plain(stream) => stream,
            Stream::Tls(session) => session.socket(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.read(buf),
            Stream::Tls(session) => session.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.write(buf),
            Stream::Tls(session) => session.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.flush(),
            Stream::Tls(session) => session.flush(),
        }
    }
}

/// Motivos por los que no se obtuvo una cabecera completa
#[derive(Debug)]
enum RequestError {
    /// El cliente cerró o expiró el timeout
    Closed,
    TooLarge,
    Malformed,
    InvalidContentLength,
    Parse(ParseError),
}

impl RequestError {
    fn status(&self) -> StatusCode {
        match self {
            RequestError::TooLarge => StatusCode::InternalServerError,
            RequestError::Parse(err) => err.status(),
            _ => StatusCode::BadRequest,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Closed => write!(f, "Client closed connection"),
            RequestError::TooLarge => write!(f, "Request Too Large"),
            RequestError::Malformed => write!(f, "Malformed request"),
            RequestError::InvalidContentLength => write!(f, "Invalid Content-Length"),
            RequestError::Parse(err) => write!(f, "{}", err),
        }
    }
}

/// Conexión de un cliente
pub struct Connection {
    shared: Arc<Shared>,
    stream: Stream,
    remote: SocketAddr,
    local: SocketAddr,
    is_tls: bool,
    tls_redirect: bool,
    buf: RequestBuffer,

    // Estado del request actual; se reinicia en cada iteración
    request: Request,
    request_len: usize,
    /// `None`: largo desconocido, el body termina al cerrar la conexión
    content_len: Option<u64>,
    consumed: u64,
    bytes_sent: u64,
    status_code: u16,
    must_close: bool,
    throttle: u64,
    throttle_second: i64,
    throttle_sent: u64,
    path_info: Option<String>,
    remote_user: Option<String>,
    birth_time: i64,
}

impl Connection {
    /// Completa el handshake TLS si corresponde. `None` si falló.
    pub(crate) fn establish(shared: Arc<Shared>, accepted: Accepted) -> Option<Connection> {
        let stream = if accepted.is_tls {
            let provider = Arc::clone(shared.tls.as_ref()?);
            match provider.handshake(accepted.stream) {
                Ok(session) => Stream::Tls(session),
                Err(err) => {
                    debug!("Handshake TLS con {} falló: {}", accepted.remote, err);
                    return None;
                }
            }
        } else {
            Stream::Plain(accepted.stream)
        };

        Some(Connection {
            shared,
            stream,
            remote: accepted.remote,
            local: accepted.local,
            is_tls: accepted.is_tls,
            tls_redirect: accepted.tls_redirect,
            buf: RequestBuffer::new(MAX_REQUEST_SIZE),
            request: Request::default(),
            request_len: 0,
            content_len: Some(0),
            consumed: 0,
            bytes_sent: 0,
            status_code: 0,
            must_close: false,
            throttle: 0,
            throttle_second: 0,
            throttle_sent: 0,
            path_info: None,
            remote_user: None,
            birth_time: unix_now(),
        })
    }

    fn reset(&mut self) {
        self.request = Request::default();
        self.request_len = 0;
        self.content_len = Some(0);
        self.consumed = 0;
        self.bytes_sent = 0;
        self.status_code = 0;
        self.must_close = false;
        self.throttle = 0;
        self.path_info = None;
        self.remote_user = None;
        self.birth_time = unix_now();
    }

    /// Ciclo de requests de la conexión
    pub(crate) fn process(&mut self) {
        loop {
            self.reset();

            let request_len = match self.read_request() {
                Ok(len) => len,
                Err(RequestError::Closed) => break,
                Err(err) => {
                    self.must_close = true;
                    self.send_http_error(err.status(), &err.to_string());
                    break;
                }
            };

            if let Err(err) = self.begin(request_len) {
                self.must_close = true;
                self.send_http_error(err.status(), &err.to_string());
                break;
            }

            router::handle_request(self);

            let callbacks = self.callbacks();
            callbacks.end_request(self, self.status_code);
            self.log_access();

            let keep_alive = self.should_keep_alive() && self.discard_body().is_ok();
            if !keep_alive {
                break;
            }

            // Solo la parte del body que ya estaba en el buffer
            let buffered_body = (self.buf.len() - self.request_len) as u64;
            let body_in_buffer = buffered_body.min(self.content_len.unwrap_or(0)) as usize;
            self.buf.consume(self.request_len + body_in_buffer);
        }
    }

    /// Lee hasta tener una cabecera completa; retorna su largo
    fn read_request(&mut self) -> Result<usize, RequestError> {
        loop {
            match get_request_len(self.buf.data()) {
                RequestLen::Complete(len) => return Ok(len),
                RequestLen::Malformed => return Err(RequestError::Malformed),
                RequestLen::Incomplete => {}
            }
            if self.buf.is_full() {
                return Err(RequestError::TooLarge);
            }
            if self.shared.is_stopping() {
                return Err(RequestError::Closed);
            }
            match self.buf.fill(&mut self.stream) {
                Ok(0) | Err(_) => return Err(RequestError::Closed),
                Ok(_) => {}
            }
        }
    }

    fn begin(&mut self, request_len: usize) -> Result<(), RequestError> {
        self.request = Request::parse(&self.buf.data()[..request_len]).map_err(RequestError::Parse)?;
        self.request_len = request_len;

        self.content_len = match self.request.header("Content-Length") {
            Some(value) => Some(
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| RequestError::InvalidContentLength)?,
            ),
            None if matches!(self.request.method(), Method::POST | Method::PUT) => None,
            None => Some(0),
        };
        if self.content_len.is_none() {
            self.must_close = true;
        }
        Ok(())
    }

    /// Lee y descarta lo que quede del body
    fn discard_body(&mut self) -> io::Result<()> {
        let mut sink = [0u8; IO_CHUNK_SIZE];
        while self.read(&mut sink)? > 0 {}
        Ok(())
    }

    fn should_keep_alive(&self) -> bool {
        let requested = match self.request.header("Connection") {
            Some(value) => value.eq_ignore_ascii_case("keep-alive"),
            None => self.request.http_version() == "1.1",
        };
        self.shared.config.enable_keep_alive
            && !self.shared.is_stopping()
            && self.content_len.is_some()
            && self.status_code != 401
            && !self.must_close
            && requested
    }

    /// Valor del header `Connection` para la respuesta actual
    pub fn connection_header(&self) -> &'static str {
        if self.should_keep_alive() {
            "keep-alive"
        } else {
            "close"
        }
    }

    fn log_access(&self) {
        if let Some(log) = &self.shared.access_log {
            log.write(&AccessEntry {
                remote_ip: self.remote.ip(),
                remote_user: self.remote_user.as_deref(),
                time: self.birth_time,
                method: self.request.method().as_str(),
                uri: self.request.uri(),
                http_version: self.request.http_version(),
                status: self.status_code,
                bytes_sent: self.bytes_sent,
                referer: self.request.header("Referer"),
                user_agent: self.request.header("User-Agent"),
            });
        }
    }

    /// Cierre ordenado: close_notify TLS, SO_LINGER de 1s, shutdown de
    /// escritura y lectura de lo que el cliente haya dejado en vuelo.
    pub(crate) fn close(mut self) {
        if let Stream::Tls(session) = &mut self.stream {
            session.shutdown();
        }

        let socket = self.stream.socket();
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 1,
        };
        if let Err(err) = setsockopt(socket.as_raw_fd(), sockopt::Linger, &linger) {
            debug!("SO_LINGER: {}", err);
        }
        let _ = socket.shutdown(Shutdown::Write);
        if socket.set_nonblocking(true).is_ok() {
            let mut sink = [0u8; 1024];
            let mut reader = socket;
            while matches!(reader.read(&mut sink), Ok(n) if n > 0) {}
        }
    }

    /// Lectura directa del socket, sin contabilizar body
    pub(crate) fn pull(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(out) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    /// Bytes que llegaron después de la cabecera; se quitan del buffer
    pub(crate) fn take_buffered_after_request(&mut self) -> Vec<u8> {
        let rest = self.buf.data()[self.request_len..].to_vec();
        self.buf.truncate(self.request_len);
        rest
    }

    /// Envía `data` completo respetando el throttle
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if self.throttle == 0 {
            self.stream.write_all(data)?;
            self.bytes_sent += data.len() as u64;
            return Ok(());
        }

        let mut sent = 0;
        while sent < data.len() {
            if self.shared.is_stopping() {
                return Err(io::Error::new(io::ErrorKind::Other, "server is stopping"));
            }
            let now = unix_now();
            if now != self.throttle_second {
                self.throttle_second = now;
                self.throttle_sent = 0;
            }
            let budget = self.throttle.saturating_sub(self.throttle_sent);
            let allowed = budget.min((data.len() - sent) as u64) as usize;
            if allowed == 0 {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            self.stream.write_all(&data[sent..sent + allowed])?;
            sent += allowed;
            self.throttle_sent += allowed as u64;
            self.bytes_sent += allowed as u64;
        }
        Ok(())
    }

    /// Registra un error asociado a este request
    pub(crate) fn log_error(&self, message: &str) {
        let callbacks = Arc::clone(&self.shared.callbacks);
        if !callbacks.log_message(Some(self), message) {
            error!(
                "[client {}] {} {}: {}",
                self.remote.ip(),
                self.request.method(),
                self.request.uri(),
                message
            );
        }
    }

    /// Envía la página de error estándar (o la del host)
    pub fn send_http_error(&mut self, status: StatusCode, message: &str) {
        self.status_code = status.as_u16();
        let callbacks = self.callbacks();
        if callbacks.http_error(self, status.as_u16()) {
            return;
        }

        let mut response = Response::error(status, message);
        response.add_header("Connection", self.connection_header());
        let _ = self.send_response(&response);
    }

    /// Envía una respuesta armada; en HEAD se omite el body
    pub fn send_response(&mut self, response: &Response) -> io::Result<()> {
        self.status_code = response.status();
        self.send(&response.head_bytes())?;
        if self.request.method() != Method::HEAD {
            self.send(response.body())?;
        }
        Ok(())
    }

    /// Sirve un archivo con la misma semántica que los archivos estáticos
    pub fn send_file(&mut self, path: &Path) {
        file::send_file(self, path);
    }

    /// Guarda los archivos de un body `multipart/form-data` en `dest_dir`.
    /// Retorna cuántos se guardaron.
    pub fn upload(&mut self, dest_dir: &Path) -> usize {
        upload::upload(self, dest_dir)
    }

    /// Envía un frame WebSocket sin máscara
    pub fn websocket_write(&mut self, opcode: u8, data: &[u8]) -> io::Result<()> {
        let frame = websocket::encode_frame(opcode, data);
        self.send(&frame)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn is_tls(&self) -> bool {
        self.is_tls
    }

    pub(crate) fn is_tls_redirect(&self) -> bool {
        self.tls_redirect
    }

    pub(crate) fn tls_port(&self) -> Option<u16> {
        self.shared.tls_port
    }

    /// Usuario autenticado por digest, si lo hay
    pub fn remote_user(&self) -> Option<&str> {
        self.remote_user.as_deref()
    }

    pub(crate) fn set_remote_user(&mut self, user: Option<String>) {
        self.remote_user = user;
    }

    /// Parte del URI que sigue al script CGI
    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }

    pub(crate) fn set_path_info(&mut self, path_info: Option<String>) {
        self.path_info = path_info;
    }

    /// Aplica la regla de throttle que corresponde al cliente y al URI
    pub(crate) fn update_throttle(&mut self) {
        self.throttle = self.shared.throttle.limit_for(self.remote.ip(), self.request.uri());
    }

    /// Largo del body; `None` si el cliente no lo declaró
    pub fn content_length(&self) -> Option<u64> {
        self.content_len
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Código que se registrará para este request
    pub fn set_status(&mut self, status: u16) {
        self.status_code = status;
    }

    pub(crate) fn set_must_close(&mut self) {
        self.must_close = true;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub(crate) fn callbacks(&self) -> Arc<dyn Callbacks> {
        Arc::clone(&self.shared.callbacks)
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }
}

/// Lee el body del request actual
impl Read for Connection {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let remaining = match self.content_len {
            Some(len) => len.saturating_sub(self.consumed),
            None => u64::MAX,
        };
        if remaining == 0 || out.is_empty() {
            return Ok(0);
        }
        let max = (out.len() as u64).min(remaining) as usize;

        let body_start = self.request_len as u64 + self.consumed;
        let n = if body_start < self.buf.len() as u64 {
            let available = &self.buf.data()[body_start as usize..];
            let n = available.len().min(max);
            out[..n].copy_from_slice(&available[..n]);
            n
        } else {
            self.pull(&mut out[..max])?
        };

        self.consumed += n as u64;
        Ok(n)
    }
}

/// Escribe en el socket; `write` siempre envía todo o falla
impl Write for Connection {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.send(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("is_tls", &self.is_tls)
            .field("uri", &self.request.uri())
            .field("status_code", &self.status_code)
            .finish()
    }
}
