//! # Parsing de Requests HTTP/1.x
//! src/http/request.rs
//!
//! Este módulo implementa el parser de la cabecera de un request. El body
//! nunca pasa por aquí: la conexión lo entrega en streaming a los handlers.
//!
//! ## Formato de un Request
//!
//! ```text
//! GET /path?param1=value1&param2=value2 HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! User-Agent: curl/7.68.0\r\n
//! \r\n
//! ```
//!
//! ## Componentes
//!
//! 1. **Request Line**: `METHOD /path?query HTTP/1.x`
//! 2. **Headers**: Pares `Name: Value` (uno por línea, máximo 64)
//! 3. **Empty Line**: `\n\n` o `\r\n\r\n` marca el fin de la cabecera

use super::StatusCode;
use crate::utils::uri::get_var;

/// Máximo de headers que se conservan por request; el resto se ignora
pub const MAX_HEADERS: usize = 64;

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// HEAD - Como GET pero solo retorna headers
    HEAD,

    /// POST - Enviar datos a un recurso (CGI)
    POST,

    /// PUT - Crear o reemplazar un archivo
    PUT,

    /// DELETE - Borrar un archivo
    DELETE,

    /// OPTIONS - Consultar capacidades del servidor
    OPTIONS,

    /// PROPFIND - Metadatos WebDAV
    PROPFIND,

    /// CONNECT - Aceptado por el parser, lo maneja el host vía callback
    CONNECT,
}

impl Method {
    /// Parsea un método HTTP desde un string
    ///
    /// # Errores
    ///
    /// Retorna error si el método no es soportado
    pub fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "OPTIONS" => Ok(Method::OPTIONS),
            "PROPFIND" => Ok(Method::PROPFIND),
            "CONNECT" => Ok(Method::CONNECT),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
            Method::PROPFIND => "PROPFIND",
            Method::CONNECT => "CONNECT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resultado de buscar el fin de la cabecera en un buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLen {
    /// Todavía no aparece la línea vacía
    Incomplete,

    /// La cabecera ocupa exactamente estos bytes (incluyendo la línea vacía)
    Complete(usize),

    /// Byte de control no permitido dentro de la cabecera
    Malformed,
}

/// Busca el final de la cabecera HTTP en `buf`.
///
/// Termina en la primera aparición de `\n\n` o `\n\r\n`. Los bytes de
/// control ASCII distintos de `\r` y `\n` (tab incluido) hacen que la
/// cabecera se considere malformada; los bytes >= 128 se aceptan.
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::http::request::{get_request_len, RequestLen};
///
/// assert_eq!(get_request_len(b"GET / HTTP/1.0\r\n"), RequestLen::Incomplete);
/// assert_eq!(get_request_len(b"GET / HTTP/1.0\r\n\r\nbody"), RequestLen::Complete(18));
/// assert_eq!(get_request_len(b"GET /\x01 HTTP/1.0\r\n\r\n"), RequestLen::Malformed);
/// assert_eq!(get_request_len(b"GET /\t HTTP/1.0\r\n\r\n"), RequestLen::Malformed);
/// ```
pub fn get_request_len(buf: &[u8]) -> RequestLen {
    if buf.is_empty() {
        return RequestLen::Incomplete;
    }

    for i in 0..buf.len() - 1 {
        let c = buf[i];
        if c < 128 && !(0x20..0x7f).contains(&c) && !matches!(c, b'\r' | b'\n') {
            return RequestLen::Malformed;
        }
        if c == b'\n' {
            if buf[i + 1] == b'\n' {
                return RequestLen::Complete(i + 2);
            }
            if i + 2 < buf.len() && buf[i + 1] == b'\r' && buf[i + 2] == b'\n' {
                return RequestLen::Complete(i + 3);
            }
        }
    }

    RequestLen::Incomplete
}

/// Representa la cabecera de un request HTTP parseada
#[derive(Debug, Clone)]
pub struct Request {
    /// Método HTTP
    method: Method,

    /// URI sin query string. El router lo reemplaza por la versión
    /// decodificada y normalizada antes de despachar.
    uri: String,

    /// Todo lo que sigue al primer `?` del URI
    query_string: Option<String>,

    /// Versión HTTP sin el prefijo (ej: "1.1")
    http_version: String,

    /// Headers en el orden en que llegaron
    headers: Vec<(String, String)>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: String::new(),
            query_string: None,
            http_version: String::new(),
            headers: Vec::new(),
        }
    }
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Formato inválido de la request line
    InvalidRequestLine,

    /// Método HTTP no soportado
    UnsupportedMethod(String),

    /// La versión no tiene la forma `HTTP/x.y`
    InvalidHttpVersion(String),

    /// Versión bien formada pero distinta de 1.0 y 1.1
    UnsupportedHttpVersion(String),

    /// El URI no empieza con `/` ni es `*`
    InvalidUri(String),

    /// Header malformado
    InvalidHeader(String),

    /// Request vacío
    EmptyRequest,
}

impl ParseError {
    /// Código con el que se responde este error
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::UnsupportedHttpVersion(_) => StatusCode::HttpVersionNotSupported,
            _ => StatusCode::BadRequest,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidRequestLine => write!(f, "Invalid request line format"),
            ParseError::UnsupportedMethod(m) => write!(f, "Unsupported HTTP method: {}", m),
            ParseError::InvalidHttpVersion(v) => write!(f, "Invalid HTTP version: {}", v),
            ParseError::UnsupportedHttpVersion(v) => write!(f, "Bad HTTP version: [{}]", v),
            ParseError::InvalidUri(u) => write!(f, "Invalid URI: {}", u),
            ParseError::InvalidHeader(h) => write!(f, "Invalid header: {}", h),
            ParseError::EmptyRequest => write!(f, "Empty request"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Separa la primera línea del resto, saltando los `\r\n` que la terminan
fn split_line(text: &str) -> (&str, &str) {
    match text.find(|c: char| c == '\r' || c == '\n') {
        Some(pos) => (&text[..pos], text[pos..].trim_start_matches(&['\r', '\n'][..])),
        None => (text, ""),
    }
}

/// Parsea un bloque de headers `Name: Value` (uno por línea).
///
/// Se detiene en la primera línea vacía. Los headers más allá de
/// [`MAX_HEADERS`] se descartan.
///
/// # Errores
///
/// `InvalidHeader` si una línea no contiene `:` o el nombre está vacío.
pub fn parse_headers(block: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut headers = Vec::new();

    for line in block.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }

        let colon = line
            .find(':')
            .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;
        let name = line[..colon].trim();
        if name.is_empty() {
            return Err(ParseError::InvalidHeader(line.to_string()));
        }

        if headers.len() < MAX_HEADERS {
            headers.push((name.to_string(), line[colon + 1..].trim().to_string()));
        }
    }

    Ok(headers)
}

impl Request {
    /// Parsea la cabecera de un request (request line + headers)
    ///
    /// # Argumentos
    ///
    /// * `head` - Bytes de la cabecera, tal como los delimitó [`get_request_len`]
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use httpd_engine::http::Request;
    ///
    /// let raw = b"GET /files/a.txt?sort=d HTTP/1.1\r\nHost: x\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.uri(), "/files/a.txt");
    /// assert_eq!(request.query_string(), Some("sort=d"));
    /// assert_eq!(request.http_version(), "1.1");
    /// ```
    pub fn parse(head: &[u8]) -> Result<Self, ParseError> {
        let text = String::from_utf8_lossy(head);
        let text = text.trim_start();
        if text.is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        // 1. Request line
        let (line, rest) = split_line(text);
        let mut parts = line.split(' ').filter(|part| !part.is_empty());
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v), None) => (m, t, v),
            _ => return Err(ParseError::InvalidRequestLine),
        };

        let method = Method::from_str(method)?;

        let http_version = version
            .strip_prefix("HTTP/")
            .ok_or_else(|| ParseError::InvalidHttpVersion(version.to_string()))?;

        if !target.starts_with('/') && target != "*" {
            return Err(ParseError::InvalidUri(target.to_string()));
        }

        if http_version != "1.0" && http_version != "1.1" {
            return Err(ParseError::UnsupportedHttpVersion(http_version.to_string()));
        }

        let (uri, query_string) = match target.find('?') {
            Some(q) => (&target[..q], Some(target[q + 1..].to_string())),
            None => (target, None),
        };

        // 2. Headers
        let headers = parse_headers(rest)?;

        Ok(Request {
            method,
            uri: uri.to_string(),
            query_string,
            http_version: http_version.to_string(),
            headers,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn set_uri(&mut self, uri: String) {
        self.uri = uri;
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Busca un parámetro del query string (decodificado)
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_string.as_deref().and_then(|query| get_var(query, name))
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    /// Obtiene el valor de un header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Todos los headers en orden de llegada
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}
