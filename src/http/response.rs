//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! API para construir respuestas HTTP/1.1 y convertirlas a bytes. Los
//! handlers que transmiten archivos o salida de CGI solo envían la
//! cabecera ([`Response::head_bytes`]) y escriben el body en streaming.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 206 Partial Content\r\n
//! Content-Type: text/plain\r\n
//! Content-Range: bytes 0-0/10\r\n
//! Content-Length: 1\r\n
//! \r\n
//! H
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use httpd_engine::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "text/plain")
//!     .with_body("Hello");
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

use super::status::code_forbids_body;
use super::StatusCode;

/// Representa una respuesta HTTP/1.1
#[derive(Debug, Clone)]
pub struct Response {
    /// Código numérico; puede no tener variante en `StatusCode` (CGI)
    status: u16,

    /// Texto de la status line
    reason: String,

    /// Headers en orden de envío
    headers: Vec<(String, String)>,

    /// Cuerpo de la respuesta (puede ser vacío)
    body: Vec<u8>,
}

impl Response {
    /// Crea una nueva respuesta con el código de estado especificado
    ///
    /// Por defecto, la respuesta no tiene headers ni body.
    pub fn new(status: StatusCode) -> Self {
        Self::with_status_line(status.as_u16(), status.reason_phrase())
    }

    /// Crea una respuesta con código y texto arbitrarios
    pub fn with_status_line(status: u16, reason: &str) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Agrega un header a la respuesta
    ///
    /// Si el header ya existe (sin distinguir mayúsculas), se sobrescribe.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Agrega un header a una respuesta existente (versión mutable)
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Agrega un header sin reemplazar los existentes (ej: varios `Set-Cookie`)
    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Establece el cuerpo de la respuesta desde un string
    ///
    /// Automáticamente calcula y agrega el header `Content-Length`.
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece el cuerpo de la respuesta desde bytes
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        let len = self.body.len().to_string();
        self.add_header("Content-Length", &len);
        self
    }

    /// Crea la página de error estándar.
    ///
    /// El body es `Error <código>: <razón>` seguido del mensaje. Los códigos
    /// 1xx, 204 y 304 se envían sin body y con `Content-Length: 0`.
    ///
    /// # Ejemplo
    /// ```
    /// use httpd_engine::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound, "File not found");
    /// assert_eq!(response.body(), b"Error 404: Not Found\nFile not found");
    ///
    /// let response = Response::error(StatusCode::NotModified, "ignored");
    /// assert!(response.body().is_empty());
    /// ```
    pub fn error(status: StatusCode, message: &str) -> Self {
        let response = Self::new(status);
        if code_forbids_body(status.as_u16()) {
            return response.with_header("Content-Length", "0");
        }
        let body = format!("Error {}: {}\n{}", status.as_u16(), status.reason_phrase(), message);
        response
            .with_header("Content-Type", "text/plain")
            .with_body(&body)
    }

    /// Status line y headers, terminados por la línea vacía
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }

    /// Convierte la respuesta completa (cabecera + body) a bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = self.head_bytes();
        result.extend_from_slice(&self.body);
        result
    }

    /// Obtiene el código de estado de la respuesta
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Obtiene una referencia a los headers
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Obtiene una referencia al body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_response() {
        let response = Response::new(StatusCode::Ok);
        assert_eq!(response.status(), 200);
        assert_eq!(response.reason(), "OK");
        assert!(response.headers().is_empty());
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_with_header_overwrites_case_insensitive() {
        let response = Response::new(StatusCode::Ok)
            .with_header("Content-Type", "text/plain")
            .with_header("content-type", "text/html");

        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.header("Content-Type"), Some("text/html"));
    }

    #[test]
    fn test_append_header_keeps_duplicates() {
        let mut response = Response::new(StatusCode::Ok);
        response.append_header("Set-Cookie", "a=1");
        response.append_header("Set-Cookie", "b=2");
        assert_eq!(response.headers().len(), 2);
    }

    #[test]
    fn test_with_body_sets_content_length() {
        let response = Response::new(StatusCode::Ok).with_body("Hello World");

        assert_eq!(response.body(), b"Hello World");
        assert_eq!(response.header("Content-Length"), Some("11"));
    }

    #[test]
    fn test_header_order_is_preserved() {
        let response = Response::new(StatusCode::Ok)
            .with_header("Date", "x")
            .with_header("Etag", "y")
            .with_header("Connection", "close");
        let head = String::from_utf8(response.head_bytes()).unwrap();
        assert_eq!(head, "HTTP/1.1 200 OK\r\nDate: x\r\nEtag: y\r\nConnection: close\r\n\r\n");
    }

    #[test]
    fn test_custom_status_line() {
        let response = Response::with_status_line(299, "Custom Thing");
        assert!(response.to_bytes().starts_with(b"HTTP/1.1 299 Custom Thing\r\n"));
    }

    #[test]
    fn test_error_response() {
        let response = Response::error(StatusCode::BadRequest, "Bad request");
        assert_eq!(response.status(), 400);
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.body(), b"Error 400: Bad Request\nBad request");
    }

    #[test]
    fn test_error_without_body() {
        let response = Response::error(StatusCode::NoContent, "x");
        assert!(response.body().is_empty());
        assert_eq!(response.header("Content-Length"), Some("0"));
    }
}
