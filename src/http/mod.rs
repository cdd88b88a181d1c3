//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Protocolo HTTP/1.0 y HTTP/1.1 implementado desde cero:
//!
//! - Detección del fin de cabecera y parsing de requests
//! - Construcción de responses (cabecera + body opcional)
//! - Códigos de estado
//!
//! ### Formato de Request
//!
//! ```text
//! GET /path?query=value HTTP/1.1\r\n
//! Header-Name: Header-Value\r\n
//! \r\n
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 13\r\n
//! \r\n
//! <h1>hola</h1>
//! ```

pub mod request;   // Parsing de la cabecera de requests
pub mod response;  // Construcción de responses
pub mod status;    // Códigos de estado HTTP

// Re-exportamos los tipos principales para facilitar su uso
pub use request::{Method, Request};
pub use response::Response;
pub use status::StatusCode;
