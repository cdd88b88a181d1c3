//! # Callbacks del Host
//! src/server/callbacks.rs
//!
//! Puntos donde el programa que embebe el motor puede intervenir. Todos
//! los métodos tienen una implementación por defecto que deja actuar al
//! motor, así que el host solo sobrescribe lo que necesita.
//!
//! ## Ejemplo
//!
//! ```no_run
//! use httpd_engine::config::Config;
//! use httpd_engine::server::{Callbacks, Connection, Context};
//! use std::io::Write;
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! impl Callbacks for Hello {
//!     fn begin_request(&self, conn: &mut Connection) -> bool {
//!         if conn.request().uri() != "/hello" {
//!             return false;
//!         }
//!         let _ = conn.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
//!         true
//!     }
//! }
//!
//! let ctx = Context::start(Config::default(), Arc::new(Hello)).unwrap();
//! ctx.stop();
//! ```

use super::connection::Connection;
use super::tls::TlsProvider;
use crate::config::Config;
use std::path::Path;
use std::sync::Arc;

/// Callbacks opcionales del host
pub trait Callbacks: Send + Sync {
    /// Se llama antes de despachar cada request. Retornar `true` indica que
    /// el host ya envió la respuesta completa.
    fn begin_request(&self, _conn: &mut Connection) -> bool {
        false
    }

    /// Se llama al terminar cada request con el código enviado
    fn end_request(&self, _conn: &Connection, _status: u16) {}

    /// Intercepta un mensaje de error. Retornar `true` evita que se registre
    /// con `log`.
    fn log_message(&self, _conn: Option<&Connection>, _message: &str) -> bool {
        false
    }

    /// Permite instalar un proveedor TLS propio. Si retorna `Some`, no se
    /// carga `ssl_certificate`.
    fn init_tls(&self, _config: &Config) -> Option<Arc<dyn TlsProvider>> {
        None
    }

    /// Se llama al recibir un pedido de upgrade WebSocket. Retornar `false`
    /// rechaza la conexión.
    fn websocket_connect(&self, _conn: &Connection) -> bool {
        true
    }

    /// Handshake completado; el host puede empezar a enviar frames
    fn websocket_ready(&self, _conn: &mut Connection) {}

    /// Frame recibido (ya desenmascarado). `flags` es el primer byte del
    /// frame (FIN + opcode). Retornar `false` cierra la conexión.
    fn websocket_data(&self, _conn: &mut Connection, _flags: u8, _data: &[u8]) -> bool {
        true
    }

    /// La conexión WebSocket terminó
    fn websocket_close(&self, _conn: &Connection) {}

    /// Sirve un archivo desde memoria en vez de disco
    fn open_file(&self, _path: &Path) -> Option<Arc<[u8]>> {
        None
    }

    /// Un archivo terminó de subirse con `Connection::upload`
    fn upload(&self, _conn: &mut Connection, _file_name: &Path) {}

    /// Permite reemplazar la página de error. Retornar `true` indica que
    /// el host ya envió la respuesta.
    fn http_error(&self, _conn: &mut Connection, _status: u16) -> bool {
        false
    }
}

/// Host sin callbacks
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallbacks;

impl Callbacks for NoCallbacks {}
