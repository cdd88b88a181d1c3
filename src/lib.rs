//! # httpd_engine
//! src/lib.rs
//!
//! Motor HTTP/1.1 embebible y bloqueante: un thread aceptador reparte
//! conexiones a un pool fijo de workers, y cada worker atiende una
//! conexión a la vez (keep-alive incluido).
//!
//! ## Arquitectura
//!
//! - `config`: opciones del motor (CLI, variables de entorno o por nombre)
//! - `server`: contexto, sockets, cola de conexiones, workers y TLS
//! - `router`: cadena de decisión de cada request
//! - `handlers`: archivos, directorios, CGI, SSI, auth digest, WebDAV,
//!   uploads y WebSocket
//! - `http`: parsing de requests y construcción de respuestas
//! - `resource`: archivos en disco o provistos por el host
//! - `utils`: patrones, URIs, MIME, ACL/throttle, fechas y hashes
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use httpd_engine::config::Config;
//! use httpd_engine::server::{Context, NoCallbacks};
//! use std::sync::Arc;
//!
//! let mut config = Config::default();
//! config.set_option("listening_ports", "127.0.0.1:8080").unwrap();
//! config.set_option("document_root", "/var/www").unwrap();
//!
//! let ctx = Context::start(config, Arc::new(NoCallbacks)).unwrap();
//! println!("Escuchando en {:?}", ctx.listening_addrs());
//! ctx.stop();
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod resource;
pub mod router;
pub mod server;
pub mod utils;
