//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Todo lo que ocurre entre el socket y el router:
//! 1. Abre los puertos de `listening_ports` ([`listener`])
//! 2. Un thread aceptador hace poll y aplica la ACL ([`context`])
//! 3. Las conexiones viajan por una cola acotada ([`queue`])
//! 4. Cada worker atiende una conexión a la vez ([`worker`], [`connection`])

pub mod access_log;
pub mod buffer;
pub mod callbacks;
pub mod connection;
pub mod context;
pub mod listener;
pub mod queue;
pub mod tls;
pub mod worker;

// Re-exportar para facilitar el uso
pub use callbacks::{Callbacks, NoCallbacks};
pub use connection::Connection;
pub use context::Context;
pub use tls::{RustlsProvider, TlsProvider, TlsSession};
