//! # Utilidades
//! src/utils/mod.rs
//!
//! Funciones auxiliares sin estado que usan el parser, el router y los
//! handlers:
//!
//! - `pattern`: matcher de patrones glob estilo `**.cgi$|*.pl$`
//! - `uri`: decodificación/codificación de URIs, normalización y listas de opciones
//! - `mime`: tabla de tipos MIME por extensión
//! - `net`: parseo de redes IPv4, ACL y reglas de throttle
//! - `date`: formato y parseo de fechas HTTP
//! - `hash`: MD5 en hex y clave `Sec-WebSocket-Accept`

pub mod date;
pub mod hash;
pub mod mime;
pub mod net;
pub mod pattern;
pub mod uri;

pub use pattern::{match_prefix, matches};
pub use uri::{split_option_list, url_decode, url_encode};
