//! # Hashes
//! src/utils/hash.rs
//!
//! MD5 para digest authentication y SHA-1 + base64 para el handshake
//! WebSocket.

use md5::{Digest, Md5};
use sha1::Sha1;

/// GUID fijo de RFC 6455 que se concatena a `Sec-WebSocket-Key`
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// MD5 en hexadecimal (minúsculas) de la concatenación de `parts`
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::hash::md5_hex;
///
/// assert_eq!(md5_hex(&[""]), "d41d8cd98f00b204e9800998ecf8427e");
/// assert_eq!(md5_hex(&["a", ":", "b"]), md5_hex(&["a:b"]));
/// ```
pub fn md5_hex(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Valor de `Sec-WebSocket-Accept` para una `Sec-WebSocket-Key`
pub fn websocket_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::encode(hasher.finalize())
}
