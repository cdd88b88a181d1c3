//! # WebSocket
//! src/handlers/websocket.rs
//!
//! Handshake (RFC 6455, versión 13) y lectura de frames. Cada frame
//! recibido se desenmascara y se entrega al callback `websocket_data`; el
//! host responde con [`Connection::websocket_write`].
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |           (16/64)             |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |  Masking-key (si M=1)         |          Payload Data ...     |
//! +-------------------------------+-------------------------------+
//! ```

use crate::http::{Request, Response, StatusCode};
use crate::server::buffer::IO_CHUNK_SIZE;
use crate::server::Connection;
use crate::utils::hash::websocket_accept_key;
use log::debug;

pub const OPCODE_CONTINUATION: u8 = 0x0;
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;
pub const OPCODE_CONNECTION_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;
pub const OPCODE_PONG: u8 = 0xa;

/// Payload máximo aceptado en un frame
pub const MAX_PAYLOAD_SIZE: u64 = 16 * 1024 * 1024;

/// Cabecera de un frame ya decodificada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Primer byte completo (FIN, RSV y opcode)
    pub flags: u8,
    pub mask: Option<[u8; 4]>,
    pub header_len: usize,
    pub payload_len: u64,
}

impl FrameHeader {
    pub fn opcode(&self) -> u8 {
        self.flags & 0x0f
    }

    pub fn is_final(&self) -> bool {
        self.flags & 0x80 != 0
    }
}

/// Decodifica la cabecera al inicio de `buf`; `None` si faltan bytes
pub fn parse_frame_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < 2 {
        return None;
    }
    let masked = buf[1] & 0x80 != 0;
    let (payload_len, mut header_len) = match buf[1] & 0x7f {
        126 => {
            let bytes = buf.get(2..4)?;
            (u16::from_be_bytes([bytes[0], bytes[1]]) as u64, 4)
        }
        127 => {
            let bytes = buf.get(2..10)?;
            let mut len = [0u8; 8];
            len.copy_from_slice(bytes);
            (u64::from_be_bytes(len), 10)
        }
        len => (len as u64, 2),
    };

    let mask = if masked {
        let bytes = buf.get(header_len..header_len + 4)?;
        header_len += 4;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    } else {
        None
    };

    Some(FrameHeader {
        flags: buf[0],
        mask,
        header_len,
        payload_len,
    })
}

/// XOR del payload con la máscara del cliente
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Frame de servidor (sin máscara, FIN activo)
pub fn encode_frame(opcode: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 10);
    frame.push(0x80 | (opcode & 0x0f));
    let len = data.len();
    if len < 126 {
        frame.push(len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    frame.extend_from_slice(data);
    frame
}

fn header_contains(request: &Request, name: &str, token: &str) -> bool {
    request
        .header(name)
        .map_or(false, |value| value.to_ascii_lowercase().contains(token))
}

/// `true` si el request pide un upgrade a WebSocket
pub fn is_websocket_request(request: &Request) -> bool {
    request.header("Host").is_some()
        && header_contains(request, "Upgrade", "websocket")
        && header_contains(request, "Connection", "upgrade")
        && request.header("Sec-WebSocket-Key").is_some()
}

pub(crate) fn handle_websocket_request(conn: &mut Connection) {
    conn.set_must_close();

    let version = conn.request().header("Sec-WebSocket-Version").map(str::trim);
    if version != Some("13") {
        let mut response = Response::error(StatusCode::UpgradeRequired, "");
        response.add_header("Sec-WebSocket-Version", "13");
        response.add_header("Connection", "close");
        let _ = conn.send_response(&response);
        return;
    }

    let callbacks = conn.callbacks();
    if !callbacks.websocket_connect(conn) {
        conn.send_http_error(StatusCode::Forbidden, "WebSocket connection rejected");
        return;
    }

    let key = conn.request().header("Sec-WebSocket-Key").unwrap_or_default();
    let response = Response::new(StatusCode::SwitchingProtocols)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", &websocket_accept_key(key));
    if conn.send_response(&response).is_err() {
        return;
    }

    callbacks.websocket_ready(conn);
    read_websocket(conn);
    callbacks.websocket_close(conn);
}

/// Lee frames hasta que el cliente cierra o el host lo pide
fn read_websocket(conn: &mut Connection) {
    let callbacks = conn.callbacks();
    let mut pending = conn.take_buffered_after_request();
    let mut chunk = [0u8; IO_CHUNK_SIZE];

    loop {
        let header = match parse_frame_header(&pending) {
            Some(header) => header,
            None => {
                if !fill(conn, &mut pending, &mut chunk) {
                    return;
                }
                continue;
            }
        };
        if header.payload_len > MAX_PAYLOAD_SIZE {
            debug!("Frame WebSocket de {} bytes descartado", header.payload_len);
            return;
        }

        let frame_len = header.header_len + header.payload_len as usize;
        while pending.len() < frame_len {
            if !fill(conn, &mut pending, &mut chunk) {
                return;
            }
        }

        let mut payload: Vec<u8> = pending.drain(..frame_len).skip(header.header_len).collect();
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        let keep_going = callbacks.websocket_data(conn, header.flags, &payload);
        if header.opcode() == OPCODE_CONNECTION_CLOSE {
            let _ = conn.websocket_write(OPCODE_CONNECTION_CLOSE, &payload);
            return;
        }
        if !keep_going {
            return;
        }
    }
}

fn fill(conn: &mut Connection, pending: &mut Vec<u8>, chunk: &mut [u8]) -> bool {
    match conn.pull(chunk) {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            pending.extend_from_slice(&chunk[..n]);
            true
        }
    }
}
