//! # Buffer de Lectura
//! src/server/buffer.rs
//!
//! Buffer por conexión que sobrevive entre requests keep-alive. Los bytes
//! válidos son siempre `data[..len]`; al terminar un request se consumen
//! del frente exactamente los bytes que le pertenecían, de modo que un
//! request encadenado (pipelining) queda al inicio.

use std::io::{self, Read};

/// Tamaño máximo de la cabecera de un request
pub const MAX_REQUEST_SIZE: usize = 16384;

/// Tamaño de los bloques de I/O
pub const IO_CHUNK_SIZE: usize = 8192;

#[derive(Debug)]
pub struct RequestBuffer {
    data: Vec<u8>,
    len: usize,
}

impl RequestBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            data: vec![0; max_size],
            len: 0,
        }
    }

    /// Bytes válidos
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Lee una vez desde `reader` al espacio libre. Retorna 0 en EOF o si
    /// el buffer ya está lleno.
    pub fn fill<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.is_full() {
            return Ok(0);
        }
        loop {
            match reader.read(&mut self.data[self.len..]) {
                Ok(n) => {
                    self.len += n;
                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Descarta `n` bytes del frente
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Conserva solo los primeros `n` bytes
    pub fn truncate(&mut self, n: usize) {
        self.len = self.len.min(n);
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}
