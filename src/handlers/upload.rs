//! # Upload multipart
//! src/handlers/upload.rs
//!
//! Guarda en disco las partes con `filename` de un body
//! `multipart/form-data`. El body se procesa por bloques: nunca se carga
//! completo en memoria.

use crate::server::buffer::IO_CHUNK_SIZE;
use crate::server::Connection;
use log::{debug, info};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Extrae el boundary de un `Content-Type` multipart
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let (_, rest) = content_type.split_once("boundary=")?;
    let value = rest.split(';').next()?.trim().trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Nombre de archivo de la cabecera de una parte, sin directorios
pub fn parse_part_filename(part_head: &str) -> Option<String> {
    let disposition = part_head.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("Content-Disposition") {
            Some(value)
        } else {
            None
        }
    })?;

    let raw = disposition
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))?
        .trim_matches('"');

    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(raw);
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Lee más body en `buf`; `false` en EOF o error
fn fill(conn: &mut Connection, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; IO_CHUNK_SIZE];
    match conn.read(&mut chunk) {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

pub(crate) fn upload(conn: &mut Connection, dest_dir: &Path) -> usize {
    let boundary = match conn.request().header("Content-Type").and_then(parse_boundary) {
        Some(boundary) => boundary,
        None => return 0,
    };
    let first_line = format!("--{}", boundary);
    let delimiter = format!("\r\n--{}", boundary).into_bytes();

    let callbacks = conn.callbacks();
    let mut buf: Vec<u8> = Vec::with_capacity(IO_CHUNK_SIZE);
    let mut uploaded = 0;

    loop {
        let head_end = loop {
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break Some(pos);
            }
            if buf.len() >= IO_CHUNK_SIZE || !fill(conn, &mut buf) {
                break None;
            }
        };
        let head_end = match head_end {
            Some(pos) => pos,
            None => break,
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        if head.lines().next() != Some(first_line.as_str()) {
            debug!("Parte multipart sin boundary válido");
            break;
        }
        let file_name = match parse_part_filename(&head) {
            Some(name) => name,
            None => break,
        };
        buf.drain(..head_end + 4);

        let path: PathBuf = dest_dir.join(&file_name);
        let mut file = match File::create(&path) {
            Ok(file) => file,
            Err(err) => {
                conn.log_error(&format!("Cannot open {}: {}", path.display(), err));
                break;
            }
        };

        let complete = loop {
            if let Some(pos) = find(&buf, &delimiter) {
                if file.write_all(&buf[..pos]).is_err() {
                    break false;
                }
                // Queda "--boundary..." al inicio para la siguiente parte
                buf.drain(..pos + 2);
                break true;
            }
            if buf.len() >= delimiter.len() {
                let safe = buf.len() - (delimiter.len() - 1);
                if file.write_all(&buf[..safe]).is_err() {
                    break false;
                }
                buf.drain(..safe);
            }
            if !fill(conn, &mut buf) {
                break false;
            }
        };
        drop(file);

        if !complete {
            conn.log_error(&format!("Upload of {} truncated", path.display()));
            break;
        }
        info!("Archivo recibido: {}", path.display());
        uploaded += 1;
        callbacks.upload(conn, &path);
    }

    uploaded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        assert_eq!(
            parse_boundary("multipart/form-data; boundary=----abc123").as_deref(),
            Some("----abc123")
        );
        assert_eq!(
            parse_boundary("multipart/form-data; boundary=\"quoted\"; charset=x").as_deref(),
            Some("quoted")
        );
        assert_eq!(parse_boundary("multipart/form-data"), None);
        assert_eq!(parse_boundary("multipart/form-data; boundary="), None);
    }

    #[test]
    fn test_parse_part_filename() {
        let head = "--xyz\r\nContent-Disposition: form-data; name=\"file\"; filename=\"report.pdf\"\r\nContent-Type: application/pdf";
        assert_eq!(parse_part_filename(head).as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_filename_is_stripped_of_directories() {
        let head = "--xyz\r\ncontent-disposition: form-data; filename=\"C:\\Users\\me\\a.txt\"";
        assert_eq!(parse_part_filename(head).as_deref(), Some("a.txt"));

        let head = "--xyz\r\nContent-Disposition: form-data; filename=\"../../etc/passwd\"";
        assert_eq!(parse_part_filename(head).as_deref(), Some("passwd"));

        let head = "--xyz\r\nContent-Disposition: form-data; filename=\"..\"";
        assert_eq!(parse_part_filename(head), None);
    }

    #[test]
    fn test_part_without_filename() {
        let head = "--xyz\r\nContent-Disposition: form-data; name=\"field\"";
        assert_eq!(parse_part_filename(head), None);
    }

    #[test]
    fn test_find() {
        assert_eq!(find(b"abc\r\n--b", b"\r\n--b"), Some(3));
        assert_eq!(find(b"abc", b"\r\n--b"), None);
    }
}
