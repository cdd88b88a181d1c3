//! # Archivos Estáticos
//! src/handlers/file.rs
//!
//! Sirve un recurso con `Etag`, `Last-Modified`, peticiones condicionales
//! y un único rango de bytes (`Range: bytes=a-b` o `bytes=a-`).

use super::send_data;
use crate::http::{Method, Request, Response, StatusCode};
use crate::resource::Resource;
use crate::server::Connection;
use crate::utils::date::{http_date, parse_http_date, unix_now};
use crate::utils::mime::mime_type;
use std::io::{Seek, SeekFrom};
use std::path::Path;

/// Parsea `bytes=a-b` / `bytes=a-`. Solo se considera el primer rango.
///
/// ```
/// use httpd_engine::handlers::file::parse_range_header;
///
/// assert_eq!(parse_range_header("bytes=0-99"), Some((0, Some(99))));
/// assert_eq!(parse_range_header("bytes=100-"), Some((100, None)));
/// assert_eq!(parse_range_header("bytes=-500"), None);
/// ```
pub fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value
        .trim()
        .strip_prefix("bytes=")
        .or_else(|| value.trim().strip_prefix("bytes "))?;
    let first = spec.split(',').next()?.trim();
    let first = first.split('/').next()?;
    let (start, end) = first.split_once('-')?;

    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_number(start) {
        return None;
    }
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else if is_number(end) {
        Some(end.parse().ok()?)
    } else {
        return None;
    };
    Some((start, end))
}

/// `true` si el cliente ya tiene esta versión del recurso
pub fn is_not_modified(request: &Request, resource: &Resource) -> bool {
    let etag_matches = request
        .header("If-None-Match")
        .map_or(false, |etag| etag.trim() == resource.etag());
    let unmodified_since = request
        .header("If-Modified-Since")
        .and_then(parse_http_date)
        .map_or(false, |since| resource.modified() <= since);
    etag_matches || unmodified_since
}

/// Sirve `path` como archivo estático; 404 si no existe
pub(crate) fn send_file(conn: &mut Connection, path: &Path) {
    let callbacks = conn.callbacks();
    match Resource::stat(callbacks.as_ref(), path) {
        Some(resource) if !resource.is_directory() => {
            if is_not_modified(conn.request(), &resource) {
                conn.send_http_error(StatusCode::NotModified, "");
            } else {
                handle_file_request(conn, &resource);
            }
        }
        _ => conn.send_http_error(StatusCode::NotFound, "File not found"),
    }
}

pub(crate) fn handle_file_request(conn: &mut Connection, resource: &Resource) {
    let size = resource.size();
    let mut status = StatusCode::Ok;
    let mut start = 0;
    let mut len = size;
    let mut content_range = None;

    if let Some((first, last)) = conn.request().header("Range").and_then(parse_range_header) {
        if first >= size {
            let mut response = Response::error(StatusCode::RangeNotSatisfiable, "");
            response.add_header("Content-Range", &format!("bytes */{}", size));
            response.add_header("Connection", conn.connection_header());
            let _ = conn.send_response(&response);
            return;
        }
        let last = last.map_or(size - 1, |last| last.min(size - 1));
        // Un rango invertido se ignora y se sirve el archivo entero
        if last >= first {
            status = StatusCode::PartialContent;
            start = first;
            len = last - first + 1;
            content_range = Some(format!("bytes {}-{}/{}", first, last, size));
        }
    }

    let mut reader = match resource.open() {
        Ok(reader) => reader,
        Err(err) => {
            let message = format!("fopen({}): {}", resource.path().display(), err);
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    };
    if start > 0 {
        if let Err(err) = reader.seek(SeekFrom::Start(start)) {
            let message = format!("fseek({}): {}", resource.path().display(), err);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    }

    let path = resource.path().to_string_lossy();
    let content_type = mime_type(conn.config().extra_mime_types.as_deref(), &path);
    let mut response = Response::new(status)
        .with_header("Date", &http_date(unix_now()))
        .with_header("Last-Modified", &http_date(resource.modified()))
        .with_header("Etag", &resource.etag())
        .with_header("Content-Type", &content_type)
        .with_header("Content-Length", &len.to_string())
        .with_header("Connection", conn.connection_header())
        .with_header("Accept-Ranges", "bytes");
    if let Some(range) = &content_range {
        response.add_header("Content-Range", range);
    }

    if conn.send_response(&response).is_err() || conn.request().method() == Method::HEAD {
        return;
    }
    if let Err(err) = send_data(conn, &mut reader, Some(len)) {
        log::debug!("Envío de {} interrumpido: {}", path, err);
    }
}
