//! # WebDAV Básico
//! src/handlers/dav.rs
//!
//! OPTIONS, PUT, DELETE y PROPFIND. Lo justo para que un cliente WebDAV
//! pueda listar, subir y borrar archivos bajo `document_root`.

use super::forward_body_data;
use super::file::parse_range_header;
use crate::http::{Response, StatusCode};
use crate::resource::Resource;
use crate::router::is_hidden;
use crate::server::Connection;
use crate::utils::date::http_date;
use crate::utils::uri::url_encode;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// Métodos que anuncia OPTIONS
pub const ALLOWED_METHODS: &str = "GET, POST, HEAD, CONNECT, PUT, DELETE, OPTIONS, PROPFIND";

pub(crate) fn send_options(conn: &mut Connection) {
    let response = Response::new(StatusCode::Ok)
        .with_header("Allow", ALLOWED_METHODS)
        .with_header("DAV", "1")
        .with_header("Content-Length", "0")
        .with_header("Connection", conn.connection_header());
    let _ = conn.send_response(&response);
}

fn send_status_ok(conn: &mut Connection, status: u16) {
    let response = Response::with_status_line(status, "OK")
        .with_header("Content-Length", "0")
        .with_header("Connection", conn.connection_header());
    let _ = conn.send_response(&response);
}

/// Crea o reemplaza el archivo con el body del request.
///
/// Responde 201 si el archivo no existía, 200 si lo reemplazó y 206 si
/// el request traía `Content-Range` (se escribe desde ese offset).
pub(crate) fn put_file(conn: &mut Connection, path: &Path, existing: Option<&Resource>) {
    let mut status = if existing.is_some() { 200 } else { 201 };
    conn.set_status(status);

    let is_dir_request = conn.request().uri().ends_with('/');
    let dir = if is_dir_request { Some(path) } else { path.parent() };
    if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
        if let Err(err) = fs::create_dir_all(dir) {
            let message = format!("put_dir({}): {}", path.display(), err);
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    }
    if is_dir_request {
        send_status_ok(conn, status);
        return;
    }

    let range_start = conn
        .request()
        .header("Content-Range")
        .and_then(parse_range_header)
        .map(|(start, _)| start);

    let opened = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(range_start.is_none())
        .open(path);
    let mut file = match opened {
        Ok(file) => file,
        Err(err) => {
            let message = format!("fopen({}): {}", path.display(), err);
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    };

    if let Some(start) = range_start {
        status = StatusCode::PartialContent.as_u16();
        conn.set_status(status);
        if let Err(err) = file.seek(SeekFrom::Start(start)) {
            let message = format!("fseek({}): {}", path.display(), err);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    }

    if forward_body_data(conn, &mut file) {
        if let Err(err) = file.flush() {
            let message = format!("fwrite({}): {}", path.display(), err);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
        send_status_ok(conn, status);
    }
}

pub(crate) fn delete_file(conn: &mut Connection, path: &Path, existing: Option<&Resource>) {
    let existing = match existing {
        Some(resource) if !is_hidden(conn.config(), path) => resource,
        _ => {
            conn.send_http_error(StatusCode::NotFound, "File not found");
            return;
        }
    };

    let removed = if existing.is_directory() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => conn.send_http_error(StatusCode::Ok, ""),
        Err(err) => {
            let message = format!("remove({}): {}", path.display(), err);
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
        }
    }
}

/// Bloque `<d:response>` de un recurso
pub fn dav_response(href: &str, is_directory: bool, size: u64, modified: i64) -> String {
    format!(
        "<d:response>\
         <d:href>{}</d:href>\
         <d:propstat><d:prop>\
         <d:resourcetype>{}</d:resourcetype>\
         <d:getcontentlength>{}</d:getcontentlength>\
         <d:getlastmodified>{}</d:getlastmodified>\
         </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat>\
         </d:response>\n",
        href,
        if is_directory { "<d:collection/>" } else { "" },
        size,
        http_date(modified)
    )
}

pub(crate) fn handle_propfind(conn: &mut Connection, path: &Path, resource: &Resource) {
    let uri = conn.request().uri().to_string();
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><d:multistatus xmlns:d='DAV:'>\n");
    body.push_str(&dav_response(&uri, resource.is_directory(), resource.size(), resource.modified()));

    let depth_zero = conn.request().header("Depth").map_or(false, |d| d.trim() == "0");
    if resource.is_directory() && conn.config().enable_directory_listing && !depth_zero {
        let callbacks = conn.callbacks();
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                let child = entry.path();
                if is_hidden(conn.config(), &child) {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(info) = Resource::stat(callbacks.as_ref(), &child) {
                    let href = format!("{}{}", uri, url_encode(&name));
                    body.push_str(&dav_response(&href, info.is_directory(), info.size(), info.modified()));
                }
            }
        }
    }
    body.push_str("</d:multistatus>\n");

    conn.set_must_close();
    let response = Response::new(StatusCode::MultiStatus)
        .with_header("Connection", "close")
        .with_header("Content-Type", "text/xml; charset=utf-8")
        .with_body(&body);
    let _ = conn.send_response(&response);
}
