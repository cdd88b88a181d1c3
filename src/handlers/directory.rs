//! # Listado de Directorios
//! src/handlers/directory.rs
//!
//! Genera una tabla HTML con nombre, fecha y tamaño de cada entrada. El
//! query string elige el orden: primer carácter `n` (nombre), `d` (fecha)
//! o `s` (tamaño); segundo carácter `a` o `d` (ascendente/descendente).
//! Los directorios siempre van primero.

use super::escape_html;
use crate::http::{Method, StatusCode};
use crate::router::is_hidden;
use crate::server::Connection;
use crate::utils::date::listing_date;
use crate::utils::uri::url_encode;
use std::cmp::Ordering;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Una entrada del directorio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: i64,
}

/// Compara dos entradas según el query string del listado
pub fn compare_entries(a: &DirEntry, b: &DirEntry, sort: &str) -> Ordering {
    match (a.is_directory, b.is_directory) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    let mut keys = sort.chars();
    let ordering = match keys.next() {
        Some('n') => a.name.cmp(&b.name),
        Some('s') => a.size.cmp(&b.size),
        Some('d') => a.modified.cmp(&b.modified),
        _ => Ordering::Equal,
    };
    if keys.next() == Some('d') {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Ordena las entradas; sin query string se ordena por nombre
pub fn sort_entries(entries: &mut [DirEntry], sort: Option<&str>) {
    let sort = sort.filter(|s| !s.is_empty()).unwrap_or("na");
    entries.sort_by(|a, b| compare_entries(a, b, sort));
}

/// Tamaño legible: `123`, `1.5k`, `2.0M`, `1.1G`
pub fn human_size(size: u64) -> String {
    if size < 1024 {
        format!("{}", size)
    } else if size < 0x10_0000 {
        format!("{:.1}k", size as f64 / 1024.0)
    } else if size < 0x4000_0000 {
        format!("{:.1}M", size as f64 / 1_048_576.0)
    } else {
        format!("{:.1}G", size as f64 / 1_073_741_824.0)
    }
}

fn read_entries(conn: &Connection, dir: &Path) -> io::Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(conn.config(), &entry.path()) {
            continue;
        }
        // Entradas que desaparecen mientras se lista se omiten
        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as i64);
        entries.push(DirEntry {
            name,
            is_directory: metadata.is_dir(),
            size: metadata.len(),
            modified,
        });
    }
    Ok(entries)
}

fn render_row(uri: &str, entry: &DirEntry) -> String {
    let slash = if entry.is_directory { "/" } else { "" };
    let size = if entry.is_directory {
        "[DIRECTORY]".to_string()
    } else {
        human_size(entry.size)
    };
    format!(
        "<tr><td><a href=\"{}{}{}\">{}{}</a></td><td>&nbsp;{}</td><td>&nbsp;&nbsp;{}</td></tr>\n",
        escape_html(uri),
        url_encode(&entry.name),
        slash,
        escape_html(&entry.name),
        slash,
        listing_date(entry.modified),
        size
    )
}

/// Página completa del listado
pub fn render_listing(uri: &str, entries: &[DirEntry], sort: Option<&str>) -> String {
    let direction = if sort.map_or(false, |s| s.as_bytes().get(1) == Some(&b'd')) {
        'a'
    } else {
        'd'
    };
    let title = escape_html(uri);

    let mut html = format!(
        "<html><head><title>Index of {title}</title>\
         <style>th {{text-align: left;}}</style></head>\
         <body><h1>Index of {title}</h1><pre><table cellpadding=\"0\">\
         <tr><th><a href=\"?n{d}\">Name</a></th><th><a href=\"?d{d}\">Modified</a></th>\
         <th><a href=\"?s{d}\">Size</a></th></tr>\
         <tr><td colspan=\"3\"><hr></td></tr>",
        title = title,
        d = direction
    );
    html.push_str(&format!(
        "<tr><td><a href=\"{}..\">Parent directory</a></td><td>&nbsp;-</td><td>&nbsp;&nbsp;-</td></tr>\n",
        title
    ));
    for entry in entries {
        html.push_str(&render_row(uri, entry));
    }
    html.push_str("</table></body></html>");
    html
}

pub(crate) fn handle_directory_request(conn: &mut Connection, dir: &Path) {
    let mut entries = match read_entries(conn, dir) {
        Ok(entries) => entries,
        Err(err) => {
            let message = format!("Cannot open directory {}: {}", dir.display(), err);
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    };

    let sort = conn.request().query_string().map(str::to_string);
    sort_entries(&mut entries, sort.as_deref());
    let html = render_listing(conn.request().uri(), &entries, sort.as_deref());

    conn.set_must_close();
    conn.set_status(StatusCode::Ok.as_u16());
    let head = "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: text/html; charset=utf-8\r\n\r\n";
    if conn.write_all(head.as_bytes()).is_err() || conn.request().method() == Method::HEAD {
        return;
    }
    let _ = conn.write_all(html.as_bytes());
}
