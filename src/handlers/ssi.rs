//! # Server Side Includes
//! src/handlers/ssi.rs
//!
//! Copia el archivo al cliente reemplazando las directivas:
//!
//! ```text
//! <!--#include virtual="/footer.html" -->   relativo a document_root
//! <!--#include file="/etc/motd" -->         ruta tal cual
//! <!--#include "parts/menu.html" -->        relativo al archivo actual
//! <!--#exec "date" -->                      salida de /bin/sh -c
//! ```
//!
//! Los archivos incluidos que también coinciden con `ssi_pattern` se
//! procesan recursivamente, hasta [`MAX_INCLUDE_DEPTH`] niveles.

use super::{send_data, ChildGuard, ChildOutput};
use crate::http::StatusCode;
use crate::server::buffer::IO_CHUNK_SIZE;
use crate::server::Connection;
use crate::utils::matches;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// Máxima profundidad de includes anidados
pub const MAX_INCLUDE_DEPTH: usize = 10;

const TAG_PREFIX: &[u8] = b"<!--#";

/// Destino de un `#include`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeTarget {
    Virtual(String),
    File(String),
    Relative(String),
}

fn include_regex() -> &'static Regex {
    static INCLUDE: OnceLock<Regex> = OnceLock::new();
    INCLUDE.get_or_init(|| {
        Regex::new(r#"^\s*(?:(virtual|file)\s*=\s*)?"([^"]*)""#).expect("SSI include regex is valid")
    })
}

/// Parsea los argumentos de `#include` (lo que sigue a la palabra)
///
/// ```
/// use httpd_engine::handlers::ssi::{parse_include, IncludeTarget};
///
/// assert_eq!(
///     parse_include(r#" virtual="/a.html" -->"#),
///     Some(IncludeTarget::Virtual("/a.html".to_string()))
/// );
/// ```
pub fn parse_include(args: &str) -> Option<IncludeTarget> {
    let captures = include_regex().captures(args)?;
    let target = captures.get(2)?.as_str().to_string();
    match captures.get(1).map(|kind| kind.as_str()) {
        Some("virtual") => Some(IncludeTarget::Virtual(target)),
        Some("file") => Some(IncludeTarget::File(target)),
        _ => Some(IncludeTarget::Relative(target)),
    }
}

/// Parsea el comando de `#exec "cmd"`
pub fn parse_exec(args: &str) -> Option<String> {
    let rest = args.trim_start().strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

pub(crate) fn handle_ssi_file_request(conn: &mut Connection, path: &Path) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            let message = format!("fopen({}): {}", path.display(), err);
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    };

    conn.set_must_close();
    conn.set_status(StatusCode::Ok.as_u16());
    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n";
    if conn.write_all(head.as_bytes()).is_err() {
        return;
    }
    send_ssi_file(conn, path, file, 0);
}

/// Procesa `reader` (el contenido de `path`) escribiendo en `conn`
fn send_ssi_file<R: Read>(conn: &mut Connection, path: &Path, reader: R, depth: usize) {
    let mut out: Vec<u8> = Vec::with_capacity(IO_CHUNK_SIZE);
    let mut tag: Vec<u8> = Vec::new();
    let mut in_tag = false;

    for byte in BufReader::new(reader).bytes() {
        let ch = match byte {
            Ok(ch) => ch,
            Err(_) => break,
        };

        if in_tag {
            tag.push(ch);
            if ch == b'>' {
                in_tag = false;
                if tag.len() > TAG_PREFIX.len() && tag.starts_with(TAG_PREFIX) {
                    if flush(conn, &mut out).is_err() {
                        return;
                    }
                    do_directive(conn, path, &tag, depth);
                } else {
                    out.extend_from_slice(&tag);
                }
                tag.clear();
            } else if tag.len() == TAG_PREFIX.len() && !tag.starts_with(TAG_PREFIX) {
                // No es una directiva: el texto se copia tal cual
                in_tag = false;
                out.append(&mut tag);
            } else if tag.len() >= IO_CHUNK_SIZE {
                conn.log_error(&format!("{}: SSI tag is too large", path.display()));
                in_tag = false;
                tag.clear();
            }
        } else if ch == b'<' {
            in_tag = true;
            tag.push(ch);
        } else {
            out.push(ch);
        }

        if out.len() >= IO_CHUNK_SIZE && flush(conn, &mut out).is_err() {
            return;
        }
    }

    out.append(&mut tag);
    let _ = flush(conn, &mut out);
}

fn flush(conn: &mut Connection, out: &mut Vec<u8>) -> std::io::Result<()> {
    if out.is_empty() {
        return Ok(());
    }
    let result = conn.write_all(out);
    out.clear();
    result
}

fn do_directive(conn: &mut Connection, path: &Path, tag: &[u8], depth: usize) {
    let text = String::from_utf8_lossy(&tag[TAG_PREFIX.len()..]);
    if let Some(args) = text.strip_prefix("include") {
        match parse_include(args) {
            Some(target) => do_include(conn, path, target, depth),
            None => conn.log_error(&format!("Bad SSI #include: [{}]", text)),
        }
    } else if let Some(args) = text.strip_prefix("exec") {
        match parse_exec(args) {
            Some(cmd) => do_exec(conn, &cmd),
            None => conn.log_error(&format!("Bad SSI #exec: [{}]", text)),
        }
    } else {
        conn.log_error(&format!("{}: unknown SSI command: \"{}\"", path.display(), text));
    }
}

/// Ruta del archivo a incluir desde `current`
pub fn include_path(document_root: &str, current: &Path, target: &IncludeTarget) -> PathBuf {
    match target {
        IncludeTarget::Virtual(name) => PathBuf::from(format!("{}/{}", document_root, name)),
        IncludeTarget::File(name) => PathBuf::from(name),
        IncludeTarget::Relative(name) => current.parent().unwrap_or(Path::new(".")).join(name),
    }
}

fn do_include(conn: &mut Connection, current: &Path, target: IncludeTarget, depth: usize) {
    let root = conn.config().document_root.clone().unwrap_or_default();
    let path = include_path(&root, current, &target);

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            conn.log_error(&format!("Cannot open SSI #include: [{}]: {}", path.display(), err));
            return;
        }
    };

    if matches(&conn.config().ssi_pattern, &path.to_string_lossy()) {
        if depth + 1 >= MAX_INCLUDE_DEPTH {
            conn.log_error(&format!("SSI #include level is too deep ({})", path.display()));
            return;
        }
        send_ssi_file(conn, &path, file, depth + 1);
    } else {
        let mut file = file;
        let _ = send_data(conn, &mut file, None);
    }
}

fn do_exec(conn: &mut Connection, cmd: &str) {
    let child = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn();
    let mut child = match child {
        Ok(child) => ChildGuard(child),
        Err(err) => {
            conn.log_error(&format!("Cannot SSI #exec: [{}]: {}", cmd, err));
            return;
        }
    };

    if let Some(stdout) = child.0.stdout.take() {
        let mut stdout = ChildOutput::new(conn, stdout);
        if let Err(err) = send_data(conn, &mut stdout, None) {
            conn.log_error(&format!("SSI #exec [{}]: {}", cmd, err));
        }
    }
}
