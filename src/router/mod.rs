//! # Despacho de Requests
//! src/router/mod.rs
//!
//! Decide qué handler atiende cada request. El URI se decodifica y
//! normaliza, se traduce a una ruta en disco (aplicando `url_rewrite_patterns`
//! y la emulación de PATH_INFO de CGI) y luego se recorre la cadena:
//!
//! ```text
//! redirect TLS → auth → callback del host → WebSocket → OPTIONS
//!   → sin document_root (404) → auth PUT/DELETE → PUT → DELETE
//!   → inexistente/oculto (404) → directorio sin "/" (301) → PROPFIND
//!   → índice o listado → CGI → SSI → 304 → archivo estático
//! ```
//!
//! El primer paso que aplica genera la respuesta completa.

use crate::config::Config;
use crate::handlers::{auth, cgi, dav, directory, file, ssi, websocket};
use crate::http::{Method, Response, StatusCode};
use crate::resource::Resource;
use crate::server::callbacks::Callbacks;
use crate::server::Connection;
use crate::utils::uri::{remove_double_dots_and_double_slashes, split_option_list, url_decode};
use crate::utils::{match_prefix, matches};
use std::path::{Path, PathBuf};

/// Archivo de contraseñas por directorio; nunca se sirve
pub const PASSWORDS_FILE_NAME: &str = ".htpasswd";

/// Resultado de traducir el URI
#[derive(Debug)]
struct Resolved {
    path: PathBuf,
    resource: Option<Resource>,
}

/// Atiende el request actual de `conn`
pub(crate) fn handle_request(conn: &mut Connection) {
    let decoded = url_decode(conn.request().uri(), false);
    let normalized = remove_double_dots_and_double_slashes(&decoded);
    conn.request_mut().set_uri(normalized);
    conn.update_throttle();

    let callbacks = conn.callbacks();
    let Resolved { mut path, resource } = resolve(conn, callbacks.as_ref());
    let method = conn.request().method();
    let is_put_or_delete = matches!(method, Method::PUT | Method::DELETE);

    if conn.is_tls_redirect() && !conn.is_tls() && conn.tls_port().is_some() {
        redirect_to_https(conn);
        return;
    }
    if !is_put_or_delete && !auth::check_authorization(conn, &path) {
        auth::send_authorization_request(conn);
        return;
    }
    if callbacks.begin_request(conn) {
        return;
    }
    if websocket::is_websocket_request(conn.request()) {
        websocket::handle_websocket_request(conn);
        return;
    }
    if method == Method::OPTIONS {
        dav::send_options(conn);
        return;
    }
    if conn.config().document_root.is_none() {
        conn.send_http_error(StatusCode::NotFound, "Not Found");
        return;
    }
    if is_put_or_delete && !auth::is_authorized_for_put(conn) {
        auth::send_authorization_request(conn);
        return;
    }
    if method == Method::PUT {
        dav::put_file(conn, &path, resource.as_ref());
        return;
    }
    if method == Method::DELETE {
        dav::delete_file(conn, &path, resource.as_ref());
        return;
    }

    let found = match resource {
        Some(found) if !is_hidden(conn.config(), &path) => found,
        _ => {
            conn.send_http_error(StatusCode::NotFound, "File not found");
            return;
        }
    };

    if found.is_directory() && !conn.request().uri().ends_with('/') {
        let location = format!("{}/", conn.request().uri());
        let response = Response::new(StatusCode::MovedPermanently)
            .with_header("Location", &location)
            .with_header("Content-Length", "0")
            .with_header("Connection", conn.connection_header());
        let _ = conn.send_response(&response);
        return;
    }
    if method == Method::PROPFIND {
        dav::handle_propfind(conn, &path, &found);
        return;
    }

    let mut found = found;
    if found.is_directory() {
        match substitute_index_file(conn.config(), callbacks.as_ref(), &path) {
            Some((index_path, index)) => {
                path = index_path;
                found = index;
            }
            None => {
                if conn.config().enable_directory_listing {
                    directory::handle_directory_request(conn, &path);
                } else {
                    conn.send_http_error(StatusCode::Forbidden, "Directory listing denied");
                }
                return;
            }
        }
    }

    let path_str = path.to_string_lossy();
    if matches(&conn.config().cgi_pattern, &path_str) {
        if !matches!(method, Method::GET | Method::HEAD | Method::POST) {
            let message = format!("Method {} is not implemented", method);
            conn.send_http_error(StatusCode::NotImplemented, &message);
        } else {
            cgi::handle_cgi_request(conn, &path);
        }
    } else if matches(&conn.config().ssi_pattern, &path_str) {
        ssi::handle_ssi_file_request(conn, &path);
    } else if file::is_not_modified(conn.request(), &found) {
        conn.send_http_error(StatusCode::NotModified, "");
    } else {
        file::handle_file_request(conn, &found);
    }
}

/// Traduce el URI normalizado a una ruta y la busca.
///
/// Si la ruta no existe, prueba sus prefijos que terminan en `/`: el
/// primero (el más largo) que sea un script CGI existente se usa como
/// ruta y el resto queda como PATH_INFO.
fn resolve(conn: &mut Connection, callbacks: &dyn Callbacks) -> Resolved {
    let uri = conn.request().uri().to_string();
    let config = conn.config();
    let root = config.document_root.as_deref().unwrap_or("");

    let target = config
        .url_rewrite_patterns
        .as_deref()
        .and_then(|rules| rewrite_target(rules, &uri))
        .unwrap_or_else(|| format!("{}{}", root, uri));

    if let Some(resource) = Resource::stat(callbacks, Path::new(&target)) {
        return Resolved {
            path: PathBuf::from(target),
            resource: Some(resource),
        };
    }

    let cgi_pattern = config.cgi_pattern.clone();
    for (pos, _) in target.char_indices().rev().filter(|&(pos, c)| c == '/' && pos > 1) {
        let script = &target[..pos];
        if !matches(&cgi_pattern, script) {
            continue;
        }
        if let Some(resource) = Resource::stat(callbacks, Path::new(script)) {
            if resource.is_directory() {
                continue;
            }
            conn.set_path_info(Some(target[pos..].to_string()));
            return Resolved {
                path: PathBuf::from(script),
                resource: Some(resource),
            };
        }
    }

    Resolved {
        path: PathBuf::from(target),
        resource: None,
    }
}

/// Aplica las reglas `prefijo=directorio`: gana la coincidencia más
/// larga, y ante empate la primera regla.
///
/// ```
/// use httpd_engine::router::rewrite_target;
///
/// let rules = "/static/**=/srv/assets,/static=/srv/short";
/// assert_eq!(rewrite_target(rules, "/static/app.js").as_deref(), Some("/srv/assets"));
/// assert_eq!(rewrite_target(rules, "/other"), None);
/// ```
pub fn rewrite_target(rules: &str, uri: &str) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for (pattern, dir) in split_option_list(rules) {
        let (len, dir) = match (match_prefix(pattern, uri), dir) {
            (Some(len), Some(dir)) if len > 0 => (len, dir),
            _ => continue,
        };
        if best.map_or(true, |(best_len, _)| len > best_len) {
            best = Some((len, dir));
        }
    }
    best.map(|(len, dir)| format!("{}{}", dir, &uri[len..]))
}

/// `.htpasswd` y lo que coincida con `hide_files_patterns`
pub fn is_hidden(config: &Config, path: &Path) -> bool {
    let path = path.to_string_lossy();
    let passwords_pattern = format!("**{}$", PASSWORDS_FILE_NAME);
    matches(&passwords_pattern, &path)
        || config
            .hide_files_patterns
            .as_deref()
            .map_or(false, |pattern| matches(pattern, &path))
}

/// Busca el primer archivo de `index_files` dentro del directorio
fn substitute_index_file(
    config: &Config,
    callbacks: &dyn Callbacks,
    dir: &Path,
) -> Option<(PathBuf, Resource)> {
    config
        .index_files
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .find_map(|name| {
            let candidate = dir.join(name);
            match Resource::stat(callbacks, &candidate) {
                Some(resource) if !resource.is_directory() => Some((candidate, resource)),
                _ => None,
            }
        })
}

fn redirect_to_https(conn: &mut Connection) {
    let host = conn
        .request()
        .header("Host")
        .and_then(|value| value.split(':').next())
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| conn.local_addr().ip().to_string());
    let port = conn.tls_port().unwrap_or(443);

    let mut location = format!("https://{}:{}{}", host, port, conn.request().uri());
    if let Some(query) = conn.request().query_string() {
        location.push('?');
        location.push_str(query);
    }

    let response = Response::new(StatusCode::Found)
        .with_header("Location", &location)
        .with_header("Content-Length", "0")
        .with_header("Connection", conn.connection_header());
    let _ = conn.send_response(&response);
}
