//! # Tipos MIME
//! src/utils/mime.rs
//!
//! Tabla integrada de extensiones → `Content-Type`. La opción
//! `extra_mime_types` (`.ext=tipo,...`) se consulta antes que la tabla.

use super::split_option_list;

/// Tipo usado cuando ninguna extensión coincide
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

const BUILTIN_MIME_TYPES: &[(&str, &str)] = &[
    (".html", "text/html"),
    (".htm", "text/html"),
    (".shtm", "text/html"),
    (".shtml", "text/html"),
    (".css", "text/css"),
    (".js", "application/x-javascript"),
    (".ico", "image/x-icon"),
    (".gif", "image/gif"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".svg", "image/svg+xml"),
    (".txt", "text/plain"),
    (".torrent", "application/x-bittorrent"),
    (".wav", "audio/x-wav"),
    (".mp3", "audio/x-mp3"),
    (".mid", "audio/mid"),
    (".m3u", "audio/x-mpegurl"),
    (".ogg", "application/ogg"),
    (".ram", "audio/x-pn-realaudio"),
    (".xml", "text/xml"),
    (".json", "text/json"),
    (".xslt", "application/xml"),
    (".xsl", "application/xml"),
    (".ra", "audio/x-pn-realaudio"),
    (".doc", "application/msword"),
    (".exe", "application/octet-stream"),
    (".zip", "application/x-zip-compressed"),
    (".xls", "application/excel"),
    (".tgz", "application/x-tar-gz"),
    (".tar", "application/x-tar"),
    (".gz", "application/x-gunzip"),
    (".arj", "application/x-arj-compressed"),
    (".rar", "application/x-arj-compressed"),
    (".rtf", "application/rtf"),
    (".pdf", "application/pdf"),
    (".swf", "application/x-shockwave-flash"),
    (".mpg", "video/mpeg"),
    (".webm", "video/webm"),
    (".mpeg", "video/mpeg"),
    (".mov", "video/quicktime"),
    (".mp4", "video/mp4"),
    (".m4v", "video/x-m4v"),
    (".asf", "video/x-ms-asf"),
    (".avi", "video/x-msvideo"),
    (".bmp", "image/bmp"),
    (".ttf", "application/x-font-ttf"),
];

fn has_suffix_ignore_case(path: &str, suffix: &str) -> bool {
    path.len() >= suffix.len()
        && path.as_bytes()[path.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Busca el tipo MIME solo en la tabla integrada
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::mime::builtin_mime_type;
///
/// assert_eq!(builtin_mime_type("/img/logo.PNG"), "image/png");
/// assert_eq!(builtin_mime_type("/LICENSE"), "text/plain");
/// ```
pub fn builtin_mime_type(path: &str) -> &'static str {
    BUILTIN_MIME_TYPES
        .iter()
        .find(|(ext, _)| has_suffix_ignore_case(path, ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Resuelve el tipo MIME de `path`, dando prioridad a `extra_mime_types`
pub fn mime_type(extra_mime_types: Option<&str>, path: &str) -> String {
    if let Some(extra) = extra_mime_types {
        let found = split_option_list(extra)
            .find(|(ext, mime)| mime.is_some() && has_suffix_ignore_case(path, ext));
        if let Some((_, Some(mime))) = found {
            return mime.to_string();
        }
    }
    builtin_mime_type(path).to_string()
}
