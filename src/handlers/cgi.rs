//! # CGI
//! src/handlers/cgi.rs
//!
//! Ejecuta un script por request. El script recibe el request por
//! variables de entorno y el body por stdin; su stdout empieza con un
//! bloque de headers (`Status:`, `Location:`, `Content-Type:`...) seguido
//! del body, que se retransmite tal cual al cliente.

use super::{forward_body_data, send_data, ChildGuard, ChildOutput};
use crate::http::request::{get_request_len, parse_headers, RequestLen};
use crate::http::status::reason_phrase_for;
use crate::http::{Method, Response, StatusCode};
use crate::server::buffer::{IO_CHUNK_SIZE, MAX_REQUEST_SIZE};
use crate::server::Connection;
use crate::utils::uri::split_option_list;
use log::debug;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

/// Variables de entorno del proceso CGI, en orden de definición
#[derive(Debug, Default, Clone)]
pub struct CgiEnvironment {
    vars: Vec<(String, String)>,
}

impl CgiEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: &str) {
        self.vars.push((name.to_string(), value.to_string()));
    }

    /// Último valor definido para `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Arma el entorno para `conn` ejecutando el script `prog`
    pub fn for_request(conn: &Connection, prog: &Path) -> Self {
        let config = conn.config();
        let request = conn.request();
        let root = config.document_root.as_deref().unwrap_or("");
        let mut cgi_env = CgiEnvironment::new();

        cgi_env.add("SERVER_NAME", &config.authentication_domain);
        cgi_env.add("SERVER_ROOT", root);
        cgi_env.add("DOCUMENT_ROOT", root);
        cgi_env.add("SERVER_SOFTWARE", concat!("httpd_engine/", env!("CARGO_PKG_VERSION")));
        cgi_env.add("GATEWAY_INTERFACE", "CGI/1.1");
        cgi_env.add("SERVER_PROTOCOL", "HTTP/1.1");
        cgi_env.add("REDIRECT_STATUS", "200");
        cgi_env.add("SERVER_PORT", &conn.local_addr().port().to_string());
        cgi_env.add("REQUEST_METHOD", request.method().as_str());
        cgi_env.add("REMOTE_ADDR", &conn.remote_addr().ip().to_string());
        cgi_env.add("REMOTE_PORT", &conn.remote_addr().port().to_string());

        let request_uri = match request.query_string() {
            Some(query) => format!("{}?{}", request.uri(), query),
            None => request.uri().to_string(),
        };
        cgi_env.add("REQUEST_URI", &request_uri);

        let uri = request.uri();
        let script_name = match conn.path_info() {
            Some(path_info) if uri.ends_with(path_info) => &uri[..uri.len() - path_info.len()],
            _ => uri,
        };
        cgi_env.add("SCRIPT_NAME", script_name);
        cgi_env.add("SCRIPT_FILENAME", &prog.to_string_lossy());
        cgi_env.add("PATH_TRANSLATED", &format!("{}{}", root, uri));
        cgi_env.add("HTTPS", if conn.is_tls() { "on" } else { "off" });

        if let Some(content_type) = request.header("Content-Type") {
            cgi_env.add("CONTENT_TYPE", content_type);
        }
        if let Some(query) = request.query_string() {
            cgi_env.add("QUERY_STRING", query);
        }
        if let Some(length) = request.header("Content-Length") {
            cgi_env.add("CONTENT_LENGTH", length);
        }
        for name in ["PATH", "TMP", "TEMP", "TMPDIR", "PERLLIB", "LD_LIBRARY_PATH"] {
            if let Ok(value) = std::env::var(name) {
                cgi_env.add(name, &value);
            }
        }
        if let Some(path_info) = conn.path_info() {
            cgi_env.add("PATH_INFO", path_info);
        }
        if let Some(user) = conn.remote_user() {
            cgi_env.add("REMOTE_USER", user);
            cgi_env.add("AUTH_TYPE", "Digest");
        }

        for (name, value) in request.headers() {
            cgi_env.add(&header_var_name(name), value);
        }

        if let Some(extra) = &config.cgi_environment {
            for (name, value) in split_option_list(extra) {
                cgi_env.add(name, value.unwrap_or(""));
            }
        }
        cgi_env
    }
}

/// `Accept-Encoding` → `HTTP_ACCEPT_ENCODING`
pub fn header_var_name(header: &str) -> String {
    let mut name = String::with_capacity(header.len() + 5);
    name.push_str("HTTP_");
    for c in header.chars() {
        name.push(if c == '-' { '_' } else { c.to_ascii_uppercase() });
    }
    name
}

/// Separa `Status: 404 Not Found` en código y texto
fn parse_status(value: &str) -> Option<(u16, String)> {
    let value = value.trim();
    let digits = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    let code: u16 = value[..digits].parse().ok()?;
    let text = value[digits..].trim();
    let text = if text.is_empty() { reason_phrase_for(code) } else { text };
    Some((code, text.to_string()))
}

pub(crate) fn handle_cgi_request(conn: &mut Connection, prog: &Path) {
    let env = CgiEnvironment::for_request(conn, prog);
    let dir = prog.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));

    let mut command = match &conn.config().cgi_interpreter {
        Some(interpreter) => {
            let mut command = Command::new(interpreter);
            command.arg(prog.file_name().unwrap_or(prog.as_os_str()));
            command
        }
        None => Command::new(prog.canonicalize().unwrap_or_else(|_| prog.to_path_buf())),
    };
    command
        .current_dir(dir)
        .env_clear()
        .envs(env.iter())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = match command.spawn() {
        Ok(child) => ChildGuard(child),
        Err(err) => {
            let message = format!("Cannot spawn CGI process [{}]: {}", prog.display(), err);
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    };

    let stdin = child.0.stdin.take();
    let stdout = child.0.stdout.take();
    let (mut stdin, stdout) = match (stdin, stdout) {
        (Some(stdin), Some(stdout)) => (stdin, stdout),
        _ => {
            conn.send_http_error(StatusCode::InternalServerError, "Cannot create CGI pipe");
            return;
        }
    };

    if conn.request().method() == Method::POST && !forward_body_data(conn, &mut stdin) {
        return;
    }
    // EOF para el script
    drop(stdin);

    let mut stdout = ChildOutput::new(conn, stdout);
    let (buf, header_len) = match read_cgi_headers(&mut stdout) {
        Ok(result) => result,
        Err(message) => {
            conn.log_error(&message);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    };

    let block = String::from_utf8_lossy(&buf[..header_len]);
    let headers = match parse_headers(&block) {
        Ok(headers) => headers,
        Err(err) => {
            let message = format!("CGI program sent malformed HTTP headers: {}", err);
            conn.send_http_error(StatusCode::InternalServerError, &message);
            return;
        }
    };
    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    };

    let (code, text) = match header("Status") {
        Some(status) => match parse_status(status) {
            Some(parsed) => parsed,
            None => {
                let message = format!("CGI program sent an invalid Status: [{}]", status);
                conn.send_http_error(StatusCode::InternalServerError, &message);
                return;
            }
        },
        None if header("Location").is_some() => (302, "Found".to_string()),
        None => (200, "OK".to_string()),
    };

    let keep_alive = header("Connection").map_or(false, |value| value.eq_ignore_ascii_case("keep-alive"));
    if !keep_alive {
        conn.set_must_close();
    }

    let mut response = Response::with_status_line(code, &text);
    for (name, value) in &headers {
        if !name.eq_ignore_ascii_case("Status") {
            response.append_header(name, value);
        }
    }
    if header("Connection").is_none() {
        response.append_header("Connection", "close");
    }

    if conn.send_response(&response).is_err() || conn.request().method() == Method::HEAD {
        return;
    }
    if conn.write_all(&buf[header_len..]).is_err() {
        return;
    }
    if let Err(err) = send_data(conn, &mut stdout, None) {
        debug!("Salida de CGI {} interrumpida: {}", prog.display(), err);
    }
}

/// Lee la salida del script hasta el fin de su bloque de headers.
/// Retorna lo leído y el largo del bloque.
fn read_cgi_headers<R: Read>(stdout: &mut R) -> Result<(Vec<u8>, usize), String> {
    let mut buf = Vec::with_capacity(IO_CHUNK_SIZE);
    let mut chunk = [0u8; IO_CHUNK_SIZE];
    loop {
        match get_request_len(&buf) {
            RequestLen::Complete(len) => return Ok((buf, len)),
            RequestLen::Malformed => break,
            RequestLen::Incomplete => {}
        }
        if buf.len() >= MAX_REQUEST_SIZE {
            break;
        }
        let want = chunk.len().min(MAX_REQUEST_SIZE - buf.len());
        match stdout.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(format!("Cannot read CGI output: {}", err)),
        }
    }

    let preview = String::from_utf8_lossy(&buf[..buf.len().min(256)]).into_owned();
    Err(format!(
        "CGI program sent malformed or too big (>{} bytes) HTTP headers: [{}]",
        MAX_REQUEST_SIZE, preview
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_var_name() {
        assert_eq!(header_var_name("User-Agent"), "HTTP_USER_AGENT");
        assert_eq!(header_var_name("x-forwarded-for"), "HTTP_X_FORWARDED_FOR");
        assert_eq!(header_var_name("Host"), "HTTP_HOST");
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("404 Not Found"), Some((404, "Not Found".to_string())));
        assert_eq!(parse_status(" 201"), Some((201, "Created".to_string())));
        assert_eq!(parse_status("299 Algo Propio"), Some((299, "Algo Propio".to_string())));
        assert_eq!(parse_status("abc"), None);
    }

    #[test]
    fn test_environment_keeps_order_and_last_value() {
        let mut env = CgiEnvironment::new();
        env.add("A", "1");
        env.add("B", "2");
        env.add("A", "3");

        assert_eq!(env.len(), 3);
        assert_eq!(env.get("A"), Some("3"));
        let names: Vec<_> = env.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["A", "B", "A"]);
    }
}
