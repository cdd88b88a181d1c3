//! # Digest Authentication
//! src/handlers/auth.rs
//!
//! Autenticación HTTP Digest (RFC 2617, `qop=auth`). Los archivos de
//! contraseñas tienen una línea por usuario:
//!
//! ```text
//! usuario:dominio:md5(usuario:dominio:contraseña)
//! ```
//!
//! Para cada request se busca el archivo en este orden: la primera
//! entrada de `protect_uri` cuyo prefijo coincide con el URI,
//! `global_auth_file`, y finalmente `.htpasswd` en el directorio del
//! recurso. Si no hay archivo, el recurso es público.

use crate::http::{Response, StatusCode};
use crate::router::PASSWORDS_FILE_NAME;
use crate::server::Connection;
use crate::utils::date::unix_now;
use crate::utils::hash::md5_hex;
use crate::utils::uri::split_option_list;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// Campos del header `Authorization: Digest ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub user: String,
    pub uri: String,
    pub nonce: String,
    pub nc: String,
    pub cnonce: String,
    pub qop: String,
    pub response: String,
}

/// Lee un valor entre comillas (ya sin la de apertura), respetando `\`.
/// Retorna el valor y lo que sigue a la comilla de cierre.
fn take_quoted(s: &str) -> (String, &str) {
    let mut value = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return (value, &s[i + 1..]),
            _ => value.push(c),
        }
    }
    (value, "")
}

/// Parsea el valor de `Authorization`. `None` si no es Digest o si falta
/// alguno de los campos requeridos.
///
/// ```
/// use httpd_engine::handlers::auth::parse_authorization_header;
///
/// let creds = parse_authorization_header(
///     r#"Digest username="ana", uri="/", nonce="1", nc=00000001, cnonce="x", qop=auth, response="abc""#,
/// ).unwrap();
/// assert_eq!(creds.user, "ana");
/// assert_eq!(creds.nc, "00000001");
/// ```
pub fn parse_authorization_header(value: &str) -> Option<DigestCredentials> {
    let value = value.trim_start();
    let scheme = value.get(..7)?;
    if !scheme.eq_ignore_ascii_case("Digest ") {
        return None;
    }

    let (mut user, mut uri, mut nonce, mut nc, mut cnonce, mut qop, mut response) =
        (None, None, None, None, None, None, None);

    let mut s = &value[7..];
    loop {
        s = s.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        let eq = match s.find('=') {
            Some(eq) => eq,
            None => break,
        };
        let name = s[..eq].trim().to_ascii_lowercase();
        s = &s[eq + 1..];

        let field = if let Some(quoted) = s.strip_prefix('"') {
            let (field, rest) = take_quoted(quoted);
            s = rest;
            field
        } else {
            let end = s.find(|c: char| c == ',' || c.is_whitespace()).unwrap_or(s.len());
            let field = s[..end].to_string();
            s = &s[end..];
            field
        };

        match name.as_str() {
            "username" => user = Some(field),
            "uri" => uri = Some(field),
            "nonce" => nonce = Some(field),
            "nc" => nc = Some(field),
            "cnonce" => cnonce = Some(field),
            "qop" => qop = Some(field),
            "response" => response = Some(field),
            _ => {}
        }
    }

    Some(DigestCredentials {
        user: user?,
        uri: uri?,
        nonce: nonce?,
        nc: nc?,
        cnonce: cnonce?,
        qop: qop?,
        response: response?,
    })
}

/// Respuesta esperada para `ha1` y las credenciales recibidas
pub fn expected_response(ha1: &str, method: &str, creds: &DigestCredentials) -> String {
    let ha2 = md5_hex(&[method, ":", &creds.uri]);
    md5_hex(&[
        ha1,
        ":",
        &creds.nonce,
        ":",
        &creds.nc,
        ":",
        &creds.cnonce,
        ":",
        &creds.qop,
        ":",
        &ha2,
    ])
}

/// Compara la respuesta del cliente con la esperada
pub fn check_password(ha1: &str, method: &str, creds: &DigestCredentials) -> bool {
    creds.response.len() == 32 && creds.response.eq_ignore_ascii_case(&expected_response(ha1, method, creds))
}

/// Valida el request contra un archivo de contraseñas
fn authorize<R: BufRead>(conn: &mut Connection, passwords: R) -> bool {
    let creds = match conn.request().header("Authorization").and_then(parse_authorization_header) {
        Some(creds) => creds,
        None => return false,
    };
    let domain = conn.config().authentication_domain.clone();
    let method = conn.request().method().as_str();

    for line in passwords.lines().map_while(Result::ok) {
        let mut parts = line.splitn(3, ':');
        let (user, realm, ha1) = match (parts.next(), parts.next(), parts.next()) {
            (Some(user), Some(realm), Some(ha1)) => (user, realm, ha1.trim()),
            _ => continue,
        };
        if user == creds.user && realm == domain {
            let authorized = check_password(ha1, method, &creds);
            if authorized {
                conn.set_remote_user(Some(creds.user.clone()));
            }
            return authorized;
        }
    }
    false
}

fn open_passwords_file(conn: &Connection, path: &str) -> Option<File> {
    match File::open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            conn.log_error(&format!("fopen({}): {}", path, err));
            None
        }
    }
}

/// Archivo de contraseñas aplicable a `path`, si existe
fn open_auth_file(conn: &Connection, path: &Path) -> Option<File> {
    let uri = conn.request().uri();
    if let Some(protected) = &conn.config().protect_uri {
        let rule = split_option_list(protected).find(|(prefix, _)| uri.starts_with(prefix));
        if let Some((_, Some(file_name))) = rule {
            if let Some(file) = open_passwords_file(conn, file_name) {
                return Some(file);
            }
        }
    }

    if let Some(global) = &conn.config().global_auth_file {
        return open_passwords_file(conn, global);
    }

    let dir = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(Path::new("."))
    };
    File::open(dir.join(PASSWORDS_FILE_NAME)).ok()
}

/// `true` si el recurso es público o las credenciales son válidas
pub(crate) fn check_authorization(conn: &mut Connection, path: &Path) -> bool {
    match open_auth_file(conn, path) {
        Some(file) => authorize(conn, BufReader::new(file)),
        None => true,
    }
}

/// PUT y DELETE exigen `put_delete_auth_file` y credenciales válidas
pub(crate) fn is_authorized_for_put(conn: &mut Connection) -> bool {
    let path = match &conn.config().put_delete_auth_file {
        Some(path) => path.clone(),
        None => return false,
    };
    match File::open(&path) {
        Ok(file) => authorize(conn, BufReader::new(file)),
        Err(_) => false,
    }
}

/// Responde 401 con un desafío nuevo
pub(crate) fn send_authorization_request(conn: &mut Connection) {
    conn.set_status(StatusCode::Unauthorized.as_u16());
    let challenge = format!(
        "Digest qop=\"auth\", realm=\"{}\", nonce=\"{}\"",
        conn.config().authentication_domain,
        unix_now()
    );
    let response = Response::new(StatusCode::Unauthorized)
        .with_header("Content-Length", "0")
        .with_header("WWW-Authenticate", &challenge)
        .with_header("Connection", conn.connection_header());
    let _ = conn.send_response(&response);
}

/// Agrega, actualiza o (con `password` `None` o vacío) elimina un usuario
///
/// # Errores
///
/// Usuario o dominio con `:`, o fallas de lectura/escritura.
pub fn modify_passwords_file(path: &Path, domain: &str, user: &str, password: Option<&str>) -> io::Result<()> {
    if user.contains(':') || domain.contains(':') {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "user and domain must not contain ':'"));
    }
    let password = password.filter(|p| !p.is_empty());

    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);
    let mut tmp = OpenOptions::new().write(true).create(true).truncate(true).open(tmp_path)?;

    let mut found = false;
    for line in existing.lines() {
        let mut parts = line.splitn(3, ':');
        let is_target = matches!((parts.next(), parts.next()), (Some(u), Some(d)) if u == user && d == domain);
        if is_target {
            found = true;
            if let Some(password) = password {
                writeln!(tmp, "{}:{}:{}", user, domain, md5_hex(&[user, ":", domain, ":", password]))?;
            }
        } else {
            writeln!(tmp, "{}", line)?;
        }
    }
    if !found {
        if let Some(password) = password {
            writeln!(tmp, "{}:{}:{}", user, domain, md5_hex(&[user, ":", domain, ":", password]))?;
        }
    }
    tmp.flush()?;
    drop(tmp);

    fs::rename(tmp_path, path)
}
