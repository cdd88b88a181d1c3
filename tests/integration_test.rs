//! Tests de integración del motor HTTP
//! tests/integration_test.rs
//!
//! Cada test levanta un `Context` real en 127.0.0.1 (puerto efímero) sobre
//! un document root temporal y habla HTTP por un `TcpStream`.

use httpd_engine::config::Config;
use httpd_engine::handlers::auth::modify_passwords_file;
use httpd_engine::handlers::websocket::OPCODE_TEXT;
use httpd_engine::http::{Response, StatusCode};
use httpd_engine::server::{Callbacks, Connection, Context, NoCallbacks};
use httpd_engine::utils::hash::md5_hex;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerName, StreamOwned};
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Servidor de prueba; el directorio vive lo mismo que el contexto
struct TestServer {
    ctx: Context,
    root: TempDir,
}

impl TestServer {
    fn start(options: &[(&str, &str)], callbacks: Arc<dyn Callbacks>) -> TestServer {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.set_option("listening_ports", "127.0.0.1:0").unwrap();
        config.set_option("document_root", root.path().to_str().unwrap()).unwrap();
        config.set_option("num_threads", "4").unwrap();
        config.set_option("request_timeout_ms", "1000").unwrap();
        for (name, value) in options {
            config.set_option(name, value).unwrap();
        }
        let ctx = Context::start(config, callbacks).unwrap();
        TestServer { ctx, root }
    }

    fn addr(&self) -> SocketAddr {
        self.ctx.listening_addrs()[0]
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn write_file(&self, name: &str, content: &str) {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
    }

    /// Envía un request crudo y lee la respuesta hasta que el servidor cierra
    fn send_raw(&self, raw: &str) -> String {
        let mut stream = self.connect();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    fn get(&self, uri: &str) -> String {
        self.send_raw(&format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", uri))
    }
}

/// Lee una respuesta con `Content-Length` sin esperar al cierre
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();
    let len = header_value(&head, "Content-Length")
        .map(|value| value.parse::<usize>().unwrap())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).unwrap();
    (head, body)
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}

fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let head = response.split("\r\n\r\n").next()?;
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.eq_ignore_ascii_case(name) {
            Some(value.trim())
        } else {
            None
        }
    })
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

fn digest_header(method: &str, uri: &str, user: &str, password: &str) -> String {
    let ha1 = md5_hex(&[user, ":", "mydomain.com", ":", password]);
    let ha2 = md5_hex(&[method, ":", uri]);
    let response = md5_hex(&[&ha1, ":", "1", ":", "00000001", ":", "abc", ":", "auth", ":", &ha2]);
    format!(
        "Authorization: Digest username=\"{}\", realm=\"mydomain.com\", nonce=\"1\", uri=\"{}\", \
         nc=00000001, cnonce=\"abc\", qop=auth, response=\"{}\"\r\n",
        user, uri, response
    )
}

/// Certificado autofirmado para `localhost` y su clave en un mismo PEM.
/// Retorna la ruta del PEM y el certificado solo.
fn write_self_signed_pem(dir: &Path) -> (PathBuf, String) {
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_pem = cert.pem();
    let path = dir.join("server.pem");
    fs::write(&path, format!("{}{}", cert_pem, key_pair.serialize_pem())).unwrap();
    (path, cert_pem)
}

/// GET sobre TLS confiando solo en `cert_pem`; lee hasta que el servidor cierra
fn tls_get(addr: SocketAddr, cert_pem: &str, uri: &str) -> String {
    let mut roots = RootCertStore::empty();
    for der in rustls_pemfile::certs(&mut cert_pem.as_bytes()).unwrap() {
        roots.add(&rustls::Certificate(der)).unwrap();
    }
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let session = ClientConnection::new(Arc::new(config), ServerName::try_from("localhost").unwrap()).unwrap();

    let socket = TcpStream::connect(addr).unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut stream = StreamOwned::new(session, socket);
    stream
        .write_all(format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", uri).as_bytes())
        .unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&response).into_owned()
}

#[test]
fn test_static_file() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("hello.txt", "Hello, world!");

    let response = server.get("/hello.txt");

    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(header_value(&response, "Content-Type"), Some("text/plain"));
    assert_eq!(header_value(&response, "Content-Length"), Some("13"));
    assert_eq!(header_value(&response, "Accept-Ranges"), Some("bytes"));
    assert!(header_value(&response, "Etag").is_some());
    assert_eq!(body(&response), "Hello, world!");
}

#[test]
fn test_head_has_no_body() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("hello.txt", "Hello, world!");

    let response = server.send_raw("HEAD /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(header_value(&response, "Content-Length"), Some("13"));
    assert_eq!(body(&response), "");
}

#[test]
fn test_range_requests() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("hello.txt", "Hello, world!");

    let response = server.send_raw("GET /hello.txt HTTP/1.1\r\nRange: bytes=0-0\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 206 Partial Content");
    assert_eq!(header_value(&response, "Content-Range"), Some("bytes 0-0/13"));
    assert_eq!(body(&response), "H");

    // El final se recorta al tamaño del archivo
    let response = server.send_raw("GET /hello.txt HTTP/1.1\r\nRange: bytes=7-100\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 206 Partial Content");
    assert_eq!(header_value(&response, "Content-Range"), Some("bytes 7-12/13"));
    assert_eq!(body(&response), "world!");

    let response = server.send_raw("GET /hello.txt HTTP/1.1\r\nRange: bytes=50-\r\n\r\n");
    assert!(status_line(&response).starts_with("HTTP/1.1 416"));
    assert_eq!(header_value(&response, "Content-Range"), Some("bytes */13"));
}

#[test]
fn test_conditional_get() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("hello.txt", "Hello, world!");

    let first = server.get("/hello.txt");
    let etag = header_value(&first, "Etag").unwrap().to_string();

    let response = server.send_raw(&format!("GET /hello.txt HTTP/1.1\r\nIf-None-Match: {}\r\n\r\n", etag));
    assert_eq!(status_line(&response), "HTTP/1.1 304 Not Modified");
    assert_eq!(body(&response), "");
}

#[test]
fn test_not_found_and_hidden() {
    let server = TestServer::start(&[("hide_files_patterns", "**secret.txt$")], Arc::new(NoCallbacks));
    server.write_file("secret.txt", "classified");
    server.write_file("sub/.htpasswd", "");

    let response = server.get("/missing.html");
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
    assert!(body(&response).starts_with("Error 404: Not Found"));

    let response = server.get("/secret.txt");
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
}

#[test]
fn test_directory_redirect_and_listing() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("docs/a.txt", "a");
    server.write_file("docs/b.txt", "bb");
    server.write_file("docs/secret.txt", "x");
    fs::create_dir(server.path().join("docs/nested")).unwrap();

    let response = server.get("/docs");
    assert_eq!(status_line(&response), "HTTP/1.1 301 Moved Permanently");
    assert_eq!(header_value(&response, "Location"), Some("/docs/"));

    let response = server.get("/docs/");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(header_value(&response, "Content-Type").unwrap().starts_with("text/html"));
    let listing = body(&response);
    let a = listing.find(">a.txt<").unwrap();
    let b = listing.find(">b.txt<").unwrap();
    let nested = listing.find(">nested/<").unwrap();
    assert!(nested < a && a < b);
}

#[test]
fn test_directory_listing_disabled() {
    let server = TestServer::start(&[("enable_directory_listing", "no")], Arc::new(NoCallbacks));
    fs::create_dir(server.path().join("empty")).unwrap();

    let response = server.get("/empty/");
    assert_eq!(status_line(&response), "HTTP/1.1 403 Forbidden");
}

#[test]
fn test_index_file_is_served() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("site/index.html", "<h1>home</h1>");

    let response = server.get("/site/");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(header_value(&response, "Content-Type"), Some("text/html"));
    assert_eq!(body(&response), "<h1>home</h1>");
}

#[test]
fn test_keep_alive() {
    let server = TestServer::start(&[("enable_keep_alive", "yes")], Arc::new(NoCallbacks));
    server.write_file("one.txt", "1");
    server.write_file("two.txt", "22");

    let mut stream = server.connect();
    stream.write_all(b"GET /one.txt HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(header_value(&head, "Connection"), Some("keep-alive"));
    assert_eq!(body, b"1");

    stream.write_all(b"GET /two.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(header_value(&head, "Connection"), Some("close"));
    assert_eq!(body, b"22");
}

#[test]
fn test_malformed_request() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));

    let response = server.send_raw("GET /x HTTP/2.0\r\n\r\n");
    assert!(status_line(&response).starts_with("HTTP/1.1 505"));

    let response = server.send_raw("GET /x HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
    assert!(status_line(&response).starts_with("HTTP/1.1 400"));
}

#[test]
fn test_cgi_script() {
    let server = TestServer::start(&[("cgi_interpreter", "/bin/sh")], Arc::new(NoCallbacks));
    server.write_file(
        "echo.cgi",
        "printf 'Content-Type: text/plain\\r\\n\\r\\n'\n\
         printf 'length=%s\\n' \"$CONTENT_LENGTH\"\n\
         printf 'query=%s\\n' \"$QUERY_STRING\"\n\
         echo \"$REQUEST_METHOD $(wc -c | tr -d ' ')\"\n",
    );

    let payload = "a".repeat(100_000);
    let response = server.send_raw(&format!(
        "POST /echo.cgi?a=1 HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
        payload.len(),
        payload
    ));

    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(header_value(&response, "Content-Type"), Some("text/plain"));
    assert_eq!(header_value(&response, "Connection"), Some("close"));
    let output: Vec<&str> = body(&response).lines().collect();
    assert_eq!(output, vec!["length=100000", "query=a=1", "POST 100000"]);
}

#[test]
fn test_cgi_status_header() {
    let server = TestServer::start(&[("cgi_interpreter", "/bin/sh")], Arc::new(NoCallbacks));
    server.write_file("gone.cgi", "printf 'Status: 410 Gone\\r\\nContent-Type: text/plain\\r\\n\\r\\nbye'\n");

    let response = server.get("/gone.cgi");
    assert_eq!(status_line(&response), "HTTP/1.1 410 Gone");
    assert!(header_value(&response, "Status").is_none());
    assert_eq!(body(&response), "bye");
}

#[test]
fn test_digest_authentication() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("private/secret.txt", "top secret");
    modify_passwords_file(&server.path().join("private/.htpasswd"), "mydomain.com", "ana", Some("pw")).unwrap();

    let response = server.get("/private/secret.txt");
    assert_eq!(status_line(&response), "HTTP/1.1 401 Unauthorized");
    let challenge = header_value(&response, "WWW-Authenticate").unwrap();
    assert!(challenge.starts_with("Digest qop=\"auth\", realm=\"mydomain.com\""));

    let auth = digest_header("GET", "/private/secret.txt", "ana", "pw");
    let response = server.send_raw(&format!("GET /private/secret.txt HTTP/1.1\r\n{}\r\n", auth));
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "top secret");

    let auth = digest_header("GET", "/private/secret.txt", "ana", "wrong");
    let response = server.send_raw(&format!("GET /private/secret.txt HTTP/1.1\r\n{}\r\n", auth));
    assert_eq!(status_line(&response), "HTTP/1.1 401 Unauthorized");

    // El archivo de contraseñas nunca se sirve, ni autenticado
    let auth = digest_header("GET", "/private/.htpasswd", "ana", "pw");
    let response = server.send_raw(&format!("GET /private/.htpasswd HTTP/1.1\r\n{}\r\n", auth));
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
}

#[test]
fn test_put_and_delete() {
    let passwords = tempfile::tempdir().unwrap();
    let passwords_file = passwords.path().join("passwords");
    modify_passwords_file(&passwords_file, "mydomain.com", "ana", Some("pw")).unwrap();

    let server = TestServer::start(
        &[("put_delete_auth_file", passwords_file.to_str().unwrap())],
        Arc::new(NoCallbacks),
    );

    let response = server.send_raw("PUT /up/new.txt HTTP/1.1\r\nContent-Length: 4\r\n\r\ndata");
    assert_eq!(status_line(&response), "HTTP/1.1 401 Unauthorized");
    assert!(!server.path().join("up/new.txt").exists());

    let auth = digest_header("PUT", "/up/new.txt", "ana", "pw");
    let response = server.send_raw(&format!("PUT /up/new.txt HTTP/1.1\r\n{}Content-Length: 4\r\n\r\ndata", auth));
    assert_eq!(status_line(&response), "HTTP/1.1 201 OK");
    assert_eq!(fs::read_to_string(server.path().join("up/new.txt")).unwrap(), "data");

    let response = server.send_raw(&format!("PUT /up/new.txt HTTP/1.1\r\n{}Content-Length: 3\r\n\r\nnew", auth));
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(fs::read_to_string(server.path().join("up/new.txt")).unwrap(), "new");

    let auth = digest_header("DELETE", "/up/new.txt", "ana", "pw");
    let response = server.send_raw(&format!("DELETE /up/new.txt HTTP/1.1\r\n{}\r\n", auth));
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(!server.path().join("up/new.txt").exists());

    let response = server.send_raw(&format!("DELETE /up/new.txt HTTP/1.1\r\n{}\r\n", auth));
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
}

#[test]
fn test_put_with_content_range() {
    let passwords = tempfile::tempdir().unwrap();
    let passwords_file = passwords.path().join("passwords");
    modify_passwords_file(&passwords_file, "mydomain.com", "ana", Some("pw")).unwrap();

    let server = TestServer::start(
        &[("put_delete_auth_file", passwords_file.to_str().unwrap())],
        Arc::new(NoCallbacks),
    );
    server.write_file("digits.txt", "0123456789");

    let auth = digest_header("PUT", "/digits.txt", "ana", "pw");
    let response = server.send_raw(&format!(
        "PUT /digits.txt HTTP/1.1\r\n{}Content-Range: bytes 2-4/10\r\nContent-Length: 3\r\n\r\nabc",
        auth
    ));
    assert!(status_line(&response).starts_with("HTTP/1.1 206"));
    assert_eq!(fs::read_to_string(server.path().join("digits.txt")).unwrap(), "01abc56789");
}

#[test]
fn test_options() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));

    let response = server.send_raw("OPTIONS * HTTP/1.1\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    let allow = header_value(&response, "Allow").unwrap();
    assert!(allow.contains("PROPFIND"));
    assert_eq!(header_value(&response, "DAV"), Some("1"));
}

#[test]
fn test_propfind() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("dav/file.txt", "12345");

    let response = server.send_raw("PROPFIND /dav/ HTTP/1.1\r\nDepth: 1\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 207 Multi-Status");
    let xml = body(&response);
    assert!(xml.contains("<d:href>/dav/</d:href>"));
    assert!(xml.contains("<d:href>/dav/file.txt</d:href>"));
    assert!(xml.contains("<d:getcontentlength>5</d:getcontentlength>"));
}

#[test]
fn test_ssi_include() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("parts/header.txt", "HEADER");
    server.write_file("parts/page.shtml", "<!--#include \"header.txt\" -->|body");

    let response = server.get("/parts/page.shtml");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "HEADER|body");
}

#[test]
fn test_ssi_exec() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("exec.shtml", "[<!--#exec \"echo hi\" -->]");

    let response = server.get("/exec.shtml");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "[hi\n]");
}

#[test]
fn test_ssi_include_depth_is_capped() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));
    server.write_file("loop.shtml", "x<!--#include \"loop.shtml\" -->");

    let response = server.get("/loop.shtml");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "x".repeat(10));
}

#[test]
fn test_url_rewrite() {
    let assets = tempfile::tempdir().unwrap();
    fs::write(assets.path().join("app.js"), "console.log(1)").unwrap();
    let rule = format!("/static/={}/", assets.path().display());

    let server = TestServer::start(&[("url_rewrite_patterns", rule.as_str())], Arc::new(NoCallbacks));
    let response = server.get("/static/app.js");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "console.log(1)");
}

#[test]
fn test_access_control_list() {
    let server = TestServer::start(&[("access_control_list", "-0.0.0.0/0")], Arc::new(NoCallbacks));
    server.write_file("hello.txt", "hi");

    let mut stream = server.connect();
    let _ = stream.write_all(b"GET /hello.txt HTTP/1.1\r\n\r\n");
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    assert!(response.is_empty());
}

#[test]
fn test_access_log() {
    let logs = tempfile::tempdir().unwrap();
    let log_path = logs.path().join("access.log");
    let server = TestServer::start(&[("access_log_file", log_path.to_str().unwrap())], Arc::new(NoCallbacks));
    server.write_file("hello.txt", "hi");

    server.send_raw("GET /hello.txt HTTP/1.1\r\nUser-Agent: test-agent\r\n\r\n");
    drop(server);

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("127.0.0.1 - - ["));
    assert!(log.contains("\"GET /hello.txt HTTP/1.1\" 200"));
    assert!(log.contains("\"test-agent\""));
}

/// Responde `/api/hello` desde el host y deja pasar el resto
struct ApiCallbacks;

impl Callbacks for ApiCallbacks {
    fn begin_request(&self, conn: &mut Connection) -> bool {
        if conn.request().uri() != "/api/hello" {
            return false;
        }
        let name = conn.request().query_param("name").unwrap_or_else(|| "anon".to_string());
        let response = Response::new(StatusCode::Ok)
            .with_header("Content-Type", "text/plain")
            .with_body(&format!("hello {}", name));
        conn.send_response(&response).is_ok()
    }
}

#[test]
fn test_begin_request_callback() {
    let server = TestServer::start(&[], Arc::new(ApiCallbacks));
    server.write_file("hello.txt", "from disk");

    let response = server.get("/api/hello?name=ana");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "hello ana");

    let response = server.get("/hello.txt");
    assert_eq!(body(&response), "from disk");
}

/// Eco de frames de texto
struct EchoCallbacks;

impl Callbacks for EchoCallbacks {
    fn websocket_data(&self, conn: &mut Connection, flags: u8, data: &[u8]) -> bool {
        if flags & 0x0f == OPCODE_TEXT {
            return conn.websocket_write(OPCODE_TEXT, data).is_ok();
        }
        true
    }
}

#[test]
fn test_websocket_echo() {
    let server = TestServer::start(&[], Arc::new(EchoCallbacks));

    let mut stream = server.connect();
    stream
        .write_all(
            b"GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        )
        .unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols"));
    assert_eq!(header_value(&head, "Sec-WebSocket-Accept"), Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

    // "Hello" enmascarado
    stream
        .write_all(&[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58])
        .unwrap();
    let mut frame = [0u8; 7];
    stream.read_exact(&mut frame).unwrap();
    assert_eq!(&frame, b"\x81\x05Hello");

    stream.write_all(&[0x88, 0x80, 0, 0, 0, 0]).unwrap();
    let mut close = [0u8; 2];
    stream.read_exact(&mut close).unwrap();
    assert_eq!(close, [0x88, 0x00]);
}

#[test]
fn test_websocket_wrong_version() {
    let server = TestServer::start(&[], Arc::new(NoCallbacks));

    let response = server.send_raw(
        "GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n\r\n",
    );
    assert!(status_line(&response).starts_with("HTTP/1.1 426"));
    assert_eq!(header_value(&response, "Sec-WebSocket-Version"), Some("13"));
}

#[test]
fn test_throttle_paces_output() {
    let server = TestServer::start(&[("throttle", "*=1k")], Arc::new(NoCallbacks));
    server.write_file("big.txt", &"z".repeat(3000));

    let started = Instant::now();
    let response = server.get("/big.txt");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response).len(), 3000);
    // 1024 bytes por segundo: al menos tres ventanas de un segundo
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[test]
fn test_tls_listener() {
    let certs = tempfile::tempdir().unwrap();
    let (pem_path, cert_pem) = write_self_signed_pem(certs.path());
    let server = TestServer::start(
        &[
            ("listening_ports", "127.0.0.1:0s"),
            ("ssl_certificate", pem_path.to_str().unwrap()),
        ],
        Arc::new(NoCallbacks),
    );
    server.write_file("hello.txt", "over tls");

    let response = tls_get(server.addr(), &cert_pem, "/hello.txt");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "over tls");
}

#[test]
fn test_redirect_to_tls_port() {
    let certs = tempfile::tempdir().unwrap();
    let (pem_path, _) = write_self_signed_pem(certs.path());
    let server = TestServer::start(
        &[
            ("listening_ports", "127.0.0.1:0r,127.0.0.1:0s"),
            ("ssl_certificate", pem_path.to_str().unwrap()),
        ],
        Arc::new(NoCallbacks),
    );
    let addrs = server.ctx.listening_addrs();
    let tls_port = addrs[1].port();

    let response = server.send_raw("GET /page.html?x=1&y=2 HTTP/1.1\r\nHost: localhost:8080\r\n\r\n");
    assert!(status_line(&response).starts_with("HTTP/1.1 302"));
    let expected = format!("https://localhost:{}/page.html?x=1&y=2", tls_port);
    assert_eq!(header_value(&response, "Location"), Some(expected.as_str()));
    assert_eq!(header_value(&response, "Content-Length"), Some("0"));
}

/// Guarda los uploads de `/upload` en `dir` y anota cada archivo recibido
struct UploadCallbacks {
    dir: PathBuf,
    received: Mutex<Vec<PathBuf>>,
}

impl Callbacks for UploadCallbacks {
    fn begin_request(&self, conn: &mut Connection) -> bool {
        if conn.request().uri() != "/upload" {
            return false;
        }
        let count = conn.upload(&self.dir);
        let response = Response::new(StatusCode::Ok)
            .with_header("Content-Type", "text/plain")
            .with_body(&format!("uploaded {}", count));
        conn.send_response(&response).is_ok()
    }

    fn upload(&self, _conn: &mut Connection, file_name: &Path) {
        self.received.lock().unwrap().push(file_name.to_path_buf());
    }
}

#[test]
fn test_multipart_upload() {
    let dest = tempfile::tempdir().unwrap();
    let callbacks = Arc::new(UploadCallbacks {
        dir: dest.path().to_path_buf(),
        received: Mutex::new(Vec::new()),
    });
    let server = TestServer::start(&[], callbacks.clone());

    let big: Vec<u8> = (0..20_000u32).map(|i| b'a' + (i % 26) as u8).collect();
    let mut payload = Vec::new();
    payload.extend_from_slice(
        b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"; filename=\"small.txt\"\r\n\r\nhello\r\n",
    );
    payload.extend_from_slice(
        b"--XyZ\r\nContent-Disposition: form-data; name=\"b\"; filename=\"../big.bin\"\r\n\
          Content-Type: application/octet-stream\r\n\r\n",
    );
    payload.extend_from_slice(&big);
    payload.extend_from_slice(b"\r\n--XyZ--\r\n");

    let mut stream = server.connect();
    let head = format!(
        "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    );
    stream.write_all(head.as_bytes()).unwrap();
    // Bloques impares para partir boundaries y cabeceras entre lecturas
    for chunk in payload.chunks(2999) {
        stream.write_all(chunk).unwrap();
        thread::sleep(Duration::from_millis(10));
    }
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let response = String::from_utf8_lossy(&response).into_owned();

    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body(&response), "uploaded 2");
    assert_eq!(fs::read_to_string(dest.path().join("small.txt")).unwrap(), "hello");
    assert_eq!(fs::read(dest.path().join("big.bin")).unwrap(), big);
    assert_eq!(
        *callbacks.received.lock().unwrap(),
        vec![dest.path().join("small.txt"), dest.path().join("big.bin")]
    );
}

#[test]
fn test_stalled_cgi_times_out() {
    let server = TestServer::start(&[("cgi_interpreter", "/bin/sh")], Arc::new(NoCallbacks));
    server.write_file("hang.cgi", "sleep 8\n");

    let started = Instant::now();
    let response = server.get("/hang.cgi");
    assert!(status_line(&response).starts_with("HTTP/1.1 500"));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_stop_with_stalled_cgi() {
    let server = TestServer::start(
        &[("cgi_interpreter", "/bin/sh"), ("request_timeout_ms", "20000")],
        Arc::new(NoCallbacks),
    );
    server.write_file("hang.cgi", "sleep 30\n");

    let mut stream = server.connect();
    stream.write_all(b"GET /hang.cgi HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    thread::sleep(Duration::from_millis(300));

    let started = Instant::now();
    server.ctx.stop();
    assert!(started.elapsed() < Duration::from_secs(3));

    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 500"));
}

#[test]
fn test_stop_with_idle_connection() {
    let server = TestServer::start(&[("enable_keep_alive", "yes")], Arc::new(NoCallbacks));
    let _idle = server.connect();

    let started = Instant::now();
    server.ctx.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_start_fails_on_bad_option() {
    let mut config = Config::default();
    config.set_option("listening_ports", "127.0.0.1:0").unwrap();
    config.set_option("access_control_list", "bogus").unwrap();
    assert!(Context::start(config, Arc::new(NoCallbacks)).is_err());

    let mut config = Config::default();
    assert!(config.set_option("no_such_option", "1").is_err());
}
