//! # Access Log
//! src/server/access_log.rs
//!
//! Una línea por request en formato Common Log extendido con Referer y
//! User-Agent:
//!
//! ```text
//! 127.0.0.1 - alice [10/Oct/2026:13:55:36 -0300] "GET /a.txt HTTP/1.1" 200 2326 "http://x/" "curl/8.0"
//! ```
//!
//! El archivo se abre en modo append para cada línea, con un mutex que
//! evita que dos workers intercalen escrituras.

use crate::utils::date::log_date;
use log::warn;
use std::fs::OpenOptions;
use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Datos de un request terminado
#[derive(Debug, Clone)]
pub struct AccessEntry<'a> {
    pub remote_ip: IpAddr,
    pub remote_user: Option<&'a str>,
    pub time: i64,
    pub method: &'a str,
    pub uri: &'a str,
    pub http_version: &'a str,
    pub status: u16,
    pub bytes_sent: u64,
    pub referer: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

fn quoted_or_dash(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("\"{}\"", value),
        None => "-".to_string(),
    }
}

/// Formatea una entrada (sin salto de línea)
pub fn format_entry(entry: &AccessEntry<'_>) -> String {
    format!(
        "{} - {} [{}] \"{} {} HTTP/{}\" {} {} {} {}",
        entry.remote_ip,
        entry.remote_user.unwrap_or("-"),
        log_date(entry.time),
        entry.method,
        entry.uri,
        entry.http_version,
        entry.status,
        entry.bytes_sent,
        quoted_or_dash(entry.referer),
        quoted_or_dash(entry.user_agent),
    )
}

#[derive(Debug)]
pub struct AccessLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AccessLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Agrega una entrada; un fallo de escritura solo se registra
    pub fn write(&self, entry: &AccessEntry<'_>) {
        let line = format_entry(entry);
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(err) = result {
            warn!("No se pudo escribir el access log {}: {}", self.path.display(), err);
        }
    }
}
