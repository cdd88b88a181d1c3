//! # Fechas HTTP
//! src/utils/date.rs
//!
//! Formatos usados por el servidor:
//!
//! - Headers (`Date`, `Last-Modified`): `Sun, 06 Nov 1994 08:49:37 GMT`
//! - Access log: `06/Nov/1994:08:49:37 +0000` (hora local)
//! - Listados de directorio: `06-Nov-1994 08:49` (hora local)

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Formatos aceptados en `If-Modified-Since`, sin el sufijo de zona
const HTTP_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%d/%b/%Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

/// Segundos desde epoch
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Formatea un timestamp como fecha HTTP en GMT
///
/// # Ejemplo
///
/// ```
/// use httpd_engine::utils::date::http_date;
///
/// assert_eq!(http_date(784111777), "Sun, 06 Nov 1994 08:49:37 GMT");
/// ```
pub fn http_date(timestamp: i64) -> String {
    let date = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parsea una fecha de `If-Modified-Since`.
///
/// Retorna `None` si no coincide ningún formato o el año es anterior a 1970.
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    let value = value
        .strip_suffix("GMT")
        .or_else(|| value.strip_suffix("UTC"))
        .unwrap_or(value)
        .trim_end();

    HTTP_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|date| date.and_utc().timestamp())
        .filter(|&timestamp| timestamp >= 0)
}

fn local(timestamp: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .with_timezone(&Local)
}

/// Fecha para el access log
pub fn log_date(timestamp: i64) -> String {
    local(timestamp).format("%d/%b/%Y:%H:%M:%S %z").to_string()
}

/// Fecha para los listados de directorio
pub fn listing_date(timestamp: i64) -> String {
    local(timestamp).format("%d-%b-%Y %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date_format() {
        assert_eq!(http_date(0), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn test_parse_rfc1123() {
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(784111777));
    }

    #[test]
    fn test_parse_alternative_formats() {
        assert_eq!(parse_http_date("06/Nov/1994 08:49:37"), Some(784111777));
        assert_eq!(parse_http_date("06 Nov 1994 08:49:37 GMT"), Some(784111777));
        assert_eq!(parse_http_date("06-Nov-1994 08:49:37"), Some(784111777));
    }

    #[test]
    fn test_parse_round_trip_with_formatter() {
        let now = unix_now();
        assert_eq!(parse_http_date(&http_date(now)), Some(now));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_http_date("yesterday"), None);
        assert_eq!(parse_http_date(""), None);
    }
}
