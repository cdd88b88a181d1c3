//! # Configuración del Servidor
//! src/config.rs
//!
//! Tabla de opciones del motor. La misma estructura sirve al binario
//! (argumentos CLI y variables de entorno vía `clap`) y a los programas
//! que embeben el motor (acceso por nombre con [`Config::set_option`]).
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./httpd_engine --listening-ports 8080,8443s \
//!   --document-root /srv/www \
//!   --num-threads 16 \
//!   --enable-keep-alive yes
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTPD_LISTENING_PORTS=8080 HTTPD_DOCUMENT_ROOT=/srv/www ./httpd_engine
//! ```
//!
//! ### Embebido
//! ```
//! use httpd_engine::config::Config;
//!
//! let mut config = Config::default();
//! config.set_option("listening_ports", "127.0.0.1:0").unwrap();
//! config.set_option("enable_directory_listing", "no").unwrap();
//! assert_eq!(config.get_option("enable_directory_listing").as_deref(), Some("no"));
//! ```

use crate::server::listener::parse_listening_ports;
use crate::utils::net::{Acl, ThrottleRules};
use clap::{ArgAction, Parser};
use log::info;
use std::str::FromStr;

/// Acepta `yes|no|true|false|1|0|on|off`
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" => Ok(false),
        _ => Err(format!("expected yes or no, got '{}'", value)),
    }
}

fn flag_str(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Configuración del motor HTTP
#[derive(Debug, Clone, Parser)]
#[command(name = "httpd_engine")]
#[command(about = "Servidor HTTP/1.1 embebible con CGI, SSI, WebDAV básico y WebSocket")]
#[command(version = "0.1.0")]
pub struct Config {
    // === CGI / SSI ===

    /// Patrón de archivos que se ejecutan como CGI
    #[arg(long = "cgi-pattern", default_value = "**.cgi$|**.pl$|**.php$", env = "HTTPD_CGI_PATTERN")]
    pub cgi_pattern: String,

    /// Variables extra para los CGI (`VAR=valor,VAR2=valor2`)
    #[arg(long = "cgi-environment", env = "HTTPD_CGI_ENVIRONMENT")]
    pub cgi_environment: Option<String>,

    /// Archivo de passwords requerido para PUT y DELETE
    #[arg(long = "put-delete-auth-file", env = "HTTPD_PUT_DELETE_AUTH_FILE")]
    pub put_delete_auth_file: Option<String>,

    /// Intérprete con el que se ejecutan todos los CGI
    #[arg(long = "cgi-interpreter", env = "HTTPD_CGI_INTERPRETER")]
    pub cgi_interpreter: Option<String>,

    // === Autenticación ===

    /// URIs protegidas (`/prefijo=archivo_passwords,...`)
    #[arg(long = "protect-uri", env = "HTTPD_PROTECT_URI")]
    pub protect_uri: Option<String>,

    /// Realm de la autenticación digest
    #[arg(long = "authentication-domain", default_value = "mydomain.com", env = "HTTPD_AUTHENTICATION_DOMAIN")]
    pub authentication_domain: String,

    /// Patrón de archivos procesados como SSI
    #[arg(long = "ssi-pattern", default_value = "**.shtml$|**.shtm$", env = "HTTPD_SSI_PATTERN")]
    pub ssi_pattern: String,

    /// Límites de bytes/segundo (`*=1k,10.0.0.0/8=0,/downloads/=5m`)
    #[arg(long, env = "HTTPD_THROTTLE")]
    pub throttle: Option<String>,

    // === Logs ===

    /// Archivo del access log
    #[arg(long = "access-log-file", env = "HTTPD_ACCESS_LOG_FILE")]
    pub access_log_file: Option<String>,

    /// Habilita los listados de directorio
    #[arg(long = "enable-directory-listing", default_value = "yes", action = ArgAction::Set,
          value_parser = parse_flag, env = "HTTPD_ENABLE_DIRECTORY_LISTING")]
    pub enable_directory_listing: bool,

    /// Archivo del log de errores (por defecto stderr)
    #[arg(long = "error-log-file", env = "HTTPD_ERROR_LOG_FILE")]
    pub error_log_file: Option<String>,

    /// Archivo de passwords que protege todo el sitio
    #[arg(long = "global-auth-file", env = "HTTPD_GLOBAL_AUTH_FILE")]
    pub global_auth_file: Option<String>,

    /// Archivos índice que se buscan en los directorios, en orden
    #[arg(long = "index-files", default_value = "index.html,index.htm,index.cgi,index.shtml,index.php,index.lp",
          env = "HTTPD_INDEX_FILES")]
    pub index_files: String,

    /// Permite varias requests por conexión
    #[arg(long = "enable-keep-alive", default_value = "no", action = ArgAction::Set,
          value_parser = parse_flag, env = "HTTPD_ENABLE_KEEP_ALIVE")]
    pub enable_keep_alive: bool,

    /// Reglas de acceso por IP (`-0.0.0.0/0,+192.168.0.0/16`)
    #[arg(long = "access-control-list", env = "HTTPD_ACCESS_CONTROL_LIST")]
    pub access_control_list: Option<String>,

    /// Tipos MIME adicionales (`.ext=tipo,...`)
    #[arg(long = "extra-mime-types", env = "HTTPD_EXTRA_MIME_TYPES")]
    pub extra_mime_types: Option<String>,

    // === Red ===

    /// Puertos de escucha (`[ip:]port[s|r],...`)
    #[arg(long = "listening-ports", default_value = "8080", env = "HTTPD_LISTENING_PORTS")]
    pub listening_ports: String,

    /// Directorio raíz de los documentos
    #[arg(long = "document-root", default_value = ".", env = "HTTPD_DOCUMENT_ROOT")]
    pub document_root: Option<String>,

    /// Archivo PEM con certificado y clave privada
    #[arg(long = "ssl-certificate", env = "HTTPD_SSL_CERTIFICATE")]
    pub ssl_certificate: Option<String>,

    /// Número de workers
    #[arg(long = "num-threads", default_value = "50", env = "HTTPD_NUM_THREADS")]
    pub num_threads: usize,

    /// Usuario al que se cambia después de abrir los puertos
    #[arg(long = "run-as-user", env = "HTTPD_RUN_AS_USER")]
    pub run_as_user: Option<String>,

    /// Reescrituras de URI (`/prefijo=/directorio,...`)
    #[arg(long = "url-rewrite-patterns", env = "HTTPD_URL_REWRITE_PATTERNS")]
    pub url_rewrite_patterns: Option<String>,

    /// Patrón de archivos que nunca se sirven ni se listan
    #[arg(long = "hide-files-patterns", env = "HTTPD_HIDE_FILES_PATTERNS")]
    pub hide_files_patterns: Option<String>,

    /// Timeout de lectura/escritura de cada socket en milisegundos
    #[arg(long = "request-timeout-ms", default_value = "30000", env = "HTTPD_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    // === Logging del proceso ===

    /// Nivel de log (error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "info", env = "HTTPD_LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Nombres de las opciones, en orden
    pub const OPTION_NAMES: [&'static str; 24] = [
        "cgi_pattern",
        "cgi_environment",
        "put_delete_auth_file",
        "cgi_interpreter",
        "protect_uri",
        "authentication_domain",
        "ssi_pattern",
        "throttle",
        "access_log_file",
        "enable_directory_listing",
        "error_log_file",
        "global_auth_file",
        "index_files",
        "enable_keep_alive",
        "access_control_list",
        "extra_mime_types",
        "listening_ports",
        "document_root",
        "ssl_certificate",
        "num_threads",
        "run_as_user",
        "url_rewrite_patterns",
        "hide_files_patterns",
        "request_timeout_ms",
    ];

    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Asigna una opción por nombre.
    ///
    /// Para las opciones opcionales, un valor vacío las desactiva.
    ///
    /// # Errores
    ///
    /// Nombre desconocido o valor que no se puede convertir al tipo de la opción.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), String> {
        fn optional(value: &str) -> Option<String> {
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }

        fn number<T: FromStr>(name: &str, value: &str) -> Result<T, String> {
            value
                .parse()
                .map_err(|_| format!("Invalid value for {}: {}", name, value))
        }

        match name {
            "cgi_pattern" => self.cgi_pattern = value.to_string(),
            "cgi_environment" => self.cgi_environment = optional(value),
            "put_delete_auth_file" => self.put_delete_auth_file = optional(value),
            "cgi_interpreter" => self.cgi_interpreter = optional(value),
            "protect_uri" => self.protect_uri = optional(value),
            "authentication_domain" => self.authentication_domain = value.to_string(),
            "ssi_pattern" => self.ssi_pattern = value.to_string(),
            "throttle" => self.throttle = optional(value),
            "access_log_file" => self.access_log_file = optional(value),
            "enable_directory_listing" => self.enable_directory_listing = parse_flag(value)?,
            "error_log_file" => self.error_log_file = optional(value),
            "global_auth_file" => self.global_auth_file = optional(value),
            "index_files" => self.index_files = value.to_string(),
            "enable_keep_alive" => self.enable_keep_alive = parse_flag(value)?,
            "access_control_list" => self.access_control_list = optional(value),
            "extra_mime_types" => self.extra_mime_types = optional(value),
            "listening_ports" => self.listening_ports = value.to_string(),
            "document_root" => self.document_root = optional(value),
            "ssl_certificate" => self.ssl_certificate = optional(value),
            "num_threads" => self.num_threads = number(name, value)?,
            "run_as_user" => self.run_as_user = optional(value),
            "url_rewrite_patterns" => self.url_rewrite_patterns = optional(value),
            "hide_files_patterns" => self.hide_files_patterns = optional(value),
            "request_timeout_ms" => self.request_timeout_ms = number(name, value)?,
            _ => return Err(format!("Invalid option: {}", name)),
        }
        Ok(())
    }

    /// Lee una opción por nombre; `None` si no existe o no tiene valor
    pub fn get_option(&self, name: &str) -> Option<String> {
        match name {
            "cgi_pattern" => Some(self.cgi_pattern.clone()),
            "cgi_environment" => self.cgi_environment.clone(),
            "put_delete_auth_file" => self.put_delete_auth_file.clone(),
            "cgi_interpreter" => self.cgi_interpreter.clone(),
            "protect_uri" => self.protect_uri.clone(),
            "authentication_domain" => Some(self.authentication_domain.clone()),
            "ssi_pattern" => Some(self.ssi_pattern.clone()),
            "throttle" => self.throttle.clone(),
            "access_log_file" => self.access_log_file.clone(),
            "enable_directory_listing" => Some(flag_str(self.enable_directory_listing).to_string()),
            "error_log_file" => self.error_log_file.clone(),
            "global_auth_file" => self.global_auth_file.clone(),
            "index_files" => Some(self.index_files.clone()),
            "enable_keep_alive" => Some(flag_str(self.enable_keep_alive).to_string()),
            "access_control_list" => self.access_control_list.clone(),
            "extra_mime_types" => self.extra_mime_types.clone(),
            "listening_ports" => Some(self.listening_ports.clone()),
            "document_root" => self.document_root.clone(),
            "ssl_certificate" => self.ssl_certificate.clone(),
            "num_threads" => Some(self.num_threads.to_string()),
            "run_as_user" => self.run_as_user.clone(),
            "url_rewrite_patterns" => self.url_rewrite_patterns.clone(),
            "hide_files_patterns" => self.hide_files_patterns.clone(),
            "request_timeout_ms" => Some(self.request_timeout_ms.to_string()),
            _ => None,
        }
    }

    /// Nivel de log configurado
    pub fn log_level_filter(&self) -> Result<log::LevelFilter, String> {
        log::LevelFilter::from_str(&self.log_level)
            .map_err(|_| format!("Invalid log level: {}", self.log_level))
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.num_threads == 0 {
            return Err("num_threads must be >= 1".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be > 0".to_string());
        }

        parse_listening_ports(&self.listening_ports).map_err(|e| e.to_string())?;

        if let Some(acl) = &self.access_control_list {
            Acl::parse(acl)?;
        }
        if let Some(throttle) = &self.throttle {
            ThrottleRules::parse(throttle)?;
        }

        self.log_level_filter()?;

        Ok(())
    }

    /// Registra un resumen de la configuración efectiva
    pub fn print_summary(&self) {
        info!("Configuración:");
        for name in Self::OPTION_NAMES {
            if let Some(value) = self.get_option(name) {
                info!("   {:<26} {}", name, value);
            }
        }
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            cgi_pattern: "**.cgi$|**.pl$|**.php$".to_string(),
            cgi_environment: None,
            put_delete_auth_file: None,
            cgi_interpreter: None,
            protect_uri: None,
            authentication_domain: "mydomain.com".to_string(),
            ssi_pattern: "**.shtml$|**.shtm$".to_string(),
            throttle: None,
            access_log_file: None,
            enable_directory_listing: true,
            error_log_file: None,
            global_auth_file: None,
            index_files: "index.html,index.htm,index.cgi,index.shtml,index.php,index.lp".to_string(),
            enable_keep_alive: false,
            access_control_list: None,
            extra_mime_types: None,
            listening_ports: "8080".to_string(),
            document_root: Some(".".to_string()),
            ssl_certificate: None,
            num_threads: 50,
            run_as_user: None,
            url_rewrite_patterns: None,
            hide_files_patterns: None,
            request_timeout_ms: 30_000,
            log_level: "info".to_string(),
        }
    }
}
