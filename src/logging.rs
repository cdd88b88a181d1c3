//! # Logging
//! src/logging.rs
//!
//! El motor solo usa las macros de `log`. Este módulo provee el backend
//! que instala el binario: stderr o el archivo `error_log_file`, con
//! líneas `[fecha] [nivel] mensaje`.

use crate::config::Config;
use log::LevelFilter;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Destino de los mensajes
enum LogBackend {
    File { file: fs::File, path: PathBuf },
    Stderr,
}

/// Backend de `log` para el binario
pub struct Logger {
    target: Mutex<LogBackend>,
    log_level: LevelFilter,
}

impl Logger {
    /// Crea el logger según `error_log_file` y `log_level`.
    ///
    /// # Errores
    ///
    /// Nivel inválido o archivo de log que no se puede abrir.
    pub fn new(config: &Config) -> Result<Self, String> {
        let log_level = config.log_level_filter()?;
        let target = match &config.error_log_file {
            Some(path) => {
                let path = PathBuf::from(path);
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|err| format!("Failed to open log file '{}': {}", path.display(), err))?;
                LogBackend::File { file, path }
            }
            None => LogBackend::Stderr,
        };
        Ok(Self {
            target: Mutex::new(target),
            log_level,
        })
    }

    /// Instala el logger como logger global del proceso
    pub fn init(config: &Config) -> Result<(), String> {
        let logger = Self::new(config)?;
        let level = logger.log_level;
        log::set_logger(Box::leak(Box::new(logger)))
            .map_err(|err| format!("Failed to initialize logger: {}", err))?;
        log::set_max_level(level);
        Ok(())
    }

    fn format(record: &log::Record) -> String {
        format!(
            "[{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    }

    /// Los mensajes de debug de rustls solo interesan con `trace`
    fn should_ignore(&self, record: &log::Record) -> bool {
        record.target().starts_with("rustls") && record.level() > log::Level::Warn
            && self.log_level < LevelFilter::Trace
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.log_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) || self.should_ignore(record) {
            return;
        }

        let line = Self::format(record);
        let mut target = match self.target.lock() {
            Ok(target) => target,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &mut *target {
            LogBackend::File { file, path } => {
                if let Err(err) = writeln!(file, "{}", line) {
                    eprintln!("Logging to file {} failed: {}", path.display(), err);
                    eprintln!("{}", line);
                }
            }
            LogBackend::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{}", line);
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut target) = self.target.lock() {
            match &mut *target {
                LogBackend::File { file, .. } => {
                    let _ = file.flush();
                }
                LogBackend::Stderr => {
                    let _ = io::stderr().lock().flush();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn test_file_backend_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.log");

        let mut config = Config::default();
        config.error_log_file = Some(path.to_string_lossy().into_owned());
        let logger = Logger::new(&config).unwrap();

        logger.log(
            &log::Record::builder()
                .args(format_args!("algo salió mal"))
                .level(log::Level::Error)
                .target("httpd_engine")
                .build(),
        );
        logger.flush();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[ERROR] algo salió mal"));
    }

    #[test]
    fn test_level_filter() {
        let mut config = Config::default();
        config.log_level = "warn".to_string();
        let logger = Logger::new(&config).unwrap();

        let info = log::Metadata::builder().level(log::Level::Info).build();
        let error = log::Metadata::builder().level(log::Level::Error).build();
        assert!(!logger.enabled(&info));
        assert!(logger.enabled(&error));
    }

    #[test]
    fn test_unwritable_log_file() {
        let mut config = Config::default();
        config.error_log_file = Some("/nonexistent-dir/x/error.log".to_string());
        assert!(Logger::new(&config).is_err());
    }
}
