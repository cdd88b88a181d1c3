//! # Recursos
//! src/resource.rs
//!
//! Un recurso es lo que resuelve un URI: un archivo o directorio en disco,
//! o un buffer en memoria que el host entrega desde el callback
//! `open_file`. Solo uno de los dos respaldos está activo.

use crate::server::callbacks::Callbacks;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone)]
enum Backing {
    Disk,
    Memory(Arc<[u8]>),
}

/// Metadatos de un recurso resuelto
#[derive(Debug, Clone)]
pub struct Resource {
    path: PathBuf,
    is_directory: bool,
    modified: i64,
    size: u64,
    backing: Backing,
}

impl Resource {
    /// Busca `path`, consultando primero al host.
    ///
    /// Retorna `None` si no existe ni en memoria ni en disco.
    pub fn stat(callbacks: &dyn Callbacks, path: &Path) -> Option<Resource> {
        if let Some(data) = callbacks.open_file(path) {
            return Some(Resource {
                path: path.to_path_buf(),
                is_directory: false,
                modified: 0,
                size: data.len() as u64,
                backing: Backing::Memory(data),
            });
        }

        let metadata = fs::metadata(path).ok()?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Some(Resource {
            path: path.to_path_buf(),
            is_directory: metadata.is_dir(),
            modified,
            size: metadata.len(),
            backing: Backing::Disk,
        })
    }

    /// Abre el recurso para lectura
    pub fn open(&self) -> io::Result<ResourceReader> {
        match &self.backing {
            Backing::Memory(data) => Ok(ResourceReader::Memory(Cursor::new(Arc::clone(data)))),
            Backing::Disk => File::open(&self.path).map(ResourceReader::Disk),
        }
    }

    /// `"<mtime hex>.<size>"`, entre comillas
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use httpd_engine::resource::Resource;
    /// use httpd_engine::server::callbacks::NoCallbacks;
    ///
    /// let dir = std::env::temp_dir();
    /// let resource = Resource::stat(&NoCallbacks, &dir).unwrap();
    /// assert!(resource.etag().starts_with('"'));
    /// ```
    pub fn etag(&self) -> String {
        format!("\"{:x}.{}\"", self.modified, self.size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.backing, Backing::Memory(_))
    }

    /// Fecha de modificación en segundos desde epoch (0 en memoria)
    pub fn modified(&self) -> i64 {
        self.modified
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Lector de un recurso abierto
pub enum ResourceReader {
    Disk(File),
    Memory(Cursor<Arc<[u8]>>),
}

impl Read for ResourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ResourceReader::Disk(file) => file.read(buf),
            ResourceReader::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for ResourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ResourceReader::Disk(file) => file.seek(pos),
            ResourceReader::Memory(cursor) => cursor.seek(pos),
        }
    }
}
