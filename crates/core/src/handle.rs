//! Validated input documents.

use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::types::FormatKind;
use std::io;
use std::path::{Path, PathBuf};

/// An input path whose format has been resolved from its extension.
///
/// The native document is not parsed here; format crates load it when their
/// walker first needs it.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    path: PathBuf,
    kind: FormatKind,
}

impl DocumentHandle {
    /// Validate `path` and resolve its format.
    ///
    /// The extension check runs before any filesystem access, so an
    /// unsupported extension is reported even for paths that do not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kind = FormatKind::from_path(path).ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "{} (expected .pdf, .docx or .pptx)",
                path.display()
            ))
        })?;

        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(Error::IoError(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        log::debug!("Opened {} as {:?}", path.display(), kind);
        Ok(Self {
            path: path.to_path_buf(),
            kind,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    /// Basename of the path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Read the file's size and timestamps.
    pub fn metadata(&self) -> Result<Metadata> {
        Metadata::read(&self.path)
    }
}
