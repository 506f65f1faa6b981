//! Error types for office document extraction.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening, walking, or persisting a document.
#[derive(Error, Debug)]
pub enum Error {
    /// The input path is unreadable, or an output location could not be created.
    #[error("I/O failure: {0}")]
    IoError(#[from] std::io::Error),

    /// The path's extension is not one of the supported formats.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// An embedded image could not be decoded into a bitmap.
    #[error("Image decode failure: {0}")]
    DecodeError(String),

    /// A sink failed to write its output or the database rejected a statement.
    #[error("Persistence failure: {0}")]
    PersistenceError(String),

    /// Failed to parse the PDF object structure.
    #[error("PDF parsing error: {0}")]
    PdfParseError(String),

    /// Invalid or corrupted file.
    #[error("Invalid or corrupted file: {0}")]
    CorruptedFile(String),

    /// ZIP archive error (for DOCX/PPTX).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing error (for DOCX/PPTX).
    #[error("XML parsing error: {0}")]
    XmlError(String),
}

impl Error {
    /// Wrap any displayable error as a persistence failure.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Error::PersistenceError(err.to_string())
    }
}
