//! Domain types for the unified record model.
//!
//! Every format walker produces the same four record kinds, so sinks can
//! consume a batch without knowing which format it came from.

use crate::error::{Error, Result};
use crate::normalize::TextKind;
use crate::metadata::Metadata;
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;

/// The three supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormatKind {
    /// Page-oriented PDF.
    Pdf,
    /// Flow-oriented word-processing document (.docx).
    WordProc,
    /// Slide-oriented presentation (.pptx).
    Presentation,
}

impl FormatKind {
    /// Resolve the format from a path's suffix. Matching is case-sensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.to_string_lossy();
        if name.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if name.ends_with(".docx") {
            Some(Self::WordProc)
        } else if name.ends_with(".pptx") {
            Some(Self::Presentation)
        } else {
            None
        }
    }

    /// The file extension this format is selected by, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::WordProc => ".docx",
            Self::Presentation => ".pptx",
        }
    }
}

/// A styled text run normalized out of any of the three formats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSpanRecord {
    /// 1-based page or slide number; always 1 for word-processing documents.
    pub location: u32,
    /// Trimmed, never empty.
    pub text: String,
    pub kind: TextKind,
    pub font_name: String,
    pub font_size: f64,
    pub bold: bool,
    pub italic: bool,
}

/// A table grid. Row and column counts are derived from the cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRecord {
    pub location: u32,
    pub row_count: usize,
    pub col_count: usize,
    pub cells: Vec<Vec<String>>,
}

impl TableRecord {
    /// Build a table record, deriving the row and column counts from the grid.
    pub fn new(location: u32, cells: Vec<Vec<String>>) -> Self {
        let row_count = cells.len();
        let col_count = cells.first().map_or(0, Vec::len);
        Self {
            location,
            row_count,
            col_count,
            cells,
        }
    }
}

/// Encoding of a decoded image record. Every image is represented as PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageEncoding {
    #[serde(rename = "PNG")]
    Png,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "PNG",
        }
    }
}

/// An embedded image decoded to an owned bitmap.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub location: u32,
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub pixels: DynamicImage,
}

impl ImageRecord {
    /// Wrap an already decoded bitmap.
    pub fn from_bitmap(location: u32, pixels: DynamicImage) -> Self {
        Self {
            location,
            encoding: ImageEncoding::Png,
            width: pixels.width(),
            height: pixels.height(),
            pixels,
        }
    }

    /// Pixel dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A hyperlink target found in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub location: u32,
    pub target_uri: String,
}

impl LinkRecord {
    pub fn new(location: u32, target_uri: impl Into<String>) -> Self {
        Self {
            location,
            target_uri: target_uri.into(),
        }
    }
}

/// One normalized record from a walker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Record {
    Text(TextSpanRecord),
    Table(TableRecord),
    Image(ImageRecord),
    Link(LinkRecord),
}

/// Everything extracted from one document by one walker run.
///
/// Constructed once and never mutated afterwards; sinks only borrow it.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedRecordBatch {
    file_name: String,
    metadata: Metadata,
    records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_error: Option<String>,
}

impl UnifiedRecordBatch {
    /// Create a batch from a walker's output.
    pub fn new(file_name: impl Into<String>, metadata: Metadata, records: Vec<Record>) -> Self {
        Self {
            file_name: file_name.into(),
            metadata,
            records,
            image_error: None,
        }
    }

    /// Record that the image pass failed. The batch then holds no images.
    pub fn with_image_error(mut self, message: Option<String>) -> Self {
        self.image_error = message;
        self
    }

    /// Why image extraction failed, if it did.
    pub fn image_error(&self) -> Option<&str> {
        self.image_error.as_deref()
    }

    /// Surface a failed image pass as a `DecodeError`.
    pub fn check_images(&self) -> Result<()> {
        match &self.image_error {
            Some(msg) => Err(Error::DecodeError(msg.clone())),
            None => Ok(()),
        }
    }

    /// Basename of the source document.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// All records in emission order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextSpanRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::Text(t) => Some(t),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::Image(i) => Some(i),
            _ => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkRecord> {
        self.records.iter().filter_map(|r| match r {
            Record::Link(l) => Some(l),
            _ => None,
        })
    }

    /// Per-kind record counts.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            file_name: self.file_name.clone(),
            size_bytes: self.metadata.size_bytes,
            texts: self.texts().count(),
            tables: self.tables().count(),
            images: self.images().count(),
            links: self.links().count(),
            image_error: self.image_error.clone(),
        }
    }
}

/// Record counts for one batch, used for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub file_name: String,
    pub size_bytes: u64,
    pub texts: usize,
    pub tables: usize,
    pub images: usize,
    pub links: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_error: Option<String>,
}
