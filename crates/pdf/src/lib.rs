//! PDF extraction: a page-oriented native model, a lopdf-backed
//! implementation of it, positional table detection, and the walker that
//! turns pages into records.

mod fonts;
pub mod reader;
pub mod source;
pub mod tables;
pub mod walker;

pub use reader::{LopdfOpener, LopdfSource};
pub use source::{
    Annotation, ColorSpace, PdfBlock, PdfImage, PdfLine, PdfSource, PdfSpan, RawImage,
};
pub use tables::{TableDetector, TableDetectorConfig};
pub use walker::PdfWalker;
