//! Core record model, heading classification, and document handles for
//! office document extraction.

pub mod bitmap;
pub mod error;
pub mod handle;
pub mod metadata;
pub mod normalize;
pub mod ooxml;
pub mod types;
pub mod walker;

pub use error::{Error, Result};
pub use handle::DocumentHandle;
pub use metadata::Metadata;
pub use normalize::{classify, normalize_span, RawStyle, TextKind};
pub use types::{
    BatchSummary, FormatKind, ImageEncoding, ImageRecord, LinkRecord, Record, TableRecord,
    TextSpanRecord, UnifiedRecordBatch,
};
pub use walker::{extract, DocumentOpener, Walk, Walker};
