//! DOCX (Office Open XML) backend for office document extraction.
//!
//! Reads .docx packages into paragraphs, runs, tables and relationships,
//! then walks them into the unified record model.

pub mod parser;
pub mod walker;

pub use parser::{DocxOpener, DocxReader, WordDocument};
pub use walker::DocxWalker;
