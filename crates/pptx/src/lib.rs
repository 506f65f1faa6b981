//! PPTX (Office Open XML) backend for office document extraction.
//!
//! Parses .pptx files, which are ZIP archives containing XML documents,
//! into slides and shapes, then walks them into the unified record model.

pub mod parser;
pub mod walker;

pub use parser::{PptxOpener, PptxParser, Presentation};
pub use walker::PptxWalker;
