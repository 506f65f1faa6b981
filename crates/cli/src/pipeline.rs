//! Format dispatch: one opener and walker per supported format.

use harvest_core::{
    extract, DocumentHandle, DocumentOpener, FormatKind, Result, UnifiedRecordBatch,
};
use harvest_docx::{DocxOpener, DocxWalker};
use harvest_pdf::{LopdfOpener, PdfWalker};
use harvest_pptx::{PptxOpener, PptxWalker};
use std::path::{Path, PathBuf};

/// Open, load and walk one document.
pub fn extract_document(path: &Path) -> Result<UnifiedRecordBatch> {
    let handle = DocumentHandle::open(path)?;

    match handle.kind() {
        FormatKind::Pdf => {
            log::debug!("Parsing as PDF");
            let source = LopdfOpener.open(&handle)?;
            extract(&handle, &mut PdfWalker::new(source))
        }
        FormatKind::WordProc => {
            log::debug!("Parsing as DOCX");
            let document = DocxOpener.open(&handle)?;
            extract(&handle, &mut DocxWalker::new(document))
        }
        FormatKind::Presentation => {
            log::debug!("Parsing as PPTX");
            let presentation = PptxOpener.open(&handle)?;
            extract(&handle, &mut PptxWalker::new(presentation))
        }
    }
}

/// Flat-file output directory for `input` under `root`: `<root>/<file stem>`.
pub fn flat_output_dir(root: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    root.join(stem)
}
