//! The seams between document handles, format walkers, and batches.

use crate::error::{Error, Result};
use crate::handle::DocumentHandle;
use crate::types::{FormatKind, Record, UnifiedRecordBatch};

/// Loads the native object model for one format.
pub trait DocumentOpener {
    /// The native document this opener produces.
    type Document;

    /// The format this opener accepts.
    const KIND: FormatKind;

    /// Parse the native document behind `handle`.
    fn load(&self, handle: &DocumentHandle) -> Result<Self::Document>;

    /// Check the handle's format, then load it.
    fn open(&self, handle: &DocumentHandle) -> Result<Self::Document> {
        if handle.kind() != Self::KIND {
            return Err(Error::UnsupportedFormat(format!(
                "{} is not a {} file",
                handle.path().display(),
                Self::KIND.extension()
            )));
        }
        self.load(handle)
    }
}

/// Walks one native document and produces normalized records.
///
/// Each pass covers one record kind. `walk` runs them in emission order:
/// text spans, then links, then images, then tables.
pub trait Walker {
    fn texts(&mut self) -> Result<Vec<Record>>;

    fn links(&mut self) -> Result<Vec<Record>>;

    /// Decode every embedded image. Fails on the first undecodable one.
    fn images(&mut self) -> Result<Vec<Record>>;

    fn tables(&mut self) -> Result<Vec<Record>>;

    /// Run all four passes.
    ///
    /// A failing image pass does not discard the other kinds: its error is
    /// returned in [`Walk::image_error`] next to the remaining records.
    /// Failures in any other pass abort the walk.
    fn walk(&mut self) -> Result<Walk> {
        let mut records = self.texts()?;
        records.extend(self.links()?);

        let image_error = match self.images() {
            Ok(images) => {
                records.extend(images);
                None
            }
            Err(e) => {
                log::warn!("Image extraction failed: {}", e);
                Some(e)
            }
        };

        records.extend(self.tables()?);
        Ok(Walk {
            records,
            image_error,
        })
    }
}

/// The output of one [`Walker::walk`].
#[derive(Debug)]
pub struct Walk {
    pub records: Vec<Record>,
    /// Set when the image pass failed; no image records are included then.
    pub image_error: Option<Error>,
}

/// Run `walker` and package its output with the handle's metadata.
///
/// An image-pass failure is kept on the batch (see
/// [`UnifiedRecordBatch::check_images`]) so the other records can still be
/// persisted before the error is reported.
pub fn extract(handle: &DocumentHandle, walker: &mut dyn Walker) -> Result<UnifiedRecordBatch> {
    let metadata = handle.metadata()?;
    let walk = walker.walk()?;
    log::info!(
        "Extracted {} records from {}",
        walk.records.len(),
        handle.file_name()
    );
    let image_error = walk.image_error.map(|e| match e {
        Error::DecodeError(msg) => msg,
        other => other.to_string(),
    });
    Ok(UnifiedRecordBatch::new(handle.file_name(), metadata, walk.records)
        .with_image_error(image_error))
}
