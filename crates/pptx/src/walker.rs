//! Presentation walker. Every record is located at its 1-based slide number.

use crate::parser::{Presentation, Shape, Slide};
use harvest_core::bitmap::decode_image;
use harvest_core::{
    normalize_span, Error, ImageRecord, LinkRecord, Record, Result, TableRecord, TextSpanRecord,
    Walker,
};

/// Walks a parsed [`Presentation`].
pub struct PptxWalker {
    presentation: Presentation,
}

impl PptxWalker {
    pub fn new(presentation: Presentation) -> Self {
        Self { presentation }
    }

    fn shapes(&self) -> impl Iterator<Item = (u32, &Shape)> {
        self.presentation
            .slides
            .iter()
            .flat_map(|slide: &Slide| slide.shapes.iter().map(move |s| (slide.number as u32, s)))
    }

    /// One record per non-blank run of every text frame.
    pub fn text_records(&self) -> Vec<TextSpanRecord> {
        let mut spans = Vec::new();
        for (location, shape) in self.shapes() {
            let Some(frame) = shape.text_frame.as_ref() else {
                continue;
            };
            for run in frame.paragraphs.iter().flat_map(|p| p.runs.iter()) {
                if let Some(span) = normalize_span(location, &run.text, &run.font) {
                    spans.push(span);
                }
            }
        }
        spans
    }

    /// One record per run with a click hyperlink, whatever its text.
    pub fn link_records(&self) -> Vec<LinkRecord> {
        self.shapes()
            .filter_map(|(location, shape)| shape.text_frame.as_ref().map(|f| (location, f)))
            .flat_map(|(location, frame)| {
                frame
                    .paragraphs
                    .iter()
                    .flat_map(|p| p.runs.iter())
                    .filter_map(move |run| match run.hyperlink.as_deref() {
                        Some(address) if !address.is_empty() => {
                            Some(LinkRecord::new(location, address))
                        }
                        _ => None,
                    })
            })
            .collect()
    }

    /// Decode every picture shape.
    pub fn image_records(&self) -> Result<Vec<ImageRecord>> {
        let mut images = Vec::new();
        for (location, shape) in self.shapes().filter(|(_, s)| s.is_picture()) {
            let blob = shape.image.as_deref().ok_or_else(|| {
                Error::DecodeError(format!("picture on slide {} has no image payload", location))
            })?;
            images.push(decode_image(location, blob)?);
        }
        Ok(images)
    }

    /// One record per table shape, with trimmed cell text.
    pub fn table_records(&self) -> Vec<TableRecord> {
        self.shapes()
            .filter_map(|(location, shape)| {
                let rows = shape.table.as_ref()?;
                let cells = rows
                    .iter()
                    .map(|row| row.iter().map(|c| c.trim().to_string()).collect())
                    .collect();
                Some(TableRecord::new(location, cells))
            })
            .collect()
    }
}

impl Walker for PptxWalker {
    fn texts(&mut self) -> Result<Vec<Record>> {
        let spans = self.text_records();
        log::debug!(
            "PPTX text pass over {} slides produced {} spans",
            self.presentation.slides.len(),
            spans.len()
        );
        Ok(spans.into_iter().map(Record::Text).collect())
    }

    fn links(&mut self) -> Result<Vec<Record>> {
        Ok(self.link_records().into_iter().map(Record::Link).collect())
    }

    fn images(&mut self) -> Result<Vec<Record>> {
        Ok(self.image_records()?.into_iter().map(Record::Image).collect())
    }

    fn tables(&mut self) -> Result<Vec<Record>> {
        Ok(self.table_records().into_iter().map(Record::Table).collect())
    }
}
