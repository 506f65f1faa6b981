//! PDF walker: pages in order, each record located at its 1-based page.

use crate::source::PdfSource;
use harvest_core::{
    normalize_span, ImageRecord, LinkRecord, RawStyle, Record, Result, TableRecord,
    TextSpanRecord, Walker,
};

/// Walks any [`PdfSource`].
pub struct PdfWalker<S> {
    source: S,
}

impl<S: PdfSource> PdfWalker<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn pages(&self) -> impl Iterator<Item = (u32, u32)> {
        (0..self.source.page_count()).map(|page| (page, page + 1))
    }

    /// Spans in block, line, span order. Boldness is read off the font name;
    /// spans carry no italic flag.
    pub fn text_records(&self) -> Result<Vec<TextSpanRecord>> {
        let mut spans = Vec::new();
        for (page, location) in self.pages() {
            for block in self.source.text_blocks(page)? {
                for span in block.spans() {
                    let style = RawStyle {
                        font_name: span.font.clone(),
                        font_size: span.size,
                        bold: Some(span.font.as_deref().is_some_and(|f| f.contains("Bold"))),
                        italic: Some(false),
                    };
                    if let Some(record) = normalize_span(location, &span.text, &style) {
                        spans.push(record);
                    }
                }
            }
        }
        Ok(spans)
    }

    /// One record per annotation that carries a URI.
    pub fn link_records(&self) -> Result<Vec<LinkRecord>> {
        let mut links = Vec::new();
        for (page, location) in self.pages() {
            let Some(annotations) = self.source.annotations(page)? else {
                continue;
            };
            links.extend(
                annotations
                    .into_iter()
                    .filter_map(|a| a.uri)
                    .map(|uri| LinkRecord::new(location, uri)),
            );
        }
        Ok(links)
    }

    /// Decode every image; the first failure aborts the pass.
    pub fn image_records(&self) -> Result<Vec<ImageRecord>> {
        let mut images = Vec::new();
        for (page, location) in self.pages() {
            for image in self.source.images(page)? {
                images.push(image.decode(location)?);
            }
        }
        Ok(images)
    }

    pub fn table_records(&self) -> Result<Vec<TableRecord>> {
        let mut tables = Vec::new();
        for (page, location) in self.pages() {
            tables.extend(
                self.source
                    .tables(page)?
                    .into_iter()
                    .map(|cells| TableRecord::new(location, cells)),
            );
        }
        Ok(tables)
    }
}

impl<S: PdfSource> Walker for PdfWalker<S> {
    fn texts(&mut self) -> Result<Vec<Record>> {
        let spans = self.text_records()?;
        log::debug!(
            "PDF text pass over {} pages produced {} spans",
            self.source.page_count(),
            spans.len()
        );
        Ok(spans.into_iter().map(Record::Text).collect())
    }

    fn links(&mut self) -> Result<Vec<Record>> {
        Ok(self.link_records()?.into_iter().map(Record::Link).collect())
    }

    fn images(&mut self) -> Result<Vec<Record>> {
        Ok(self.image_records()?.into_iter().map(Record::Image).collect())
    }

    fn tables(&mut self) -> Result<Vec<Record>> {
        Ok(self.table_records()?.into_iter().map(Record::Table).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::{one_page_pdf, sample_pdf};
    use crate::reader::{LopdfOpener, LopdfSource};
    use crate::source::{Annotation, ColorSpace, PdfBlock, PdfImage, PdfLine, PdfSpan, RawImage};
    use lopdf::content::Operation;
    use lopdf::{dictionary, Object, Stream};
    use harvest_core::{extract, DocumentHandle, DocumentOpener, Error, TextKind};
    use std::fs;

    #[derive(Default)]
    struct FakePage {
        blocks: Vec<PdfBlock>,
        annotations: Option<Vec<Annotation>>,
        images: Vec<PdfImage>,
        tables: Vec<Vec<Vec<String>>>,
    }

    struct FakeSource(Vec<FakePage>);

    impl PdfSource for FakeSource {
        fn page_count(&self) -> u32 {
            self.0.len() as u32
        }

        fn text_blocks(&self, page: u32) -> Result<Vec<PdfBlock>> {
            Ok(self.0[page as usize].blocks.clone())
        }

        fn annotations(&self, page: u32) -> Result<Option<Vec<Annotation>>> {
            Ok(self.0[page as usize].annotations.clone())
        }

        fn images(&self, page: u32) -> Result<Vec<PdfImage>> {
            Ok(self.0[page as usize].images.clone())
        }

        fn tables(&self, page: u32) -> Result<Vec<Vec<Vec<String>>>> {
            Ok(self.0[page as usize].tables.clone())
        }
    }

    fn block(spans: Vec<PdfSpan>) -> PdfBlock {
        PdfBlock {
            lines: vec![PdfLine { spans }],
        }
    }

    #[test]
    fn test_bold_heading_span() {
        let walker = PdfWalker::new(FakeSource(vec![FakePage {
            blocks: vec![block(vec![PdfSpan::new("Hello PDF", Some("BoldFont"), Some(14.0))])],
            ..Default::default()
        }]));

        let spans = walker.text_records().unwrap();
        assert_eq!(spans.len(), 1);
        let s = &spans[0];
        assert_eq!(s.location, 1);
        assert_eq!(s.text, "Hello PDF");
        assert_eq!(s.kind, TextKind::Heading);
        assert_eq!(s.font_name, "BoldFont");
        assert_eq!(s.font_size, 14.0);
        assert!(s.bold);
        assert!(!s.italic);
    }

    #[test]
    fn test_span_defaults_and_case_sensitive_bold() {
        let walker = PdfWalker::new(FakeSource(vec![
            FakePage::default(),
            FakePage {
                blocks: vec![block(vec![
                    PdfSpan::new("   ", Some("Bold"), Some(20.0)),
                    PdfSpan::new(" body ", None, None),
                    PdfSpan::new("semibold", Some("Arial-bold"), Some(9.0)),
                ])],
                ..Default::default()
            },
        ]));

        let spans = walker.text_records().unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].location, 2);
        assert_eq!(spans[0].text, "body");
        assert_eq!(spans[0].font_name, "Default");
        assert_eq!(spans[0].font_size, 0.0);
        assert_eq!(spans[0].kind, TextKind::Body);
        assert!(!spans[1].bold);
    }

    #[test]
    fn test_links_only_from_uri_annotations() {
        let walker = PdfWalker::new(FakeSource(vec![
            FakePage {
                annotations: Some(vec![
                    Annotation {
                        uri: Some("http://example.com".into()),
                    },
                    Annotation { uri: None },
                ]),
                ..Default::default()
            },
            FakePage::default(),
            FakePage {
                annotations: Some(vec![Annotation {
                    uri: Some("http://third.example".into()),
                }]),
                ..Default::default()
            },
        ]));

        assert_eq!(
            walker.link_records().unwrap(),
            vec![
                LinkRecord::new(1, "http://example.com"),
                LinkRecord::new(3, "http://third.example"),
            ]
        );
    }

    #[test]
    fn test_images_and_decode_failure() {
        let gray = PdfImage::Raw(RawImage::new(3, 2, ColorSpace::Gray, vec![0; 6]));
        let walker = PdfWalker::new(FakeSource(vec![
            FakePage::default(),
            FakePage {
                images: vec![gray.clone()],
                ..Default::default()
            },
        ]));
        let images = walker.image_records().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].location, 2);
        assert_eq!(images[0].dimensions(), (3, 2));

        let walker = PdfWalker::new(FakeSource(vec![FakePage {
            images: vec![gray, PdfImage::Encoded(b"garbage".to_vec())],
            ..Default::default()
        }]));
        assert!(matches!(walker.image_records().unwrap_err(), Error::DecodeError(_)));
    }

    #[test]
    fn test_tables_keep_detected_grid() {
        let walker = PdfWalker::new(FakeSource(vec![FakePage {
            tables: vec![
                vec![vec!["a ".into(), "b".into()], vec!["c".into(), "d".into()]],
                Vec::new(),
            ],
            ..Default::default()
        }]));

        let tables = walker.table_records().unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!((tables[0].row_count, tables[0].col_count), (2, 2));
        assert_eq!(tables[0].cells[0][0], "a ");
        assert_eq!((tables[1].row_count, tables[1].col_count), (0, 0));
    }

    #[test]
    fn test_walk_order() {
        let mut walker = PdfWalker::new(FakeSource(vec![FakePage {
            blocks: vec![block(vec![PdfSpan::new("text", None, None)])],
            annotations: Some(vec![Annotation {
                uri: Some("http://example.com".into()),
            }]),
            images: vec![PdfImage::Raw(RawImage::new(1, 1, ColorSpace::Rgb, vec![1, 2, 3]))],
            tables: vec![vec![vec!["x".into()]]],
        }]));

        let records = walker.walk().unwrap().records;
        assert!(matches!(records[0], Record::Text(_)));
        assert!(matches!(records[1], Record::Link(_)));
        assert!(matches!(records[2], Record::Image(_)));
        assert!(matches!(records[3], Record::Table(_)));
    }

    #[test]
    fn test_walk_real_document() {
        let mut walker = PdfWalker::new(LopdfSource::load_mem(&sample_pdf()).unwrap());
        let walk = walker.walk().unwrap();
        assert!(walk.image_error.is_none());
        let records = walk.records;

        let texts: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                Record::Text(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[0].text, "Hello World!");
        assert_eq!(texts[0].font_name, "Courier");
        assert_eq!(texts[0].kind, TextKind::Heading);
        assert!(!texts[0].bold);
        assert_eq!(texts[1].text, "Hello PDF");
        assert!(texts[1].bold);
        assert_eq!(texts[1].font_size, 14.0);

        assert!(records
            .iter()
            .any(|r| matches!(r, Record::Link(l) if l.target_uri == "http://example.com" && l.location == 1)));
        assert!(records
            .iter()
            .any(|r| matches!(r, Record::Image(i) if i.dimensions() == (2, 1))));
    }

    #[test]
    fn test_extract_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        fs::write(&path, sample_pdf()).unwrap();

        let handle = DocumentHandle::open(&path).unwrap();
        let source = LopdfOpener.open(&handle).unwrap();
        let batch = extract(&handle, &mut PdfWalker::new(source)).unwrap();

        assert_eq!(batch.file_name(), "sample.pdf");
        assert_eq!(batch.texts().count(), 3);
        assert_eq!(batch.links().count(), 1);
        assert_eq!(batch.images().count(), 1);
    }

    #[test]
    fn test_bad_image_keeps_text_records() {
        let bytes = one_page_pdf(|doc| {
            let font = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            });
            // Indexed colour space with no lookup table.
            let image = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 1,
                    "Height" => 1,
                    "BitsPerComponent" => 8,
                    "ColorSpace" => vec!["Indexed".into(), "DeviceRGB".into(), 0.into()],
                },
                vec![0],
            ));
            let resources = dictionary! {
                "Font" => dictionary! { "F1" => font },
                "XObject" => dictionary! { "Im1" => image },
            };
            let operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 11.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal("Body text")]),
                Operation::new("ET", vec![]),
            ];
            (resources, operations)
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad-image.pdf");
        fs::write(&path, bytes).unwrap();
        let handle = DocumentHandle::open(&path).unwrap();
        let source = LopdfOpener.open(&handle).unwrap();
        let batch = extract(&handle, &mut PdfWalker::new(source)).unwrap();

        let texts: Vec<&str> = batch.texts().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Body text"]);
        assert_eq!(batch.images().count(), 0);
        assert!(batch.image_error().is_some());
        assert!(matches!(batch.check_images().unwrap_err(), Error::DecodeError(_)));
    }
}
