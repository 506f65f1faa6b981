//! Word-processing walker.
//!
//! Word documents carry no page model here, so every text span and link is
//! recorded at location 1. Images are located by their position in the
//! relationship list and tables by their 1-based table index.

use crate::parser::WordDocument;
use harvest_core::bitmap::decode_image;
use harvest_core::{
    normalize_span, Error, ImageRecord, LinkRecord, Record, Result, TableRecord, TextSpanRecord,
    Walker,
};

/// Location used for records of a document without pages.
const SINGLE_LOCATION: u32 = 1;

/// Walks a parsed [`WordDocument`].
pub struct DocxWalker {
    document: WordDocument,
}

impl DocxWalker {
    pub fn new(document: WordDocument) -> Self {
        Self { document }
    }

    /// One record per non-blank run, paragraphs then runs in order.
    pub fn text_records(&self) -> Vec<TextSpanRecord> {
        self.document
            .paragraphs
            .iter()
            .flat_map(|p| p.runs.iter())
            .filter_map(|run| normalize_span(SINGLE_LOCATION, &run.text, &run.style()))
            .collect()
    }

    /// Hyperlink relationships whose target appears in a paragraph's text.
    ///
    /// This is substring containment, not structural association: a link
    /// whose visible text differs from its URI is missed, and a URI that
    /// merely appears in prose matches. One record per matching
    /// (paragraph, relationship) pair.
    pub fn link_records(&self) -> Vec<LinkRecord> {
        let hyperlinks: Vec<&str> = self
            .document
            .relationships
            .iter()
            .filter(|r| r.is_hyperlink())
            .map(|r| r.target_ref.as_str())
            .collect();

        let mut links = Vec::new();
        for paragraph in &self.document.paragraphs {
            let text = paragraph.text();
            for target in &hyperlinks {
                if text.contains(target) {
                    links.push(LinkRecord::new(SINGLE_LOCATION, *target));
                }
            }
        }
        links
    }

    /// Decode every embedded image relationship.
    ///
    /// The location is the relationship's 1-based position in the full
    /// relationship list. Any matching relationship without an embedded
    /// payload fails the pass, including external targets whose URL merely
    /// contains "image".
    pub fn image_records(&self) -> Result<Vec<ImageRecord>> {
        let mut images = Vec::new();
        for (idx, rel) in self.document.relationships.iter().enumerate() {
            if !rel.target_ref.contains("image") {
                continue;
            }
            let location = (idx + 1) as u32;
            if rel.external {
                return Err(Error::DecodeError(format!(
                    "relationship {} points outside the package ({})",
                    rel.id, rel.target_ref
                )));
            }
            let blob = rel.blob.as_deref().ok_or_else(|| {
                Error::DecodeError(format!("image part '{}' has no payload", rel.target_ref))
            })?;
            images.push(decode_image(location, blob)?);
        }
        Ok(images)
    }

    /// One record per table, with trimmed cell text.
    pub fn table_records(&self) -> Vec<TableRecord> {
        self.document
            .tables
            .iter()
            .enumerate()
            .map(|(idx, table)| {
                let cells = table
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|c| c.trim().to_string()).collect())
                    .collect();
                TableRecord::new((idx + 1) as u32, cells)
            })
            .collect()
    }
}

impl Walker for DocxWalker {
    fn texts(&mut self) -> Result<Vec<Record>> {
        let spans = self.text_records();
        log::debug!("DOCX text pass produced {} spans", spans.len());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::build_docx;
    use crate::parser::{DocRelationship, DocxReader, Paragraph, Run, Table};
    use harvest_core::bitmap::encode_png;
    use harvest_core::TextKind;
    use image::DynamicImage;
    use std::io::Cursor;

    fn run(text: &str) -> Run {
        Run {
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn hyperlink(target: &str) -> DocRelationship {
        DocRelationship {
            id: "rId1".into(),
            rel_type: "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink"
                .into(),
            target_ref: target.into(),
            external: true,
            blob: None,
        }
    }

    fn image_rel(target: &str, blob: Option<Vec<u8>>) -> DocRelationship {
        DocRelationship {
            id: "rId9".into(),
            rel_type: "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image"
                .into(),
            target_ref: target.into(),
            external: false,
            blob,
        }
    }

    #[test]
    fn test_text_regular_run() {
        let walker = DocxWalker::new(WordDocument {
            paragraphs: vec![Paragraph {
                runs: vec![Run {
                    text: "Hello DOCX".into(),
                    font_name: Some("Regular".into()),
                    font_size: Some(10.0),
                    bold: Some(false),
                    italic: Some(false),
                }],
            }],
            ..Default::default()
        });

        let records = walker.text_records();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.location, 1);
        assert_eq!(r.text, "Hello DOCX");
        assert_eq!(r.kind, TextKind::Body);
        assert_eq!(r.font_name, "Regular");
        assert_eq!(r.font_size, 10.0);
        assert!(!r.bold);
        assert!(!r.italic);
    }

    #[test]
    fn test_text_skips_blank_runs_and_defaults_style() {
        let walker = DocxWalker::new(WordDocument {
            paragraphs: vec![
                Paragraph {
                    runs: vec![run("  "), run(" kept ")],
                },
                Paragraph { runs: vec![run("")] },
            ],
            ..Default::default()
        });

        let records = walker.text_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "kept");
        assert_eq!(records[0].font_name, "Default");
        assert_eq!(records[0].font_size, 0.0);
    }

    #[test]
    fn test_links_by_substring() {
        let walker = DocxWalker::new(WordDocument {
            paragraphs: vec![Paragraph {
                runs: vec![run("Check this link: http://example.com")],
            }],
            relationships: vec![hyperlink("http://example.com")],
            ..Default::default()
        });

        let links = walker.link_records();
        assert_eq!(links, vec![LinkRecord::new(1, "http://example.com")]);
    }

    #[test]
    fn test_links_miss_and_overmatch() {
        let walker = DocxWalker::new(WordDocument {
            paragraphs: vec![
                Paragraph {
                    runs: vec![run("click here")],
                },
                Paragraph {
                    runs: vec![run("see http://a.com and http://a.com/page")],
                },
            ],
            relationships: vec![hyperlink("http://a.com/page"), hyperlink("http://a.com")],
            ..Default::default()
        });

        let links = walker.link_records();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.location == 1));
    }

    #[test]
    fn test_links_ignore_non_hyperlink_relationships() {
        let walker = DocxWalker::new(WordDocument {
            paragraphs: vec![Paragraph {
                runs: vec![run("media/image1.png")],
            }],
            relationships: vec![image_rel("media/image1.png", None)],
            ..Default::default()
        });
        assert!(walker.link_records().is_empty());
    }

    #[test]
    fn test_images_located_by_relationship_position() {
        let png = encode_png(&DynamicImage::new_rgb8(70, 70)).unwrap();
        let walker = DocxWalker::new(WordDocument {
            relationships: vec![
                hyperlink("http://example.com"),
                image_rel("media/image1.png", Some(png)),
            ],
            ..Default::default()
        });

        let images = walker.image_records().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].location, 2);
        assert_eq!(images[0].dimensions(), (70, 70));
        assert_eq!(images[0].encoding.as_str(), "PNG");
    }

    #[test]
    fn test_undecodable_image_aborts() {
        let walker = DocxWalker::new(WordDocument {
            relationships: vec![image_rel("media/image1.png", Some(b"garbage".to_vec()))],
            ..Default::default()
        });
        assert!(matches!(
            walker.image_records().unwrap_err(),
            Error::DecodeError(_)
        ));
    }

    #[test]
    fn test_external_image_target_fails_pass() {
        let walker = DocxWalker::new(WordDocument {
            relationships: vec![hyperlink("http://example.com/images/logo")],
            ..Default::default()
        });
        match walker.image_records().unwrap_err() {
            Error::DecodeError(msg) => assert!(msg.contains("http://example.com/images/logo")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_walk_keeps_text_when_images_fail() {
        let mut walker = DocxWalker::new(WordDocument {
            paragraphs: vec![Paragraph {
                runs: vec![run("Body text")],
            }],
            tables: vec![Table {
                rows: vec![vec!["a".into()]],
            }],
            relationships: vec![image_rel("media/image1.png", Some(b"garbage".to_vec()))],
        });

        let walk = walker.walk().unwrap();
        assert!(matches!(walk.image_error, Some(Error::DecodeError(_))));
        assert_eq!(walk.records.len(), 2);
        assert!(matches!(&walk.records[0], Record::Text(t) if t.text == "Body text"));
        assert!(matches!(walk.records[1], Record::Table(_)));
    }

    #[test]
    fn test_tables_trimmed_and_indexed() {
        let walker = DocxWalker::new(WordDocument {
            tables: vec![
                Table {
                    rows: vec![
                        vec![" A ".into(), "B".into()],
                        vec!["C".into(), "D\n".into()],
                    ],
                },
                Table { rows: Vec::new() },
            ],
            ..Default::default()
        });

        let tables = walker.table_records();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].location, 1);
        assert_eq!(tables[0].row_count, 2);
        assert_eq!(tables[0].col_count, 2);
        assert_eq!(
            tables[0].cells,
            vec![vec!["A".to_string(), "B".to_string()], vec!["C".to_string(), "D".to_string()]]
        );
        assert_eq!(tables[1].location, 2);
        assert_eq!(tables[1].col_count, 0);
    }

    #[test]
    fn test_walk_real_package() {
        let png = encode_png(&DynamicImage::new_rgb8(8, 4)).unwrap();
        let bytes = build_docx(
            r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="28"/></w:rPr><w:t>Title</w:t></w:r></w:p>
               <w:p><w:r><w:t xml:space="preserve">Visit http://example.com today</w:t></w:r></w:p>
               <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
               <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="http://example.com" TargetMode="External"/>"#,
            &[("word/media/image1.png", &png[..])],
        );

        let document = DocxReader::new().read(Cursor::new(bytes)).unwrap();
        let records = DocxWalker::new(document).walk().unwrap().records;

        let kinds: Vec<&str> = records
            .iter()
            .map(|r| match r {
                Record::Text(_) => "text",
                Record::Link(_) => "link",
                Record::Image(_) => "image",
                Record::Table(_) => "table",
            })
            .collect();
        assert_eq!(kinds, vec!["text", "text", "link", "image", "table"]);

        match &records[0] {
            Record::Text(t) => {
                assert_eq!(t.kind, TextKind::Heading);
                assert_eq!(t.font_size, 14.0);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }
}
