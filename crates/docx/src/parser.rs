//! DOCX package reader.
//!
//! Produces a plain in-memory model of the main document part: body-level
//! paragraphs with their runs, top-level tables, and the part's
//! relationships (with payloads for embedded parts).

use harvest_core::normalize::coerce_font_size;
use harvest_core::ooxml::{self, attr_value, local_name, toggle_value};
use harvest_core::{DocumentHandle, DocumentOpener, Error, FormatKind, RawStyle, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use zip::ZipArchive;

/// Conventional location of the main document part.
const DEFAULT_MAIN_PART: &str = "word/document.xml";

/// Elements whose content belongs to embedded objects, not the paragraph.
const SKIPPED_ELEMENTS: &[&[u8]] = &[b"drawing", b"pict", b"object", b"txbxContent"];

/// A parsed word-processing document.
#[derive(Debug, Clone, Default)]
pub struct WordDocument {
    /// Body-level paragraphs in document order (table cells excluded).
    pub paragraphs: Vec<Paragraph>,
    /// Top-level tables in document order.
    pub tables: Vec<Table>,
    /// Relationships of the main document part, in `.rels` order.
    pub relationships: Vec<DocRelationship>,
}

/// A paragraph and its runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub runs: Vec<Run>,
}

impl Paragraph {
    /// The paragraph's full text: all run texts concatenated.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// A run with only its explicitly set formatting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub font_name: Option<String>,
    /// Size in points.
    pub font_size: Option<f64>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
}

impl Run {
    pub fn style(&self) -> RawStyle {
        RawStyle {
            font_name: self.font_name.clone(),
            font_size: self.font_size,
            bold: self.bold,
            italic: self.italic,
        }
    }
}

/// A table as a row-major grid of raw cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

/// A relationship of the main document part.
#[derive(Debug, Clone, PartialEq)]
pub struct DocRelationship {
    pub id: String,
    pub rel_type: String,
    /// The raw target reference, e.g. `media/image1.png` or a URL.
    pub target_ref: String,
    pub external: bool,
    /// Bytes of the target part, for internal non-XML targets.
    pub blob: Option<Vec<u8>>,
}

impl DocRelationship {
    pub fn is_hyperlink(&self) -> bool {
        self.rel_type.ends_with("/hyperlink")
    }
}

/// Reader for DOCX packages.
pub struct DocxReader;

impl DocxReader {
    /// Create a new DOCX reader.
    pub fn new() -> Self {
        Self
    }

    /// Read a DOCX package.
    pub fn read<R: Read + Seek>(&self, reader: R) -> Result<WordDocument> {
        let mut archive = ooxml::open_archive(reader)?;
        let main_part = ooxml::main_document_part(&mut archive, DEFAULT_MAIN_PART)?;
        log::debug!("DOCX main part: {}", main_part);

        let content = ooxml::read_part(&mut archive, &main_part)?;
        let mut document = parse_body(&content)?;
        document.relationships = self.read_relationships(&mut archive, &main_part)?;

        log::debug!(
            "DOCX: {} paragraphs, {} tables, {} relationships",
            document.paragraphs.len(),
            document.tables.len(),
            document.relationships.len()
        );
        Ok(document)
    }

    fn read_relationships<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        main_part: &str,
    ) -> Result<Vec<DocRelationship>> {
        let rels = ooxml::part_relationships(archive, main_part)?;
        let mut out = Vec::with_capacity(rels.len());

        for rel in rels {
            let blob = if rel.external {
                None
            } else {
                let part = ooxml::resolve_target(main_part, &rel.target);
                if part.ends_with(".xml") || !ooxml::has_part(archive, &part) {
                    None
                } else {
                    Some(ooxml::read_part_bytes(archive, &part)?)
                }
            };
            out.push(DocRelationship {
                id: rel.id,
                rel_type: rel.rel_type,
                target_ref: rel.target,
                external: rel.external,
                blob,
            });
        }

        Ok(out)
    }
}

impl Default for DocxReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens `.docx` handles from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxOpener;

impl DocumentOpener for DocxOpener {
    type Document = WordDocument;
    const KIND: FormatKind = FormatKind::WordProc;

    fn load(&self, handle: &DocumentHandle) -> Result<WordDocument> {
        let file = File::open(handle.path())?;
        DocxReader::new().read(BufReader::new(file))
    }
}

#[derive(Debug, Default)]
struct TableBuilder {
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
    cell: Option<CellBuilder>,
}

#[derive(Debug)]
struct CellBuilder {
    paragraphs: Vec<String>,
    span: usize,
    /// Continues a vertical merge from the cell above.
    continues: bool,
}

/// Event-driven state for walking `w:body`.
#[derive(Debug, Default)]
struct BodyState {
    paragraphs: Vec<Paragraph>,
    tables: Vec<Table>,
    skip_depth: usize,
    table_depth: usize,
    table: Option<TableBuilder>,
    paragraph: Option<Paragraph>,
    run: Option<Run>,
    in_rpr: bool,
    in_text: bool,
}

impl BodyState {
    /// Elements skipped with their whole subtree. Content controls count
    /// only outside a paragraph; run-level ones keep their text.
    fn skips(&self, local: &[u8]) -> bool {
        SKIPPED_ELEMENTS.contains(&local) || (local == b"sdt" && self.paragraph.is_none())
    }

    fn start(&mut self, e: &BytesStart) {
        let name = e.name();
        let local = local_name(name.as_ref());

        if self.skips(local) {
            self.skip_depth += 1;
            return;
        }
        if self.skip_depth > 0 {
            return;
        }

        match local {
            b"tbl" => {
                self.table_depth += 1;
                if self.table_depth == 1 {
                    self.table = Some(TableBuilder::default());
                }
            }
            b"tr" if self.table_depth == 1 => {
                if let Some(table) = self.table.as_mut() {
                    table.row = Some(Vec::new());
                }
            }
            b"tc" if self.table_depth == 1 => {
                if let Some(table) = self.table.as_mut() {
                    table.cell = Some(CellBuilder {
                        paragraphs: Vec::new(),
                        span: 1,
                        continues: false,
                    });
                }
            }
            b"gridSpan" if self.table_depth == 1 => {
                let span = attr_value(e, b"val")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(1)
                    .max(1);
                if let Some(cell) = self.table.as_mut().and_then(|t| t.cell.as_mut()) {
                    cell.span = span;
                }
            }
            b"vMerge" if self.table_depth == 1 => {
                let restart = attr_value(e, b"val").is_some_and(|v| v == "restart");
                if let Some(cell) = self.table.as_mut().and_then(|t| t.cell.as_mut()) {
                    cell.continues = !restart;
                }
            }
            b"p" if self.table_depth <= 1 => {
                self.paragraph = Some(Paragraph::default());
            }
            b"r" if self.paragraph.is_some() => {
                self.run = Some(Run::default());
            }
            b"rPr" if self.run.is_some() => {
                self.in_rpr = true;
            }
            _ => {
                if self.in_rpr {
                    self.run_property(local, e);
                } else {
                    self.run_content(local);
                }
            }
        }
    }

    fn run_property(&mut self, local: &[u8], e: &BytesStart) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        match local {
            b"rFonts" => {
                run.font_name = attr_value(e, b"ascii").or_else(|| attr_value(e, b"hAnsi"));
            }
            b"sz" => {
                run.font_size = attr_value(e, b"val").map(|v| coerce_font_size(&v) / 2.0);
            }
            b"b" => run.bold = Some(toggle_value(e, b"val")),
            b"i" => run.italic = Some(toggle_value(e, b"val")),
            _ => {}
        }
    }

    fn run_content(&mut self, local: &[u8]) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        match local {
            b"t" => self.in_text = true,
            b"tab" => run.text.push('\t'),
            b"br" | b"cr" => run.text.push('\n'),
            _ => {}
        }
    }

    fn end(&mut self, local: &[u8]) {
        if self.skips(local) {
            self.skip_depth = self.skip_depth.saturating_sub(1);
            return;
        }
        if self.skip_depth > 0 {
            return;
        }

        match local {
            b"t" => self.in_text = false,
            b"rPr" => self.in_rpr = false,
            b"r" => {
                if let (Some(run), Some(paragraph)) = (self.run.take(), self.paragraph.as_mut()) {
                    paragraph.runs.push(run);
                }
            }
            b"p" => {
                if let Some(paragraph) = self.paragraph.take() {
                    if self.table_depth == 0 {
                        self.paragraphs.push(paragraph);
                    } else if let Some(cell) = self.table.as_mut().and_then(|t| t.cell.as_mut()) {
                        cell.paragraphs.push(paragraph.text());
                    }
                }
            }
            b"tc" if self.table_depth == 1 => {
                if let Some(table) = self.table.as_mut() {
                    if let (Some(cell), Some(row)) = (table.cell.take(), table.row.as_mut()) {
                        let above = cell
                            .continues
                            .then(|| table.rows.last().and_then(|prev| prev.get(row.len())))
                            .flatten();
                        let text = match above {
                            Some(text) => text.clone(),
                            None => cell.paragraphs.join("\n"),
                        };
                        for _ in 0..cell.span {
                            row.push(text.clone());
                        }
                    }
                }
            }
            b"tr" if self.table_depth == 1 => {
                if let Some(table) = self.table.as_mut() {
                    if let Some(row) = table.row.take() {
                        table.rows.push(row);
                    }
                }
            }
            b"tbl" => {
                if self.table_depth == 1 {
                    if let Some(table) = self.table.take() {
                        self.tables.push(Table { rows: table.rows });
                    }
                }
                self.table_depth = self.table_depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text && self.skip_depth == 0 {
            if let Some(run) = self.run.as_mut() {
                run.text.push_str(text);
            }
        }
    }
}

/// Parse the main document XML into paragraphs and tables.
fn parse_body(xml: &str) -> Result<WordDocument> {
    let mut reader = Reader::from_str(xml);
    let mut state = BodyState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => state.start(e),
            Ok(Event::Empty(ref e)) => {
                state.start(e);
                let name = e.name();
                state.end(local_name(name.as_ref()));
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                state.end(local_name(name.as_ref()));
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::XmlError(format!("Bad text in document: {}", err)))?;
                state.text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing document at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(WordDocument {
        paragraphs: state.paragraphs,
        tables: state.tables,
        relationships: Vec::new(),
    })
}
