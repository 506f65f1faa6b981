//! PPTX file parser implementation.

use harvest_core::normalize::coerce_font_size;
use harvest_core::ooxml::{self, attr_value, local_name, Relationship};
use harvest_core::{DocumentHandle, DocumentOpener, Error, FormatKind, RawStyle, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use zip::ZipArchive;

/// Conventional location of the presentation part.
const DEFAULT_MAIN_PART: &str = "ppt/presentation.xml";

/// A parsed presentation.
#[derive(Debug, Clone, Default)]
pub struct Presentation {
    /// Slides in presentation order.
    pub slides: Vec<Slide>,
}

/// A single slide.
#[derive(Debug, Clone, Default)]
pub struct Slide {
    /// 1-based slide number.
    pub number: usize,
    /// Top-level shapes in z-order.
    pub shapes: Vec<Shape>,
}

/// Kind of a top-level shape, from its element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeType {
    /// `p:sp`: an auto shape, placeholder or text box.
    AutoShape,
    /// `p:pic`.
    Picture,
    /// `p:graphicFrame`: tables, charts, diagrams.
    GraphicFrame,
    /// `p:grpSp`.
    Group,
    /// `p:cxnSp`.
    Connector,
}

impl ShapeType {
    fn from_element(local: &[u8]) -> Option<Self> {
        match local {
            b"sp" => Some(Self::AutoShape),
            b"pic" => Some(Self::Picture),
            b"graphicFrame" => Some(Self::GraphicFrame),
            b"grpSp" => Some(Self::Group),
            b"cxnSp" => Some(Self::Connector),
            _ => None,
        }
    }
}

/// A top-level shape with whatever content it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub shape_type: ShapeType,
    pub text_frame: Option<TextFrame>,
    /// Image payload of a picture shape.
    pub image: Option<Vec<u8>>,
    /// Raw cell text of a table graphic frame.
    pub table: Option<Vec<Vec<String>>>,
}

impl Shape {
    pub fn new(shape_type: ShapeType) -> Self {
        Self {
            shape_type,
            text_frame: None,
            image: None,
            table: None,
        }
    }

    pub fn is_picture(&self) -> bool {
        self.shape_type == ShapeType::Picture
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }
}

/// Paragraphs of a shape's text body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextFrame {
    pub paragraphs: Vec<TextParagraph>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextParagraph {
    pub runs: Vec<TextRun>,
}

/// A text run with its directly applied font and click hyperlink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub font: RawStyle,
    /// Resolved hyperlink address, if the run has a click action.
    pub hyperlink: Option<String>,
}

/// Parser for PPTX (Office Open XML) files.
pub struct PptxParser;

impl PptxParser {
    /// Create a new PPTX parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a PPTX file from a reader.
    pub fn parse<R: Read + Seek>(&self, reader: R) -> Result<Presentation> {
        let mut archive = ooxml::open_archive(reader)?;
        let main_part = ooxml::main_document_part(&mut archive, DEFAULT_MAIN_PART)?;

        let mut presentation = Presentation::default();

        // Get the slide order from presentation.xml and its relationships
        let slide_order = self.get_slide_order(&mut archive, &main_part)?;

        // Parse each slide in order
        for (idx, slide_path) in slide_order.iter().enumerate() {
            let slide = self.parse_slide(&mut archive, slide_path, idx + 1)?;
            log::debug!(
                "Slide {} ({}): {} shapes",
                slide.number,
                slide_path,
                slide.shapes.len()
            );
            presentation.slides.push(slide);
        }

        Ok(presentation)
    }

    /// Get the ordered list of slide parts.
    ///
    /// `p:sldIdLst` is authoritative; when it is missing, slide relationships
    /// are ordered by the number in their id or file name.
    fn get_slide_order<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        main_part: &str,
    ) -> Result<Vec<String>> {
        let rels = ooxml::part_relationships(archive, main_part)?;
        let by_id: HashMap<&str, &Relationship> = rels.iter().map(|r| (r.id.as_str(), r)).collect();

        let content = ooxml::read_part(archive, main_part)?;
        let listed = parse_slide_id_list(&content)?;

        let ordered: Vec<String> = listed
            .iter()
            .filter_map(|id| by_id.get(id.as_str()))
            .map(|r| ooxml::resolve_target(main_part, &r.target))
            .collect();
        if !ordered.is_empty() {
            return Ok(ordered);
        }

        let mut slides: Vec<(String, Option<usize>)> = rels
            .iter()
            .filter(|r| is_slide_relationship(&r.rel_type))
            .map(|r| {
                let order_num = extract_slide_number(&r.target).or_else(|| extract_slide_number(&r.id));
                (ooxml::resolve_target(main_part, &r.target), order_num)
            })
            .collect();

        // Sort slides by their number
        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });

        Ok(slides.into_iter().map(|(path, _)| path).collect())
    }

    /// Parse a single slide from the archive.
    fn parse_slide<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        slide_path: &str,
        slide_number: usize,
    ) -> Result<Slide> {
        let content = ooxml::read_part(archive, slide_path)?;
        let rels = ooxml::part_relationships(archive, slide_path)?;
        let by_id: HashMap<String, Relationship> =
            rels.into_iter().map(|r| (r.id.clone(), r)).collect();

        let parsed = extract_shapes_from_xml(&content, &by_id)?;

        let mut shapes = Vec::with_capacity(parsed.len());
        for (mut shape, image_rel) in parsed {
            if let Some(rel) = image_rel.and_then(|id| by_id.get(&id)) {
                if rel.external {
                    log::warn!(
                        "Slide {}: picture links to external {}",
                        slide_number,
                        rel.target
                    );
                } else {
                    let part = ooxml::resolve_target(slide_path, &rel.target);
                    if ooxml::has_part(archive, &part) {
                        shape.image = Some(ooxml::read_part_bytes(archive, &part)?);
                    } else {
                        log::warn!("Slide {}: image part {} is missing", slide_number, part);
                    }
                }
            }
            shapes.push(shape);
        }

        Ok(Slide {
            number: slide_number,
            shapes,
        })
    }
}

impl Default for PptxParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens `.pptx` handles from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct PptxOpener;

impl DocumentOpener for PptxOpener {
    type Document = Presentation;
    const KIND: FormatKind = FormatKind::Presentation;

    fn load(&self, handle: &DocumentHandle) -> Result<Presentation> {
        let file = File::open(handle.path())?;
        PptxParser::new().parse(BufReader::new(file))
    }
}

fn is_slide_relationship(rel_type: &str) -> bool {
    rel_type.ends_with("/slide")
}

/// The `r:id` of every `p:sldId`, in list order.
fn parse_slide_id_list(xml: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"sldId" =>
            {
                if let Some(id) = prefixed_attr(e, b"id") {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing presentation: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(ids)
}

/// Value of a namespace-prefixed attribute such as `r:id`, ignoring an
/// unprefixed attribute with the same local name.
fn prefixed_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() != key && local_name(a.key.as_ref()) == key)
        .map(|a| {
            a.unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
        })
}

/// A table being collected from a graphic frame.
#[derive(Debug, Default)]
struct TableBuilder {
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
    cell: Option<Vec<String>>,
    paragraph: Option<String>,
    in_text: bool,
}

/// A top-level shape being collected.
#[derive(Debug)]
struct ShapeBuilder {
    shape: Shape,
    image_rel: Option<String>,
    table: Option<TableBuilder>,
    in_text_body: bool,
    paragraph: Option<TextParagraph>,
    run: Option<TextRun>,
    in_rpr: bool,
    in_text: bool,
}

impl ShapeBuilder {
    fn new(shape_type: ShapeType) -> Self {
        Self {
            shape: Shape::new(shape_type),
            image_rel: None,
            table: None,
            in_text_body: false,
            paragraph: None,
            run: None,
            in_rpr: false,
            in_text: false,
        }
    }
}

/// Event-driven state for walking `p:spTree`.
struct SlideState<'a> {
    rels: &'a HashMap<String, Relationship>,
    shapes: Vec<(Shape, Option<String>)>,
    shape_depth: usize,
    current: Option<ShapeBuilder>,
}

impl<'a> SlideState<'a> {
    fn new(rels: &'a HashMap<String, Relationship>) -> Self {
        Self {
            rels,
            shapes: Vec::new(),
            shape_depth: 0,
            current: None,
        }
    }

    fn start(&mut self, e: &BytesStart, empty: bool) {
        let name = e.name();
        let local = local_name(name.as_ref());

        if let Some(shape_type) = ShapeType::from_element(local) {
            self.shape_depth += 1;
            if self.shape_depth == 1 {
                self.current = Some(ShapeBuilder::new(shape_type));
            }
            return;
        }

        // Content of shapes nested in a group belongs to the group only.
        if self.shape_depth != 1 {
            return;
        }
        let rels = self.rels;
        let Some(builder) = self.current.as_mut() else {
            return;
        };

        if let Some(table) = builder.table.as_mut() {
            table_start(table, local);
            return;
        }

        match local {
            b"blip" if builder.shape.shape_type == ShapeType::Picture => {
                builder.image_rel = attr_value(e, b"embed");
            }
            b"tbl" if builder.shape.shape_type == ShapeType::GraphicFrame => {
                builder.table = Some(TableBuilder::default());
            }
            b"txBody" if builder.shape.shape_type == ShapeType::AutoShape => {
                builder.in_text_body = true;
                builder.shape.text_frame.get_or_insert_with(TextFrame::default);
            }
            b"p" if builder.in_text_body => {
                builder.paragraph = Some(TextParagraph::default());
            }
            b"r" if builder.paragraph.is_some() => {
                builder.run = Some(TextRun::default());
            }
            b"rPr" => {
                if let Some(run) = builder.run.as_mut() {
                    read_run_properties(run, e);
                    builder.in_rpr = !empty;
                }
            }
            b"latin" if builder.in_rpr => {
                if let Some(run) = builder.run.as_mut() {
                    run.font.font_name = attr_value(e, b"typeface");
                }
            }
            b"hlinkClick" if builder.in_rpr => {
                if let Some(run) = builder.run.as_mut() {
                    run.hyperlink = prefixed_attr(e, b"id")
                        .and_then(|id| rels.get(&id))
                        .map(|rel| rel.target.clone());
                }
            }
            b"t" if builder.run.is_some() => {
                builder.in_text = true;
            }
            _ => {}
        }
    }

    fn end(&mut self, local: &[u8]) {
        if ShapeType::from_element(local).is_some() {
            if self.shape_depth == 1 {
                if let Some(builder) = self.current.take() {
                    self.shapes.push((builder.shape, builder.image_rel));
                }
            }
            self.shape_depth = self.shape_depth.saturating_sub(1);
            return;
        }
        if self.shape_depth != 1 {
            return;
        }
        let Some(builder) = self.current.as_mut() else {
            return;
        };

        if let Some(table) = builder.table.as_mut() {
            if local == b"tbl" {
                let rows = std::mem::take(&mut table.rows);
                builder.shape.table = Some(rows);
                builder.table = None;
            } else {
                table_end(table, local);
            }
            return;
        }

        match local {
            b"t" => builder.in_text = false,
            b"rPr" => builder.in_rpr = false,
            b"r" => {
                if let (Some(run), Some(paragraph)) = (builder.run.take(), builder.paragraph.as_mut()) {
                    paragraph.runs.push(run);
                }
            }
            b"p" => {
                if let (Some(paragraph), Some(frame)) =
                    (builder.paragraph.take(), builder.shape.text_frame.as_mut())
                {
                    frame.paragraphs.push(paragraph);
                }
            }
            b"txBody" => builder.in_text_body = false,
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.shape_depth != 1 {
            return;
        }
        let Some(builder) = self.current.as_mut() else {
            return;
        };
        if let Some(table) = builder.table.as_mut() {
            if let (true, Some(paragraph)) = (table.in_text, table.paragraph.as_mut()) {
                paragraph.push_str(text);
            }
        } else if builder.in_text {
            if let Some(run) = builder.run.as_mut() {
                run.text.push_str(text);
            }
        }
    }
}

fn table_start(table: &mut TableBuilder, local: &[u8]) {
    match local {
        b"tr" => table.row = Some(Vec::new()),
        b"tc" => table.cell = Some(Vec::new()),
        b"p" if table.cell.is_some() => table.paragraph = Some(String::new()),
        b"t" => table.in_text = true,
        b"br" => {
            if let Some(paragraph) = table.paragraph.as_mut() {
                paragraph.push('\n');
            }
        }
        _ => {}
    }
}

fn table_end(table: &mut TableBuilder, local: &[u8]) {
    match local {
        b"t" => table.in_text = false,
        b"p" => {
            if let (Some(paragraph), Some(cell)) = (table.paragraph.take(), table.cell.as_mut()) {
                cell.push(paragraph);
            }
        }
        b"tc" => {
            if let (Some(cell), Some(row)) = (table.cell.take(), table.row.as_mut()) {
                row.push(cell.join("\n"));
            }
        }
        b"tr" => {
            if let Some(row) = table.row.take() {
                table.rows.push(row);
            }
        }
        _ => {}
    }
}

/// Read `sz` (hundredths of a point), `b` and `i` from an `a:rPr`.
fn read_run_properties(run: &mut TextRun, e: &BytesStart) {
    if let Some(sz) = attr_value(e, b"sz") {
        run.font.font_size = Some(coerce_font_size(&sz) / 100.0);
    }
    if let Some(b) = attr_value(e, b"b") {
        run.font.bold = Some(b == "1" || b == "true");
    }
    if let Some(i) = attr_value(e, b"i") {
        run.font.italic = Some(i == "1" || i == "true");
    }
}

/// Extract top-level shapes from slide XML, paired with their picture
/// relationship id.
fn extract_shapes_from_xml(
    xml_content: &str,
    rels: &HashMap<String, Relationship>,
) -> Result<Vec<(Shape, Option<String>)>> {
    let mut reader = Reader::from_str(xml_content);
    let mut state = SlideState::new(rels);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => state.start(e, false),
            Ok(Event::Empty(ref e)) => {
                state.start(e, true);
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
                    .map_err(|err| Error::XmlError(format!("Bad text in slide: {}", err)))?;
                state.text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing slide at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(state.shapes)
}

/// Extract a slide number from a string like "rId2" or "slides/slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    // Remove common extensions first
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    // Try to find digits at the end
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}
