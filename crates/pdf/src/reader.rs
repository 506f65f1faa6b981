//! [`PdfSource`] backed by lopdf.
//!
//! The document is parsed once and every pass (text, annotations, images,
//! tables) reads from the same object graph.

use crate::fonts::{decode_text_simple, FontResource, PdfFont, ESTIMATED_WIDTHS};
use crate::source::{
    Annotation, ColorSpace, PdfBlock, PdfImage, PdfLine, PdfSource, PdfSpan, RawImage,
};
use crate::tables::TableDetector;
use harvest_core::{DocumentHandle, DocumentOpener, Error, FormatKind, Result};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::path::Path;

/// Guard against cyclic `/Parent` chains.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// TJ adjustments beyond this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f64 = 200.0;

/// Filters lopdf can undo on an image stream.
const STREAM_FILTERS: [&str; 3] = ["FlateDecode", "LZWDecode", "ASCII85Decode"];

fn pdf_err(e: lopdf::Error) -> Error {
    Error::PdfParseError(e.to_string())
}

/// A loaded PDF and its page list.
pub struct LopdfSource {
    doc: Document,
    pages: Vec<ObjectId>,
    detector: TableDetector,
}

impl LopdfSource {
    /// Load a PDF from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let doc = Document::load(path).map_err(pdf_err)?;
        Ok(Self::from_document(doc))
    }

    /// Load a PDF from memory.
    pub fn load_mem(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes).map_err(pdf_err)?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        let pages = doc.get_pages().into_values().collect();
        Self {
            doc,
            pages,
            detector: TableDetector::new(),
        }
    }

    /// Replace the table detector used by [`PdfSource::tables`].
    pub fn with_detector(mut self, detector: TableDetector) -> Self {
        self.detector = detector;
        self
    }

    fn page_dict(&self, page: u32) -> Result<&Dictionary> {
        let id = self.pages.get(page as usize).ok_or_else(|| {
            Error::PdfParseError(format!(
                "page {} out of range ({} pages)",
                page + 1,
                self.pages.len()
            ))
        })?;
        self.doc.get_dictionary(*id).map_err(pdf_err)
    }

    /// Follow one indirect reference.
    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        match self.resolve(obj)? {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    /// Look up a page attribute, walking up the page tree for inheritable ones.
    fn inherited<'a>(&'a self, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut dict = page;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            dict = self.resolve_dict(dict.get(b"Parent").ok()?)?;
        }
        None
    }

    fn resources<'a>(&'a self, page: &'a Dictionary) -> Option<&'a Dictionary> {
        self.inherited(page, b"Resources")
            .and_then(|r| self.resolve_dict(r))
    }

    /// Concatenated, decompressed content streams of a page.
    fn page_content(&self, page: &Dictionary) -> Result<Vec<u8>> {
        let Ok(contents) = page.get(b"Contents") else {
            return Ok(Vec::new());
        };

        match self.resolve(contents) {
            Some(Object::Stream(s)) => stream_data(s),
            Some(Object::Array(arr)) => {
                let mut content = Vec::new();
                for obj in arr {
                    if let Some(Object::Stream(s)) = self.resolve(obj) {
                        content.extend_from_slice(&stream_data(s)?);
                        content.push(b' ');
                    }
                }
                Ok(content)
            }
            _ => Err(Error::PdfParseError("Invalid content stream".to_string())),
        }
    }

    /// The page's font resources by resource name.
    fn font_resources(&self, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, FontResource> {
        let Some(font_dict) = resources
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|f| self.resolve_dict(f))
        else {
            return HashMap::new();
        };

        font_dict
            .iter()
            .filter_map(|(name, obj)| {
                let font = self.resolve_dict(obj)?;
                Some((name.clone(), FontResource::from_dict(&self.doc, font)))
            })
            .collect()
    }

    fn image_from_stream(&self, stream: &Stream) -> Result<PdfImage> {
        let dict = &stream.dict;
        let filters = filter_names(dict);

        if filters.iter().any(|f| f == "DCTDecode") {
            if filters.len() == 1 {
                return Ok(PdfImage::Encoded(stream.content.clone()));
            }
            return Ok(PdfImage::Unsupported(format!("filter chain {:?}", filters)));
        }
        if let Some(other) = filters.iter().find(|f| !STREAM_FILTERS.contains(&f.as_str())) {
            return Ok(PdfImage::Unsupported(format!("{} image data", other)));
        }

        let (Some(width), Some(height)) = (
            self.dimension(dict, b"Width"),
            self.dimension(dict, b"Height"),
        ) else {
            return Ok(PdfImage::Unsupported(
                "missing or invalid image dimensions".to_string(),
            ));
        };

        let is_mask = matches!(
            dict.get(b"ImageMask").ok().and_then(|m| self.resolve(m)),
            Some(Object::Boolean(true))
        );
        let (color, bits) = if is_mask {
            (ColorSpace::Gray, 1)
        } else {
            let bits = dict.get(b"BitsPerComponent").ok().and_then(|o| self.number(o));
            let bits = match bits {
                Some(b) if [1.0, 2.0, 4.0, 8.0, 16.0].contains(&b) => b as u8,
                other => {
                    return Ok(PdfImage::Unsupported(format!(
                        "{:?} bits per component",
                        other
                    )))
                }
            };
            let Some(color) = dict
                .get(b"ColorSpace")
                .ok()
                .and_then(|cs| self.color_space(cs))
            else {
                return Ok(PdfImage::Unsupported("unsupported colour space".to_string()));
            };
            (color, bits)
        };

        let samples = match stream_data(stream) {
            Ok(samples) => samples,
            Err(e) => return Ok(PdfImage::Unsupported(e.to_string())),
        };
        let mut image = RawImage::new(width, height, color, samples).with_bits(bits);
        let decode = dict
            .get(b"Decode")
            .ok()
            .and_then(|d| self.resolve(d))
            .and_then(|d| d.as_array().ok())
            .and_then(|d| d.iter().map(|v| self.number(v)).collect::<Option<Vec<f64>>>());
        if let Some(decode) = decode {
            image = image.with_decode(decode);
        }
        Ok(PdfImage::Raw(image))
    }

    /// A positive, finite pixel dimension that fits in `u32`.
    fn dimension(&self, dict: &Dictionary, key: &[u8]) -> Option<u32> {
        let value = dict.get(key).ok().and_then(|o| self.number(o))?;
        (value.is_finite() && value >= 1.0 && value <= u32::MAX as f64).then(|| value as u32)
    }

    fn color_space(&self, obj: &Object) -> Option<ColorSpace> {
        match self.resolve(obj)? {
            Object::Name(name) => match name.as_slice() {
                b"DeviceGray" | b"CalGray" | b"G" => Some(ColorSpace::Gray),
                b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(ColorSpace::Rgb),
                b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
                _ => None,
            },
            Object::Array(arr) => match self.resolve(arr.first()?)? {
                Object::Name(family) if family.as_slice() == b"ICCBased" => {
                    let profile = self.resolve_dict(arr.get(1)?)?;
                    match profile.get(b"N").ok().and_then(|n| self.number(n))? as u32 {
                        1 => Some(ColorSpace::Gray),
                        3 => Some(ColorSpace::Rgb),
                        4 => Some(ColorSpace::Cmyk),
                        _ => None,
                    }
                }
                Object::Name(family) if matches!(family.as_slice(), b"Indexed" | b"I") => {
                    self.indexed(arr)
                }
                first @ Object::Name(_) => self.color_space(first),
                _ => None,
            },
            _ => None,
        }
    }

    /// `[/Indexed base hival lookup]`, the lookup being a string or a stream.
    fn indexed(&self, arr: &[Object]) -> Option<ColorSpace> {
        let base = self.color_space(arr.get(1)?)?;
        if matches!(base, ColorSpace::Indexed { .. }) {
            return None;
        }
        let hival = self.number(arr.get(2)?)?;
        if !(0.0..=255.0).contains(&hival) {
            return None;
        }

        let mut palette = match self.resolve(arr.get(3)?)? {
            Object::String(bytes, _) => bytes.clone(),
            Object::Stream(stream) => stream_data(stream).ok()?,
            _ => return None,
        };
        palette.truncate((hival as usize + 1) * base.components());
        Some(ColorSpace::Indexed {
            base: Box::new(base),
            palette,
        })
    }

    fn number(&self, obj: &Object) -> Option<f64> {
        number(self.resolve(obj)?)
    }

    /// Every span on a page, for table detection.
    fn page_spans(&self, page: u32) -> Result<Vec<PdfSpan>> {
        Ok(self
            .text_blocks(page)?
            .into_iter()
            .flat_map(|b| b.lines.into_iter())
            .flat_map(|l| l.spans.into_iter())
            .collect())
    }
}

impl PdfSource for LopdfSource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn text_blocks(&self, page: u32) -> Result<Vec<PdfBlock>> {
        let page_dict = self.page_dict(page)?;
        let resources = self.font_resources(self.resources(page_dict));
        let fonts: HashMap<&[u8], PdfFont> = resources
            .iter()
            .map(|(name, font)| (name.as_slice(), font.load(&self.doc)))
            .collect();
        let content = self.page_content(page_dict)?;
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let content = Content::decode(&content).map_err(pdf_err)?;
        let mut state = TextState::default();
        for op in &content.operations {
            state.apply(&op.operator, &op.operands, &fonts);
        }

        log::debug!(
            "PDF page {}: {} text blocks",
            page + 1,
            state.blocks.len()
        );
        Ok(state.blocks)
    }

    fn annotations(&self, page: u32) -> Result<Option<Vec<Annotation>>> {
        let page_dict = self.page_dict(page)?;
        let Some(Object::Array(annots)) = page_dict.get(b"Annots").ok().and_then(|a| self.resolve(a))
        else {
            return Ok(None);
        };

        let annotations = annots
            .iter()
            .filter_map(|a| self.resolve_dict(a))
            .map(|annot| Annotation {
                uri: annot
                    .get(b"A")
                    .ok()
                    .and_then(|a| self.resolve_dict(a))
                    .and_then(|action| action.get(b"URI").ok())
                    .and_then(|uri| match self.resolve(uri) {
                        Some(Object::String(bytes, _)) => Some(decode_text_simple(bytes)),
                        _ => None,
                    }),
            })
            .collect();
        Ok(Some(annotations))
    }

    fn images(&self, page: u32) -> Result<Vec<PdfImage>> {
        let page_dict = self.page_dict(page)?;
        let Some(xobjects) = self
            .resources(page_dict)
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| self.resolve_dict(x))
        else {
            return Ok(Vec::new());
        };

        let mut images = Vec::new();
        for (name, obj) in xobjects.iter() {
            let Some(Object::Stream(stream)) = self.resolve(obj) else {
                continue;
            };
            let is_image = matches!(
                stream.dict.get(b"Subtype"),
                Ok(Object::Name(n)) if n.as_slice() == b"Image"
            );
            if is_image {
                log::debug!(
                    "PDF page {}: image XObject /{}",
                    page + 1,
                    String::from_utf8_lossy(name)
                );
                images.push(self.image_from_stream(stream)?);
            }
        }
        Ok(images)
    }

    fn tables(&self, page: u32) -> Result<Vec<Vec<Vec<String>>>> {
        let spans = self.page_spans(page)?;
        Ok(self.detector.detect(&spans))
    }
}

/// Opens `.pdf` handles from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfOpener;

impl DocumentOpener for LopdfOpener {
    type Document = LopdfSource;
    const KIND: FormatKind = FormatKind::Pdf;

    fn load(&self, handle: &DocumentHandle) -> Result<LopdfSource> {
        LopdfSource::load(handle.path())
    }
}

/// Text-object state while interpreting a content stream.
#[derive(Debug)]
struct TextState {
    blocks: Vec<PdfBlock>,
    block: Option<PdfBlock>,
    line: PdfLine,
    /// Resource name of the current font.
    font: Option<Vec<u8>>,
    font_size: f64,
    leading: f64,
    char_spacing: f64,
    word_spacing: f64,
    /// `Tz` as a fraction.
    h_scale: f64,
    /// Text matrix `[a b c d e f]`.
    tm: [f64; 6],
    /// Start of the current line.
    tlm: [f64; 6],
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            block: None,
            line: PdfLine::default(),
            font: None,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            tm: IDENTITY,
            tlm: IDENTITY,
        }
    }
}

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

impl TextState {
    fn apply(&mut self, operator: &str, operands: &[Object], fonts: &HashMap<&[u8], PdfFont>) {
        let num = |i: usize| operands.get(i).and_then(number);

        match operator {
            "BT" => {
                self.block = Some(PdfBlock::default());
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
            }
            "ET" => {
                self.break_line();
                if let Some(block) = self.block.take() {
                    if !block.lines.is_empty() {
                        self.blocks.push(block);
                    }
                }
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.font = Some(name.clone());
                }
                self.font_size = num(1).unwrap_or(0.0);
            }
            "TL" => self.leading = num(0).unwrap_or(0.0),
            "Tc" => self.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.h_scale = num(0).unwrap_or(100.0) / 100.0,
            "Td" => self.move_line(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
            "TD" => {
                let ty = num(1).unwrap_or(0.0);
                self.leading = -ty;
                self.move_line(num(0).unwrap_or(0.0), ty);
            }
            "Tm" => {
                let mut m = IDENTITY;
                for (i, slot) in m.iter_mut().enumerate() {
                    *slot = num(i).unwrap_or(IDENTITY[i]);
                }
                self.break_line();
                self.tm = m;
                self.tlm = m;
            }
            "T*" => self.move_line(0.0, -self.leading),
            "Tj" => self.show_string(operands.first(), fonts),
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show(items, fonts);
                }
            }
            "'" => {
                self.move_line(0.0, -self.leading);
                self.show_string(operands.first(), fonts);
            }
            "\"" => {
                self.word_spacing = num(0).unwrap_or(self.word_spacing);
                self.char_spacing = num(1).unwrap_or(self.char_spacing);
                self.move_line(0.0, -self.leading);
                self.show_string(operands.get(2), fonts);
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        let [a, b, c, d, e, f] = self.tlm;
        self.tlm = [a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d];
        self.tm = self.tlm;
        self.break_line();
    }

    fn break_line(&mut self) {
        if self.line.spans.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.line);
        if let Some(block) = self.block.as_mut() {
            block.lines.push(line);
        }
    }

    fn show_string(&mut self, operand: Option<&Object>, fonts: &HashMap<&[u8], PdfFont>) {
        if let Some(text @ Object::String(..)) = operand {
            self.show(std::slice::from_ref(text), fonts);
        }
    }

    /// Show strings and `TJ` adjustments as one span, then move the text
    /// position past them. Large negative adjustments read as word gaps.
    fn show(&mut self, items: &[Object], fonts: &HashMap<&[u8], PdfFont>) {
        let font = self.font.as_deref().and_then(|name| fonts.get(name));
        let widths = font.map_or(&ESTIMATED_WIDTHS, |font| font.widths);

        let mut text = String::new();
        let mut advance = 0.0;
        for item in items {
            match item {
                Object::String(bytes, _) => {
                    match font {
                        Some(font) => text.push_str(&font.decode(bytes)),
                        None => text.push_str(&decode_text_simple(bytes)),
                    }
                    advance += widths.advance(
                        bytes,
                        self.font_size,
                        self.char_spacing,
                        self.word_spacing,
                    ) * self.h_scale;
                }
                other => {
                    let Some(adjustment) = number(other) else {
                        continue;
                    };
                    if -adjustment > TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ')
                    {
                        text.push(' ');
                    }
                    advance -= adjustment / 1000.0 * self.font_size * self.h_scale;
                }
            }
        }

        let [a, b, c, d, e, f] = self.tm;
        if self.block.is_some() {
            let scale = (c * c + d * d).sqrt();
            self.line.spans.push(PdfSpan {
                text,
                font: font.and_then(|font| font.name).map(str::to_string),
                size: Some(self.font_size * scale),
                x: e,
                y: f,
                width: advance * (a * a + b * b).sqrt(),
            });
        }
        self.tm[4] += advance * a;
        self.tm[5] += advance * b;
    }
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| match o {
                Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Stream payload with its filters removed.
fn stream_data(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    // lopdf declines to decompress image streams directly.
    let mut plain = stream.clone();
    plain.dict.remove(b"Subtype");
    plain.decompressed_content().map_err(pdf_err)
}
