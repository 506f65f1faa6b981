//! The page-oriented object model the PDF walker consumes.

use harvest_core::bitmap::decode_image;
use harvest_core::{Error, ImageRecord, Result};
use image::{DynamicImage, GrayImage, RgbImage};

/// A styled run of text on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfSpan {
    pub text: String,
    /// Base font name, if the font resource could be resolved.
    pub font: Option<String>,
    /// Effective size in points.
    pub size: Option<f64>,
    /// Origin in user space.
    pub x: f64,
    pub y: f64,
    /// Horizontal extent in user space; 0 when unknown.
    pub width: f64,
}

impl PdfSpan {
    pub fn new(text: impl Into<String>, font: Option<&str>, size: Option<f64>) -> Self {
        Self {
            text: text.into(),
            font: font.map(str::to_string),
            size,
            x: 0.0,
            y: 0.0,
            width: 0.0,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    /// Right edge in user space.
    pub fn end(&self) -> f64 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfLine {
    pub spans: Vec<PdfSpan>,
}

/// A text block: one `BT`..`ET` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfBlock {
    pub lines: Vec<PdfLine>,
}

impl PdfBlock {
    pub fn spans(&self) -> impl Iterator<Item = &PdfSpan> {
        self.lines.iter().flat_map(|l| l.spans.iter())
    }
}

/// A page annotation. Only the link action's URI is modeled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    pub uri: Option<String>,
}

/// Colour model of raw image samples.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Each sample indexes `palette`, which holds `base.components()` bytes
    /// per entry.
    Indexed {
        base: Box<ColorSpace>,
        palette: Vec<u8>,
    },
}

impl ColorSpace {
    /// Samples per pixel in the image data.
    pub fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gray => "Gray",
            Self::Rgb => "RGB",
            Self::Cmyk => "CMYK",
            Self::Indexed { .. } => "Indexed",
        }
    }
}

/// Uncompressed image samples, rows padded to whole bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub color: ColorSpace,
    /// 1, 2, 4, 8 or 16.
    pub bits_per_component: u8,
    /// `/Decode`: a `[min max]` pair per component.
    pub decode: Option<Vec<f64>>,
    pub samples: Vec<u8>,
}

impl RawImage {
    /// 8-bit samples with the default decode ranges.
    pub fn new(width: u32, height: u32, color: ColorSpace, samples: Vec<u8>) -> Self {
        Self {
            width,
            height,
            color,
            bits_per_component: 8,
            decode: None,
            samples,
        }
    }

    pub fn with_bits(mut self, bits: u8) -> Self {
        self.bits_per_component = bits;
        self
    }

    pub fn with_decode(mut self, decode: Vec<f64>) -> Self {
        self.decode = Some(decode);
        self
    }

    /// Expand to an 8-bit bitmap. `None` when the samples do not fill the
    /// declared geometry or the geometry overflows.
    pub fn to_bitmap(&self) -> Option<DynamicImage> {
        let bits = self.bits_per_component as usize;
        if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
            return None;
        }
        let components = self.color.components();
        let per_row = (self.width as usize).checked_mul(components)?;
        let row_bytes = per_row.checked_mul(bits)?.div_ceil(8);
        let needed = row_bytes.checked_mul(self.height as usize)?;
        if row_bytes == 0 || self.samples.len() < needed {
            return None;
        }

        let max = ((1u32 << bits) - 1) as f64;
        let ranges = self.decode_ranges(components, max);
        let indexed = matches!(self.color, ColorSpace::Indexed { .. });

        let mut values = Vec::with_capacity(per_row.checked_mul(self.height as usize)?);
        for row in self.samples[..needed].chunks_exact(row_bytes) {
            for i in 0..per_row {
                let (lo, hi) = ranges[i % components];
                let v = lo + sample_at(row, i, bits) as f64 / max * (hi - lo);
                values.push(if indexed {
                    v.round().clamp(0.0, 255.0) as u8
                } else {
                    (v.clamp(0.0, 1.0) * 255.0).round() as u8
                });
            }
        }

        match &self.color {
            ColorSpace::Indexed { base, palette } => {
                let stride = base.components();
                let entries = palette.len() / stride;
                if entries == 0 {
                    return None;
                }
                let expanded = values
                    .iter()
                    .flat_map(|&idx| {
                        let start = (idx as usize).min(entries - 1) * stride;
                        palette[start..start + stride].iter().copied()
                    })
                    .collect();
                to_dynamic(self.width, self.height, base, expanded)
            }
            color => to_dynamic(self.width, self.height, color, values),
        }
    }

    /// Per-component `(min, max)`. Device samples map into `0..=1`,
    /// palette indices into `0..=max`.
    fn decode_ranges(&self, components: usize, max: f64) -> Vec<(f64, f64)> {
        match &self.decode {
            Some(d) if d.len() >= components * 2 => {
                d.chunks_exact(2).take(components).map(|p| (p[0], p[1])).collect()
            }
            _ if matches!(self.color, ColorSpace::Indexed { .. }) => vec![(0.0, max)],
            _ => vec![(0.0, 1.0); components],
        }
    }
}

/// The `index`th sample of a row, MSB first for sub-byte depths.
fn sample_at(row: &[u8], index: usize, bits: usize) -> u32 {
    match bits {
        8 => row[index] as u32,
        16 => u16::from_be_bytes([row[2 * index], row[2 * index + 1]]) as u32,
        _ => {
            let bit = index * bits;
            let shift = 8 - bits - bit % 8;
            ((row[bit / 8] >> shift) & ((1u8 << bits) - 1)) as u32
        }
    }
}

fn to_dynamic(width: u32, height: u32, color: &ColorSpace, values: Vec<u8>) -> Option<DynamicImage> {
    match color {
        ColorSpace::Gray => GrayImage::from_raw(width, height, values).map(DynamicImage::ImageLuma8),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, values).map(DynamicImage::ImageRgb8),
        ColorSpace::Cmyk => {
            let rgb: Vec<u8> = values
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = 255 - px[3] as u16;
                    [px[0], px[1], px[2]].map(|c| ((255 - c as u16) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Indexed { .. } => None,
    }
}

/// An image XObject as found on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfImage {
    /// A self-describing payload such as a JPEG stream.
    Encoded(Vec<u8>),
    /// Uncompressed samples.
    Raw(RawImage),
    /// An image whose encoding cannot be represented as a bitmap.
    Unsupported(String),
}

impl PdfImage {
    /// Decode into a bitmap record at `location`.
    pub fn decode(&self, location: u32) -> Result<ImageRecord> {
        match self {
            Self::Encoded(bytes) => decode_image(location, bytes),
            Self::Raw(raw) => {
                let pixels = raw.to_bitmap().ok_or_else(|| {
                    Error::DecodeError(format!(
                        "image at location {}: {} bytes do not fill {}x{} {}-bit {}",
                        location,
                        raw.samples.len(),
                        raw.width,
                        raw.height,
                        raw.bits_per_component,
                        raw.color.name()
                    ))
                })?;
                Ok(ImageRecord::from_bitmap(location, pixels))
            }
            Self::Unsupported(reason) => Err(Error::DecodeError(format!(
                "image at location {}: {}",
                location, reason
            ))),
        }
    }
}

/// Read access to a PDF's pages. Page indices are 0-based.
///
/// Text and images come from structurally different parts of a page, so
/// they are exposed as separate passes over the same source.
pub trait PdfSource {
    fn page_count(&self) -> u32;

    /// Text blocks in content-stream order.
    fn text_blocks(&self, page: u32) -> Result<Vec<PdfBlock>>;

    /// The page's annotations, or `None` when it has no annotation list.
    fn annotations(&self, page: u32) -> Result<Option<Vec<Annotation>>>;

    /// Image XObjects in resource listing order.
    fn images(&self, page: u32) -> Result<Vec<PdfImage>>;

    /// Detected tables as raw row-major grids.
    fn tables(&self, page: u32) -> Result<Vec<Vec<Vec<String>>>>;
}
