//! Style normalization shared by every format walker.
//!
//! Each walker reads whatever styling its native model exposes into a
//! [`RawStyle`]; [`normalize_span`] then applies the one defaulting policy
//! and the heading classifier, so no walker decides these on its own.

use crate::types::TextSpanRecord;
use serde::Serialize;

/// Font sizes strictly above this many points are headings.
pub const HEADING_SIZE_THRESHOLD: f64 = 12.0;

/// Font name recorded when the native model has none.
pub const DEFAULT_FONT_NAME: &str = "Default";

/// Whether a text span reads as a heading or as body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    Heading,
    Body,
}

impl TextKind {
    /// Label used by both sinks: `heading` or `text`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Body => "text",
        }
    }
}

/// Classify a span as heading or body.
///
/// Bold text is always a heading; otherwise the size must be strictly
/// greater than [`HEADING_SIZE_THRESHOLD`]. A non-finite size counts as 0.
pub fn classify(font_size: f64, bold: bool) -> TextKind {
    let size = if font_size.is_finite() { font_size } else { 0.0 };
    if bold || size > HEADING_SIZE_THRESHOLD {
        TextKind::Heading
    } else {
        TextKind::Body
    }
}

/// Coerce a textual font size to points, treating anything unparseable as 0.
pub fn coerce_font_size(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Styling as read from a native model, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStyle {
    pub font_name: Option<String>,
    pub font_size: Option<f64>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
}

impl RawStyle {
    /// Resolved font name, falling back to [`DEFAULT_FONT_NAME`].
    pub fn font_name(&self) -> &str {
        self.font_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_FONT_NAME)
    }

    /// Resolved size in points, 0 when unknown.
    pub fn font_size(&self) -> f64 {
        self.font_size.filter(|s| s.is_finite()).unwrap_or(0.0)
    }

    pub fn bold(&self) -> bool {
        self.bold.unwrap_or(false)
    }

    pub fn italic(&self) -> bool {
        self.italic.unwrap_or(false)
    }
}

/// Turn one native text run into a record.
///
/// Returns `None` when the text is blank after trimming.
pub fn normalize_span(location: u32, text: &str, style: &RawStyle) -> Option<TextSpanRecord> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let font_size = style.font_size();
    let bold = style.bold();
    Some(TextSpanRecord {
        location,
        text: text.to_string(),
        kind: classify(font_size, bold),
        font_name: style.font_name().to_string(),
        font_size,
        bold,
        italic: style.italic(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_threshold() {
        assert_eq!(classify(12.0, false), TextKind::Body);
        assert_eq!(classify(12.01, false), TextKind::Heading);
        assert_eq!(classify(10.0, true), TextKind::Heading);
        assert_eq!(classify(0.0, false), TextKind::Body);
        assert_eq!(classify(f64::NAN, false), TextKind::Body);
    }

    #[test]
    fn test_coerce_font_size() {
        assert_eq!(coerce_font_size("14"), 14.0);
        assert_eq!(coerce_font_size(" 10.5 "), 10.5);
        assert_eq!(coerce_font_size("large"), 0.0);
        assert_eq!(coerce_font_size(""), 0.0);
        assert_eq!(coerce_font_size("inf"), 0.0);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(TextKind::Heading.as_str(), "heading");
        assert_eq!(TextKind::Body.as_str(), "text");
    }

    #[test]
    fn test_normalize_defaults() {
        let record = normalize_span(1, "  Hello  ", &RawStyle::default()).unwrap();
        assert_eq!(record.text, "Hello");
        assert_eq!(record.font_name, "Default");
        assert_eq!(record.font_size, 0.0);
        assert!(!record.bold);
        assert!(!record.italic);
        assert_eq!(record.kind, TextKind::Body);
    }

    #[test]
    fn test_normalize_skips_blank() {
        assert!(normalize_span(1, "   \t\n", &RawStyle::default()).is_none());
        assert!(normalize_span(1, "", &RawStyle::default()).is_none());
    }

    #[test]
    fn test_normalize_empty_font_name_defaults() {
        let style = RawStyle {
            font_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(normalize_span(2, "x", &style).unwrap().font_name, "Default");
    }

    #[test]
    fn test_normalize_keeps_explicit_style() {
        let style = RawStyle {
            font_name: Some("Arial".into()),
            font_size: Some(14.0),
            bold: Some(false),
            italic: Some(true),
        };
        let record = normalize_span(4, "Title", &style).unwrap();
        assert_eq!(record.location, 4);
        assert_eq!(record.kind, TextKind::Heading);
        assert!(record.italic);
    }
}
