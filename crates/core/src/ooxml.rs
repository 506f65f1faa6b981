//! Office Open XML package plumbing shared by the DOCX and PPTX readers.
//!
//! Both formats are ZIP archives of XML parts linked by `.rels` files; this
//! module reads parts, parses relationships and resolves their targets.

use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// Relationship type of a document's main part.
pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// Relationship type of a hyperlink.
pub const REL_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

/// One `<Relationship>` entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// The raw `Target` attribute.
    pub target: String,
    /// `TargetMode="External"`: the target is a URI, not a package part.
    pub external: bool,
}

impl Relationship {
    /// Whether this is a hyperlink relationship (transitional or strict).
    pub fn is_hyperlink(&self) -> bool {
        self.rel_type == REL_HYPERLINK || self.rel_type.ends_with("/hyperlink")
    }

    /// Whether this is an officeDocument relationship (transitional or strict).
    pub fn is_office_document(&self) -> bool {
        self.rel_type == REL_OFFICE_DOCUMENT || self.rel_type.ends_with("/officeDocument")
    }
}

/// Open a ZIP archive, mapping failures to [`Error::ZipError`].
pub fn open_archive<R: Read + Seek>(reader: R) -> Result<ZipArchive<R>> {
    ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))
}

/// Whether the archive contains a part at `path`.
pub fn has_part<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> bool {
    archive.by_name(path).is_ok()
}

/// Read a part from the archive as UTF-8 text.
pub fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

/// Read a part from the archive as raw bytes.
pub fn read_part_bytes<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

    let mut content = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut content)
        .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

/// Relationships of `part`, in document order. A part without a `.rels`
/// file has no relationships.
pub fn part_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
) -> Result<Vec<Relationship>> {
    let rels_path = rels_path_for(part);
    if !has_part(archive, &rels_path) {
        log::debug!("No relationships for {}", part);
        return Ok(Vec::new());
    }
    let content = read_part(archive, &rels_path)?;
    parse_relationships(&content)
}

/// Locate the package's main document part via `_rels/.rels`, falling back
/// to `fallback` when the package relationships do not name one.
pub fn main_document_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    fallback: &str,
) -> Result<String> {
    let rels = part_relationships(archive, "")?;
    let main = rels
        .iter()
        .find(|r| r.is_office_document())
        .map(|r| resolve_target("", &r.target))
        .unwrap_or_else(|| fallback.to_string());

    if !has_part(archive, &main) {
        return Err(Error::CorruptedFile(format!(
            "main document part '{}' is missing",
            main
        )));
    }
    Ok(main)
}

/// Parse the contents of a `.rels` part.
pub fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut rels = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut rel = Relationship {
                    id: String::new(),
                    rel_type: String::new(),
                    target: String::new(),
                    external: false,
                };

                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                    match attr.key.as_ref() {
                        b"Id" => rel.id = value,
                        b"Type" => rel.rel_type = value,
                        b"Target" => rel.target = value,
                        b"TargetMode" => rel.external = value.eq_ignore_ascii_case("External"),
                        _ => {}
                    }
                }
                rels.push(rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

/// The `.rels` path belonging to `part`; the empty part is the package root.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None if part.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target relative to the part that owns it.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

/// Extract the local name from a potentially namespaced XML element name.
pub fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Value of the first attribute whose local name is `key`.
pub fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .map(|a| {
            a.unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
        })
}

/// Read an OOXML on/off attribute: absent, `1`, `true` or `on` mean on when
/// the element is present.
pub fn toggle_value(e: &BytesStart, key: &[u8]) -> bool {
    match attr_value(e, key) {
        None => true,
        Some(v) => !matches!(v.as_str(), "0" | "false" | "off"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="http://example.com/?a=1&amp;b=2" TargetMode="External"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
</Relationships>"#;

    #[test]
    fn test_parse_relationships() {
        let rels = parse_relationships(RELS).unwrap();
        assert_eq!(rels.len(), 3);
        assert_eq!(rels[0].id, "rId1");
        assert!(!rels[0].is_hyperlink());
        assert!(rels[1].is_hyperlink());
        assert!(rels[1].external);
        assert_eq!(rels[1].target, "http://example.com/?a=1&b=2");
        assert_eq!(rels[2].target, "media/image1.png");
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(
            rels_path_for("ppt/slides/slide1.xml"),
            "ppt/slides/_rels/slide1.xml.rels"
        );
        assert_eq!(rels_path_for(""), "_rels/.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("word/document.xml", "media/image1.png"), "word/media/image1.png");
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../media/image2.jpeg"),
            "ppt/media/image2.jpeg"
        );
        assert_eq!(resolve_target("ppt/presentation.xml", "/ppt/slides/slide3.xml"), "ppt/slides/slide3.xml");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"p:sp"), b"sp");
        assert_eq!(local_name(b"w:t"), b"t");
        assert_eq!(local_name(b"sp"), b"sp");
    }

    #[test]
    fn test_main_document_part() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        zip.start_file("_rels/.rels", options).unwrap();
        zip.write_all(
            br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/main.xml"/>
</Relationships>"#,
        )
        .unwrap();
        zip.start_file("word/main.xml", options).unwrap();
        zip.write_all(b"<w:document/>").unwrap();
        let cursor = zip.finish().unwrap();

        let mut archive = open_archive(cursor).unwrap();
        assert_eq!(
            main_document_part(&mut archive, "word/document.xml").unwrap(),
            "word/main.xml"
        );
    }

    #[test]
    fn test_main_document_part_missing() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("other.xml", FileOptions::default()).unwrap();
        zip.write_all(b"<x/>").unwrap();
        let cursor = zip.finish().unwrap();

        let mut archive = open_archive(cursor).unwrap();
        let err = main_document_part(&mut archive, "word/document.xml").unwrap_err();
        assert!(matches!(err, Error::CorruptedFile(_)));
    }
}
