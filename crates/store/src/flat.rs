//! Flat-file sink: a text file of styled spans, a CSV of tables, and one
//! PNG per image.
//!
//! Links are not written here; only the relational sink stores them.

use crate::Sink;
use harvest_core::bitmap::encode_png;
use harvest_core::{Error, Result, TextSpanRecord, UnifiedRecordBatch};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TEXT_FILE: &str = "text_data.txt";
pub const TABLES_FILE: &str = "tables.csv";

/// Writes a batch into a directory.
#[derive(Debug, Clone)]
pub struct FlatFileSink {
    dir: PathBuf,
}

impl FlatFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_text(&self, batch: &UnifiedRecordBatch) -> Result<usize> {
        let path = self.dir.join(TEXT_FILE);
        let file = File::create(&path).map_err(Error::persistence)?;
        let mut out = BufWriter::new(file);

        let mut lines = 0;
        for span in batch.texts() {
            writeln!(out, "{}", text_line(span)).map_err(Error::persistence)?;
            lines += 1;
        }
        out.flush().map_err(Error::persistence)?;
        Ok(lines)
    }

    fn write_tables(&self, batch: &UnifiedRecordBatch) -> Result<usize> {
        let path = self.dir.join(TABLES_FILE);
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(Error::persistence)?;

        let mut count = 0;
        for table in batch.tables() {
            writer
                .write_record([format!(
                    "Page {} ({}x{})",
                    table.location, table.row_count, table.col_count
                )])
                .map_err(Error::persistence)?;
            for row in &table.cells {
                writer.write_record(row).map_err(Error::persistence)?;
            }
            count += 1;
        }
        writer.flush().map_err(Error::persistence)?;
        Ok(count)
    }

    fn write_images(&self, batch: &UnifiedRecordBatch) -> Result<usize> {
        let mut count = 0;
        for (idx, image) in batch.images().enumerate() {
            let png = encode_png(&image.pixels)?;
            let path = self.dir.join(format!("image_{}.png", idx + 1));
            fs::write(&path, png).map_err(Error::persistence)?;
            count += 1;
        }
        Ok(count)
    }
}

impl Sink for FlatFileSink {
    fn persist(&mut self, batch: &UnifiedRecordBatch) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let lines = self.write_text(batch)?;
        let tables = self.write_tables(batch)?;
        let images = self.write_images(batch)?;

        log::info!(
            "Wrote {} text lines, {} tables, {} images for {} to {}",
            lines,
            tables,
            images,
            batch.file_name(),
            self.dir.display()
        );
        Ok(())
    }
}

/// `Page <n> - <kind>: <text> (Font: <name>, Size: <size>, Bold: <b>, Italic: <i>)`
pub fn text_line(span: &TextSpanRecord) -> String {
    format!(
        "Page {} - {}: {} (Font: {}, Size: {:?}, Bold: {}, Italic: {})",
        span.location,
        span.kind.as_str(),
        span.text,
        span.font_name,
        span.font_size,
        span.bold,
        span.italic
    )
}
