//! Table detection from text positions.
//!
//! Works on positioned spans only, without looking at ruling lines: spans
//! are grouped into rows by baseline, spans that touch within a row are
//! joined into one cell, and a run of consecutive rows with the same number
//! of cells whose left edges line up is reported as a table.

use crate::source::PdfSpan;

/// Table detector configuration.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Minimum number of rows to consider as table
    pub min_rows: usize,
    /// Minimum number of columns to consider as table
    pub min_columns: usize,
    /// Maximum number of columns (above this, likely word-level splitting)
    pub max_columns: usize,
    /// Y tolerance for grouping spans into rows (fraction of font size)
    pub y_tolerance_factor: f64,
    /// Maximum horizontal drift of a column's left edge between rows (points)
    pub x_tolerance: f64,
    /// Spans closer than this (fraction of font size) belong to one cell
    pub column_gap_factor: f64,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 12,
            y_tolerance_factor: 0.4,
            x_tolerance: 5.0,
            column_gap_factor: 1.0,
        }
    }
}

/// Gaps wider than this (fraction of font size) get a space when joined.
const WORD_GAP_FACTOR: f64 = 0.15;

/// Text on one baseline that reads as a unit.
#[derive(Debug, Clone)]
struct Cell {
    x: f64,
    end: f64,
    text: String,
}

/// The cells sharing a baseline, left to right.
#[derive(Debug, Clone)]
struct Row {
    cells: Vec<Cell>,
}

/// Detects tables in a page's spans.
#[derive(Debug, Clone, Default)]
pub struct TableDetector {
    config: TableDetectorConfig,
}

impl TableDetector {
    /// Create a new table detector with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new table detector with custom configuration.
    pub fn with_config(config: TableDetectorConfig) -> Self {
        Self { config }
    }

    /// Detect tables, top of the page first. Each table is a row-major grid
    /// of the cell spans' text.
    pub fn detect(&self, spans: &[PdfSpan]) -> Vec<Vec<Vec<String>>> {
        let rows = self.group_into_rows(spans);
        log::debug!("TableDetector: {} spans in {} rows", spans.len(), rows.len());

        let mut tables = Vec::new();
        let mut start = 0;
        while start < rows.len() {
            let end = self.region_end(&rows, start);
            if end - start >= self.config.min_rows {
                tables.push(
                    rows[start..end]
                        .iter()
                        .map(|row| row.cells.iter().map(|c| c.text.clone()).collect())
                        .collect(),
                );
                start = end;
            } else {
                start += 1;
            }
        }

        log::debug!("TableDetector: found {} tables", tables.len());
        tables
    }

    /// Exclusive end of the aligned region starting at `start`.
    fn region_end(&self, rows: &[Row], start: usize) -> usize {
        let first = &rows[start];
        let columns = first.cells.len();
        if columns < self.config.min_columns || columns > self.config.max_columns {
            return start + 1;
        }

        let mut end = start + 1;
        while end < rows.len() && self.aligned(first, &rows[end]) {
            end += 1;
        }
        end
    }

    fn aligned(&self, a: &Row, b: &Row) -> bool {
        a.cells.len() == b.cells.len()
            && a
                .cells
                .iter()
                .zip(&b.cells)
                .all(|(x, y)| (x.x - y.x).abs() <= self.config.x_tolerance)
    }

    /// Group non-blank spans into rows by Y position, top to bottom.
    fn group_into_rows(&self, spans: &[PdfSpan]) -> Vec<Row> {
        let mut sorted: Vec<&PdfSpan> = spans.iter().filter(|s| !s.text.trim().is_empty()).collect();
        // Sort by Y (descending for PDF coords) then X
        sorted.sort_by(|a, b| {
            b.y.partial_cmp(&a.y)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut grouped: Vec<(f64, Vec<&PdfSpan>)> = Vec::new();
        for span in sorted {
            let tolerance = (span.size.unwrap_or(0.0) * self.config.y_tolerance_factor).max(1.0);
            match grouped.last_mut() {
                Some((y, row)) if (span.y - *y).abs() <= tolerance => row.push(span),
                _ => grouped.push((span.y, vec![span])),
            }
        }

        grouped
            .into_iter()
            .map(|(_, mut row)| {
                row.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
                Row {
                    cells: self.join_cells(&row),
                }
            })
            .collect()
    }

    /// Join spans that overlap or sit within the column gap of the previous
    /// one, so one sentence shown in several pieces stays a single cell.
    fn join_cells(&self, spans: &[&PdfSpan]) -> Vec<Cell> {
        let mut cells: Vec<Cell> = Vec::new();
        for span in spans {
            let size = span.size.unwrap_or(0.0);
            match cells.last_mut() {
                Some(cell) if span.x - cell.end < size * self.config.column_gap_factor => {
                    let spaced = cell.text.ends_with(char::is_whitespace)
                        || span.text.starts_with(char::is_whitespace);
                    if !spaced && span.x - cell.end > size * WORD_GAP_FACTOR {
                        cell.text.push(' ');
                    }
                    cell.text.push_str(&span.text);
                    cell.end = cell.end.max(span.end());
                }
                _ => cells.push(Cell {
                    x: span.x,
                    end: span.end(),
                    text: span.text.clone(),
                }),
            }
        }
        cells
    }
}
