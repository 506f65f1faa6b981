//! Relational sink over a minimal connect/execute/commit/close contract.
//!
//! Every text span, link and table becomes one row of a single wide
//! `extracted_data` table. Images are not stored.

use crate::Sink;
use harvest_core::{Error, Metadata, Record, Result, UnifiedRecordBatch};

pub const TABLE_NAME: &str = "extracted_data";

pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS extracted_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    creation_time TIMESTAMP,
    modification_time TIMESTAMP,
    page_number INTEGER NOT NULL,
    data_type TEXT NOT NULL,
    content TEXT,
    font_name TEXT,
    font_size REAL,
    bold BOOLEAN,
    italic BOOLEAN
)";

pub const INSERT_SQL: &str = "INSERT INTO extracted_data (
    file_name, file_size, creation_time, modification_time, page_number,
    data_type, content, font_name, font_size, bold, italic
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

/// An open connection to one database.
pub trait Connection {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn close(self) -> Result<()>;
}

/// Creates databases and opens connections to them.
pub trait Connector {
    type Connection: Connection;

    /// Create the named database if it does not exist. Idempotent.
    fn ensure_database(&self, name: &str) -> Result<()>;

    fn connect(&self, database: &str) -> Result<Self::Connection>;
}

/// One `extracted_data` row, minus the batch-wide file columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub page_number: u32,
    pub data_type: &'static str,
    pub content: String,
    pub font_name: Option<String>,
    pub font_size: f64,
    pub bold: bool,
    pub italic: bool,
}

impl RecordRow {
    /// Rows for every persisted record kind, in emission order.
    pub fn from_batch(batch: &UnifiedRecordBatch) -> Result<Vec<RecordRow>> {
        let mut rows = Vec::new();
        for record in batch.records() {
            let row = match record {
                Record::Text(t) => RecordRow {
                    page_number: t.location,
                    data_type: t.kind.as_str(),
                    content: t.text.clone(),
                    font_name: Some(t.font_name.clone()),
                    font_size: t.font_size,
                    bold: t.bold,
                    italic: t.italic,
                },
                Record::Link(l) => RecordRow::unstyled(l.location, "link", l.target_uri.clone()),
                Record::Table(t) => {
                    let grid = serde_json::to_string(&t.cells).map_err(Error::persistence)?;
                    RecordRow::unstyled(t.location, "table", grid)
                }
                Record::Image(_) => continue,
            };
            rows.push(row);
        }
        Ok(rows)
    }

    fn unstyled(page_number: u32, data_type: &'static str, content: String) -> Self {
        Self {
            page_number,
            data_type,
            content,
            font_name: None,
            font_size: 0.0,
            bold: false,
            italic: false,
        }
    }

    fn params(&self, file_name: &str, metadata: &Metadata) -> Vec<SqlValue> {
        vec![
            file_name.into(),
            (metadata.size_bytes as i64).into(),
            timestamp(metadata.created_unix()),
            timestamp(metadata.modified_unix()),
            (self.page_number as i64).into(),
            self.data_type.into(),
            self.content.clone().into(),
            self.font_name.clone().map_or(SqlValue::Null, SqlValue::Text),
            self.font_size.into(),
            self.bold.into(),
            self.italic.into(),
        ]
    }
}

/// Unix seconds as a UTC `YYYY-MM-DD HH:MM:SS` literal.
fn timestamp(unix: i64) -> SqlValue {
    match chrono::DateTime::from_timestamp(unix, 0) {
        Some(dt) => SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        None => SqlValue::Null,
    }
}

/// Persists batches into one database through a [`Connector`].
pub struct SqlSink<C> {
    connector: C,
    database: String,
}

impl<C: Connector> SqlSink<C> {
    pub fn new(connector: C, database: impl Into<String>) -> Self {
        Self {
            connector,
            database: database.into(),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connector> Sink for SqlSink<C> {
    fn persist(&mut self, batch: &UnifiedRecordBatch) -> Result<()> {
        let rows = RecordRow::from_batch(batch)?;

        self.connector.ensure_database(&self.database)?;
        let mut conn = self.connector.connect(&self.database)?;
        conn.execute(CREATE_TABLE_SQL, &[])?;

        for row in &rows {
            conn.execute(INSERT_SQL, &row.params(batch.file_name(), batch.metadata()))?;
        }
        conn.commit()?;
        conn.close()?;

        log::info!(
            "Stored {} rows for {} in database {}",
            rows.len(),
            batch.file_name(),
            self.database
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvest_core::{
        ImageRecord, LinkRecord, TableRecord, TextKind, TextSpanRecord,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    pub(crate) fn sample_batch() -> UnifiedRecordBatch {
        let metadata = Metadata {
            size_bytes: 4096,
            created_at: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            modified_at: Utc.timestamp_opt(1_600_000_060, 0).unwrap(),
        };
        UnifiedRecordBatch::new(
            "deck.pptx",
            metadata,
            vec![
                Record::Text(TextSpanRecord {
                    location: 1,
                    text: "Title".into(),
                    kind: TextKind::Heading,
                    font_name: "Arial".into(),
                    font_size: 28.0,
                    bold: true,
                    italic: false,
                }),
                Record::Link(LinkRecord::new(1, "http://example.com")),
                Record::Image(ImageRecord::from_bitmap(
                    2,
                    image::DynamicImage::new_rgb8(1, 1),
                )),
                Record::Table(TableRecord::new(
                    2,
                    vec![vec!["a".into(), "b".into()], vec!["c".into(), "d".into()]],
                )),
            ],
        )
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        EnsureDatabase(String),
        Connect(String),
        Execute(String, Vec<SqlValue>),
        Commit,
        Close,
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingConnector {
        calls: Rc<RefCell<Vec<Call>>>,
        fail_on_insert: Option<usize>,
    }

    pub(crate) struct RecordingConnection {
        calls: Rc<RefCell<Vec<Call>>>,
        inserts: usize,
        fail_on_insert: Option<usize>,
    }

    impl Connector for RecordingConnector {
        type Connection = RecordingConnection;

        fn ensure_database(&self, name: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(Call::EnsureDatabase(name.to_string()));
            Ok(())
        }

        fn connect(&self, database: &str) -> Result<RecordingConnection> {
            self.calls.borrow_mut().push(Call::Connect(database.to_string()));
            Ok(RecordingConnection {
                calls: Rc::clone(&self.calls),
                inserts: 0,
                fail_on_insert: self.fail_on_insert,
            })
        }
    }

    impl Connection for RecordingConnection {
        fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<()> {
            if sql.starts_with("INSERT") {
                self.inserts += 1;
                if self.fail_on_insert == Some(self.inserts) {
                    return Err(Error::persistence("constraint failed"));
                }
            }
            self.calls
                .borrow_mut()
                .push(Call::Execute(sql.to_string(), params.to_vec()));
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.calls.borrow_mut().push(Call::Commit);
            Ok(())
        }

        fn close(self) -> Result<()> {
            self.calls.borrow_mut().push(Call::Close);
            Ok(())
        }
    }

    #[test]
    fn test_rows_from_batch() {
        let rows = RecordRow::from_batch(&sample_batch()).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].data_type, "heading");
        assert_eq!(rows[0].font_name.as_deref(), Some("Arial"));
        assert!(rows[0].bold);

        assert_eq!(rows[1].data_type, "link");
        assert_eq!(rows[1].content, "http://example.com");
        assert_eq!(rows[1].font_name, None);
        assert_eq!(rows[1].font_size, 0.0);

        assert_eq!(rows[2].data_type, "table");
        assert_eq!(rows[2].page_number, 2);
        assert_eq!(rows[2].content, r#"[["a","b"],["c","d"]]"#);
    }

    #[test]
    fn test_persist_call_sequence() {
        let connector = RecordingConnector::default();
        let calls = Rc::clone(&connector.calls);
        let mut sink = SqlSink::new(connector, "test_db");
        sink.persist(&sample_batch()).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls[0], Call::EnsureDatabase("test_db".into()));
        assert_eq!(calls[1], Call::Connect("test_db".into()));
        assert!(matches!(&calls[2], Call::Execute(sql, p) if sql == CREATE_TABLE_SQL && p.is_empty()));

        let inserts: Vec<&Vec<SqlValue>> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Execute(sql, params) if sql == INSERT_SQL => Some(params),
                _ => None,
            })
            .collect();
        assert_eq!(inserts.len(), 3);
        assert_eq!(calls.iter().filter(|c| **c == Call::Commit).count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == Call::Close).count(), 1);
        assert_eq!(calls[calls.len() - 2], Call::Commit);
        assert_eq!(calls[calls.len() - 1], Call::Close);

        assert_eq!(
            inserts[0],
            &vec![
                SqlValue::Text("deck.pptx".into()),
                SqlValue::Integer(4096),
                SqlValue::Text("2020-09-13 12:26:40".into()),
                SqlValue::Text("2020-09-13 12:27:40".into()),
                SqlValue::Integer(1),
                SqlValue::Text("heading".into()),
                SqlValue::Text("Title".into()),
                SqlValue::Text("Arial".into()),
                SqlValue::Real(28.0),
                SqlValue::Integer(1),
                SqlValue::Integer(0),
            ]
        );
        assert_eq!(inserts[1][7], SqlValue::Null);
        assert_eq!(inserts[2][5], SqlValue::Text("table".into()));
    }

    #[test]
    fn test_insert_failure_aborts_without_commit() {
        let connector = RecordingConnector {
            fail_on_insert: Some(2),
            ..Default::default()
        };
        let calls = Rc::clone(&connector.calls);
        let mut sink = SqlSink::new(connector, "test_db");

        let err = sink.persist(&sample_batch()).unwrap_err();
        assert!(matches!(err, Error::PersistenceError(_)));

        let calls = calls.borrow();
        assert!(!calls.contains(&Call::Commit));
        let inserts = calls
            .iter()
            .filter(|c| matches!(c, Call::Execute(sql, _) if sql == INSERT_SQL))
            .count();
        assert_eq!(inserts, 1);
    }
}
