//! SQLite backend for [`SqlSink`](crate::SqlSink): each database is a
//! `<name>.db` file under a root directory.

use crate::sql::{Connection, Connector, SqlValue};
use harvest_core::{Error, Result};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::fs;
use std::path::{Path, PathBuf};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Opens SQLite database files under `root`.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    root: PathBuf,
}

impl SqliteConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing database `name`.
    pub fn database_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::PersistenceError(format!(
                "invalid database name '{}'",
                name
            )));
        }
        Ok(self.root.join(format!("{}.db", name)))
    }

    fn open(&self, name: &str) -> Result<rusqlite::Connection> {
        let path = self.database_path(name)?;
        rusqlite::Connection::open(&path).map_err(|e| {
            Error::PersistenceError(format!("Failed to open database {}: {}", path.display(), e))
        })
    }
}

impl Connector for SqliteConnector {
    type Connection = SqliteConnection;

    fn ensure_database(&self, name: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let conn = self.open(name)?;
        conn.close().map_err(|(_, e)| Error::persistence(e))?;
        log::debug!("Database {} ready under {}", name, self.root.display());
        Ok(())
    }

    fn connect(&self, database: &str) -> Result<SqliteConnection> {
        let conn = self.open(database)?;
        conn.execute_batch("BEGIN").map_err(Error::persistence)?;
        Ok(SqliteConnection {
            conn,
            in_transaction: true,
        })
    }
}

/// A connection holding one open transaction until [`Connection::commit`].
///
/// Dropping it uncommitted rolls the transaction back.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    in_transaction: bool,
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<()> {
        self.conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(Error::persistence)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT").map_err(Error::persistence)?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        if self.in_transaction {
            self.conn
                .execute_batch("ROLLBACK")
                .map_err(Error::persistence)?;
        }
        self.conn.close().map_err(|(_, e)| Error::persistence(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::tests::sample_batch;
    use crate::sql::{SqlSink, TABLE_NAME};
    use crate::Sink;

    fn count_rows(path: &Path) -> i64 {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", TABLE_NAME), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_ensure_database_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(dir.path().join("dbs"));

        connector.ensure_database("test_db").unwrap();
        connector.ensure_database("test_db").unwrap();

        let path = connector.database_path("test_db").unwrap();
        assert!(path.exists());
        assert_eq!(fs::read_dir(connector.root()).unwrap().count(), 1);
    }

    #[test]
    fn test_invalid_database_name() {
        let connector = SqliteConnector::new("/tmp");
        for name in ["", "..", "a/b"] {
            assert!(matches!(
                connector.database_path(name).unwrap_err(),
                Error::PersistenceError(_)
            ));
        }
    }

    #[test]
    fn test_persist_row_count_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(dir.path());
        let path = connector.database_path("extracted").unwrap();
        let mut sink = SqlSink::new(connector, "extracted");

        let batch = sample_batch();
        sink.persist(&batch).unwrap();

        let expected = batch.texts().count() + batch.links().count() + batch.tables().count();
        assert_eq!(count_rows(&path), expected as i64);

        let conn = rusqlite::Connection::open(&path).unwrap();
        let (kind, content, created): (String, String, String) = conn
            .query_row(
                "SELECT data_type, content, creation_time FROM extracted_data WHERE data_type = 'link'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(kind, "link");
        assert_eq!(content, "http://example.com");
        assert_eq!(created, "2020-09-13 12:26:40");

        // A second batch appends to the same table.
        sink.persist(&batch).unwrap();
        assert_eq!(count_rows(&path), 2 * expected as i64);
    }

    #[test]
    fn test_uncommitted_connection_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(dir.path());
        connector.ensure_database("db").unwrap();

        let mut conn = connector.connect("db").unwrap();
        conn.execute(crate::sql::CREATE_TABLE_SQL, &[]).unwrap();
        conn.close().unwrap();

        let raw = rusqlite::Connection::open(connector.database_path("db").unwrap()).unwrap();
        let tables: i64 = raw
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'extracted_data'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
