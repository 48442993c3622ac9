use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::types::ValueRef;

use crate::error::SqlError;
use crate::traits::{Row, SqlStore, Value};

/// SqlStore implementation backed by rusqlite (bundled SQLite).
///
/// A single connection behind a Mutex: writes serialize in-process, so
/// conditional updates observe a consistent before-state.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SqlError> {
        let conn = Connection::open(path).map_err(|e| SqlError::Connection(e.to_string()))?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SqlError> {
        let conn = Connection::open_in_memory().map_err(|e| SqlError::Connection(e.to_string()))?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> Result<(), SqlError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| SqlError::Connection(e.to_string()))
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

fn value_at(row: &rusqlite::Row, idx: usize) -> Value {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) | Err(_) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::Integer(i),
        Ok(ValueRef::Real(f)) => Value::Real(f),
        Ok(ValueRef::Text(t)) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        Ok(ValueRef::Blob(b)) => Value::Blob(b.to_vec()),
    }
}

impl SqlStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SqlError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SqlError::Query(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(sql).map_err(|e| SqlError::Query(e.to_string()))?;

        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let columns = column_names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), value_at(row, i)))
                    .collect();
                Ok(Row { columns })
            })
            .map_err(|e| SqlError::Query(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| SqlError::Query(e.to_string()))?);
        }
        Ok(result)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SqlError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SqlError::Execution(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let affected = conn
            .execute(sql, param_refs.as_slice())
            .map_err(|e| SqlError::Execution(e.to_string()))?;

        Ok(affected as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let s = SqliteStore::open_in_memory().unwrap();
        s.exec(
            "CREATE TABLE people (id TEXT PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
            &[],
        )
        .unwrap();
        s
    }

    #[test]
    fn insert_and_query() {
        let s = store();
        let n = s
            .exec(
                "INSERT INTO people (id, name, age) VALUES (?1, ?2, ?3)",
                &["p1".into(), "Asha".into(), 21.into()],
            )
            .unwrap();
        assert_eq!(n, 1);

        let rows = s
            .query("SELECT id, name, age FROM people WHERE id = ?1", &["p1".into()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name"), Some("Asha"));
        assert_eq!(rows[0].get_i64("age"), Some(21));
    }

    #[test]
    fn null_columns_read_as_none() {
        let s = store();
        s.exec(
            "INSERT INTO people (id, name, age) VALUES (?1, ?2, ?3)",
            &["p1".into(), "Asha".into(), Value::Null],
        )
        .unwrap();
        let rows = s.query("SELECT age FROM people", &[]).unwrap();
        assert_eq!(rows[0].get_i64("age"), None);
    }

    #[test]
    fn conditional_update_reports_affected_rows() {
        let s = store();
        s.exec(
            "INSERT INTO people (id, name, age) VALUES (?1, ?2, ?3)",
            &["p1".into(), "Asha".into(), 21.into()],
        )
        .unwrap();

        let won = s
            .exec(
                "UPDATE people SET age = 22 WHERE id = ?1 AND age = 21",
                &["p1".into()],
            )
            .unwrap();
        assert_eq!(won, 1);

        let lost = s
            .exec(
                "UPDATE people SET age = 23 WHERE id = ?1 AND age = 21",
                &["p1".into()],
            )
            .unwrap();
        assert_eq!(lost, 0);
    }

    #[test]
    fn unique_violation_is_detectable() {
        let s = store();
        s.exec(
            "INSERT INTO people (id, name) VALUES (?1, ?2)",
            &["p1".into(), "Asha".into()],
        )
        .unwrap();
        let err = s
            .exec(
                "INSERT INTO people (id, name) VALUES (?1, ?2)",
                &["p1".into(), "Dup".into()],
            )
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatehouse.db");
        {
            let s = SqliteStore::open(&path).unwrap();
            s.exec("CREATE TABLE t (id TEXT PRIMARY KEY)", &[]).unwrap();
            s.exec("INSERT INTO t (id) VALUES (?1)", &["a".into()]).unwrap();
        }
        let s = SqliteStore::open(&path).unwrap();
        let rows = s.query("SELECT id FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
