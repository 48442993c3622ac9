use std::sync::Arc;

use gatehouse_core::{ListParams, ListResult, ServiceError};
use gatehouse_sql::{Row, SqlStore, Value};

use crate::model::{LeaveKind, LocalLeave, LocalStatus, UtilizationStatus};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS local_leaves (
        id          TEXT PRIMARY KEY,
        data        TEXT NOT NULL,
        number      TEXT NOT NULL UNIQUE,
        student_id  TEXT NOT NULL,
        status      TEXT NOT NULL,
        utilization TEXT NOT NULL,
        decided_by  TEXT,
        purpose     TEXT NOT NULL,
        place       TEXT NOT NULL,
        created_at  TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_local_student ON local_leaves(student_id)",
    "CREATE INDEX IF NOT EXISTS idx_local_status ON local_leaves(status)",
    "CREATE INDEX IF NOT EXISTS idx_local_decider ON local_leaves(decided_by)",
];

/// Persistent storage for local leave records.
pub struct LocalStore {
    db: Arc<dyn SqlStore>,
}

impl LocalStore {
    /// Create the store and initialise its schema.
    pub fn new(db: Arc<dyn SqlStore>) -> Result<Self, ServiceError> {
        for stmt in SCHEMA {
            db.exec(stmt, &[])
                .map_err(|e| ServiceError::Storage(format!("local leave schema init: {e}")))?;
        }
        db.exec(super::COUNTER_SCHEMA, &[])
            .map_err(|e| ServiceError::Storage(format!("counter schema init: {e}")))?;
        Ok(Self { db })
    }

    /// Allocate the next `L-` record number.
    pub fn next_number(&self) -> Result<String, ServiceError> {
        let seq = super::next_sequence(self.db.as_ref(), LeaveKind::Local.prefix())?;
        Ok(LeaveKind::Local.format_number(seq))
    }

    /// Insert a new record.
    pub fn create(&self, rec: &LocalLeave) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(rec).map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.db
            .exec(
                "INSERT INTO local_leaves \
                 (id, data, number, student_id, status, utilization, decided_by, purpose, place, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                &[
                    rec.id.clone().into(),
                    data.into(),
                    rec.number.clone().into(),
                    rec.student_id.clone().into(),
                    rec.status.as_str().into(),
                    rec.utilization_status.as_str().into(),
                    rec.decided_by.clone().into(),
                    rec.purpose.clone().into(),
                    rec.place.clone().into(),
                    rec.created_at.clone().into(),
                ],
            )
            .map_err(|e| {
                if e.is_unique_violation() {
                    ServiceError::Conflict(format!("record number {} already exists", rec.number))
                } else {
                    ServiceError::Storage(e.to_string())
                }
            })?;

        Ok(())
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Result<LocalLeave, ServiceError> {
        let rows = self
            .db
            .query("SELECT data FROM local_leaves WHERE id = ?1", &[id.into()])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("local leave {id}")))?;
        row_to_local(row)
    }

    /// Get a record by its number.
    pub fn get_by_number(&self, number: &str) -> Result<LocalLeave, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM local_leaves WHERE number = ?1",
                &[number.into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("local leave {number}")))?;
        row_to_local(row)
    }

    /// Persist the office decision, conditional on the record still
    /// being pending. Returns `false` if someone decided it first.
    pub fn decide(&self, rec: &LocalLeave) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(rec).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE local_leaves SET data = ?1, status = ?2, decided_by = ?3 \
                 WHERE id = ?4 AND status = 'pending'",
                &[
                    data.into(),
                    rec.status.as_str().into(),
                    rec.decided_by.clone().into(),
                    rec.id.clone().into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok(affected > 0)
    }

    /// Delete an undecided, unused record owned by `student_id`.
    /// Returns `false` if the record is no longer in that state.
    pub fn delete_pending(&self, id: &str, student_id: &str) -> Result<bool, ServiceError> {
        let affected = self
            .db
            .exec(
                "DELETE FROM local_leaves \
                 WHERE id = ?1 AND student_id = ?2 AND status = 'pending' AND utilization = 'pending'",
                &[id.into(), student_id.into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok(affected > 0)
    }

    /// Move utilization, conditional on its observed value. The record
    /// carries the new utilization fields already applied.
    pub fn set_utilization(
        &self,
        rec: &LocalLeave,
        expect: UtilizationStatus,
    ) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(rec).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE local_leaves SET data = ?1, utilization = ?2 \
                 WHERE id = ?3 AND utilization = ?4",
                &[
                    data.into(),
                    rec.utilization_status.as_str().into(),
                    rec.id.clone().into(),
                    expect.as_str().into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok(affected > 0)
    }

    /// A student's own records, newest first.
    pub fn list_for_student(
        &self,
        student_id: &str,
        params: &ListParams,
    ) -> Result<ListResult<LocalLeave>, ServiceError> {
        self.list_where("student_id = ?1", &[student_id.into()], params)
    }

    /// The office queue: undecided records, oldest first.
    pub fn list_pending(&self, params: &ListParams) -> Result<ListResult<LocalLeave>, ServiceError> {
        let total = self.count_where("status = 'pending'", &[])?;
        let rows = self
            .db
            .query(
                "SELECT data FROM local_leaves WHERE status = 'pending' \
                 ORDER BY created_at ASC LIMIT ?1 OFFSET ?2",
                &[
                    Value::Integer(params.limit as i64),
                    Value::Integer(params.offset as i64),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows.iter().map(row_to_local).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }

    /// Records a given office member has decided, optionally filtered by
    /// a search term over number/purpose/place.
    pub fn list_decided_by(
        &self,
        decider_id: &str,
        params: &ListParams,
    ) -> Result<ListResult<LocalLeave>, ServiceError> {
        match params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let like = format!("%{q}%");
                self.list_where(
                    "decided_by = ?1 AND (number LIKE ?2 OR purpose LIKE ?2 OR place LIKE ?2)",
                    &[decider_id.into(), like.into()],
                    params,
                )
            }
            None => self.list_where("decided_by = ?1", &[decider_id.into()], params),
        }
    }

    fn count_where(&self, where_sql: &str, params: &[Value]) -> Result<usize, ServiceError> {
        let sql = format!("SELECT COUNT(*) as cnt FROM local_leaves WHERE {where_sql}");
        let rows = self
            .db
            .query(&sql, params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize)
    }

    fn list_where(
        &self,
        where_sql: &str,
        params: &[Value],
        list: &ListParams,
    ) -> Result<ListResult<LocalLeave>, ServiceError> {
        let total = self.count_where(where_sql, params)?;

        let limit_idx = params.len() + 1;
        let offset_idx = params.len() + 2;
        let sql = format!(
            "SELECT data FROM local_leaves WHERE {where_sql} \
             ORDER BY created_at DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );
        let mut all = params.to_vec();
        all.push(Value::Integer(list.limit as i64));
        all.push(Value::Integer(list.offset as i64));

        let rows = self
            .db
            .query(&sql, &all)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows.iter().map(row_to_local).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }
}

/// Deserialize a record from a row's `data` JSON column.
fn row_to_local(row: &Row) -> Result<LocalLeave, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json)
        .map_err(|e| ServiceError::Storage(format!("bad local leave json: {e}")))
}
