use std::sync::Arc;

use gatehouse_core::{ListParams, ListResult, ServiceError};
use gatehouse_sql::{Row, SqlStore, Value};

use crate::model::stage::{Stage, StageScope};
use crate::model::{LeaveKind, OutstationLeave, UtilizationStatus};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS outstation_leaves (
        id            TEXT PRIMARY KEY,
        data          TEXT NOT NULL,
        number        TEXT NOT NULL UNIQUE,
        student_id    TEXT NOT NULL,
        department    TEXT NOT NULL,
        instructor_id TEXT,
        current_stage TEXT NOT NULL,
        final_status  TEXT NOT NULL,
        utilization   TEXT NOT NULL,
        purpose       TEXT NOT NULL,
        place         TEXT NOT NULL,
        created_at    TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_outstation_student ON outstation_leaves(student_id)",
    "CREATE INDEX IF NOT EXISTS idx_outstation_stage ON outstation_leaves(current_stage)",
    "CREATE INDEX IF NOT EXISTS idx_outstation_department ON outstation_leaves(department)",
    // Per-approver index of personally made decisions, for history queries.
    "CREATE TABLE IF NOT EXISTS outstation_decisions (
        record_id  TEXT NOT NULL,
        stage      TEXT NOT NULL,
        decider_id TEXT NOT NULL,
        decided_at TEXT NOT NULL,
        PRIMARY KEY (record_id, stage)
    )",
    "CREATE INDEX IF NOT EXISTS idx_outstation_decider ON outstation_decisions(decider_id)",
];

/// Persistent storage for outstation leave records.
pub struct OutstationStore {
    db: Arc<dyn SqlStore>,
}

impl OutstationStore {
    /// Create the store and initialise its schema.
    pub fn new(db: Arc<dyn SqlStore>) -> Result<Self, ServiceError> {
        for stmt in SCHEMA {
            db.exec(stmt, &[])
                .map_err(|e| ServiceError::Storage(format!("outstation schema init: {e}")))?;
        }
        db.exec(super::COUNTER_SCHEMA, &[])
            .map_err(|e| ServiceError::Storage(format!("counter schema init: {e}")))?;
        Ok(Self { db })
    }

    /// Allocate the next `OS-` record number.
    pub fn next_number(&self) -> Result<String, ServiceError> {
        let seq = super::next_sequence(self.db.as_ref(), LeaveKind::Outstation.prefix())?;
        Ok(LeaveKind::Outstation.format_number(seq))
    }

    /// Insert a new record.
    pub fn create(&self, rec: &OutstationLeave) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(rec).map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.db
            .exec(
                "INSERT INTO outstation_leaves \
                 (id, data, number, student_id, department, instructor_id, current_stage, \
                  final_status, utilization, purpose, place, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                &[
                    rec.id.clone().into(),
                    data.into(),
                    rec.number.clone().into(),
                    rec.student_id.clone().into(),
                    rec.department.clone().into(),
                    rec.instructor_id.clone().into(),
                    rec.current_stage.as_str().into(),
                    rec.final_status.as_str().into(),
                    rec.utilization_status.as_str().into(),
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
    pub fn get(&self, id: &str) -> Result<OutstationLeave, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM outstation_leaves WHERE id = ?1",
                &[id.into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("outstation leave {id}")))?;
        row_to_outstation(row)
    }

    /// Get a record by its number.
    pub fn get_by_number(&self, number: &str) -> Result<OutstationLeave, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM outstation_leaves WHERE number = ?1",
                &[number.into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("outstation leave {number}")))?;
        row_to_outstation(row)
    }

    /// Persist a stage transition, conditional on the record still
    /// sitting at `observed_stage` with the workflow open. The record
    /// carries the new stage/status already applied. Returns `false`
    /// if a concurrent decision got there first.
    pub fn advance(
        &self,
        rec: &OutstationLeave,
        observed_stage: Stage,
    ) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(rec).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE outstation_leaves SET data = ?1, current_stage = ?2, final_status = ?3 \
                 WHERE id = ?4 AND current_stage = ?5 AND final_status = 'pending'",
                &[
                    data.into(),
                    rec.current_stage.as_str().into(),
                    rec.final_status.as_str().into(),
                    rec.id.clone().into(),
                    observed_stage.as_str().into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok(affected > 0)
    }

    /// Record one approver's decision in the history index.
    pub fn record_decision(
        &self,
        record_id: &str,
        stage: Stage,
        decider_id: &str,
        decided_at: &str,
    ) -> Result<(), ServiceError> {
        self.db
            .exec(
                "INSERT OR IGNORE INTO outstation_decisions (record_id, stage, decider_id, decided_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                &[
                    record_id.into(),
                    stage.as_str().into(),
                    decider_id.into(),
                    decided_at.into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Move utilization, conditional on its observed value.
    pub fn set_utilization(
        &self,
        rec: &OutstationLeave,
        expect: UtilizationStatus,
    ) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(rec).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE outstation_leaves SET data = ?1, utilization = ?2 \
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
    ) -> Result<ListResult<OutstationLeave>, ServiceError> {
        self.list_where("student_id = ?1", &[student_id.into()], params, "DESC")
    }

    /// Records currently waiting at `stage`, scoped the way the stage
    /// demands, oldest first.
    pub fn stage_queue(
        &self,
        stage: Stage,
        scope: StageScope,
        actor_id: &str,
        department: Option<&str>,
        params: &ListParams,
    ) -> Result<ListResult<OutstationLeave>, ServiceError> {
        let stage_val: Value = stage.as_str().into();
        match scope {
            StageScope::Department => {
                let dept = department.unwrap_or_default();
                self.list_where(
                    "current_stage = ?1 AND final_status = 'pending' AND department = ?2",
                    &[stage_val, dept.into()],
                    params,
                    "ASC",
                )
            }
            StageScope::Assignment => self.list_where(
                "current_stage = ?1 AND final_status = 'pending' AND instructor_id = ?2",
                &[stage_val, actor_id.into()],
                params,
                "ASC",
            ),
            StageScope::Global => self.list_where(
                "current_stage = ?1 AND final_status = 'pending'",
                &[stage_val],
                params,
                "ASC",
            ),
        }
    }

    /// Records a given approver has personally decided, optionally
    /// filtered by a search term over number/purpose/place.
    pub fn list_decided_by(
        &self,
        decider_id: &str,
        params: &ListParams,
    ) -> Result<ListResult<OutstationLeave>, ServiceError> {
        let base = "id IN (SELECT record_id FROM outstation_decisions WHERE decider_id = ?1)";
        match params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let like = format!("%{q}%");
                self.list_where(
                    &format!("{base} AND (number LIKE ?2 OR purpose LIKE ?2 OR place LIKE ?2)"),
                    &[decider_id.into(), like.into()],
                    params,
                    "DESC",
                )
            }
            None => self.list_where(base, &[decider_id.into()], params, "DESC"),
        }
    }

    fn count_where(&self, where_sql: &str, params: &[Value]) -> Result<usize, ServiceError> {
        let sql = format!("SELECT COUNT(*) as cnt FROM outstation_leaves WHERE {where_sql}");
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
        order: &str,
    ) -> Result<ListResult<OutstationLeave>, ServiceError> {
        let total = self.count_where(where_sql, params)?;

        let limit_idx = params.len() + 1;
        let offset_idx = params.len() + 2;
        let sql = format!(
            "SELECT data FROM outstation_leaves WHERE {where_sql} \
             ORDER BY created_at {order} LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );
        let mut all = params.to_vec();
        all.push(Value::Integer(list.limit as i64));
        all.push(Value::Integer(list.offset as i64));

        let rows = self
            .db
            .query(&sql, &all)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows
            .iter()
            .map(row_to_outstation)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }
}

/// Deserialize a record from a row's `data` JSON column.
fn row_to_outstation(row: &Row) -> Result<OutstationLeave, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json)
        .map_err(|e| ServiceError::Storage(format!("bad outstation leave json: {e}")))
}
