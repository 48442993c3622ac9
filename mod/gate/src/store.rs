use std::sync::Arc;

use gatehouse_core::{ListParams, ListResult, ServiceError};
use gatehouse_sql::{Row, SqlStore, Value};

use crate::model::{CrossingLog, GateToken, Presence, Student};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS students (
        id       TEXT PRIMARY KEY,
        data     TEXT NOT NULL,
        name     TEXT NOT NULL,
        presence TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_students_presence ON students(presence)",
    "CREATE TABLE IF NOT EXISTS gate_tokens (
        id         TEXT PRIMARY KEY,
        data       TEXT NOT NULL,
        student_id TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        status     TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        used_at    TEXT,
        created_at TEXT NOT NULL
    )",
    // The at-most-one-outstanding invariant lives in the index, not in
    // application reads.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_one_pending \
     ON gate_tokens(student_id) WHERE status = 'pending' AND used_at IS NULL",
    "CREATE TABLE IF NOT EXISTS crossing_logs (
        id            TEXT PRIMARY KEY,
        data          TEXT NOT NULL,
        student_id    TEXT NOT NULL,
        student_name  TEXT NOT NULL,
        exit_done     INTEGER NOT NULL,
        entry_done    INTEGER NOT NULL,
        record_number TEXT,
        created_at    TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_logs_pairing \
     ON crossing_logs(student_id, exit_done, entry_done)",
];

/// Persistent storage for the gate: student presence, crossing tokens
/// and the audit log.
pub struct GateStore {
    db: Arc<dyn SqlStore>,
}

impl GateStore {
    /// Create the store and initialise its schema.
    pub fn new(db: Arc<dyn SqlStore>) -> Result<Self, ServiceError> {
        for stmt in SCHEMA {
            db.exec(stmt, &[])
                .map_err(|e| ServiceError::Storage(format!("gate schema init: {e}")))?;
        }
        Ok(Self { db })
    }

    // -- students -----------------------------------------------------------

    /// Create the presence row for a student if it does not exist yet.
    /// New students start inside.
    pub fn ensure_student(&self, id: &str, name: &str) -> Result<(), ServiceError> {
        let student = Student::new(id, name);
        let data =
            serde_json::to_string(&student).map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.db
            .exec(
                "INSERT OR IGNORE INTO students (id, data, name, presence) VALUES (?1, ?2, ?3, ?4)",
                &[
                    id.into(),
                    data.into(),
                    name.into(),
                    student.presence.as_str().into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_student(&self, id: &str) -> Result<Student, ServiceError> {
        let rows = self
            .db
            .query("SELECT data FROM students WHERE id = ?1", &[id.into()])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("student {id}")))?;
        row_to_student(row)
    }

    /// Write the student back, conditional on the presence value the
    /// caller observed. Returns `false` when a concurrent crossing got
    /// there first.
    pub fn update_student(
        &self,
        student: &Student,
        observed: Presence,
    ) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(student).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let affected = self
            .db
            .exec(
                "UPDATE students SET data = ?1, presence = ?2 WHERE id = ?3 AND presence = ?4",
                &[
                    data.into(),
                    student.presence.as_str().into(),
                    student.id.clone().into(),
                    observed.as_str().into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Students currently outside, by name.
    pub fn list_outside(&self, params: &ListParams) -> Result<ListResult<Student>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT COUNT(*) as cnt FROM students WHERE presence = 'outside'",
                &[],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let total = rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize;

        let rows = self
            .db
            .query(
                "SELECT data FROM students WHERE presence = 'outside' \
                 ORDER BY name ASC LIMIT ?1 OFFSET ?2",
                &[
                    Value::Integer(params.limit as i64),
                    Value::Integer(params.offset as i64),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows
            .iter()
            .map(row_to_student)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }

    // -- tokens -------------------------------------------------------------

    /// Insert a freshly minted token. The partial unique index turns a
    /// second outstanding token for the same student into a conflict.
    pub fn insert_token(&self, tok: &GateToken) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(tok).map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.db
            .exec(
                "INSERT INTO gate_tokens \
                 (id, data, student_id, token_hash, status, expires_at, used_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                &[
                    tok.id.clone().into(),
                    data.into(),
                    tok.student_id.clone().into(),
                    tok.token_hash.clone().into(),
                    tok.status.as_str().into(),
                    tok.expires_at.clone().into(),
                    tok.used_at.clone().into(),
                    tok.created_at.clone().into(),
                ],
            )
            .map_err(|e| {
                if e.is_unique_violation() {
                    ServiceError::Conflict("a crossing token is already outstanding".into())
                } else {
                    ServiceError::Storage(e.to_string())
                }
            })?;
        Ok(())
    }

    pub fn get_token(&self, id: &str) -> Result<GateToken, ServiceError> {
        let rows = self
            .db
            .query("SELECT data FROM gate_tokens WHERE id = ?1", &[id.into()])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("token {id}")))?;
        row_to_token(row)
    }

    pub fn find_token_by_hash(&self, hash: &str) -> Result<Option<GateToken>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM gate_tokens WHERE token_hash = ?1",
                &[hash.into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.first().map(row_to_token).transpose()
    }

    /// Move a token to its terminal state. The token carries the new
    /// status and `used_at` already applied; the write succeeds only if
    /// the row is still pending and unused, so exactly one caller wins.
    pub fn consume_token(&self, tok: &GateToken) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(tok).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let affected = self
            .db
            .exec(
                "UPDATE gate_tokens SET data = ?1, status = ?2, used_at = ?3 \
                 WHERE id = ?4 AND status = 'pending' AND used_at IS NULL",
                &[
                    data.into(),
                    tok.status.as_str().into(),
                    tok.used_at.clone().into(),
                    tok.id.clone().into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Outstanding tokens for a student whose TTL has lapsed.
    pub fn expired_pending(
        &self,
        student_id: &str,
        now: &str,
    ) -> Result<Vec<GateToken>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM gate_tokens \
                 WHERE student_id = ?1 AND status = 'pending' AND used_at IS NULL \
                 AND expires_at <= ?2",
                &[student_id.into(), now.into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(row_to_token).collect()
    }

    // -- audit log ----------------------------------------------------------

    pub fn insert_log(&self, log: &CrossingLog) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(log).map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.db
            .exec(
                "INSERT INTO crossing_logs \
                 (id, data, student_id, student_name, exit_done, entry_done, record_number, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                &[
                    log.id.clone().into(),
                    data.into(),
                    log.student_id.clone().into(),
                    log.student_name.clone().into(),
                    log.exit.is_some().into(),
                    log.entry.is_some().into(),
                    log.record_number.clone().into(),
                    log.created_at.clone().into(),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    /// The newest row for this student whose exit happened but whose
    /// entry is still open. This is the row an entry crossing pairs
    /// with.
    pub fn latest_open_exit(&self, student_id: &str) -> Result<Option<CrossingLog>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM crossing_logs \
                 WHERE student_id = ?1 AND exit_done = 1 AND entry_done = 0 \
                 ORDER BY created_at DESC LIMIT 1",
                &[student_id.into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.first().map(row_to_log).transpose()
    }

    /// Fill in a row's entry leg. Succeeds at most once per row.
    pub fn complete_entry(&self, log: &CrossingLog) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(log).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let affected = self
            .db
            .exec(
                "UPDATE crossing_logs SET data = ?1, entry_done = 1 \
                 WHERE id = ?2 AND entry_done = 0",
                &[data.into(), log.id.clone().into()],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Audit rows, newest first, optionally filtered by student id,
    /// student name or record number.
    pub fn list_logs(&self, params: &ListParams) -> Result<ListResult<CrossingLog>, ServiceError> {
        let (where_sql, mut args): (&str, Vec<Value>) =
            match params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                Some(q) => {
                    let like = format!("%{q}%");
                    (
                        "student_id LIKE ?1 OR student_name LIKE ?1 OR record_number LIKE ?1",
                        vec![like.into()],
                    )
                }
                None => ("1=1", vec![]),
            };

        let count_sql = format!("SELECT COUNT(*) as cnt FROM crossing_logs WHERE {where_sql}");
        let rows = self
            .db
            .query(&count_sql, &args)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let total = rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) as usize;

        let limit_idx = args.len() + 1;
        let offset_idx = args.len() + 2;
        let sql = format!(
            "SELECT data FROM crossing_logs WHERE {where_sql} \
             ORDER BY created_at DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );
        args.push(Value::Integer(params.limit as i64));
        args.push(Value::Integer(params.offset as i64));

        let rows = self
            .db
            .query(&sql, &args)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows.iter().map(row_to_log).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }
}

fn row_to_student(row: &Row) -> Result<Student, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad student json: {e}")))
}

fn row_to_token(row: &Row) -> Result<GateToken, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad token json: {e}")))
}

fn row_to_log(row: &Row) -> Result<CrossingLog, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad log json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrossingLeg, CrossingOutcome, Direction, TokenStatus};
    use gatehouse_core::{new_id, now_rfc3339};
    use gatehouse_sql::SqliteStore;

    fn test_store() -> GateStore {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        GateStore::new(db).unwrap()
    }

    fn make_token(id: &str, student: &str, hash: &str, expires_at: &str) -> GateToken {
        GateToken {
            id: id.into(),
            student_id: student.into(),
            student_name: "Asha".into(),
            direction: Direction::Exit,
            purpose: Some("bank".into()),
            place: Some("city".into()),
            token_hash: hash.into(),
            status: TokenStatus::Pending,
            expires_at: expires_at.into(),
            used_at: None,
            decided_by: None,
            record_number: None,
            created_at: now_rfc3339(),
        }
    }

    fn exit_log(id: &str, student: &str, created_at: &str) -> CrossingLog {
        CrossingLog {
            id: id.into(),
            student_id: student.into(),
            student_name: "Asha".into(),
            guard_id: "g1".into(),
            token_id: Some(new_id()),
            record_number: Some("L-00001".into()),
            direction: Direction::Exit,
            exit: Some(CrossingLeg {
                outcome: CrossingOutcome::Approved,
                at: created_at.into(),
                purpose: Some("bank".into()),
                place: Some("city".into()),
            }),
            entry: None,
            created_at: created_at.into(),
        }
    }

    #[test]
    fn students_start_inside_and_ensure_is_idempotent() {
        let store = test_store();
        store.ensure_student("s1", "Asha").unwrap();
        store.ensure_student("s1", "Asha").unwrap();
        let s = store.get_student("s1").unwrap();
        assert_eq!(s.presence, Presence::Inside);
        assert!(s.exit_context.is_none());
    }

    #[test]
    fn presence_update_is_conditional() {
        let store = test_store();
        store.ensure_student("s1", "Asha").unwrap();
        let mut s = store.get_student("s1").unwrap();

        s.presence = Presence::Outside;
        assert!(store.update_student(&s, Presence::Inside).unwrap());
        // Same observed state again: the row has moved on.
        assert!(!store.update_student(&s, Presence::Inside).unwrap());

        s.presence = Presence::Inside;
        assert!(store.update_student(&s, Presence::Outside).unwrap());
    }

    #[test]
    fn one_outstanding_token_per_student() {
        let store = test_store();
        let future = "2099-01-01T00:00:00+00:00";
        store
            .insert_token(&make_token("t1", "s1", "h1", future))
            .unwrap();

        let err = store
            .insert_token(&make_token("t2", "s1", "h2", future))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // A different student is unaffected.
        store
            .insert_token(&make_token("t3", "s2", "h3", future))
            .unwrap();

        // Consuming the first frees the slot.
        let mut t1 = store.get_token("t1").unwrap();
        t1.status = TokenStatus::Approved;
        t1.used_at = Some(now_rfc3339());
        assert!(store.consume_token(&t1).unwrap());
        store
            .insert_token(&make_token("t4", "s1", "h4", future))
            .unwrap();
    }

    #[test]
    fn consume_is_single_shot() {
        let store = test_store();
        store
            .insert_token(&make_token("t1", "s1", "h1", "2099-01-01T00:00:00+00:00"))
            .unwrap();

        let mut tok = store.get_token("t1").unwrap();
        tok.status = TokenStatus::Approved;
        tok.used_at = Some(now_rfc3339());
        assert!(store.consume_token(&tok).unwrap());

        tok.status = TokenStatus::Rejected;
        assert!(!store.consume_token(&tok).unwrap());

        let got = store.get_token("t1").unwrap();
        assert_eq!(got.status, TokenStatus::Approved);
        assert!(got.used_at.is_some());
    }

    #[test]
    fn hash_lookup() {
        let store = test_store();
        store
            .insert_token(&make_token("t1", "s1", "h1", "2099-01-01T00:00:00+00:00"))
            .unwrap();
        assert_eq!(store.find_token_by_hash("h1").unwrap().unwrap().id, "t1");
        assert!(store.find_token_by_hash("nope").unwrap().is_none());
    }

    #[test]
    fn expired_pending_listing() {
        let store = test_store();
        store
            .insert_token(&make_token("t1", "s1", "h1", "2020-01-01T00:00:00+00:00"))
            .unwrap();
        store
            .insert_token(&make_token("t2", "s2", "h2", "2099-01-01T00:00:00+00:00"))
            .unwrap();

        let now = now_rfc3339();
        let expired = store.expired_pending("s1", &now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "t1");
        assert!(store.expired_pending("s2", &now).unwrap().is_empty());
    }

    #[test]
    fn entry_pairs_with_newest_open_exit() {
        let store = test_store();
        store
            .insert_log(&exit_log("l1", "s1", "2026-08-20T08:00:00+00:00"))
            .unwrap();
        store
            .insert_log(&exit_log("l2", "s1", "2026-08-21T08:00:00+00:00"))
            .unwrap();

        let open = store.latest_open_exit("s1").unwrap().unwrap();
        assert_eq!(open.id, "l2");

        let mut paired = open.clone();
        paired.entry = Some(CrossingLeg {
            outcome: CrossingOutcome::Approved,
            at: now_rfc3339(),
            purpose: None,
            place: None,
        });
        assert!(store.complete_entry(&paired).unwrap());
        // The entry leg is written exactly once.
        assert!(!store.complete_entry(&paired).unwrap());

        let open = store.latest_open_exit("s1").unwrap().unwrap();
        assert_eq!(open.id, "l1");
    }

    #[test]
    fn log_search() {
        let store = test_store();
        store
            .insert_log(&exit_log("l1", "s1", "2026-08-20T08:00:00+00:00"))
            .unwrap();
        let mut other = exit_log("l2", "s2", "2026-08-21T08:00:00+00:00");
        other.record_number = Some("OS-00007".into());
        store.insert_log(&other).unwrap();

        let all = store.list_logs(&ListParams::default()).unwrap();
        assert_eq!(all.total, 2);
        // Newest first.
        assert_eq!(all.items[0].id, "l2");

        let params = ListParams {
            q: Some("OS-00007".into()),
            ..ListParams::default()
        };
        let hits = store.list_logs(&params).unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.items[0].id, "l2");
    }

    #[test]
    fn outside_listing() {
        let store = test_store();
        store.ensure_student("s1", "Asha").unwrap();
        store.ensure_student("s2", "Ravi").unwrap();

        let mut s = store.get_student("s2").unwrap();
        s.presence = Presence::Outside;
        store.update_student(&s, Presence::Inside).unwrap();

        let outside = store.list_outside(&ListParams::default()).unwrap();
        assert_eq!(outside.total, 1);
        assert_eq!(outside.items[0].id, "s2");
    }
}
