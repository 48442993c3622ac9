use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use gatehouse_core::{
    Actor, Directory, ListParams, ListResult, Notice, Outbox, Role, ServiceError, new_id,
    now_rfc3339,
};
use gatehouse_sql::SqlStore;

use leave::model::{LeaveKind, UtilizationStatus, kind_for_number};
use leave::service::WorkflowService;

use crate::model::{
    CrossingLeg, CrossingLog, CrossingOutcome, CrossingResult, DecideRequest, Direction,
    ExitContext, GateDecision, GateToken, IssueTokenRequest, ManualCrossingRequest, Presence,
    ResolveRequest, Student, TokenGrant, TokenPreview, TokenStatus,
};
use crate::secret;
use crate::store::GateStore;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// How long an issued crossing token stays scannable.
    pub token_ttl: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(300),
        }
    }
}

/// The gate: issues crossing tokens, consumes them exactly once, and
/// keeps presence, leave utilization and the audit log in step.
///
/// The token's terminal transition is the serialization point. Every
/// real-world effect happens only after the acting call has won that
/// conditional write, so two guards scanning the same code can never
/// both let a student through.
pub struct GateService {
    store: GateStore,
    workflow: Arc<WorkflowService>,
    directory: Arc<dyn Directory>,
    outbox: Outbox,
    token_ttl: Duration,
}

/// Everything an approved crossing needs to apply its effects.
struct Crossing {
    direction: Direction,
    purpose: Option<String>,
    place: Option<String>,
    record_number: Option<String>,
    token_id: Option<String>,
    guard_id: String,
    at: String,
}

impl GateService {
    pub fn new(
        db: Arc<dyn SqlStore>,
        workflow: Arc<WorkflowService>,
        directory: Arc<dyn Directory>,
        outbox: Outbox,
        config: GateConfig,
    ) -> Result<Arc<Self>, ServiceError> {
        Ok(Arc::new(Self {
            store: GateStore::new(db)?,
            workflow,
            directory,
            outbox,
            token_ttl: config.token_ttl,
        }))
    }

    // =======================================================================
    // Token issuance (student-facing)
    // =======================================================================

    /// Mint a single-use crossing token for the requesting student.
    ///
    /// The direction is derived from the student's current presence,
    /// never taken from the request. At most one token per student may
    /// be outstanding; the storage index enforces it.
    pub fn issue(&self, actor: &Actor, req: IssueTokenRequest) -> Result<TokenGrant, ServiceError> {
        require_role(actor, Role::Student)?;
        self.store.ensure_student(&actor.id, &actor.name)?;
        let student = self.store.get_student(&actor.id)?;
        let direction = Direction::for_presence(student.presence);
        let now = now_rfc3339();

        let (purpose, place) = match direction {
            Direction::Exit => (
                Some(required_text("purpose", req.purpose.as_deref().unwrap_or(""))?),
                Some(required_text("place", req.place.as_deref().unwrap_or(""))?),
            ),
            // An entry token describes the trip being closed; fall back
            // to what the student said on the way out.
            Direction::Entry => {
                let ctx = student.exit_context.as_ref();
                (
                    normalize_opt(req.purpose).or_else(|| ctx.map(|c| c.purpose.clone())),
                    normalize_opt(req.place).or_else(|| ctx.map(|c| c.place.clone())),
                )
            }
        };

        let record_number = match normalize_opt(req.record_number) {
            Some(number) => {
                if direction != Direction::Exit {
                    return Err(ServiceError::Invalid(
                        "record binding applies to exit crossings".into(),
                    ));
                }
                self.check_record_binding(&actor.id, &number)?;
                Some(number)
            }
            None => None,
        };

        // Lapsed tokens keep holding the uniqueness slot until marked
        // terminal; clear them before inserting.
        self.finalize_expired(&actor.id, &now)?;

        let (raw, hash) = secret::mint();
        let tok = GateToken {
            id: new_id(),
            student_id: actor.id.clone(),
            student_name: actor.name.clone(),
            direction,
            purpose: purpose.clone(),
            place: place.clone(),
            token_hash: hash,
            status: TokenStatus::Pending,
            expires_at: self.expiry_from_now(),
            used_at: None,
            decided_by: None,
            record_number: record_number.clone(),
            created_at: now,
        };
        self.store.insert_token(&tok)?;

        Ok(TokenGrant {
            token: secret::compose(&raw, tok.record_number.as_deref()),
            token_id: tok.id,
            direction,
            purpose,
            place,
            record_number,
            expires_at: tok.expires_at,
        })
    }

    // =======================================================================
    // Scan and decide (guard-facing)
    // =======================================================================

    /// Look up a scanned code without consuming it. Shows the guard
    /// who is crossing, which way, and any bound leave record.
    pub fn resolve(&self, actor: &Actor, req: &ResolveRequest) -> Result<TokenPreview, ServiceError> {
        require_role(actor, Role::Guard)?;
        let (base, _) = secret::split(req.code.trim());
        let tok = self
            .store
            .find_token_by_hash(&secret::hash(base))?
            .ok_or_else(|| ServiceError::NotFound("unknown crossing code".into()))?;

        let now = now_rfc3339();
        if tok.used_at.is_some() {
            return Err(ServiceError::Gone("crossing code already used".into()));
        }
        if tok.is_expired(&now) {
            self.finalize_token(&tok, &now)?;
            return Err(ServiceError::Gone("crossing code expired".into()));
        }
        if tok.status != TokenStatus::Pending {
            return Err(ServiceError::Conflict("crossing code is not pending".into()));
        }

        let record = match tok.record_number.as_deref() {
            Some(number) => match self.workflow.lookup_gatepass(number) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(record = %number, error = %e, "bound record lookup failed");
                    None
                }
            },
            None => None,
        };

        Ok(TokenPreview {
            token_id: tok.id,
            student_id: tok.student_id,
            student_name: tok.student_name,
            direction: tok.direction,
            purpose: tok.purpose,
            place: tok.place,
            expires_at: tok.expires_at,
            record,
        })
    }

    /// Consume a token and, on approval, apply the crossing.
    ///
    /// The terminal write happens first and exactly once; whoever loses
    /// the race gets `Gone`. A rejection consumes the token but touches
    /// nothing else.
    pub fn decide(
        &self,
        actor: &Actor,
        token_id: &str,
        req: &DecideRequest,
    ) -> Result<CrossingResult, ServiceError> {
        require_role(actor, Role::Guard)?;
        let tok = self.store.get_token(token_id)?;
        let now = now_rfc3339();

        if tok.used_at.is_some() {
            return Err(ServiceError::Gone("token already consumed".into()));
        }
        if tok.is_expired(&now) {
            // First touch of an expired token retires it so the code
            // can never be replayed.
            self.finalize_token(&tok, &now)?;
            return Err(ServiceError::Gone("token expired".into()));
        }

        let mut terminal = tok.clone();
        terminal.status = match req.decision {
            GateDecision::Approve => TokenStatus::Approved,
            GateDecision::Reject => TokenStatus::Rejected,
        };
        terminal.used_at = Some(now.clone());
        terminal.decided_by = Some(actor.id.clone());
        if !self.store.consume_token(&terminal)? {
            return Err(ServiceError::Gone("token was consumed concurrently".into()));
        }

        if req.decision == GateDecision::Reject {
            let presence = self.store.get_student(&tok.student_id)?.presence;
            self.notify_outcome(&tok.student_id, tok.direction, false, presence);
            return Ok(CrossingResult {
                token_id: Some(terminal.id),
                student_id: tok.student_id,
                direction: tok.direction,
                approved: false,
                presence,
            });
        }

        let presence = self.apply_crossing(
            &tok.student_id,
            Crossing {
                direction: tok.direction,
                purpose: tok.purpose.clone(),
                place: tok.place.clone(),
                record_number: tok.record_number.clone(),
                token_id: Some(terminal.id.clone()),
                guard_id: actor.id.clone(),
                at: now,
            },
        )?;
        Ok(CrossingResult {
            token_id: Some(terminal.id),
            student_id: tok.student_id,
            direction: tok.direction,
            approved: true,
            presence,
        })
    }

    /// Record a crossing without a token (lost phone, dead battery).
    /// Same effects as an approved scan; the student's presence must
    /// match the requested direction.
    pub fn record_manual(
        &self,
        actor: &Actor,
        req: ManualCrossingRequest,
    ) -> Result<CrossingResult, ServiceError> {
        require_role(actor, Role::Guard)?;
        let person = self
            .directory
            .resolve(&req.student_id)
            .ok_or_else(|| ServiceError::NotFound(format!("student {}", req.student_id)))?;
        if person.role != Role::Student {
            return Err(ServiceError::Invalid(format!(
                "'{}' is not a student",
                req.student_id
            )));
        }
        self.store.ensure_student(&person.id, &person.name)?;
        let student = self.store.get_student(&person.id)?;
        let now = now_rfc3339();

        let (purpose, place, record_number) = match req.direction {
            Direction::Exit => {
                if student.presence != Presence::Inside {
                    return Err(ServiceError::Conflict(format!(
                        "student {} is already outside",
                        person.id
                    )));
                }
                let purpose = required_text("purpose", req.purpose.as_deref().unwrap_or(""))?;
                let place = required_text("place", req.place.as_deref().unwrap_or(""))?;
                let record_number = match normalize_opt(req.record_number) {
                    Some(number) => {
                        self.check_record_binding(&person.id, &number)?;
                        Some(number)
                    }
                    None => None,
                };
                (Some(purpose), Some(place), record_number)
            }
            Direction::Entry => {
                if student.presence != Presence::Outside {
                    return Err(ServiceError::Conflict(format!(
                        "student {} is already inside",
                        person.id
                    )));
                }
                let ctx = student.exit_context.as_ref();
                (
                    ctx.map(|c| c.purpose.clone()),
                    ctx.map(|c| c.place.clone()),
                    None,
                )
            }
        };

        let presence = self.apply_crossing(
            &person.id,
            Crossing {
                direction: req.direction,
                purpose,
                place,
                record_number,
                token_id: None,
                guard_id: actor.id.clone(),
                at: now,
            },
        )?;
        Ok(CrossingResult {
            token_id: None,
            student_id: person.id,
            direction: req.direction,
            approved: true,
            presence,
        })
    }

    // =======================================================================
    // Read sides
    // =======================================================================

    /// The requesting student's own presence and active context.
    pub fn my_presence(&self, actor: &Actor) -> Result<Student, ServiceError> {
        require_role(actor, Role::Student)?;
        self.store.ensure_student(&actor.id, &actor.name)?;
        self.store.get_student(&actor.id)
    }

    /// A student's presence, for gate staff and approvers.
    pub fn student_presence(&self, actor: &Actor, student_id: &str) -> Result<Student, ServiceError> {
        require_staff(actor)?;
        let person = self
            .directory
            .resolve(student_id)
            .ok_or_else(|| ServiceError::NotFound(format!("student {student_id}")))?;
        if person.role != Role::Student {
            return Err(ServiceError::Invalid(format!("'{student_id}' is not a student")));
        }
        self.store.ensure_student(&person.id, &person.name)?;
        self.store.get_student(&person.id)
    }

    /// Students currently off campus.
    pub fn list_outside(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<Student>, ServiceError> {
        require_staff(actor)?;
        self.store.list_outside(params)
    }

    /// The crossing audit log, newest first.
    pub fn list_logs(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<CrossingLog>, ServiceError> {
        require_staff(actor)?;
        self.store.list_logs(params)
    }

    // =======================================================================
    // Internals
    // =======================================================================

    fn expiry_from_now(&self) -> String {
        (chrono::Utc::now() + self.token_ttl).to_rfc3339()
    }

    /// An exit may only bind a record the student owns, that is
    /// approved, and whose crossing has not started.
    fn check_record_binding(&self, student_id: &str, number: &str) -> Result<(), ServiceError> {
        let summary = self.workflow.lookup_gatepass(number)?;
        if summary.student_id != student_id {
            return Err(ServiceError::Forbidden(format!(
                "record {number} belongs to another student"
            )));
        }
        if !summary.approved {
            return Err(ServiceError::Conflict(format!(
                "record {number} is not approved"
            )));
        }
        if summary.utilization != UtilizationStatus::Pending || summary.exit_used {
            return Err(ServiceError::Conflict(format!(
                "record {number} has already been used"
            )));
        }
        Ok(())
    }

    /// Retire a token that lapsed undecided: rejected, used, done.
    fn finalize_token(&self, tok: &GateToken, now: &str) -> Result<(), ServiceError> {
        let mut lapsed = tok.clone();
        lapsed.status = TokenStatus::Rejected;
        lapsed.used_at = Some(now.to_string());
        self.store.consume_token(&lapsed)?;
        Ok(())
    }

    fn finalize_expired(&self, student_id: &str, now: &str) -> Result<(), ServiceError> {
        for tok in self.store.expired_pending(student_id, now)? {
            self.finalize_token(&tok, now)?;
        }
        Ok(())
    }

    /// Apply an approved crossing: flip presence (conditionally),
    /// settle leave utilization, write the audit leg, tell the student.
    fn apply_crossing(&self, student_id: &str, c: Crossing) -> Result<Presence, ServiceError> {
        let student = self.store.get_student(student_id)?;
        match c.direction {
            Direction::Exit => {
                if student.presence != Presence::Inside {
                    return Err(ServiceError::Conflict(format!(
                        "student {student_id} is already outside"
                    )));
                }
                let mut updated = student.clone();
                updated.presence = Presence::Outside;
                updated.exit_context = Some(ExitContext {
                    purpose: c.purpose.clone().unwrap_or_default(),
                    place: c.place.clone().unwrap_or_default(),
                    out_at: c.at.clone(),
                });
                if let Some(number) = c.record_number.as_deref() {
                    match kind_for_number(number) {
                        Some(LeaveKind::Local) => updated.active_local = Some(number.to_string()),
                        Some(LeaveKind::Outstation) => {
                            updated.active_outstation = Some(number.to_string())
                        }
                        None => {}
                    }
                }
                if !self.store.update_student(&updated, Presence::Inside)? {
                    return Err(ServiceError::Conflict(format!(
                        "student {student_id} crossed concurrently"
                    )));
                }

                // The crossing stands even if the record write loses a
                // race; the mismatch is logged for reconciliation.
                if let Some(number) = c.record_number.as_deref() {
                    if let Err(e) = self.workflow.begin_utilization(number, student_id, &c.at) {
                        warn!(record = %number, error = %e, "leave record not moved to in_use");
                    }
                }

                self.store.insert_log(&CrossingLog {
                    id: new_id(),
                    student_id: student_id.to_string(),
                    student_name: student.name.clone(),
                    guard_id: c.guard_id.clone(),
                    token_id: c.token_id,
                    record_number: c.record_number,
                    direction: Direction::Exit,
                    exit: Some(CrossingLeg {
                        outcome: CrossingOutcome::Approved,
                        at: c.at.clone(),
                        purpose: c.purpose,
                        place: c.place,
                    }),
                    entry: None,
                    created_at: c.at,
                })?;

                self.notify_outcome(student_id, Direction::Exit, true, Presence::Outside);
                Ok(Presence::Outside)
            }
            Direction::Entry => {
                if student.presence != Presence::Outside {
                    return Err(ServiceError::Conflict(format!(
                        "student {student_id} is already inside"
                    )));
                }
                let active = [student.active_local.clone(), student.active_outstation.clone()];
                let mut updated = student.clone();
                updated.presence = Presence::Inside;
                updated.exit_context = None;
                updated.active_local = None;
                updated.active_outstation = None;
                if !self.store.update_student(&updated, Presence::Outside)? {
                    return Err(ServiceError::Conflict(format!(
                        "student {student_id} crossed concurrently"
                    )));
                }

                for number in active.iter().flatten() {
                    if let Err(e) = self.workflow.complete_utilization(number, student_id, &c.at) {
                        warn!(record = %number, error = %e, "leave record not completed");
                    }
                }

                let leg = CrossingLeg {
                    outcome: CrossingOutcome::Approved,
                    at: c.at.clone(),
                    purpose: c.purpose,
                    place: c.place,
                };
                match self.store.latest_open_exit(student_id)? {
                    Some(mut open) => {
                        open.entry = Some(leg.clone());
                        if !self.store.complete_entry(&open)? {
                            self.insert_entry_only(student_id, &student.name, &c.guard_id, c.token_id, leg, &c.at)?;
                        }
                    }
                    None => {
                        self.insert_entry_only(student_id, &student.name, &c.guard_id, c.token_id, leg, &c.at)?
                    }
                }

                self.notify_outcome(student_id, Direction::Entry, true, Presence::Inside);
                Ok(Presence::Inside)
            }
        }
    }

    /// Fallback audit row for an entry with no open exit to pair with.
    fn insert_entry_only(
        &self,
        student_id: &str,
        student_name: &str,
        guard_id: &str,
        token_id: Option<String>,
        leg: CrossingLeg,
        now: &str,
    ) -> Result<(), ServiceError> {
        self.store.insert_log(&CrossingLog {
            id: new_id(),
            student_id: student_id.to_string(),
            student_name: student_name.to_string(),
            guard_id: guard_id.to_string(),
            token_id,
            record_number: None,
            direction: Direction::Entry,
            exit: None,
            entry: Some(leg),
            created_at: now.to_string(),
        })
    }

    fn notify_outcome(&self, student_id: &str, direction: Direction, approved: bool, presence: Presence) {
        match self.directory.resolve(student_id) {
            Some(person) => self.outbox.post(Notice::GateOutcome {
                recipient: person,
                direction: direction.to_string(),
                approved,
                presence: presence.to_string(),
            }),
            None => warn!(student = %student_id, "student not in directory"),
        }
    }
}

fn require_role(actor: &Actor, role: Role) -> Result<(), ServiceError> {
    if actor.role != role {
        return Err(ServiceError::Forbidden(format!("requires the {role} role")));
    }
    Ok(())
}

fn require_staff(actor: &Actor) -> Result<(), ServiceError> {
    if actor.role != Role::Guard && !actor.role.is_approver() {
        return Err(ServiceError::Forbidden(
            "requires gate or approver access".into(),
        ));
    }
    Ok(())
}

fn required_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
