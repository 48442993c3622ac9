use std::sync::Arc;

use chrono::NaiveDate;
use tracing::warn;

use gatehouse_core::{
    Actor, Directory, ListParams, ListResult, Notice, Outbox, Role, ServiceError, new_id,
    now_rfc3339,
};
use gatehouse_sql::SqlStore;

use crate::model::stage::{self, Stage, StageScope};
use crate::model::{
    Course, CreateLocalLeave, CreateOutstationLeave, FinalStatus, GatepassSummary, LeaveKind,
    LocalDecideRequest, LocalLeave, LocalStatus, OutstationLeave, Rejection, StageDecideRequest,
    StageDecision, StageOutcome, UtilizationStatus, kind_for_number,
};
use crate::store::{LocalStore, OutstationStore};

/// The approval workflow engine for both leave record kinds.
///
/// All state transitions go through conditional store writes; a caller
/// losing a race gets a `Conflict`, never a silent overwrite. Notices
/// are posted to the outbox after the write commits and never affect
/// the outcome.
pub struct WorkflowService {
    local: LocalStore,
    outstation: OutstationStore,
    directory: Arc<dyn Directory>,
    outbox: Outbox,
}

impl WorkflowService {
    pub fn new(
        db: Arc<dyn SqlStore>,
        directory: Arc<dyn Directory>,
        outbox: Outbox,
    ) -> Result<Arc<Self>, ServiceError> {
        Ok(Arc::new(Self {
            local: LocalStore::new(Arc::clone(&db))?,
            outstation: OutstationStore::new(db)?,
            directory,
            outbox,
        }))
    }

    // =======================================================================
    // Local records
    // =======================================================================

    /// Create a local leave record for the requesting student.
    pub fn create_local(
        &self,
        actor: &Actor,
        req: CreateLocalLeave,
    ) -> Result<LocalLeave, ServiceError> {
        require_role(actor, Role::Student)?;
        valid_date("date", &req.date)?;
        valid_time("outTime", &req.out_time)?;
        valid_time("inTime", &req.in_time)?;
        let purpose = required_text("purpose", &req.purpose)?;
        let place = required_text("place", &req.place)?;

        let rec = LocalLeave {
            id: new_id(),
            number: self.local.next_number()?,
            student_id: actor.id.clone(),
            student_name: actor.name.clone(),
            department: actor.department.clone(),
            date: req.date,
            out_time: req.out_time,
            in_time: req.in_time,
            purpose,
            place,
            attachment: normalize_opt(req.attachment),
            status: LocalStatus::Pending,
            decided_by: None,
            decided_at: None,
            decision_note: None,
            utilization_status: UtilizationStatus::Pending,
            exit_used: false,
            entry_used: false,
            actual_out_at: None,
            actual_in_at: None,
            created_at: now_rfc3339(),
        };
        self.local.create(&rec)?;

        match self.directory.find_approver(Role::HostelOffice, None) {
            Some(office) => self.outbox.post(Notice::ApprovalRequested {
                recipient: office,
                record_number: rec.number.clone(),
                requester_name: rec.student_name.clone(),
                stage: Role::HostelOffice.to_string(),
            }),
            None => warn!(record = %rec.number, "no hostel office contact for notification"),
        }

        Ok(rec)
    }

    /// The requesting student's own local records.
    pub fn my_local(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<LocalLeave>, ServiceError> {
        self.local.list_for_student(&actor.id, params)
    }

    /// Fetch one local record; visible to its owner and to the office.
    pub fn get_local(&self, actor: &Actor, id: &str) -> Result<LocalLeave, ServiceError> {
        let rec = self.local.get(id)?;
        if rec.student_id != actor.id && actor.role != Role::HostelOffice {
            return Err(ServiceError::Forbidden(format!(
                "record {} is not visible to you",
                rec.number
            )));
        }
        Ok(rec)
    }

    /// Hostel office decision on a local record. Single shot.
    pub fn decide_local(
        &self,
        actor: &Actor,
        id: &str,
        req: LocalDecideRequest,
    ) -> Result<LocalLeave, ServiceError> {
        require_role(actor, Role::HostelOffice)?;
        if req.decision == LocalStatus::Pending {
            return Err(ServiceError::Invalid(
                "decision must be approved or denied".into(),
            ));
        }

        let mut rec = self.local.get(id)?;
        if rec.status != LocalStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "record {} is already {}",
                rec.number, rec.status
            )));
        }

        rec.status = req.decision;
        rec.decided_by = Some(actor.id.clone());
        rec.decided_at = Some(now_rfc3339());
        rec.decision_note = normalize_opt(req.note);

        if !self.local.decide(&rec)? {
            return Err(ServiceError::Conflict(format!(
                "record {} was decided concurrently",
                rec.number
            )));
        }

        self.notify_resolved(
            &rec.student_id,
            &rec.number,
            rec.status == LocalStatus::Approved,
            rec.decision_note.clone(),
        );
        Ok(rec)
    }

    /// Withdraw an undecided local record. Owner only.
    pub fn withdraw_local(&self, actor: &Actor, id: &str) -> Result<(), ServiceError> {
        let rec = self.local.get(id)?;
        if rec.student_id != actor.id {
            return Err(ServiceError::Forbidden(format!(
                "record {} belongs to another student",
                rec.number
            )));
        }
        if !self.local.delete_pending(id, &actor.id)? {
            return Err(ServiceError::Conflict(format!(
                "record {} is already decided or in use",
                rec.number
            )));
        }
        Ok(())
    }

    /// Undecided local records, for the office.
    pub fn local_queue(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<LocalLeave>, ServiceError> {
        require_role(actor, Role::HostelOffice)?;
        self.local.list_pending(params)
    }

    /// Local records the acting office member has decided.
    pub fn local_decided(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<LocalLeave>, ServiceError> {
        require_role(actor, Role::HostelOffice)?;
        self.local.list_decided_by(&actor.id, params)
    }

    // =======================================================================
    // Outstation records
    // =======================================================================

    /// Create an outstation leave record for the requesting student.
    pub fn create_outstation(
        &self,
        actor: &Actor,
        req: CreateOutstationLeave,
    ) -> Result<OutstationLeave, ServiceError> {
        require_role(actor, Role::Student)?;
        let department = actor
            .department
            .clone()
            .ok_or_else(|| ServiceError::Invalid("student has no department on record".into()))?;

        let leaving = valid_date("dateOfLeaving", &req.date_of_leaving)?;
        let returning = valid_date("dateOfReturning", &req.date_of_returning)?;
        if returning < leaving {
            return Err(ServiceError::Invalid(
                "dateOfReturning is before dateOfLeaving".into(),
            ));
        }
        let purpose = required_text("purpose", &req.purpose)?;
        let place = required_text("place", &req.place)?;

        let instructor_id = self.check_instructor(req.course, normalize_opt(req.instructor_id))?;

        let rec = OutstationLeave {
            id: new_id(),
            number: self.outstation.next_number()?,
            student_id: actor.id.clone(),
            student_name: actor.name.clone(),
            department,
            course: req.course,
            instructor_id,
            date_of_leaving: req.date_of_leaving,
            date_of_returning: req.date_of_returning,
            purpose,
            place,
            attachment: normalize_opt(req.attachment),
            current_stage: stage::initial_stage(req.course),
            final_status: FinalStatus::Pending,
            stage_status: Default::default(),
            rejected_by: None,
            attendance: None,
            leave_balance: None,
            utilization_status: UtilizationStatus::Pending,
            exit_used: false,
            entry_used: false,
            actual_out_at: None,
            actual_in_at: None,
            created_at: now_rfc3339(),
        };
        self.outstation.create(&rec)?;
        self.notify_stage(&rec, rec.current_stage);
        Ok(rec)
    }

    /// The requesting student's own outstation records.
    pub fn my_outstation(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<OutstationLeave>, ServiceError> {
        self.outstation.list_for_student(&actor.id, params)
    }

    /// Fetch one outstation record; visible to its owner and to approvers.
    pub fn get_outstation(&self, actor: &Actor, id: &str) -> Result<OutstationLeave, ServiceError> {
        let rec = self.outstation.get(id)?;
        if rec.student_id != actor.id && !actor.role.is_approver() {
            return Err(ServiceError::Forbidden(format!(
                "record {} is not visible to you",
                rec.number
            )));
        }
        Ok(rec)
    }

    /// Decide the record's current stage as the acting approver.
    ///
    /// Approval advances the record along its course's sequence (or
    /// resolves it at the terminal stage); rejection freezes it
    /// permanently. The stage transition is a conditional write — a
    /// concurrent decision surfaces as `Conflict`.
    pub fn decide_outstation(
        &self,
        actor: &Actor,
        id: &str,
        req: StageDecideRequest,
    ) -> Result<OutstationLeave, ServiceError> {
        let owned = stage::stage_for_role(actor.role).ok_or_else(|| {
            ServiceError::Forbidden(format!("role {} does not decide any stage", actor.role))
        })?;

        let mut rec = self.outstation.get(id)?;
        if !rec.is_open() {
            return Err(ServiceError::Conflict(format!(
                "record {} is already {}",
                rec.number, rec.final_status
            )));
        }
        if rec.current_stage != owned {
            return Err(ServiceError::Conflict(format!(
                "record {} is at stage {}, not {}",
                rec.number, rec.current_stage, owned
            )));
        }
        self.check_stage_scope(actor, &rec, owned)?;

        let observed = rec.current_stage;
        let now = now_rfc3339();
        let note = normalize_opt(req.note);

        match req.decision {
            StageOutcome::Rejected => {
                let reason = required_text("reason", req.reason.as_deref().unwrap_or(""))
                    .map_err(|_| ServiceError::Invalid("rejection requires a reason".into()))?;
                rec.stage_status.insert(
                    observed,
                    StageDecision {
                        status: StageOutcome::Rejected,
                        decided_by: actor.id.clone(),
                        decided_at: now.clone(),
                        note,
                    },
                );
                rec.rejected_by = Some(Rejection {
                    stage: observed,
                    decided_by: actor.id.clone(),
                    decided_at: now.clone(),
                    reason,
                });
                rec.final_status = FinalStatus::Rejected;
                rec.current_stage = Stage::Completed;
            }
            StageOutcome::Approved => {
                if let Some(attendance) = req.attendance {
                    if observed != Stage::OfficeSecretary {
                        return Err(ServiceError::Invalid(
                            "attendance is recorded at the officeSecretary stage".into(),
                        ));
                    }
                    rec.attendance = Some(attendance);
                }
                if let Some(balance) = req.leave_balance {
                    if !rec.course.is_doctoral() {
                        return Err(ServiceError::Invalid(
                            "leave balance applies to doctoral records only".into(),
                        ));
                    }
                    rec.leave_balance = Some(balance);
                }
                rec.stage_status.insert(
                    observed,
                    StageDecision {
                        status: StageOutcome::Approved,
                        decided_by: actor.id.clone(),
                        decided_at: now.clone(),
                        note,
                    },
                );
                match stage::next_stage(rec.course, observed) {
                    Some(next) => rec.current_stage = next,
                    None => {
                        rec.final_status = FinalStatus::Approved;
                        rec.current_stage = Stage::Completed;
                    }
                }
            }
        }

        if !self.outstation.advance(&rec, observed)? {
            return Err(ServiceError::Conflict(format!(
                "record {} was decided concurrently",
                rec.number
            )));
        }
        self.outstation
            .record_decision(&rec.id, observed, &actor.id, &now)?;

        match rec.final_status {
            FinalStatus::Pending => self.notify_stage(&rec, rec.current_stage),
            FinalStatus::Approved => {
                self.notify_resolved(&rec.student_id, &rec.number, true, None)
            }
            FinalStatus::Rejected => self.notify_resolved(
                &rec.student_id,
                &rec.number,
                false,
                rec.rejected_by.as_ref().map(|r| r.reason.clone()),
            ),
        }

        Ok(rec)
    }

    /// Records waiting at the acting approver's stage.
    pub fn outstation_queue(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<OutstationLeave>, ServiceError> {
        let owned = stage::stage_for_role(actor.role).ok_or_else(|| {
            ServiceError::Forbidden(format!("role {} does not decide any stage", actor.role))
        })?;
        let scope = owned
            .scope()
            .ok_or_else(|| ServiceError::Internal("stage has no scope".into()))?;
        if scope == StageScope::Department && actor.department.is_none() {
            return Err(ServiceError::Forbidden(
                "department-scoped role without a department".into(),
            ));
        }
        self.outstation
            .stage_queue(owned, scope, &actor.id, actor.department(), params)
    }

    /// Outstation records the acting approver has personally decided.
    pub fn outstation_decided(
        &self,
        actor: &Actor,
        params: &ListParams,
    ) -> Result<ListResult<OutstationLeave>, ServiceError> {
        if !actor.role.is_approver() {
            return Err(ServiceError::Forbidden(format!(
                "role {} does not decide any stage",
                actor.role
            )));
        }
        self.outstation.list_decided_by(&actor.id, params)
    }

    // =======================================================================
    // Gate-facing operations
    // =======================================================================

    /// Resolve a record number to the summary the gate shows a guard and
    /// validates token bindings against.
    pub fn lookup_gatepass(&self, number: &str) -> Result<GatepassSummary, ServiceError> {
        match kind_for_number(number)
            .ok_or_else(|| ServiceError::Invalid(format!("malformed record number '{number}'")))?
        {
            LeaveKind::Local => {
                let rec = self.local.get_by_number(number)?;
                Ok(GatepassSummary {
                    number: rec.number,
                    kind: LeaveKind::Local,
                    student_id: rec.student_id,
                    purpose: rec.purpose,
                    place: rec.place,
                    leaving: format!("{} {}", rec.date, rec.out_time),
                    returning: format!("{} {}", rec.date, rec.in_time),
                    approved: rec.status == LocalStatus::Approved,
                    utilization: rec.utilization_status,
                    exit_used: rec.exit_used,
                })
            }
            LeaveKind::Outstation => {
                let rec = self.outstation.get_by_number(number)?;
                Ok(GatepassSummary {
                    number: rec.number,
                    kind: LeaveKind::Outstation,
                    student_id: rec.student_id,
                    purpose: rec.purpose,
                    place: rec.place,
                    leaving: rec.date_of_leaving,
                    returning: rec.date_of_returning,
                    approved: rec.final_status == FinalStatus::Approved,
                    utilization: rec.utilization_status,
                    exit_used: rec.exit_used,
                })
            }
        }
    }

    /// Mark a record's crossing as started: pending → in_use, exit leg
    /// used, actual out time recorded. Called by the gate on an
    /// approved exit.
    pub fn begin_utilization(
        &self,
        number: &str,
        student_id: &str,
        out_at: &str,
    ) -> Result<(), ServiceError> {
        match kind_for_number(number)
            .ok_or_else(|| ServiceError::Invalid(format!("malformed record number '{number}'")))?
        {
            LeaveKind::Local => {
                let mut rec = self.local.get_by_number(number)?;
                check_usable(
                    number,
                    rec.student_id == student_id,
                    rec.status == LocalStatus::Approved,
                    rec.utilization_status == UtilizationStatus::Pending && !rec.exit_used,
                )?;
                rec.utilization_status = UtilizationStatus::InUse;
                rec.exit_used = true;
                rec.actual_out_at = Some(out_at.to_string());
                if !self.local.set_utilization(&rec, UtilizationStatus::Pending)? {
                    return Err(ServiceError::Conflict(format!(
                        "record {number} is already in use"
                    )));
                }
            }
            LeaveKind::Outstation => {
                let mut rec = self.outstation.get_by_number(number)?;
                check_usable(
                    number,
                    rec.student_id == student_id,
                    rec.final_status == FinalStatus::Approved,
                    rec.utilization_status == UtilizationStatus::Pending && !rec.exit_used,
                )?;
                rec.utilization_status = UtilizationStatus::InUse;
                rec.exit_used = true;
                rec.actual_out_at = Some(out_at.to_string());
                if !self
                    .outstation
                    .set_utilization(&rec, UtilizationStatus::Pending)?
                {
                    return Err(ServiceError::Conflict(format!(
                        "record {number} is already in use"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Mark a record's crossing as finished: in_use → completed, entry
    /// leg used, actual in time recorded. Called by the gate on an
    /// approved entry.
    pub fn complete_utilization(
        &self,
        number: &str,
        student_id: &str,
        in_at: &str,
    ) -> Result<(), ServiceError> {
        match kind_for_number(number)
            .ok_or_else(|| ServiceError::Invalid(format!("malformed record number '{number}'")))?
        {
            LeaveKind::Local => {
                let mut rec = self.local.get_by_number(number)?;
                if rec.student_id != student_id {
                    return Err(ServiceError::Conflict(format!(
                        "record {number} belongs to another student"
                    )));
                }
                rec.utilization_status = UtilizationStatus::Completed;
                rec.entry_used = true;
                rec.actual_in_at = Some(in_at.to_string());
                if !self.local.set_utilization(&rec, UtilizationStatus::InUse)? {
                    return Err(ServiceError::Conflict(format!(
                        "record {number} is not in use"
                    )));
                }
            }
            LeaveKind::Outstation => {
                let mut rec = self.outstation.get_by_number(number)?;
                if rec.student_id != student_id {
                    return Err(ServiceError::Conflict(format!(
                        "record {number} belongs to another student"
                    )));
                }
                rec.utilization_status = UtilizationStatus::Completed;
                rec.entry_used = true;
                rec.actual_in_at = Some(in_at.to_string());
                if !self
                    .outstation
                    .set_utilization(&rec, UtilizationStatus::InUse)?
                {
                    return Err(ServiceError::Conflict(format!(
                        "record {number} is not in use"
                    )));
                }
            }
        }
        Ok(())
    }

    // =======================================================================
    // Internals
    // =======================================================================

    fn check_instructor(
        &self,
        course: Course,
        instructor_id: Option<String>,
    ) -> Result<Option<String>, ServiceError> {
        if course.is_doctoral() {
            let id = instructor_id.ok_or_else(|| {
                ServiceError::Invalid("doctoral records require an instructor".into())
            })?;
            let person = self
                .directory
                .resolve(&id)
                .ok_or_else(|| ServiceError::Invalid(format!("unknown instructor '{id}'")))?;
            if person.role != Role::Instructor {
                return Err(ServiceError::Invalid(format!(
                    "'{id}' is not an instructor"
                )));
            }
            Ok(Some(id))
        } else {
            if instructor_id.is_some() {
                return Err(ServiceError::Invalid(
                    "instructor applies to doctoral records only".into(),
                ));
            }
            Ok(None)
        }
    }

    fn check_stage_scope(
        &self,
        actor: &Actor,
        rec: &OutstationLeave,
        stage: Stage,
    ) -> Result<(), ServiceError> {
        match stage.scope() {
            Some(StageScope::Department) => {
                if actor.department() != Some(rec.department.as_str()) {
                    return Err(ServiceError::Forbidden(format!(
                        "record {} belongs to department {}",
                        rec.number, rec.department
                    )));
                }
            }
            Some(StageScope::Assignment) => {
                if rec.instructor_id.as_deref() != Some(actor.id.as_str()) {
                    return Err(ServiceError::Forbidden(format!(
                        "record {} names a different instructor",
                        rec.number
                    )));
                }
            }
            Some(StageScope::Global) | None => {}
        }
        Ok(())
    }

    fn notify_stage(&self, rec: &OutstationLeave, stage: Stage) {
        let recipient = match stage.scope() {
            Some(StageScope::Assignment) => rec
                .instructor_id
                .as_deref()
                .and_then(|id| self.directory.resolve(id)),
            Some(StageScope::Department) => stage
                .owning_role()
                .and_then(|r| self.directory.find_approver(r, Some(&rec.department))),
            Some(StageScope::Global) => stage
                .owning_role()
                .and_then(|r| self.directory.find_approver(r, None)),
            None => None,
        };
        match recipient {
            Some(person) => self.outbox.post(Notice::ApprovalRequested {
                recipient: person,
                record_number: rec.number.clone(),
                requester_name: rec.student_name.clone(),
                stage: stage.to_string(),
            }),
            None => warn!(record = %rec.number, stage = %stage, "no approver found for notification"),
        }
    }

    fn notify_resolved(
        &self,
        student_id: &str,
        number: &str,
        approved: bool,
        reason: Option<String>,
    ) {
        match self.directory.resolve(student_id) {
            Some(person) => self.outbox.post(Notice::LeaveResolved {
                recipient: person,
                record_number: number.to_string(),
                approved,
                reason,
            }),
            None => warn!(record = %number, student = %student_id, "student not in directory"),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn require_role(actor: &Actor, role: Role) -> Result<(), ServiceError> {
    if actor.role != role {
        return Err(ServiceError::Forbidden(format!(
            "requires the {role} role"
        )));
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

fn valid_date(field: &str, value: &str) -> Result<NaiveDate, ServiceError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ServiceError::Invalid(format!("{field} must be YYYY-MM-DD")))
}

fn valid_time(field: &str, value: &str) -> Result<(), ServiceError> {
    chrono::NaiveTime::parse_from_str(value, "%H:%M")
        .map(|_| ())
        .map_err(|_| ServiceError::Invalid(format!("{field} must be HH:MM")))
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn check_usable(
    number: &str,
    owned: bool,
    approved: bool,
    fresh: bool,
) -> Result<(), ServiceError> {
    if !owned {
        return Err(ServiceError::Conflict(format!(
            "record {number} belongs to another student"
        )));
    }
    if !approved {
        return Err(ServiceError::Conflict(format!(
            "record {number} is not approved"
        )));
    }
    if !fresh {
        return Err(ServiceError::Conflict(format!(
            "record {number} has already been used"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::{Person, StaticDirectory};
    use gatehouse_sql::SqliteStore;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn person(id: &str, role: Role, dept: Option<&str>) -> Person {
        Person {
            id: id.into(),
            name: id.into(),
            role,
            department: dept.map(String::from),
            email: None,
        }
    }

    fn actor(id: &str, role: Role, dept: Option<&str>) -> Actor {
        Actor {
            id: id.into(),
            name: id.into(),
            role,
            department: dept.map(String::from),
        }
    }

    fn test_service() -> (Arc<WorkflowService>, UnboundedReceiver<Notice>) {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        let directory = Arc::new(StaticDirectory::new(vec![
            person("s1", Role::Student, Some("cse")),
            person("s2", Role::Student, Some("ee")),
            person("prof-1", Role::Instructor, Some("cse")),
            person("prof-2", Role::Instructor, Some("cse")),
            person("sec-cse", Role::OfficeSecretary, Some("cse")),
            person("sec-ee", Role::OfficeSecretary, Some("ee")),
            person("dpgc-cse", Role::Dpgc, Some("cse")),
            person("dugc-cse", Role::Dugc, Some("cse")),
            person("hod-cse", Role::Hod, Some("cse")),
            person("dean-1", Role::Dean, None),
            person("hostel-1", Role::HostelOffice, None),
        ]));
        let (outbox, rx) = Outbox::channel();
        let svc = WorkflowService::new(db, directory, outbox).unwrap();
        (svc, rx)
    }

    fn local_request() -> CreateLocalLeave {
        CreateLocalLeave {
            date: "2026-09-01".into(),
            out_time: "14:00".into(),
            in_time: "18:00".into(),
            purpose: "bank visit".into(),
            place: "city branch".into(),
            attachment: None,
        }
    }

    fn outstation_request(course: Course, instructor: Option<&str>) -> CreateOutstationLeave {
        CreateOutstationLeave {
            course,
            date_of_leaving: "2026-09-10".into(),
            date_of_returning: "2026-09-14".into(),
            purpose: "home visit".into(),
            place: "jaipur".into(),
            instructor_id: instructor.map(String::from),
            attachment: None,
        }
    }

    fn approve() -> StageDecideRequest {
        StageDecideRequest {
            decision: StageOutcome::Approved,
            reason: None,
            note: None,
            attendance: None,
            leave_balance: None,
        }
    }

    fn reject(reason: &str) -> StageDecideRequest {
        StageDecideRequest {
            decision: StageOutcome::Rejected,
            reason: Some(reason.into()),
            note: None,
            attendance: None,
            leave_balance: None,
        }
    }

    // --- local -------------------------------------------------------------

    #[test]
    fn local_create_and_approve() {
        let (svc, mut rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));
        let office = actor("hostel-1", Role::HostelOffice, None);

        let rec = svc.create_local(&student, local_request()).unwrap();
        assert_eq!(rec.number, "L-00001");
        assert_eq!(rec.status, LocalStatus::Pending);

        let decided = svc
            .decide_local(
                &office,
                &rec.id,
                LocalDecideRequest {
                    decision: LocalStatus::Approved,
                    note: None,
                },
            )
            .unwrap();
        assert_eq!(decided.status, LocalStatus::Approved);
        assert_eq!(decided.decided_by.as_deref(), Some("hostel-1"));

        // Second decision hits the already-decided fast path.
        let err = svc
            .decide_local(
                &office,
                &rec.id,
                LocalDecideRequest {
                    decision: LocalStatus::Denied,
                    note: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // Notices: one to the office, one back to the student.
        let first = rx.try_recv().unwrap();
        assert!(matches!(first, Notice::ApprovalRequested { .. }));
        assert_eq!(first.recipient().id, "hostel-1");
        let second = rx.try_recv().unwrap();
        match second {
            Notice::LeaveResolved { approved, .. } => assert!(approved),
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[test]
    fn local_decide_requires_office_role() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));
        let rec = svc.create_local(&student, local_request()).unwrap();

        let err = svc
            .decide_local(
                &student,
                &rec.id,
                LocalDecideRequest {
                    decision: LocalStatus::Approved,
                    note: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[test]
    fn local_withdraw_rules() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));
        let other = actor("s2", Role::Student, Some("ee"));
        let office = actor("hostel-1", Role::HostelOffice, None);

        let rec = svc.create_local(&student, local_request()).unwrap();
        let err = svc.withdraw_local(&other, &rec.id).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        svc.withdraw_local(&student, &rec.id).unwrap();
        assert!(svc.get_local(&student, &rec.id).is_err());

        let rec = svc.create_local(&student, local_request()).unwrap();
        svc.decide_local(
            &office,
            &rec.id,
            LocalDecideRequest {
                decision: LocalStatus::Approved,
                note: None,
            },
        )
        .unwrap();
        let err = svc.withdraw_local(&student, &rec.id).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn local_validation() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));

        let mut bad = local_request();
        bad.purpose = "   ".into();
        assert!(matches!(
            svc.create_local(&student, bad).unwrap_err(),
            ServiceError::Invalid(_)
        ));

        let mut bad = local_request();
        bad.date = "01-09-2026".into();
        assert!(matches!(
            svc.create_local(&student, bad).unwrap_err(),
            ServiceError::Invalid(_)
        ));

        let mut bad = local_request();
        bad.out_time = "2pm".into();
        assert!(matches!(
            svc.create_local(&student, bad).unwrap_err(),
            ServiceError::Invalid(_)
        ));
    }

    // --- outstation: standard sequence --------------------------------------

    #[test]
    fn outstation_standard_walk() {
        let (svc, mut rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));

        let rec = svc
            .create_outstation(&student, outstation_request(Course::Btech, None))
            .unwrap();
        assert_eq!(rec.number, "OS-00001");
        assert_eq!(rec.current_stage, Stage::OfficeSecretary);

        let rec = svc
            .decide_outstation(&actor("sec-cse", Role::OfficeSecretary, Some("cse")), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::Dugc);

        let rec = svc
            .decide_outstation(&actor("dugc-cse", Role::Dugc, Some("cse")), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::Hod);

        let rec = svc
            .decide_outstation(&actor("hod-cse", Role::Hod, Some("cse")), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::HostelOffice);

        let rec = svc
            .decide_outstation(&actor("hostel-1", Role::HostelOffice, None), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::Completed);
        assert_eq!(rec.final_status, FinalStatus::Approved);
        assert_eq!(rec.stage_status.len(), 4);

        // Creation + three advances notify the next approver; the final
        // approval notifies the student.
        let mut kinds = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            kinds.push(notice);
        }
        assert_eq!(kinds.len(), 5);
        assert_eq!(kinds[0].recipient().id, "sec-cse");
        assert_eq!(kinds[1].recipient().id, "dugc-cse");
        assert_eq!(kinds[2].recipient().id, "hod-cse");
        assert_eq!(kinds[3].recipient().id, "hostel-1");
        match &kinds[4] {
            Notice::LeaveResolved { recipient, approved, .. } => {
                assert_eq!(recipient.id, "s1");
                assert!(*approved);
            }
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[test]
    fn rejection_short_circuits() {
        let (svc, mut rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));

        let rec = svc
            .create_outstation(&student, outstation_request(Course::Btech, None))
            .unwrap();
        svc.decide_outstation(&actor("sec-cse", Role::OfficeSecretary, Some("cse")), &rec.id, approve())
            .unwrap();

        let rec = svc
            .decide_outstation(
                &actor("dugc-cse", Role::Dugc, Some("cse")),
                &rec.id,
                reject("insufficient notice"),
            )
            .unwrap();
        assert_eq!(rec.final_status, FinalStatus::Rejected);
        assert_eq!(rec.current_stage, Stage::Completed);
        let rejection = rec.rejected_by.as_ref().unwrap();
        assert_eq!(rejection.stage, Stage::Dugc);
        assert_eq!(rejection.reason, "insufficient notice");

        // The chain is frozen: nobody can decide any stage now.
        let err = svc
            .decide_outstation(&actor("hod-cse", Role::Hod, Some("cse")), &rec.id, approve())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        while let Ok(notice) = rx.try_recv() {
            if let Notice::LeaveResolved { approved, reason, .. } = notice {
                assert!(!approved);
                assert_eq!(reason.as_deref(), Some("insufficient notice"));
            }
        }
    }

    #[test]
    fn rejection_requires_reason() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));
        let rec = svc
            .create_outstation(&student, outstation_request(Course::Btech, None))
            .unwrap();

        let err = svc
            .decide_outstation(
                &actor("sec-cse", Role::OfficeSecretary, Some("cse")),
                &rec.id,
                reject("   "),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));
    }

    #[test]
    fn wrong_stage_and_wrong_department() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));
        let rec = svc
            .create_outstation(&student, outstation_request(Course::Btech, None))
            .unwrap();

        // Right role, wrong department.
        let err = svc
            .decide_outstation(&actor("sec-ee", Role::OfficeSecretary, Some("ee")), &rec.id, approve())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        // Approver whose stage is later in the sequence.
        let err = svc
            .decide_outstation(&actor("hod-cse", Role::Hod, Some("cse")), &rec.id, approve())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // Role outside the chain entirely.
        let err = svc
            .decide_outstation(&actor("g1", Role::Guard, None), &rec.id, approve())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    // --- outstation: doctoral sequence ---------------------------------------

    #[test]
    fn doctoral_walk_with_enrichments() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));

        let rec = svc
            .create_outstation(&student, outstation_request(Course::Phd, Some("prof-1")))
            .unwrap();
        assert_eq!(rec.current_stage, Stage::Instructor);

        // Unassigned instructor is turned away.
        let err = svc
            .decide_outstation(&actor("prof-2", Role::Instructor, Some("cse")), &rec.id, approve())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let rec = svc
            .decide_outstation(&actor("prof-1", Role::Instructor, Some("cse")), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::OfficeSecretary);

        let mut with_attendance = approve();
        with_attendance.attendance = Some(87.5);
        with_attendance.leave_balance = Some(12);
        let rec = svc
            .decide_outstation(
                &actor("sec-cse", Role::OfficeSecretary, Some("cse")),
                &rec.id,
                with_attendance,
            )
            .unwrap();
        assert_eq!(rec.current_stage, Stage::Dpgc);
        assert_eq!(rec.attendance, Some(87.5));
        assert_eq!(rec.leave_balance, Some(12));

        let rec = svc
            .decide_outstation(&actor("dpgc-cse", Role::Dpgc, Some("cse")), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::Hod);
        let rec = svc
            .decide_outstation(&actor("hod-cse", Role::Hod, Some("cse")), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::Dean);
        let rec = svc
            .decide_outstation(&actor("dean-1", Role::Dean, None), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.current_stage, Stage::HostelOffice);
        let rec = svc
            .decide_outstation(&actor("hostel-1", Role::HostelOffice, None), &rec.id, approve())
            .unwrap();
        assert_eq!(rec.final_status, FinalStatus::Approved);
        assert_eq!(rec.stage_status.len(), 6);
    }

    #[test]
    fn outstation_create_validation() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));

        // Doctoral without instructor.
        let err = svc
            .create_outstation(&student, outstation_request(Course::Phd, None))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));

        // Standard course naming an instructor.
        let err = svc
            .create_outstation(&student, outstation_request(Course::Mtech, Some("prof-1")))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));

        // Instructor id that is not an instructor.
        let err = svc
            .create_outstation(&student, outstation_request(Course::Phd, Some("hod-cse")))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));

        // Returning before leaving.
        let mut bad = outstation_request(Course::Btech, None);
        bad.date_of_returning = "2026-09-01".into();
        let err = svc.create_outstation(&student, bad).unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));

        // Attendance outside the office secretary stage.
        let rec = svc
            .create_outstation(&student, outstation_request(Course::Phd, Some("prof-1")))
            .unwrap();
        let mut bad = approve();
        bad.attendance = Some(90.0);
        let err = svc
            .decide_outstation(&actor("prof-1", Role::Instructor, Some("cse")), &rec.id, bad)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));
    }

    #[test]
    fn queues_are_scoped() {
        let (svc, _rx) = test_service();
        let s1 = actor("s1", Role::Student, Some("cse"));
        let s2 = actor("s2", Role::Student, Some("ee"));

        svc.create_outstation(&s1, outstation_request(Course::Btech, None))
            .unwrap();
        svc.create_outstation(&s2, outstation_request(Course::Btech, None))
            .unwrap();

        let q = svc
            .outstation_queue(
                &actor("sec-cse", Role::OfficeSecretary, Some("cse")),
                &ListParams::default(),
            )
            .unwrap();
        assert_eq!(q.total, 1);
        assert_eq!(q.items[0].student_id, "s1");

        let q = svc
            .outstation_queue(
                &actor("sec-ee", Role::OfficeSecretary, Some("ee")),
                &ListParams::default(),
            )
            .unwrap();
        assert_eq!(q.total, 1);
        assert_eq!(q.items[0].student_id, "s2");

        let err = svc
            .outstation_queue(&actor("g1", Role::Guard, None), &ListParams::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    // --- gate-facing ---------------------------------------------------------

    fn fully_approved_outstation(svc: &WorkflowService) -> OutstationLeave {
        let student = actor("s1", Role::Student, Some("cse"));
        let rec = svc
            .create_outstation(&student, outstation_request(Course::Btech, None))
            .unwrap();
        svc.decide_outstation(&actor("sec-cse", Role::OfficeSecretary, Some("cse")), &rec.id, approve())
            .unwrap();
        svc.decide_outstation(&actor("dugc-cse", Role::Dugc, Some("cse")), &rec.id, approve())
            .unwrap();
        svc.decide_outstation(&actor("hod-cse", Role::Hod, Some("cse")), &rec.id, approve())
            .unwrap();
        svc.decide_outstation(&actor("hostel-1", Role::HostelOffice, None), &rec.id, approve())
            .unwrap()
    }

    #[test]
    fn gatepass_lookup_and_utilization_cycle() {
        let (svc, _rx) = test_service();
        let rec = fully_approved_outstation(&svc);

        let summary = svc.lookup_gatepass(&rec.number).unwrap();
        assert!(summary.approved);
        assert_eq!(summary.utilization, UtilizationStatus::Pending);
        assert_eq!(summary.student_id, "s1");

        svc.begin_utilization(&rec.number, "s1", "2026-09-10T06:00:00+00:00")
            .unwrap();
        let summary = svc.lookup_gatepass(&rec.number).unwrap();
        assert_eq!(summary.utilization, UtilizationStatus::InUse);
        assert!(summary.exit_used);

        // A second exit against the same record is refused.
        let err = svc
            .begin_utilization(&rec.number, "s1", "2026-09-10T07:00:00+00:00")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        svc.complete_utilization(&rec.number, "s1", "2026-09-14T20:00:00+00:00")
            .unwrap();
        let summary = svc.lookup_gatepass(&rec.number).unwrap();
        assert_eq!(summary.utilization, UtilizationStatus::Completed);
    }

    #[test]
    fn utilization_requires_approved_record() {
        let (svc, _rx) = test_service();
        let student = actor("s1", Role::Student, Some("cse"));
        let rec = svc
            .create_outstation(&student, outstation_request(Course::Btech, None))
            .unwrap();

        let err = svc
            .begin_utilization(&rec.number, "s1", "2026-09-10T06:00:00+00:00")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = svc
            .begin_utilization("OS-99999", "s1", "2026-09-10T06:00:00+00:00")
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = svc
            .begin_utilization("nonsense", "s1", "2026-09-10T06:00:00+00:00")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));
    }

    #[test]
    fn utilization_checks_ownership() {
        let (svc, _rx) = test_service();
        let rec = fully_approved_outstation(&svc);

        let err = svc
            .begin_utilization(&rec.number, "s2", "2026-09-10T06:00:00+00:00")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
