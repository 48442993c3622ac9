pub mod api;
pub mod model;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use gatehouse_core::{Directory, Module, Outbox};
use gatehouse_sql::SqlStore;

use service::WorkflowService;

/// The Leave module — multi-stage approval workflows for local and
/// outstation leave records.
///
/// Mount this in the server to get record creation, stage-by-stage
/// approval with per-course sequences, withdrawal, and the scoped
/// approver queues. The gate module consumes approved records through
/// [`WorkflowService`] directly.
pub struct LeaveModule {
    service: Arc<WorkflowService>,
}

impl LeaveModule {
    pub fn new(
        db: Arc<dyn SqlStore>,
        directory: Arc<dyn Directory>,
        outbox: Outbox,
    ) -> Result<Self, gatehouse_core::ServiceError> {
        let service = WorkflowService::new(db, directory, outbox)?;
        Ok(Self { service })
    }

    /// The workflow service, for in-process callers such as the gate.
    pub fn service(&self) -> &Arc<WorkflowService> {
        &self.service
    }
}

impl Module for LeaveModule {
    fn name(&self) -> &str {
        "leave"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}
