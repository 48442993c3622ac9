pub mod api;
pub mod model;
pub mod secret;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use gatehouse_core::{Directory, Module, Outbox};
use gatehouse_sql::SqlStore;

use leave::service::WorkflowService;
use service::{GateConfig, GateService};

/// The Gate module — single-use crossing tokens, presence tracking and
/// the exit/entry audit log.
///
/// Depends on the leave module's [`WorkflowService`] to validate bound
/// records and settle their utilization as crossings happen.
pub struct GateModule {
    service: Arc<GateService>,
}

impl GateModule {
    pub fn new(
        db: Arc<dyn SqlStore>,
        workflow: Arc<WorkflowService>,
        directory: Arc<dyn Directory>,
        outbox: Outbox,
    ) -> Result<Self, gatehouse_core::ServiceError> {
        Self::with_config(db, workflow, directory, outbox, GateConfig::default())
    }

    pub fn with_config(
        db: Arc<dyn SqlStore>,
        workflow: Arc<WorkflowService>,
        directory: Arc<dyn Directory>,
        outbox: Outbox,
        config: GateConfig,
    ) -> Result<Self, gatehouse_core::ServiceError> {
        let service = GateService::new(db, workflow, directory, outbox, config)?;
        Ok(Self { service })
    }

    pub fn service(&self) -> &Arc<GateService> {
        &self.service
    }
}

impl Module for GateModule {
    fn name(&self) -> &str {
        "gate"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}
