//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use flyer_core::ports::{Collaborators, UserDirectory};
use flyer_core::{FlyerService, PlacementService, WorkflowService};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub flyers: FlyerService,
    pub placement: PlacementService,
    pub workflow: WorkflowService,
    pub users: Arc<dyn UserDirectory>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds every core service over the same set of adapters.
    pub fn new(ports: Collaborators, config: Arc<Config>) -> Self {
        Self {
            users: ports.users.clone(),
            flyers: FlyerService::new(ports.clone(), config.view_options()),
            placement: PlacementService::new(ports.clone(), config.placement),
            workflow: WorkflowService::new(ports, config.workflow),
            config,
        }
    }
}
