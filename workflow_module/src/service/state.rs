use std::sync::Arc;

use crate::workflow::{ModuleEffects, WorkflowEngine};

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) engine: Arc<WorkflowEngine<ModuleEffects>>,
}
