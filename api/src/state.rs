use std::sync::Arc;

use common::runner::JobTrigger;
use common::store::ConfigStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub trigger: Arc<dyn JobTrigger>,
}

impl AppState {
    pub fn new(store: Arc<ConfigStore>, trigger: Arc<dyn JobTrigger>) -> Self {
        Self { store, trigger }
    }
}
