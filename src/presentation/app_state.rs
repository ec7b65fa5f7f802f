// Application state for HTTP handlers
use crate::runtime::TrialRunner;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TrialRunner>,
}
