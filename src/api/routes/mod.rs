//! API route modules.

use std::sync::Arc;

use crate::pipeline::{Dispatcher, JobStore};

pub mod jobs;
pub mod triggers;

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn JobStore>,
}
