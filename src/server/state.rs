//! Shared state handed to every request handler

use std::sync::Arc;

use crate::collector::Collector;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,

    /// Path the landing page links to
    pub telemetry_path: String,
}

impl AppState {
    pub fn new(collector: Arc<Collector>, telemetry_path: impl Into<String>) -> Self {
        Self {
            collector,
            telemetry_path: telemetry_path.into(),
        }
    }
}
