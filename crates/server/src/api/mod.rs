pub mod compile;

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::compile::CompileOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub compiler: Arc<CompileOrchestrator>,
}

impl AppState {
    pub fn new(compiler: CompileOrchestrator) -> Self {
        Self { compiler: Arc::new(compiler) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/api/compile", post(compile::compile_document)).with_state(state)
}
