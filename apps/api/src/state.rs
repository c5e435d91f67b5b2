use std::sync::Arc;

use crate::llm_client::LlmInvoker;
use crate::metrics::visits::VisitTracker;
use crate::repo::PromptRepo;
use crate::workspace::queue::TaskQueue;
use crate::workspace::store::WorkspaceStore;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Everything that talks to a backend sits behind a capability trait so
/// the handlers and workers never see a concrete store.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn PromptRepo>,
    pub workspace: WorkspaceStore,
    pub queue: Arc<dyn TaskQueue>,
    pub visits: Arc<VisitTracker>,
    pub llm: Arc<dyn LlmInvoker>,
}
