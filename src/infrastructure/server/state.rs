use crate::application::dispatch::ToolDispatcher;
use crate::application::orchestrator::Orchestrator;
use crate::infrastructure::model::ModelProvider;
use std::sync::Arc;

pub(crate) struct ServerState<P: ModelProvider> {
    orchestrator: Arc<Orchestrator<P>>,
}

impl<P: ModelProvider> ServerState<P> {
    pub(crate) fn new(orchestrator: Arc<Orchestrator<P>>) -> Self {
        Self { orchestrator }
    }

    pub(crate) fn orchestrator(&self) -> Arc<Orchestrator<P>> {
        Arc::clone(&self.orchestrator)
    }

    pub(crate) fn dispatcher(&self) -> Arc<ToolDispatcher> {
        self.orchestrator.dispatcher()
    }
}
