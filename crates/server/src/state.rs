use std::sync::Arc;

use gradeflow_core::{
    Config, Dispatcher, InMemoryTaskQueue, ProblemCatalog, RubricAdvisor, SanitizedConfig,
    TicketStore,
};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    ticket_store: Arc<dyn TicketStore>,
    catalog: Arc<dyn ProblemCatalog>,
    dispatcher: Arc<Dispatcher>,
    queue: Arc<InMemoryTaskQueue>,
    rubric_advisor: Arc<RubricAdvisor>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        ticket_store: Arc<dyn TicketStore>,
        catalog: Arc<dyn ProblemCatalog>,
        dispatcher: Arc<Dispatcher>,
        queue: Arc<InMemoryTaskQueue>,
        rubric_advisor: Arc<RubricAdvisor>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            ticket_store,
            catalog,
            dispatcher,
            queue,
            rubric_advisor,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn ticket_store(&self) -> &Arc<dyn TicketStore> {
        &self.ticket_store
    }

    pub fn catalog(&self) -> &Arc<dyn ProblemCatalog> {
        &self.catalog
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn queue(&self) -> &InMemoryTaskQueue {
        &self.queue
    }

    pub fn rubric_advisor(&self) -> &RubricAdvisor {
        &self.rubric_advisor
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
