use std::sync::Arc;

use pulse_broker::MessagePublisher;
use pulse_store::StateStore;

use crate::submit::RequestSubmissionService;

pub struct AppState {
    pub state_store: Arc<dyn StateStore>,
    pub service: RequestSubmissionService,
}

impl AppState {
    pub fn new(
        state_store: Arc<dyn StateStore>,
        publisher: Arc<dyn MessagePublisher>,
        query_topic: impl Into<String>,
    ) -> Self {
        let service = RequestSubmissionService::new(
            Arc::clone(&state_store),
            publisher,
            query_topic,
        );
        Self {
            state_store,
            service,
        }
    }
}
