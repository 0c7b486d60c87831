use std::sync::Arc;

use tokio::sync::broadcast;

use crate::engine::OrderAutomation;
use crate::gateway::MessageGateway;
use crate::models::event::OrderEvent;
use crate::observability::metrics::Metrics;
use crate::store::memory::InMemoryStore;
use crate::store::OrderStore;

pub struct AppState {
    pub store: Arc<InMemoryStore>,
    pub automation: OrderAutomation,
    pub order_events_tx: broadcast::Sender<OrderEvent>,
    pub metrics: Metrics,
    pub session_name: String,
}

impl AppState {
    pub fn new(
        store: Arc<InMemoryStore>,
        gateway: Arc<dyn MessageGateway>,
        session_name: impl Into<String>,
        event_buffer_size: usize,
    ) -> Self {
        let (order_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let metrics = Metrics::new();

        let automation = OrderAutomation::new(
            store.clone(),
            store.clone(),
            gateway,
            order_events_tx.clone(),
            metrics.clone(),
        );

        Self {
            store,
            automation,
            order_events_tx,
            metrics,
            session_name: session_name.into(),
        }
    }

    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        self.automation.orders()
    }
}
