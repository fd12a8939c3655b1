use std::sync::Arc;

use tokio::task::JoinError;

use sheetkeeper_events::{Event, EventBus, InMemoryEventBus};
use sheetkeeper_engine::{OrderEnvelope, ReconciliationEngine};
use sheetkeeper_infra::{ConnectionConfig, SheetStore};

pub type OrderBus = Arc<InMemoryEventBus<OrderEnvelope>>;
pub type ApiEngine = ReconciliationEngine<Arc<dyn SheetStore>, OrderBus>;

/// Shared state behind every handler.
#[derive(Debug, Clone)]
pub struct AppServices {
    engine: Arc<ApiEngine>,
}

impl AppServices {
    /// Wire the engine over `store` and start the order notification listener.
    pub fn new(store: Arc<dyn SheetStore>, config: ConnectionConfig) -> Self {
        let bus: OrderBus = Arc::new(InMemoryEventBus::new());
        spawn_notifier(&bus);

        Self {
            engine: Arc::new(ReconciliationEngine::new(store, bus, config)),
        }
    }

    pub fn engine(&self) -> &ApiEngine {
        &self.engine
    }

    /// Run an engine call on the blocking pool.
    ///
    /// Sheet IO and scope locks block the calling thread, so handlers never
    /// call the engine directly from an async task.
    pub async fn run<T, F>(&self, call: F) -> Result<T, JoinError>
    where
        F: FnOnce(&ApiEngine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || call(&engine)).await
    }
}

/// Background subscriber: order events -> delivery notifications.
///
/// Notifications are only logged here; a sender for email or chat hooks in at
/// the same place. The loop ends when the bus is dropped.
fn spawn_notifier(bus: &OrderBus) {
    let sub = bus.subscribe();
    let spawned = std::thread::Builder::new()
        .name("order-notifier".into())
        .spawn(move || {
            while let Ok(env) = sub.recv() {
                tracing::info!(
                    order_id = env.aggregate_id(),
                    event_type = env.payload().event_type(),
                    sequence = env.sequence_number(),
                    "order notification"
                );
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "order notifier not started");
    }
}
