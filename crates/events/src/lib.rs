//! Order lifecycle events and their distribution.
//!
//! Events are published only after the corresponding sheet writes committed;
//! consumers (confirmation mailers, dashboards) subscribe through `EventBus`.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
