pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod router;
pub mod services;
pub mod venue;

pub use bus::{EventBus, InMemoryBus};
pub use config::AppConfig;
pub use domain::{
    OpenPosition, OrderFill, OrderIntent, OrderRecord, OrderStatus, OrderType, PositionBook, Side,
};
pub use error::{BrokerError, Result};
pub use lifecycle::LifecycleStore;
pub use router::{Instruction, Router};
pub use services::{BusHealthReporter, HealthReporter, OrderConsumer, PollScheduler};
pub use venue::{build_venue, PaperVenue, SubmitKind, SubmitRequest, VenueAdapter, VenueKind};
