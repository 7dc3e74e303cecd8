pub mod consumer;
pub mod health;
pub mod scheduler;

pub use consumer::OrderConsumer;
pub use health::{BusHealthReporter, HealthReporter};
pub use scheduler::PollScheduler;
