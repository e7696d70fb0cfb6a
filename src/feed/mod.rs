// Price collection: bounded history buffer + polling scheduler
pub mod history_buffer;
pub mod scheduler;

pub use history_buffer::{PriceHistoryBuffer, DEFAULT_CAPACITY};
pub use scheduler::{PriceFeedScheduler, RunState, SchedulerConfig};
