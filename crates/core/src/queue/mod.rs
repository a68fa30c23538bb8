//! Task queue: at-least-once delivery of subtask messages.

mod config;
mod memory;
mod retry;
mod types;

pub use config::QueueConfig;
pub use memory::InMemoryTaskQueue;
pub use retry::RetryPolicy;
pub use types::{HandlerError, QueueError, QueueStatus, SubtaskHandler, SubtaskMessage, TaskQueue};
