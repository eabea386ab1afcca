pub mod handler;
pub mod service;

pub use handler::{HandlerRegistry, TaskHandler};
pub use service::{QueueSource, WorkerService, WorkerServiceBuilder, WorkerStats};
