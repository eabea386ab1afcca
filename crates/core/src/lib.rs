pub mod codec;
pub mod config;
pub mod models;
pub mod utils;

pub use config::{AppConfig, BrokerConfig, ConfigLoader, QueueMode, Settings, WorkerConfig};
pub use models::{Task, TaskPriority, TaskStatus, TelemetrySample};
pub use utils::generate_task_id;
