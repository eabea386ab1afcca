pub mod broker;
pub mod keys;
pub mod memory_broker;
pub mod redis_broker;
pub mod task_queue;

pub use broker::BrokerClient;
pub use memory_broker::MemoryBroker;
pub use redis_broker::RedisBroker;
pub use task_queue::{QueueStats, TaskQueue};
