//! Builders for creating test entities with sensible defaults.

use chrono::{DateTime, Utc};
use taskhub_core::{Task, TaskPriority, TaskStatus, TelemetrySample};

/// Builder for test [`Task`] entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new(
                "telemetry.analyze",
                serde_json::json!({"device_id": "sensor-001"}),
                TaskPriority::Medium,
                3,
            ),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.task.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.task.retry_count = retry_count;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.task.max_retries = max_retries;
        self
    }

    pub fn with_worker_id(mut self, worker_id: &str) -> Self {
        self.task.worker_id = worker_id.to_string();
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for test [`TelemetrySample`] values
pub struct SampleBuilder {
    sample: TelemetrySample,
}

impl SampleBuilder {
    pub fn new() -> Self {
        Self {
            sample: TelemetrySample::new(23.5)
                .with_unit("celsius")
                .with_sequence_id(1),
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.sample.value = value;
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.sample.unit = unit.to_string();
        self
    }

    pub fn with_sequence_id(mut self, sequence_id: u32) -> Self {
        self.sample.sequence_id = sequence_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.sample.timestamp = timestamp;
        self
    }

    pub fn build(self) -> TelemetrySample {
        self.sample
    }
}

impl Default for SampleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
