use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskhub_errors::{TaskHubError, TaskHubResult};

use crate::models::{Task, TaskPriority, TaskStatus};

/// 任务经broker传输时的JSON信封
///
/// 字段与线格式一一对应：priority/status为整数，created_at/updated_at
/// 为epoch秒（向零截断）。缺失字段取默认值，未知字段忽略，
/// 格式良好的信封解析永不失败。
#[derive(Debug, Serialize, Deserialize)]
struct TaskEnvelope {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    task_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    priority: TaskPriority,
    #[serde(default)]
    status: TaskStatus,
    #[serde(default)]
    retry_count: u32,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
    #[serde(default)]
    worker_id: String,
}

fn default_max_retries() -> u32 {
    3
}

fn from_epoch_seconds(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

impl From<&Task> for TaskEnvelope {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            task_type: task.task_type.clone(),
            payload: task.payload.clone(),
            priority: task.priority,
            status: task.status,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            created_at: task.created_at.timestamp(),
            updated_at: task.updated_at.timestamp(),
            worker_id: task.worker_id.clone(),
        }
    }
}

impl From<TaskEnvelope> for Task {
    fn from(envelope: TaskEnvelope) -> Self {
        Task {
            id: envelope.id,
            task_type: envelope.task_type,
            payload: envelope.payload,
            priority: envelope.priority,
            status: envelope.status,
            retry_count: envelope.retry_count,
            max_retries: envelope.max_retries,
            created_at: from_epoch_seconds(envelope.created_at),
            updated_at: from_epoch_seconds(envelope.updated_at),
            worker_id: envelope.worker_id,
        }
    }
}

/// 序列化任务为信封JSON字符串
pub fn to_json(task: &Task) -> TaskHubResult<String> {
    serde_json::to_string(&TaskEnvelope::from(task))
        .map_err(|e| TaskHubError::Serialization(format!("序列化任务信封失败: {e}")))
}

/// 序列化任务为信封JSON值
pub fn to_json_value(task: &Task) -> TaskHubResult<Value> {
    serde_json::to_value(TaskEnvelope::from(task))
        .map_err(|e| TaskHubError::Serialization(format!("序列化任务信封失败: {e}")))
}

/// 从信封JSON字符串还原任务；格式损坏返回BadEnvelope
pub fn from_json(raw: &str) -> TaskHubResult<Task> {
    let envelope: TaskEnvelope =
        serde_json::from_str(raw).map_err(|e| TaskHubError::bad_envelope(e.to_string()))?;
    Ok(envelope.into())
}
