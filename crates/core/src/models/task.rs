use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskhub_errors::{TaskHubError, TaskHubResult};

use crate::utils::generate_task_id;

/// 任务优先级
///
/// 整数值越小优先级越高（HIGH=0），与调度器的排序键一致。
/// 线上JSON以整数编码，越界值按MEDIUM处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn as_i32(self) -> i32 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }

    /// Broker侧有序集合的分数权重
    pub fn weight(self) -> f64 {
        match self {
            TaskPriority::High => 100.0,
            TaskPriority::Medium => 50.0,
            TaskPriority::Low => 10.0,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl From<i32> for TaskPriority {
    fn from(value: i32) -> Self {
        match value {
            0 => TaskPriority::High,
            2 => TaskPriority::Low,
            _ => TaskPriority::Medium,
        }
    }
}

impl From<TaskPriority> for i32 {
    fn from(value: TaskPriority) -> Self {
        value.as_i32()
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::High => "HIGH",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::Low => "LOW",
        };
        write!(f, "{s}")
    }
}

/// 任务状态机
///
/// 合法转换：PENDING→RUNNING、RUNNING→COMPLETED、RUNNING→FAILED、
/// RUNNING→PENDING（重试）、PENDING→CANCELLED、RUNNING→CANCELLED。
/// 线上JSON以整数编码（PENDING=0..CANCELLED=4），越界值按PENDING处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed => 2,
            TaskStatus::Failed => 3,
            TaskStatus::Cancelled => 4,
        }
    }

    /// 终止态不再参与任何转换
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl From<i32> for TaskStatus {
    fn from(value: i32) -> Self {
        match value {
            1 => TaskStatus::Running,
            2 => TaskStatus::Completed,
            3 => TaskStatus::Failed,
            4 => TaskStatus::Cancelled,
            _ => TaskStatus::Pending,
        }
    }
}

impl From<TaskStatus> for i32 {
    fn from(value: TaskStatus) -> Self {
        value.as_i32()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

fn transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Pending)
            | (Pending, Cancelled)
            | (Running, Cancelled)
    )
}

/// 工作单元
///
/// id在创建时生成且不再改变；priority、task_type、max_retries、created_at
/// 创建后不可变。worker_id非空当且仅当status为RUNNING。
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub payload: Value,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub worker_id: String,
}

pub const DEFAULT_MAX_RETRIES: u32 = 3;

impl Task {
    /// 创建新任务：生成UUID，初始状态PENDING
    pub fn new<S: Into<String>>(
        task_type: S,
        payload: Value,
        priority: TaskPriority,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_task_id(),
            task_type: task_type.into(),
            payload,
            priority,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            worker_id: String::new(),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// PENDING→RUNNING，并登记执行它的worker
    pub fn mark_running(&mut self, worker_id: &str) -> TaskHubResult<()> {
        if worker_id.is_empty() {
            return Err(TaskHubError::Internal("worker_id不能为空".to_string()));
        }
        self.transition(TaskStatus::Running)?;
        self.worker_id = worker_id.to_string();
        Ok(())
    }

    /// RUNNING→COMPLETED
    pub fn mark_completed(&mut self) -> TaskHubResult<()> {
        self.transition(TaskStatus::Completed)?;
        self.worker_id.clear();
        Ok(())
    }

    /// RUNNING→FAILED
    pub fn mark_failed(&mut self) -> TaskHubResult<()> {
        self.transition(TaskStatus::Failed)?;
        self.worker_id.clear();
        Ok(())
    }

    /// PENDING/RUNNING→CANCELLED
    pub fn mark_cancelled(&mut self) -> TaskHubResult<()> {
        self.transition(TaskStatus::Cancelled)?;
        self.worker_id.clear();
        Ok(())
    }

    /// 重试：RUNNING→PENDING，计数加一，要求retry_count < max_retries
    pub fn prepare_retry(&mut self) -> TaskHubResult<()> {
        if !self.can_retry() {
            return Err(TaskHubError::recoverable(format!(
                "重试次数已耗尽: {}/{}",
                self.retry_count, self.max_retries
            )));
        }
        self.transition(TaskStatus::Pending)?;
        self.retry_count += 1;
        self.worker_id.clear();
        Ok(())
    }

    fn transition(&mut self, to: TaskStatus) -> TaskHubResult<()> {
        if !transition_allowed(self.status, to) {
            return Err(TaskHubError::invalid_transition(self.status, to));
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// updated_at单调不减
    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
