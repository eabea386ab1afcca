use std::sync::Arc;

use sha2::{Digest, Sha256};
use taskhub_core::codec::envelope;
use taskhub_core::{Task, TaskPriority};
use taskhub_errors::{TaskHubError, TaskHubResult};
use taskhub_infrastructure::{keys, BrokerClient};
use tracing::{debug, warn};

pub const DEFAULT_TASK_TTL_SECONDS: u64 = 3600;

/// 任务生产者
///
/// 把任务序列化为信封后推入broker：FIFO语义走`queue:<name>`列表，
/// 优先级语义走`priq:<name>`有序集合。可选地在`dedup:<name>`集合上
/// 做幂等去重。每次提交都会把最新信封镜像到`task:<id>`。
pub struct Producer {
    broker: Arc<dyn BrokerClient>,
    task_ttl_seconds: u64,
}

impl Producer {
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            broker,
            task_ttl_seconds: DEFAULT_TASK_TTL_SECONDS,
        }
    }

    /// 设置task:<id>镜像的TTL，0表示永不过期
    pub fn with_task_ttl(mut self, seconds: u64) -> Self {
        self.task_ttl_seconds = seconds;
        self
    }

    /// FIFO提交：LPUSH到queue:<name>
    pub fn submit(&self, queue: &str, task: &Task) -> TaskHubResult<()> {
        let payload = envelope::to_json(task)?;
        if self.broker.lpush(&keys::queue(queue), &payload) == 0 {
            return Err(TaskHubError::broker_unavailable(format!(
                "向队列 {queue} 推送任务 {} 失败",
                task.id
            )));
        }
        self.mirror(task);
        debug!(task_id = %task.id, queue, "task submitted");
        Ok(())
    }

    /// 优先级提交：ZADD到priq:<name>
    ///
    /// 分数 = 优先级权重 * 1e9 + (1e9 - 到达序号)，到达序号来自
    /// `incr counter:<name>`，保证同优先级内先到先弹。
    pub fn submit_priority(&self, queue: &str, task: &Task) -> TaskHubResult<()> {
        let arrival_seq = self.broker.incr(&keys::counter(queue));
        if arrival_seq == 0 {
            // INCR从1起算，0只会在broker失败时出现
            return Err(TaskHubError::broker_unavailable(format!(
                "获取队列 {queue} 到达序号失败"
            )));
        }
        let score = priority_score(task.priority, arrival_seq);
        let payload = envelope::to_json(task)?;
        if !self.broker.zadd(&keys::priority_queue(queue), score, &payload) {
            return Err(TaskHubError::broker_unavailable(format!(
                "向优先级队列 {queue} 推送任务 {} 失败",
                task.id
            )));
        }
        self.mirror(task);
        debug!(task_id = %task.id, queue, score, "priority task submitted");
        Ok(())
    }

    /// 去重提交
    ///
    /// 先SADD指纹：返回0表示指纹已存在，本次提交被跳过（返回Ok(false)）。
    /// 入队失败时回滚指纹，避免后续提交被永久挡住。
    pub fn submit_deduped(
        &self,
        queue: &str,
        task: &Task,
        fingerprint: &str,
    ) -> TaskHubResult<bool> {
        if self.broker.sadd(&keys::dedup(queue), fingerprint) == 0 {
            debug!(task_id = %task.id, queue, "duplicate fingerprint, submission skipped");
            return Ok(false);
        }
        match self.submit(queue, task) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.broker.srem(&keys::dedup(queue), fingerprint);
                Err(e)
            }
        }
    }

    /// 把任务最新信封写入task:<id>镜像；尽力而为，失败只记日志
    pub fn mirror(&self, task: &Task) {
        let Ok(payload) = envelope::to_json(task) else {
            return;
        };
        if !self
            .broker
            .set(&keys::task(&task.id), &payload, self.task_ttl_seconds)
        {
            warn!(task_id = %task.id, "failed to mirror task state");
        }
    }

    /// 查询task:<id>镜像中的最新任务状态
    pub fn lookup(&self, task_id: &str) -> Option<Task> {
        let raw = self.broker.get(&keys::task(task_id))?;
        envelope::from_json(&raw).ok()
    }

    /// FIFO队列当前深度
    pub fn queue_depth(&self, queue: &str) -> i64 {
        self.broker.llen(&keys::queue(queue))
    }

    /// 优先级队列当前深度
    pub fn priority_queue_depth(&self, queue: &str) -> i64 {
        self.broker.zcard(&keys::priority_queue(queue))
    }
}

/// 优先级分数：权重主导，同权重内到达序号越小分数越高
pub fn priority_score(priority: TaskPriority, arrival_seq: i64) -> f64 {
    priority.weight() * 1e9 + (1e9 - arrival_seq as f64)
}

/// 默认幂等指纹：sha256(type + payload)
pub fn default_fingerprint(task: &Task) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.task_type.as_bytes());
    hasher.update(task.payload.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
