use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use taskhub_core::codec::envelope;
use taskhub_core::config::{QueueMode, WorkerConfig};
use taskhub_core::{generate_task_id, Task};
use taskhub_dispatcher::{default_fingerprint, Producer};
use taskhub_errors::{TaskHubError, TaskHubResult};
use taskhub_infrastructure::{keys, BrokerClient};
use tracing::{debug, error, info, warn};

use crate::handler::{HandlerRegistry, TaskHandler};

/// Worker消费的队列来源
#[derive(Debug, Clone)]
pub enum QueueSource {
    /// queue:<name>列表，brpop阻塞弹出
    Fifo(String),
    /// priq:<name>有序集合，zpopmax轮询
    Priority(String),
}

impl QueueSource {
    pub fn from_config(config: &WorkerConfig) -> Self {
        match config.mode {
            QueueMode::Fifo => QueueSource::Fifo(config.queue.clone()),
            QueueMode::Priority => QueueSource::Priority(config.queue.clone()),
        }
    }
}

/// Worker处理统计
#[derive(Debug, Default, Clone, Serialize)]
pub struct WorkerStats {
    pub tasks_processed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub tasks_cancelled: u64,
    /// 无法解析而被丢弃的信封数
    pub envelopes_dropped: u64,
    pub task_type_counts: HashMap<String, u64>,
}

/// WorkerService构建器
pub struct WorkerServiceBuilder {
    worker_id: Option<String>,
    broker: Arc<dyn BrokerClient>,
    source: QueueSource,
    registry: HandlerRegistry,
    worker_count: usize,
    poll_timeout_seconds: u64,
    poll_interval: Duration,
    backoff: Duration,
    task_ttl_seconds: u64,
    dedup_queue: Option<String>,
}

impl WorkerServiceBuilder {
    pub fn new(broker: Arc<dyn BrokerClient>, source: QueueSource) -> Self {
        Self {
            worker_id: None,
            broker,
            source,
            registry: HandlerRegistry::new(),
            worker_count: 4,
            poll_timeout_seconds: 5,
            poll_interval: Duration::from_millis(200),
            backoff: Duration::from_millis(1000),
            task_ttl_seconds: 3600,
            dedup_queue: None,
        }
    }

    /// 按配置覆盖运行参数
    pub fn with_config(mut self, config: &WorkerConfig) -> Self {
        self.worker_count = config.worker_count;
        self.poll_timeout_seconds = config.poll_timeout_seconds;
        self.poll_interval = Duration::from_millis(config.poll_interval_ms);
        self.backoff = Duration::from_millis(config.backoff_ms);
        self.task_ttl_seconds = config.task_ttl_seconds;
        self.dedup_queue = config.dedup_queue.clone();
        self
    }

    pub fn worker_id<S: Into<String>>(mut self, worker_id: S) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn poll_timeout_seconds(mut self, seconds: u64) -> Self {
        self.poll_timeout_seconds = seconds;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn task_ttl_seconds(mut self, seconds: u64) -> Self {
        self.task_ttl_seconds = seconds;
        self
    }

    /// 启用终态清理指纹的去重集合（约定使用默认指纹）
    pub fn dedup_queue<S: Into<String>>(mut self, queue: S) -> Self {
        self.dedup_queue = Some(queue.into());
        self
    }

    /// 注册任务处理器
    pub fn register_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.registry.register(handler);
        self
    }

    pub fn build(self) -> WorkerService {
        let worker_id = self.worker_id.unwrap_or_else(default_worker_id);
        let producer =
            Producer::new(Arc::clone(&self.broker)).with_task_ttl(self.task_ttl_seconds);
        WorkerService {
            context: Arc::new(WorkerContext {
                worker_id,
                broker: self.broker,
                producer,
                registry: self.registry,
                source: self.source,
                poll_timeout_seconds: self.poll_timeout_seconds,
                poll_interval: self.poll_interval,
                backoff: self.backoff,
                dedup_queue: self.dedup_queue,
                cancelled: AtomicBool::new(false),
                stats: Mutex::new(WorkerStats::default()),
            }),
            worker_count: self.worker_count,
            threads: Mutex::new(Vec::new()),
        }
    }
}

fn default_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}-{}", host, &generate_task_id()[..8])
}

/// Worker线程池
///
/// 每个线程循环：弹出任务、解析信封、PENDING→RUNNING、按类型分发、
/// 记录终态。broker不可达时退避；停机信号在任务间协作式检查，
/// 执行中的任务不被打断。
pub struct WorkerService {
    context: Arc<WorkerContext>,
    worker_count: usize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

struct WorkerContext {
    worker_id: String,
    broker: Arc<dyn BrokerClient>,
    producer: Producer,
    registry: HandlerRegistry,
    source: QueueSource,
    poll_timeout_seconds: u64,
    poll_interval: Duration,
    backoff: Duration,
    dedup_queue: Option<String>,
    cancelled: AtomicBool,
    stats: Mutex<WorkerStats>,
}

impl WorkerService {
    /// 启动worker线程
    pub fn start(&self) {
        let mut threads = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !threads.is_empty() {
            warn!("worker服务已在运行");
            return;
        }
        self.context.cancelled.store(false, Ordering::SeqCst);
        info!(
            worker_id = %self.context.worker_id,
            count = self.worker_count,
            "启动worker线程池"
        );
        for index in 0..self.worker_count {
            let context = Arc::clone(&self.context);
            let spawned = thread::Builder::new()
                .name(format!("taskhub-worker-{index}"))
                .spawn(move || context.run_loop(index));
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => error!("创建worker线程失败: {e}"),
            }
        }
    }

    /// 停止：置协作取消标志并等待线程退出
    pub fn stop(&self) {
        self.context.cancelled.store(true, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = {
            let mut threads = self
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            threads.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        info!(worker_id = %self.context.worker_id, "worker线程池已停止");
    }

    pub fn is_running(&self) -> bool {
        !self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn worker_id(&self) -> &str {
        &self.context.worker_id
    }

    pub fn stats(&self) -> WorkerStats {
        self.context
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 处理至多一个任务，返回是否做了工作；测试与嵌入式轮询使用
    pub fn run_once(&self) -> bool {
        self.context.poll_and_execute()
    }
}

impl WorkerContext {
    fn run_loop(&self, index: usize) {
        debug!(worker = %self.worker_id, index, "worker线程启动");
        while !self.cancelled.load(Ordering::SeqCst) {
            self.poll_and_execute();
        }
        debug!(worker = %self.worker_id, index, "worker线程退出");
    }

    fn pop(&self) -> Option<String> {
        match &self.source {
            QueueSource::Fifo(name) => self
                .broker
                .brpop(&keys::queue(name), self.poll_timeout_seconds),
            QueueSource::Priority(name) => self
                .broker
                .zpopmax(&keys::priority_queue(name))
                .map(|(member, _score)| member),
        }
    }

    fn poll_and_execute(&self) -> bool {
        let Some(raw) = self.pop() else {
            // 空轮询是正常的空闲路径；优先级队列没有阻塞原语，小睡一下
            if matches!(self.source, QueueSource::Priority(_))
                && !self.cancelled.load(Ordering::SeqCst)
            {
                thread::sleep(self.poll_interval);
            }
            // 区分"队列空"与"broker不可达"，后者退避
            if !self.broker.ping() && !self.cancelled.load(Ordering::SeqCst) {
                warn!("broker不可达，退避 {:?}", self.backoff);
                thread::sleep(self.backoff);
            }
            return false;
        };

        let mut task = match envelope::from_json(&raw) {
            Ok(task) => task,
            Err(e) => {
                // 信封损坏：丢弃不重试
                warn!(error = %e, "丢弃无法解析的任务信封");
                self.with_stats(|stats| stats.envelopes_dropped += 1);
                return false;
            }
        };

        if self.cancelled.load(Ordering::SeqCst) {
            // 停机信号已到：已弹出但未开始的任务转为CANCELLED
            if task.mark_cancelled().is_ok() {
                self.finish(&task);
                self.with_stats(|stats| stats.tasks_cancelled += 1);
            }
            return false;
        }

        if let Err(e) = task.mark_running(&self.worker_id) {
            warn!(task_id = %task.id, error = %e, "任务状态异常，丢弃");
            return false;
        }
        self.producer.mirror(&task);
        debug!(task_id = %task.id, task_type = %task.task_type, "开始执行任务");

        let outcome = match self.registry.get(&task.task_type) {
            Some(handler) => handler.handle(&task),
            None => Err(TaskHubError::NoHandler(task.task_type.clone())),
        };
        self.record_outcome(task, outcome);
        true
    }

    fn record_outcome(&self, mut task: Task, outcome: TaskHubResult<()>) {
        let task_type = task.task_type.clone();
        match outcome {
            Ok(()) => {
                if let Err(e) = task.mark_completed() {
                    error!(task_id = %task.id, error = %e, "记录完成状态失败");
                    return;
                }
                self.finish(&task);
                self.with_stats(|stats| {
                    stats.tasks_processed += 1;
                    *stats.task_type_counts.entry(task_type).or_insert(0) += 1;
                });
            }
            Err(TaskHubError::HandlerRecoverable(reason)) if task.can_retry() => {
                warn!(
                    task_id = %task.id,
                    retry = task.retry_count + 1,
                    max_retries = task.max_retries,
                    "任务可重试失败: {reason}"
                );
                if let Err(e) = task.prepare_retry() {
                    error!(task_id = %task.id, error = %e, "准备重试失败");
                    return;
                }
                if let Err(e) = self.requeue(&task) {
                    // 重新入队失败则置FAILED，避免任务凭空消失
                    error!(task_id = %task.id, error = %e, "重新入队失败，任务置为FAILED");
                    let _ = task.mark_running(&self.worker_id);
                    let _ = task.mark_failed();
                    self.finish(&task);
                    self.with_stats(|stats| stats.tasks_failed += 1);
                    return;
                }
                self.with_stats(|stats| stats.tasks_retried += 1);
            }
            Err(e) => {
                // 重试耗尽、致命失败或没有处理器
                error!(task_id = %task.id, error = %e, "任务执行失败");
                if task.mark_failed().is_err() {
                    return;
                }
                self.finish(&task);
                self.with_stats(|stats| stats.tasks_failed += 1);
            }
        }
    }

    /// 按来源语义重新入队
    fn requeue(&self, task: &Task) -> TaskHubResult<()> {
        match &self.source {
            QueueSource::Fifo(name) => self.producer.submit(name, task),
            QueueSource::Priority(name) => self.producer.submit_priority(name, task),
        }
    }

    /// 终态落账：更新task:<id>镜像，清理去重指纹
    fn finish(&self, task: &Task) {
        self.producer.mirror(task);
        if task.is_terminal() {
            if let Some(dedup) = &self.dedup_queue {
                self.broker
                    .srem(&keys::dedup(dedup), &default_fingerprint(task));
            }
        }
    }

    fn with_stats<F: FnOnce(&mut WorkerStats)>(&self, update: F) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }
}
