use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use taskhub_core::{Task, TaskPriority};
use tracing::debug;

/// 进程内优先级任务队列
///
/// 多生产者/多消费者、有界、阻塞式。排序键为(优先级, 入队时间, 入队序号)，
/// 高优先级先出，同优先级内按FIFO。一把互斥锁保护全部内部状态，
/// not_empty/not_full两个条件变量分别唤醒消费者与生产者；
/// 等待被唤醒后重新检查谓词，虚假唤醒会继续等待。
///
/// 关闭语义：shutdown置位后广播两个条件变量，阻塞中的enqueue返回false、
/// dequeue在队列排空后返回None。Drop时自动触发shutdown。
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    not_full: Condvar,
    /// 0表示无界（不推荐）
    max_capacity: usize,
}

pub const DEFAULT_CAPACITY: usize = 10_000;

struct QueueInner {
    heap: BinaryHeap<QueueEntry>,
    /// 按优先级维护的精确计数，供get_stats使用
    priority_counts: [usize; 3],
    next_seq: u64,
    shutdown: bool,
}

/// 队列条目：任务加上入队时刻与单调序号
///
/// enqueue_time只用作同优先级内的FIFO决胜；序号保证同一时刻入队的
/// 任务也有确定性的先后关系。
struct QueueEntry {
    task: Task,
    enqueue_time: Instant,
    seq: u64,
}

impl QueueEntry {
    fn key(&self) -> (TaskPriority, Instant, u64) {
        (self.task.priority, self.enqueue_time, self.seq)
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap是大顶堆，反转比较让最小排序键位于堆顶
        other.key().cmp(&self.key())
    }
}

/// 队列统计快照
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub current_size: usize,
    pub capacity: usize,
    /// 百分比，无界队列恒为0
    pub utilization: f64,
    pub priority_breakdown: PriorityBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                priority_counts: [0; 3],
                next_seq: 0,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            max_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 入队；队列满时最多等待timeout
    ///
    /// timeout为零表示不等待。返回false表示整个等待期内队列都是满的，
    /// 或队列已经关闭。
    pub fn enqueue(&self, task: Task, timeout: Duration) -> bool {
        let mut inner = self.lock();
        if inner.shutdown {
            return false;
        }
        if self.max_capacity > 0 && inner.heap.len() >= self.max_capacity {
            if timeout.is_zero() {
                return false;
            }
            let deadline = Instant::now() + timeout;
            while inner.heap.len() >= self.max_capacity {
                if inner.shutdown {
                    return false;
                }
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                let (guard, _) = self
                    .not_full
                    .wait_timeout(inner, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                inner = guard;
            }
            if inner.shutdown {
                return false;
            }
        }

        inner.priority_counts[task.priority.as_i32() as usize] += 1;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(QueueEntry {
            task,
            enqueue_time: Instant::now(),
            seq,
        });
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// 出队；队列空时最多等待timeout
    ///
    /// 返回排序最前的任务。timeout为零表示不等待。队列关闭后仍可排空
    /// 剩余任务，排空后返回None。
    pub fn dequeue(&self, timeout: Duration) -> Option<Task> {
        let mut inner = self.lock();
        if inner.heap.is_empty() {
            if timeout.is_zero() {
                return None;
            }
            let deadline = Instant::now() + timeout;
            while inner.heap.is_empty() {
                if inner.shutdown {
                    return None;
                }
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                let (guard, _) = self
                    .not_empty
                    .wait_timeout(inner, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                inner = guard;
            }
        }

        let entry = inner.heap.pop()?;
        inner.priority_counts[entry.task.priority.as_i32() as usize] -= 1;
        drop(inner);
        self.not_full.notify_one();
        Some(entry.task)
    }

    /// 查看下一个将被弹出的任务快照，不移除
    ///
    /// 返回值是建议性的：并发消费者可能在读取之后立刻弹走它。
    pub fn peek(&self) -> Option<Task> {
        let inner = self.lock();
        inner.heap.peek().map(|entry| entry.task.clone())
    }

    pub fn size(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    pub fn full(&self) -> bool {
        self.max_capacity > 0 && self.lock().heap.len() >= self.max_capacity
    }

    pub fn capacity(&self) -> usize {
        self.max_capacity
    }

    /// 清空全部任务并唤醒所有等待的生产者
    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.heap.len();
        inner.heap.clear();
        inner.priority_counts = [0; 3];
        drop(inner);
        self.not_full.notify_all();
        if dropped > 0 {
            debug!("cleared {} tasks from queue", dropped);
        }
    }

    pub fn get_stats(&self) -> QueueStats {
        let inner = self.lock();
        let current_size = inner.heap.len();
        let utilization = if self.max_capacity > 0 {
            current_size as f64 * 100.0 / self.max_capacity as f64
        } else {
            0.0
        };
        QueueStats {
            current_size,
            capacity: self.max_capacity,
            utilization,
            priority_breakdown: PriorityBreakdown {
                high: inner.priority_counts[0],
                medium: inner.priority_counts[1],
                low: inner.priority_counts[2],
            },
        }
    }

    /// 触发关闭：置位latch并广播两个条件变量，阻塞中的调用方立即返回
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if inner.shutdown {
            return;
        }
        inner.shutdown = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        debug!("task queue shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn task(id: &str, priority: TaskPriority) -> Task {
        let mut task = Task::new("test", json!({}), priority, 3);
        task.id = id.to_string();
        task
    }

    const NO_WAIT: Duration = Duration::ZERO;

    #[test]
    fn test_default_construction() {
        let queue = TaskQueue::new();
        assert_eq!(queue.size(), 0);
        assert!(queue.empty());
        assert!(!queue.full());
        assert_eq!(queue.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_enqueue_dequeue_basic() {
        let queue = TaskQueue::new();
        assert!(queue.enqueue(task("t1", TaskPriority::Medium), NO_WAIT));
        assert_eq!(queue.size(), 1);
        let popped = queue.dequeue(NO_WAIT).unwrap();
        assert_eq!(popped.id, "t1");
        assert!(queue.empty());
    }

    #[test]
    fn test_priority_ordering_scenario() {
        let queue = TaskQueue::new();
        queue.enqueue(task("l1", TaskPriority::Low), NO_WAIT);
        queue.enqueue(task("h1", TaskPriority::High), NO_WAIT);
        queue.enqueue(task("m1", TaskPriority::Medium), NO_WAIT);
        queue.enqueue(task("h2", TaskPriority::High), NO_WAIT);
        queue.enqueue(task("l2", TaskPriority::Low), NO_WAIT);

        let order: Vec<String> = (0..5)
            .map(|_| queue.dequeue(NO_WAIT).unwrap().id)
            .collect();
        assert_eq!(order, ["h1", "h2", "m1", "l1", "l2"]);
    }

    #[test]
    fn test_fifo_within_same_priority() {
        let queue = TaskQueue::new();
        for id in ["h1", "h2", "h3"] {
            queue.enqueue(task(id, TaskPriority::High), NO_WAIT);
            thread::sleep(Duration::from_millis(2));
        }
        let order: Vec<String> = (0..3)
            .map(|_| queue.dequeue(NO_WAIT).unwrap().id)
            .collect();
        assert_eq!(order, ["h1", "h2", "h3"]);
    }

    #[test]
    fn test_same_instant_ties_are_deterministic() {
        // 不做sleep，靠入队序号决胜
        let queue = TaskQueue::new();
        for i in 0..50 {
            queue.enqueue(task(&format!("t{i}"), TaskPriority::Medium), NO_WAIT);
        }
        for i in 0..50 {
            assert_eq!(queue.dequeue(NO_WAIT).unwrap().id, format!("t{i}"));
        }
    }

    #[test]
    fn test_dequeue_empty_returns_immediately() {
        let queue = TaskQueue::new();
        let started = Instant::now();
        assert!(queue.dequeue(NO_WAIT).is_none());
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_dequeue_timeout_expires_empty() {
        let queue = TaskQueue::new();
        let started = Instant::now();
        assert!(queue.dequeue(Duration::from_millis(100)).is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(90));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_enqueue_full_returns_false_immediately() {
        let queue = TaskQueue::with_capacity(2);
        assert!(queue.enqueue(task("a", TaskPriority::Medium), NO_WAIT));
        assert!(queue.enqueue(task("b", TaskPriority::Medium), NO_WAIT));
        assert!(queue.full());
        let started = Instant::now();
        assert!(!queue.enqueue(task("c", TaskPriority::Medium), NO_WAIT));
        assert!(started.elapsed() < Duration::from_millis(10));
        assert_eq!(queue.size(), 2);
    }

    #[test]
    fn test_bounded_backpressure_scenario() {
        let queue = Arc::new(TaskQueue::with_capacity(3));
        for i in 0..3 {
            assert!(queue.enqueue(task(&format!("t{i}"), TaskPriority::Medium), NO_WAIT));
        }
        assert!(!queue.enqueue(task("t3", TaskPriority::Medium), NO_WAIT));

        // 消费者100ms后腾出一个位置
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                queue.dequeue(NO_WAIT)
            })
        };

        let started = Instant::now();
        let accepted = queue.enqueue(task("t4", TaskPriority::Medium), Duration::from_millis(500));
        let elapsed = started.elapsed();
        assert!(accepted);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500));
        assert!(consumer.join().unwrap().is_some());
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let queue = Arc::new(TaskQueue::with_capacity(4));
        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = Arc::clone(&queue);
            producers.push(thread::spawn(move || {
                for i in 0..20 {
                    queue.enqueue(
                        task(&format!("p{p}-{i}"), TaskPriority::Medium),
                        Duration::from_millis(50),
                    );
                }
            }));
        }
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut count = 0;
                while count < 60 {
                    if queue.dequeue(Duration::from_millis(20)).is_some() {
                        count += 1;
                    } else if queue.empty() {
                        break;
                    }
                    assert!(queue.size() <= queue.capacity());
                }
            })
        };
        for producer in producers {
            producer.join().unwrap();
        }
        consumer.join().unwrap();
        assert!(queue.size() <= queue.capacity());
    }

    #[test]
    fn test_blocking_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(TaskQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(queue.enqueue(task("t", TaskPriority::High), NO_WAIT));
        let popped = consumer.join().unwrap();
        assert_eq!(popped.unwrap().id, "t");
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = TaskQueue::new();
        queue.enqueue(task("h", TaskPriority::High), NO_WAIT);
        queue.enqueue(task("l", TaskPriority::Low), NO_WAIT);
        assert_eq!(queue.peek().unwrap().id, "h");
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.dequeue(NO_WAIT).unwrap().id, "h");
    }

    #[test]
    fn test_peek_empty() {
        let queue = TaskQueue::new();
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_clear_resets_state_and_wakes_producers() {
        let queue = Arc::new(TaskQueue::with_capacity(1));
        queue.enqueue(task("a", TaskPriority::High), NO_WAIT);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.enqueue(task("b", TaskPriority::Medium), Duration::from_secs(5))
            })
        };
        thread::sleep(Duration::from_millis(50));
        queue.clear();
        assert!(producer.join().unwrap());
        assert_eq!(queue.size(), 1);
        let stats = queue.get_stats();
        assert_eq!(stats.priority_breakdown.medium, 1);
        assert_eq!(stats.priority_breakdown.high, 0);
    }

    #[test]
    fn test_stats_accuracy() {
        let queue = TaskQueue::with_capacity(10);
        queue.enqueue(task("h1", TaskPriority::High), NO_WAIT);
        queue.enqueue(task("h2", TaskPriority::High), NO_WAIT);
        queue.enqueue(task("m1", TaskPriority::Medium), NO_WAIT);
        queue.enqueue(task("l1", TaskPriority::Low), NO_WAIT);

        let stats = queue.get_stats();
        assert_eq!(stats.current_size, 4);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.utilization, 40.0);
        assert_eq!(stats.priority_breakdown.high, 2);
        assert_eq!(stats.priority_breakdown.medium, 1);
        assert_eq!(stats.priority_breakdown.low, 1);

        queue.dequeue(NO_WAIT);
        assert_eq!(queue.get_stats().priority_breakdown.high, 1);
    }

    #[test]
    fn test_stats_serialize_to_json() {
        let queue = TaskQueue::with_capacity(4);
        queue.enqueue(task("t", TaskPriority::High), NO_WAIT);
        let value = serde_json::to_value(queue.get_stats()).unwrap();
        assert_eq!(value["current_size"], 1);
        assert_eq!(value["priority_breakdown"]["high"], 1);
    }

    #[test]
    fn test_unbounded_queue_never_full() {
        let queue = TaskQueue::with_capacity(0);
        for i in 0..100 {
            assert!(queue.enqueue(task(&format!("t{i}"), TaskPriority::Low), NO_WAIT));
        }
        assert!(!queue.full());
        assert_eq!(queue.get_stats().utilization, 0.0);
    }

    #[test]
    fn test_shutdown_rejects_enqueue_and_drains_dequeue() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a", TaskPriority::Medium), NO_WAIT);
        queue.shutdown();
        assert!(!queue.enqueue(task("b", TaskPriority::Medium), NO_WAIT));
        // 关闭后仍允许排空
        assert_eq!(queue.dequeue(NO_WAIT).unwrap().id, "a");
        assert!(queue.dequeue(NO_WAIT).is_none());
    }

    #[test]
    fn test_shutdown_unblocks_waiting_consumer() {
        let queue = Arc::new(TaskQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue(Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        queue.shutdown();
        assert!(consumer.join().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_shutdown_unblocks_waiting_producer() {
        let queue = Arc::new(TaskQueue::with_capacity(1));
        queue.enqueue(task("a", TaskPriority::Medium), NO_WAIT);
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.enqueue(task("b", TaskPriority::Medium), Duration::from_secs(30))
            })
        };
        thread::sleep(Duration::from_millis(50));
        queue.shutdown();
        assert!(!producer.join().unwrap());
    }

    #[test]
    fn test_concurrent_producers_consumers_total_order() {
        let queue = Arc::new(TaskQueue::with_capacity(64));
        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = Arc::clone(&queue);
            producers.push(thread::spawn(move || {
                for i in 0..25 {
                    let priority = match i % 3 {
                        0 => TaskPriority::High,
                        1 => TaskPriority::Medium,
                        _ => TaskPriority::Low,
                    };
                    assert!(queue.enqueue(
                        task(&format!("p{p}-{i}"), priority),
                        Duration::from_secs(5)
                    ));
                }
            }));
        }
        for producer in producers {
            producer.join().unwrap();
        }

        // 单消费者排空，验证出队序列与(priority, enqueue_time)全序一致
        let mut last_priority = TaskPriority::High;
        let mut count = 0;
        while let Some(task) = queue.dequeue(NO_WAIT) {
            assert!(task.priority >= last_priority);
            last_priority = task.priority;
            count += 1;
        }
        assert_eq!(count, 100);
    }
}
