//! Broker键空间约定
//!
//! 调度器保留的键形态：`queue:<name>`、`priq:<name>`、`dedup:<name>`、
//! `task:<id>`、`counter:<name>`。

/// FIFO任务队列（list，左推右弹）
pub fn queue(name: &str) -> String {
    format!("queue:{name}")
}

/// 优先级任务队列（sorted set，分数高者先弹出）
pub fn priority_queue(name: &str) -> String {
    format!("priq:{name}")
}

/// 已提交任务指纹集合（set）
pub fn dedup(name: &str) -> String {
    format!("dedup:{name}")
}

/// 任务最新信封的镜像（string，可配TTL）
pub fn task(id: &str) -> String {
    format!("task:{id}")
}

/// 原子计数器（string）
pub fn counter(name: &str) -> String {
    format!("counter:{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(queue("telemetry"), "queue:telemetry");
        assert_eq!(priority_queue("telemetry"), "priq:telemetry");
        assert_eq!(dedup("telemetry"), "dedup:telemetry");
        assert_eq!(task("abc-123"), "task:abc-123");
        assert_eq!(counter("telemetry"), "counter:telemetry");
    }
}
