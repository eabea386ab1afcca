use std::collections::HashMap;
use std::sync::Arc;

use taskhub_core::Task;
use taskhub_errors::TaskHubResult;
use tracing::info;

/// 任务处理器接口
///
/// 按任务类型注册到worker。失败分两类：返回
/// [`taskhub_errors::TaskHubError::HandlerRecoverable`]计入重试，
/// 返回[`taskhub_errors::TaskHubError::HandlerFatal`]直接置FAILED。
/// 处理器自行校验payload schema，payload结构不属于核心契约。
pub trait TaskHandler: Send + Sync {
    /// 处理器负责的任务类型，例如"telemetry.analyze"
    fn name(&self) -> &str;

    /// 执行任务
    fn handle(&self, task: &Task) -> TaskHubResult<()>;
}

/// 按任务类型索引的处理器注册表
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器；同名覆盖
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let name = handler.name().to_string();
        info!("注册任务处理器: {}", name);
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
