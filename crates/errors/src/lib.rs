use thiserror::Error;


/// 任务处理基底的统一错误类型
#[derive(Debug, Error)]
pub enum TaskHubError {
    #[error("Broker不可用: {0}")]
    BrokerUnavailable(String),
    #[error("任务信封解析失败: {0}")]
    BadEnvelope(String),
    #[error("任务类型没有注册处理器: {0}")]
    NoHandler(String),
    #[error("任务执行失败(可重试): {0}")]
    HandlerRecoverable(String),
    #[error("任务执行失败(不可恢复): {0}")]
    HandlerFatal(String),
    #[error("队列已关闭")]
    QueueShutdown,
    #[error("非法状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type TaskHubResult<T> = Result<T, TaskHubError>;

impl TaskHubError {
    pub fn broker_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::BrokerUnavailable(msg.into())
    }
    pub fn bad_envelope<S: Into<String>>(msg: S) -> Self {
        Self::BadEnvelope(msg.into())
    }
    pub fn recoverable<S: Into<String>>(msg: S) -> Self {
        Self::HandlerRecoverable(msg.into())
    }
    pub fn fatal<S: Into<String>>(msg: S) -> Self {
        Self::HandlerFatal(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn invalid_transition<A: ToString, B: ToString>(from: A, to: B) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// 该错误是否计入重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskHubError::BrokerUnavailable(_) | TaskHubError::HandlerRecoverable(_)
        )
    }

    /// 该错误是否直接导致任务失败，不再重试
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskHubError::HandlerFatal(_)
                | TaskHubError::NoHandler(_)
                | TaskHubError::Configuration(_)
                | TaskHubError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for TaskHubError {
    fn from(err: serde_json::Error) -> Self {
        TaskHubError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for TaskHubError {
    fn from(err: anyhow::Error) -> Self {
        TaskHubError::Internal(err.to_string())
    }
}
