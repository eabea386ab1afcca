use std::env;
use std::path::Path;

use configparser::ini::Ini;
use serde::{Deserialize, Serialize};
use taskhub_errors::{TaskHubError, TaskHubResult};
use tracing::debug;

/// INI配置读取器
///
/// 支持`[section]`小节、`key = value`、`#`与`;`注释，空白不敏感。
/// 只读访问，按(section, key)取值并提供默认值。
pub struct Settings {
    ini: Ini,
}

impl Settings {
    /// 从文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TaskHubResult<Self> {
        let mut ini = Ini::new();
        ini.load(path.as_ref())
            .map_err(|e| TaskHubError::config_error(format!("读取配置文件失败: {e}")))?;
        Ok(Self { ini })
    }

    /// 从字符串加载
    pub fn load_from_str(content: &str) -> TaskHubResult<Self> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|e| TaskHubError::config_error(format!("解析配置内容失败: {e}")))?;
        Ok(Self { ini })
    }

    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get(section, key)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.ini.get(section, key) {
            Some(value) => value.trim().parse().unwrap_or(default),
            None => default,
        }
    }

    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.ini.get(section, key) {
            Some(value) => matches!(
                value.trim().to_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ),
            None => default,
        }
    }

    pub fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.ini.get(section, key) {
            Some(value) => value.trim().parse().unwrap_or(default),
            None => default,
        }
    }

    pub fn has_key(&self, section: &str, key: &str) -> bool {
        self.ini.get(section, key).is_some()
    }
}

/// Broker连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// 数据库索引(0-15)
    pub db: i64,
    pub pool_size: usize,
    pub connect_timeout_ms: u64,
    pub socket_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            pool_size: 5,
            connect_timeout_ms: 1000,
            socket_timeout_ms: 1000,
        }
    }
}

impl BrokerConfig {
    /// 构建连接URL
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Worker消费模式：FIFO列表或优先级有序集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueMode {
    Fifo,
    Priority,
}

/// Worker运行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_count: usize,
    /// 队列名（不含queue:/priq:前缀）
    pub queue: String,
    pub mode: QueueMode,
    /// brpop阻塞时长
    pub poll_timeout_seconds: u64,
    /// 优先级队列空轮询间隔
    pub poll_interval_ms: u64,
    /// broker不可达时的退避
    pub backoff_ms: u64,
    /// task:<id>镜像的TTL
    pub task_ttl_seconds: u64,
    /// 去重集合所在队列名，空表示不启用去重清理
    pub dedup_queue: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue: "telemetry".to_string(),
            mode: QueueMode::Fifo,
            poll_timeout_seconds: 5,
            poll_interval_ms: 200,
            backoff_ms: 1000,
            task_ttl_seconds: 3600,
            dedup_queue: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub worker: WorkerConfig,
    pub log_level: String,
}

impl AppConfig {
    /// 加载配置；path为None时使用默认值
    pub fn load(path: Option<&str>) -> TaskHubResult<Self> {
        let config = match path {
            Some(path) => {
                debug!("Loading config from {}", path);
                let settings = Settings::load_from_file(path)?;
                Self::from_settings(&settings)
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let password = settings.get_string("broker", "password", "");
        let dedup_queue = settings.get_string("worker", "dedup_queue", "");
        let mode = match settings
            .get_string("worker", "mode", "fifo")
            .to_lowercase()
            .as_str()
        {
            "priority" => QueueMode::Priority,
            _ => QueueMode::Fifo,
        };
        Self {
            broker: BrokerConfig {
                host: settings.get_string("broker", "host", &defaults.broker.host),
                port: settings.get_int("broker", "port", defaults.broker.port as i64) as u16,
                password: if password.is_empty() {
                    None
                } else {
                    Some(password)
                },
                db: settings.get_int("broker", "db", defaults.broker.db),
                pool_size: settings.get_int("broker", "pool_size", defaults.broker.pool_size as i64)
                    as usize,
                connect_timeout_ms: settings.get_int(
                    "broker",
                    "connect_timeout_ms",
                    defaults.broker.connect_timeout_ms as i64,
                ) as u64,
                socket_timeout_ms: settings.get_int(
                    "broker",
                    "socket_timeout_ms",
                    defaults.broker.socket_timeout_ms as i64,
                ) as u64,
            },
            worker: WorkerConfig {
                worker_count: settings.get_int(
                    "worker",
                    "worker_count",
                    defaults.worker.worker_count as i64,
                ) as usize,
                queue: settings.get_string("worker", "queue", &defaults.worker.queue),
                mode,
                poll_timeout_seconds: settings.get_int(
                    "worker",
                    "poll_timeout_seconds",
                    defaults.worker.poll_timeout_seconds as i64,
                ) as u64,
                poll_interval_ms: settings.get_int(
                    "worker",
                    "poll_interval_ms",
                    defaults.worker.poll_interval_ms as i64,
                ) as u64,
                backoff_ms: settings.get_int(
                    "worker",
                    "backoff_ms",
                    defaults.worker.backoff_ms as i64,
                ) as u64,
                task_ttl_seconds: settings.get_int(
                    "worker",
                    "task_ttl_seconds",
                    defaults.worker.task_ttl_seconds as i64,
                ) as u64,
                dedup_queue: if dedup_queue.is_empty() {
                    None
                } else {
                    Some(dedup_queue)
                },
            },
            log_level: settings.get_string("logging", "level", "info"),
        }
    }

    pub fn validate(&self) -> TaskHubResult<()> {
        if self.broker.host.is_empty() {
            return Err(TaskHubError::config_error("broker.host不能为空"));
        }
        if self.broker.port == 0 {
            return Err(TaskHubError::config_error("broker.port不能为0"));
        }
        if self.broker.pool_size == 0 {
            return Err(TaskHubError::config_error("broker.pool_size必须大于0"));
        }
        if self.worker.worker_count == 0 {
            return Err(TaskHubError::config_error("worker.worker_count必须大于0"));
        }
        if self.worker.queue.is_empty() {
            return Err(TaskHubError::config_error("worker.queue不能为空"));
        }
        Ok(())
    }
}

/// 配置加载器，提供带环境变量覆盖的加载入口
pub struct ConfigLoader;

impl ConfigLoader {
    /// 优先级：
    /// 1. 环境变量 TASKHUB_CONFIG_PATH 指定的配置文件
    /// 2. 调用方传入的路径
    /// 3. 默认配置
    pub fn load(path: Option<&str>) -> TaskHubResult<AppConfig> {
        if let Ok(env_path) = env::var("TASKHUB_CONFIG_PATH") {
            return AppConfig::load(Some(&env_path));
        }
        AppConfig::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_INI: &str = r#"
# broker连接
[broker]
host = redis.internal
port = 6380
password = s3cret
db = 2
pool_size = 8

; worker配置
[worker]
worker_count = 2
queue = ingest
mode = priority
dedup_queue = ingest

[logging]
level = debug
"#;

    #[test]
    fn test_settings_accessors_with_defaults() {
        let settings = Settings::load_from_str(SAMPLE_INI).unwrap();
        assert_eq!(settings.get_string("broker", "host", "x"), "redis.internal");
        assert_eq!(settings.get_int("broker", "port", 0), 6380);
        assert_eq!(settings.get_int("broker", "missing", 42), 42);
        assert_eq!(settings.get_string("nope", "nope", "fallback"), "fallback");
        assert!(settings.has_key("worker", "queue"));
        assert!(!settings.has_key("worker", "absent"));
    }

    #[test]
    fn test_bool_and_double_parsing() {
        let settings = Settings::load_from_str(
            "[flags]\nenabled = Yes\ndisabled = off\nratio = 0.75\nbad = abc\n",
        )
        .unwrap();
        assert!(settings.get_bool("flags", "enabled", false));
        assert!(!settings.get_bool("flags", "disabled", true));
        assert!(settings.get_bool("flags", "missing", true));
        assert_eq!(settings.get_double("flags", "ratio", 0.0), 0.75);
        assert_eq!(settings.get_double("flags", "bad", 1.5), 1.5);
    }

    #[test]
    fn test_app_config_from_settings() {
        let settings = Settings::load_from_str(SAMPLE_INI).unwrap();
        let config = AppConfig::from_settings(&settings);
        assert_eq!(config.broker.host, "redis.internal");
        assert_eq!(config.broker.port, 6380);
        assert_eq!(config.broker.password.as_deref(), Some("s3cret"));
        assert_eq!(config.broker.db, 2);
        assert_eq!(config.broker.pool_size, 8);
        assert_eq!(config.worker.worker_count, 2);
        assert_eq!(config.worker.queue, "ingest");
        assert_eq!(config.worker.mode, QueueMode::Priority);
        assert_eq!(config.worker.dedup_queue.as_deref(), Some("ingest"));
        assert_eq!(config.log_level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn test_broker_url_with_and_without_password() {
        let mut broker = BrokerConfig::default();
        assert_eq!(broker.url(), "redis://127.0.0.1:6379/0");
        broker.password = Some("pw".to_string());
        broker.db = 3;
        assert_eq!(broker.url(), "redis://:pw@127.0.0.1:6379/3");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_INI.as_bytes()).unwrap();
        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.broker.host, "redis.internal");
    }

    #[test]
    fn test_load_defaults_when_no_path() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.broker.port, 6379);
        assert_eq!(config.worker.mode, QueueMode::Fifo);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.broker.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.worker.queue.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AppConfig::load(Some("/no/such/taskhub.ini")).unwrap_err();
        assert!(matches!(err, TaskHubError::Configuration(_)));
    }
}
