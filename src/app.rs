use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use taskhub_core::config::ConfigLoader;
use taskhub_core::{Task, TelemetrySample};
use taskhub_errors::{TaskHubError, TaskHubResult};
use taskhub_infrastructure::{BrokerClient, RedisBroker};
use taskhub_worker::{QueueSource, TaskHandler, WorkerService, WorkerServiceBuilder};
use tracing::info;

/// 应用装配：配置、broker连接与worker线程池
pub struct App {
    service: WorkerService,
}

impl App {
    pub fn build(config_path: Option<&str>) -> Result<Self> {
        let config = ConfigLoader::load(config_path).context("加载配置失败")?;
        info!(
            broker = %format!("{}:{}", config.broker.host, config.broker.port),
            queue = %config.worker.queue,
            "taskhub启动中"
        );

        let broker: Arc<dyn BrokerClient> =
            Arc::new(RedisBroker::connect(config.broker.clone()).context("连接broker失败")?);

        let service = WorkerServiceBuilder::new(broker, QueueSource::from_config(&config.worker))
            .with_config(&config.worker)
            .register_handler(Arc::new(AnalyzeHandler))
            .build();

        Ok(Self { service })
    }

    /// 启动worker并阻塞到收到Ctrl-C
    pub fn run(&self) -> Result<()> {
        self.service.start();
        info!(worker_id = %self.service.worker_id(), "worker已启动，Ctrl-C退出");

        let (tx, rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })
        .context("注册退出信号处理失败")?;
        let _ = rx.recv();

        info!("收到退出信号，正在停止worker");
        self.service.stop();
        let stats = self.service.stats();
        info!(
            processed = stats.tasks_processed,
            failed = stats.tasks_failed,
            retried = stats.tasks_retried,
            "worker已停止"
        );
        Ok(())
    }
}

/// 内置的遥测分析处理器
///
/// payload约定: {"samples": ["<base16编码的二进制采样>", ...]} 或
/// {"values": [<f64>, ...]}。只做计数与均值统计并写日志，
/// 更重的分析（阈值告警、聚合、入库）由外部处理器实现。
struct AnalyzeHandler;

impl AnalyzeHandler {
    fn decode_samples(task: &Task) -> TaskHubResult<Vec<f64>> {
        if let Some(values) = task.payload.get("values").and_then(|v| v.as_array()) {
            return Ok(values.iter().filter_map(|v| v.as_f64()).collect());
        }
        let samples = task
            .payload
            .get("samples")
            .and_then(|v| v.as_array())
            .ok_or_else(|| TaskHubError::fatal("payload缺少values或samples字段"))?;
        let mut values = Vec::with_capacity(samples.len());
        for entry in samples {
            let encoded = entry
                .as_str()
                .ok_or_else(|| TaskHubError::fatal("samples元素必须是字符串"))?;
            let bytes = decode_base16(encoded)
                .ok_or_else(|| TaskHubError::fatal("samples元素不是合法的base16"))?;
            let sample: TelemetrySample = taskhub_core::codec::sample::decode(&bytes)
                .ok_or_else(|| TaskHubError::fatal("无法解码二进制采样"))?;
            values.push(sample.value);
        }
        Ok(values)
    }
}

impl TaskHandler for AnalyzeHandler {
    fn name(&self) -> &str {
        "telemetry.analyze"
    }

    fn handle(&self, task: &Task) -> TaskHubResult<()> {
        let values = Self::decode_samples(task)?;
        if values.is_empty() {
            info!(task_id = %task.id, "采样批次为空");
            return Ok(());
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        info!(
            task_id = %task.id,
            count = values.len(),
            mean,
            "采样批次分析完成"
        );
        Ok(())
    }
}

fn decode_base16(encoded: &str) -> Option<Vec<u8>> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&encoded[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskhub_core::codec::sample;
    use taskhub_core::TaskPriority;
    use taskhub_testing_utils::SampleBuilder;

    fn encode_base16(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_analyze_plain_values() {
        let task = Task::new(
            "telemetry.analyze",
            json!({"values": [1.0, 2.0, 3.0]}),
            TaskPriority::Medium,
            0,
        );
        assert!(AnalyzeHandler.handle(&task).is_ok());
    }

    #[test]
    fn test_analyze_binary_samples() {
        let binary = sample::encode(&SampleBuilder::new().with_value(42.0).build());
        let task = Task::new(
            "telemetry.analyze",
            json!({"samples": [encode_base16(&binary)]}),
            TaskPriority::Medium,
            0,
        );
        assert!(AnalyzeHandler.handle(&task).is_ok());
    }

    #[test]
    fn test_analyze_rejects_missing_fields_as_fatal() {
        let task = Task::new("telemetry.analyze", json!({}), TaskPriority::Medium, 0);
        let err = AnalyzeHandler.handle(&task).unwrap_err();
        assert!(matches!(err, TaskHubError::HandlerFatal(_)));
    }

    #[test]
    fn test_analyze_rejects_bad_base16_as_fatal() {
        let task = Task::new(
            "telemetry.analyze",
            json!({"samples": ["zz"]}),
            TaskPriority::Medium,
            0,
        );
        let err = AnalyzeHandler.handle(&task).unwrap_err();
        assert!(matches!(err, TaskHubError::HandlerFatal(_)));
    }
}
