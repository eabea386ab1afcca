use chrono::{DateTime, Utc};

/// 单个遥测采样
///
/// 作为任务payload内的叶子值类型使用。序列化走二进制编码
/// （见 [`crate::codec::sample`]），时间戳精度为微秒。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    /// 设备流内单调递增的序号，用于排序
    pub sequence_id: u32,
}

impl TelemetrySample {
    /// 以当前时间创建采样，单位默认"unitless"
    pub fn new(value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
            unit: "unitless".to_string(),
            sequence_id: 0,
        }
    }

    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_sequence_id(mut self, sequence_id: u32) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            timestamp: DateTime::UNIX_EPOCH,
            value: 0.0,
            unit: "unitless".to_string(),
            sequence_id: 0,
        }
    }
}
