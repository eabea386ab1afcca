use chrono::{DateTime, SecondsFormat, Utc};
use taskhub_errors::{TaskHubError, TaskHubResult};
use uuid::Uuid;

/// 生成36字符的小写UUID v4任务ID
pub fn generate_task_id() -> String {
    Uuid::new_v4().to_string()
}

/// 转为ISO-8601字符串（微秒精度，UTC）
pub fn to_iso8601(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 解析ISO-8601字符串
pub fn from_iso8601(raw: &str) -> TaskHubResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TaskHubError::Serialization(format!("解析时间戳失败 '{raw}': {e}")))
}

pub fn to_epoch_millis(instant: &DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub fn from_epoch_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_shape() {
        let id = generate_task_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        // version 4标志位
        assert_eq!(id.as_bytes()[14], b'4');
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = generate_task_id();
        let b = generate_task_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_iso8601_round_trip() {
        let now = Utc::now();
        let restored = from_iso8601(&to_iso8601(&now)).unwrap();
        assert_eq!(restored.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_iso8601_rejects_garbage() {
        assert!(from_iso8601("not-a-timestamp").is_err());
    }

    #[test]
    fn test_epoch_millis_round_trip() {
        let instant = from_epoch_millis(1_730_000_000_123);
        assert_eq!(to_epoch_millis(&instant), 1_730_000_000_123);
    }
}
