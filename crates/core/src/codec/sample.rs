use chrono::DateTime;
use prost::Message;

use crate::models::TelemetrySample;

/// 遥测采样的Protobuf线格式
///
/// 字段编号是线格式契约的一部分：向后兼容只允许追加字段，不允许删除。
#[derive(Clone, PartialEq, Message)]
struct TelemetrySampleProto {
    /// epoch微秒
    #[prost(int64, tag = "1")]
    timestamp_us: i64,
    #[prost(double, tag = "2")]
    value: f64,
    #[prost(string, tag = "3")]
    unit: String,
    #[prost(uint32, tag = "4")]
    sequence_id: u32,
}

impl From<&TelemetrySample> for TelemetrySampleProto {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            timestamp_us: sample.timestamp.timestamp_micros(),
            value: sample.value,
            unit: sample.unit.clone(),
            sequence_id: sample.sequence_id,
        }
    }
}

impl From<TelemetrySampleProto> for TelemetrySample {
    fn from(proto: TelemetrySampleProto) -> Self {
        Self {
            timestamp: DateTime::from_timestamp_micros(proto.timestamp_us)
                .unwrap_or(DateTime::UNIX_EPOCH),
            value: proto.value,
            unit: proto.unit,
            sequence_id: proto.sequence_id,
        }
    }
}

/// 编码为二进制，典型大小约30字节
pub fn encode(sample: &TelemetrySample) -> Vec<u8> {
    TelemetrySampleProto::from(sample).encode_to_vec()
}

/// 解码二进制数据；无效字节返回None而不是错误
pub fn decode(data: &[u8]) -> Option<TelemetrySample> {
    TelemetrySampleProto::decode(data).ok().map(Into::into)
}

/// 不实际编码的情况下计算编码后的字节数
pub fn encoded_len(sample: &TelemetrySample) -> usize {
    TelemetrySampleProto::from(sample).encoded_len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reference_sample() -> TelemetrySample {
        TelemetrySample {
            timestamp: DateTime::from_timestamp_micros(1_730_000_000_000_000).unwrap(),
            value: 23.5,
            unit: "celsius".to_string(),
            sequence_id: 12345,
        }
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let sample = reference_sample();
        let binary = encode(&sample);
        let restored = decode(&binary).unwrap();
        assert_eq!(restored, sample);
    }

    #[test]
    fn test_encoded_size_stays_compact() {
        let sample = reference_sample();
        let binary = encode(&sample);
        assert!(binary.len() <= 40, "encoded {} bytes", binary.len());
        assert_eq!(encoded_len(&sample), binary.len());
    }

    #[test]
    fn test_timestamp_precision_within_one_microsecond() {
        let sample = TelemetrySample::new(1.0).with_timestamp(Utc::now());
        let restored = decode(&encode(&sample)).unwrap();
        let drift = (sample.timestamp.timestamp_micros() - restored.timestamp.timestamp_micros())
            .unsigned_abs();
        assert!(drift <= 1);
    }

    #[test]
    fn test_invalid_bytes_decode_to_none() {
        assert!(decode(&[0xff, 0xff, 0xff, 0xff]).is_none());
        assert!(decode(&[0x0a]).is_none());
    }

    #[test]
    fn test_empty_input_is_default_sample() {
        // 空字节串是合法的protobuf消息，全部字段取默认值
        let sample = decode(&[]).unwrap();
        assert_eq!(sample.value, 0.0);
        assert_eq!(sample.sequence_id, 0);
        assert!(sample.unit.is_empty());
    }

    #[test]
    fn test_unit_and_sequence_preserved_exactly() {
        let sample = TelemetrySample::new(-40.25)
            .with_unit("psi")
            .with_sequence_id(u32::MAX);
        let restored = decode(&encode(&sample)).unwrap();
        assert_eq!(restored.value, -40.25);
        assert_eq!(restored.unit, "psi");
        assert_eq!(restored.sequence_id, u32::MAX);
    }
}
