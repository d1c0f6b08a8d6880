//! 总线配置
//!
//! 各配置均实现 `Default` 并支持 `bon` 构建与 serde 反序列化，
//! 时长字段在配置文件中以毫秒表示（`*_ms`）。
//!
use crate::error::EvbusResult;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 消费循环在队列为空时的默认休眠间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 延迟动作队列配置
#[derive(Builder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredActionConfig {
    /// 队列为空时的轮询休眠间隔
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for DeferredActionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// 队列版总线配置
#[derive(Builder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuedConfig {
    /// 队列为空时的轮询休眠间隔
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for QueuedConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// 总线实现的选择
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerKind {
    /// 异步入队、单消费线程分发
    #[default]
    Queued,
    /// 在发布线程上同步分发
    Direct,
}

/// 总线整体配置，由工厂（`AnyPubSubManager::from_config`）消费
#[derive(Builder, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    #[builder(default)]
    pub kind: ManagerKind,
    #[builder(default)]
    pub queued: QueuedConfig,
    /// 为队列版总线附加的重试队列（为空则不重试）
    pub retry: Option<RetryConfig>,
}

/// 失败重试组合配置
#[derive(Builder, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 首次失败后的最大重试次数
    pub max_attempts: u32,
    #[builder(default)]
    #[serde(default)]
    pub queue: DeferredActionConfig,
}

impl PubSubConfig {
    /// 从 JSON 文本解析配置，缺失字段取默认值
    pub fn from_json_str(raw: &str) -> EvbusResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg = PubSubConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, PubSubConfig::default());
        assert_eq!(cfg.kind, ManagerKind::Queued);
        assert_eq!(cfg.queued.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(cfg.retry.is_none());
    }

    #[test]
    fn json_overrides_kind_interval_and_retry() {
        let cfg = PubSubConfig::from_json_str(
            r#"{
                "kind": "direct",
                "queued": { "poll_interval_ms": 5 },
                "retry": { "max_attempts": 3, "queue": { "poll_interval_ms": 7 } }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.kind, ManagerKind::Direct);
        assert_eq!(cfg.queued.poll_interval, Duration::from_millis(5));
        let retry = cfg.retry.unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.queue.poll_interval, Duration::from_millis(7));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = PubSubConfig::from_json_str(r#"{"kind": "kafka"}"#).unwrap_err();
        assert!(matches!(err, crate::error::EvbusError::Config { .. }));
    }

    #[test]
    fn builder_defaults_match_default_impl() {
        assert_eq!(QueuedConfig::builder().build(), QueuedConfig::default());
        let cfg = DeferredActionConfig::builder()
            .poll_interval(Duration::from_millis(1))
            .build();
        assert_eq!(cfg.poll_interval, Duration::from_millis(1));
    }
}
