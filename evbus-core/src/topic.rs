//! 主题解析（TopicResolver）
//!
//! 为消息种类解析稳定的主题名/通道名：
//! - 优先使用消息类型上声明的名称；
//! - 未声明时回退为类型全名（`type_name::<T>()`）；
//! - 可挂接外部的名称规范化器（`NameNormalizer`）。
//!
//! 解析结果按 `TypeId` 缓存，同一类型多次解析得到同一字符串。
//!
use crate::message::{Message, MessageKind};
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

/// 名称规范化器（外部协作者），例如统一加前缀、转小写等
pub trait NameNormalizer: Send + Sync {
    fn normalize(&self, name: &str) -> String;
}

impl<F> NameNormalizer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn normalize(&self, name: &str) -> String {
        (self)(name)
    }
}

/// 使用给定规范化器处理名称；未提供时原样返回。
///
/// 规范化结果为空时保留原名称，保证非空。
pub fn normalize_name(name: &str, normalizer: Option<&dyn NameNormalizer>) -> String {
    match normalizer {
        Some(n) => {
            let normalized = n.normalize(name);
            if normalized.trim().is_empty() {
                name.to_string()
            } else {
                normalized
            }
        }
        None => name.to_string(),
    }
}

/// 主题/通道名解析器
#[derive(Default)]
pub struct TopicResolver {
    normalizer: Option<Arc<dyn NameNormalizer>>,
    topics: DashMap<TypeId, Arc<str>>,
    channels: DashMap<TypeId, Arc<str>>,
}

impl TopicResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带规范化器的解析器，所有解析结果都会经过该规范化器
    pub fn with_normalizer(normalizer: impl NameNormalizer + 'static) -> Self {
        Self {
            normalizer: Some(Arc::new(normalizer)),
            ..Self::default()
        }
    }

    pub fn topic_name<T: Message>(&self) -> Arc<str> {
        self.topic_name_of(&MessageKind::of::<T>())
    }

    pub fn topic_name_of(&self, kind: &MessageKind) -> Arc<str> {
        Self::resolve(&self.topics, kind, kind.declared_topic(), self.normalizer())
    }

    pub fn channel_name<T: Message>(&self) -> Arc<str> {
        self.channel_name_of(&MessageKind::of::<T>())
    }

    pub fn channel_name_of(&self, kind: &MessageKind) -> Arc<str> {
        Self::resolve(&self.channels, kind, kind.declared_channel(), self.normalizer())
    }

    /// 对显式传入的名称应用本解析器的规范化器
    pub fn normalize(&self, name: &str) -> String {
        normalize_name(name, self.normalizer())
    }

    fn normalizer(&self) -> Option<&dyn NameNormalizer> {
        self.normalizer.as_deref()
    }

    fn resolve(
        cache: &DashMap<TypeId, Arc<str>>,
        kind: &MessageKind,
        declared: Option<&'static str>,
        normalizer: Option<&dyn NameNormalizer>,
    ) -> Arc<str> {
        let id = kind.type_id();
        if let Some(hit) = cache.get(&id) {
            return hit.value().clone();
        }

        // 规范化器在分片锁之外执行，它可以再次调用本解析器
        // 声明为空串视为未声明
        let raw = declared
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(kind.type_name());
        let name: Arc<str> = Arc::from(normalize_name(raw, normalizer));

        // 并发首次解析时以先写入者为准
        cache.entry(id).or_insert(name).clone()
    }
}

impl std::fmt::Debug for TopicResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicResolver")
            .field("has_normalizer", &self.normalizer.is_some())
            .field("cached_topics", &self.topics.len())
            .finish()
    }
}
