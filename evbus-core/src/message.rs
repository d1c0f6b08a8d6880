//! 消息（Message）契约
//!
//! 任何可发布的消息类型都实现 [`Message`]：
//! - `TOPIC`：显式声明的主题名（可选），缺省时回退为类型全名；
//! - `CHANNEL`：显式声明的通道名（可选），供基于传输的总线分组使用。
//!
//! 通常通过 `#[derive(Message)]` 与 `#[message(topic = "...", channel = "...")]` 生成实现。
//!
use std::any::{TypeId, type_name};
use std::sync::Arc;

/// 可发布的消息
pub trait Message: Send + Sync + 'static {
    /// 显式声明的主题名（建议常量字符串，不随重构变化）
    const TOPIC: Option<&'static str> = None;
    /// 显式声明的通道名
    const CHANNEL: Option<&'static str> = None;
}

/// 运行时的消息种类描述，用于非泛型的注册/注销入口
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageKind {
    type_id: TypeId,
    type_name: &'static str,
    topic: Option<&'static str>,
    channel: Option<&'static str>,
}

impl MessageKind {
    pub fn of<T: Message>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            topic: T::TOPIC,
            channel: T::CHANNEL,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn declared_topic(&self) -> Option<&'static str> {
        self.topic
    }

    pub fn declared_channel(&self) -> Option<&'static str> {
        self.channel
    }

    pub(crate) fn payload_kind(&self) -> PayloadKind {
        PayloadKind {
            type_id: self.type_id,
            type_name: self.type_name,
        }
    }
}

/// 订阅者声明接收的载荷类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadKind {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl PayloadKind {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

/// 类型擦除后的载荷，在队列与订阅者之间共享
pub type Payload = Arc<dyn std::any::Any + Send + Sync>;

/// 队列版总线内部承载的信封：{topic, payload}
#[derive(Clone)]
pub(crate) struct Envelope {
    pub topic: Arc<str>,
    pub payload: Payload,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl Message for Plain {}

    struct Declared;
    impl Message for Declared {
        const TOPIC: Option<&'static str> = Some("orders.created");
        const CHANNEL: Option<&'static str> = Some("orders");
    }

    #[test]
    fn kind_captures_declared_metadata() {
        let kind = MessageKind::of::<Declared>();
        assert_eq!(kind.declared_topic(), Some("orders.created"));
        assert_eq!(kind.declared_channel(), Some("orders"));
        assert_eq!(kind.type_id(), TypeId::of::<Declared>());
    }

    #[test]
    fn kind_without_declaration_keeps_type_name() {
        let kind = MessageKind::of::<Plain>();
        assert_eq!(kind.declared_topic(), None);
        assert!(kind.type_name().ends_with("Plain"));
        assert_eq!(kind.payload_kind(), PayloadKind::of::<Plain>());
    }
}
