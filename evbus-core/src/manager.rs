//! 发布/订阅管理器（PubSubManager）协议
//!
//! 统一订阅注册与消息发布的入口，不绑定具体的分发策略：
//! - 注册/注销：委托给 `SubscriptionRegistry`，仅给出消息类型时经 `TopicResolver` 解析主题；
//! - 发布：由实现决定是入队异步分发（`QueuedPubSubManager`）还是同步分发（`DirectPubSubManager`）；
//! - 该 trait 带有泛型方法，通常以具体实现类型注入使用。
//!
use crate::error::{EvbusError, EvbusResult};
use crate::handler::{AsyncMessageHandler, MessageHandler, RawHandler};
use crate::message::{Message, MessageKind, Payload};
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::topic::TopicResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait PubSubManager: Send + Sync {
    fn resolver(&self) -> &TopicResolver;

    fn registry(&self) -> &SubscriptionRegistry;

    /// 以原样主题发布已擦除类型的载荷
    fn publish_raw(&self, topic: Arc<str>, payload: Payload) -> EvbusResult<()>;

    /// `publish_raw` 的异步版本；取消信号仅在真正发布前检查
    async fn publish_raw_async(
        &self,
        topic: Arc<str>,
        payload: Payload,
        cancel: Option<&CancellationToken>,
    ) -> EvbusResult<()>;

    /// 校验并规范化显式给出的主题名
    fn topic_for(&self, name: &str) -> EvbusResult<Arc<str>> {
        if name.trim().is_empty() {
            return Err(EvbusError::invalid("topic name must not be empty"));
        }
        Ok(Arc::from(self.resolver().normalize(name)))
    }

    // ---- 注册 ----

    fn add_subscriber<T, H>(&self, handler: H) -> EvbusResult<()>
    where
        T: Message,
        H: MessageHandler<T>,
    {
        let topic = self.resolver().topic_name::<T>();
        self.registry().add_sync::<T, H>(&topic, handler)
    }

    fn add_subscriber_to<T, H>(&self, name: &str, handler: H) -> EvbusResult<()>
    where
        T: Send + Sync + 'static,
        H: MessageHandler<T>,
    {
        let topic = self.topic_for(name)?;
        self.registry().add_sync::<T, H>(&topic, handler)
    }

    fn add_async_subscriber<T, H>(&self, handler: H) -> EvbusResult<()>
    where
        T: Message,
        H: AsyncMessageHandler<T>,
    {
        let topic = self.resolver().topic_name::<T>();
        self.registry().add_async::<T, H>(&topic, handler)
    }

    fn add_async_subscriber_to<T, H>(&self, name: &str, handler: H) -> EvbusResult<()>
    where
        T: Send + Sync + 'static,
        H: AsyncMessageHandler<T>,
    {
        let topic = self.topic_for(name)?;
        self.registry().add_async::<T, H>(&topic, handler)
    }

    /// 非泛型注册入口：以运行时的消息种类注册类型擦除订阅者
    fn add_kind_subscriber(&self, kind: &MessageKind, handler: RawHandler) -> EvbusResult<()> {
        let topic = self.resolver().topic_name_of(kind);
        self.registry().add(&topic, Subscription::raw(kind, handler))
    }

    // ---- 注销 ----

    fn remove_subscriber<T: Message>(&self) -> bool {
        let topic = self.resolver().topic_name::<T>();
        self.registry().remove(&topic)
    }

    fn remove_kind_subscriber(&self, kind: &MessageKind) -> bool {
        let topic = self.resolver().topic_name_of(kind);
        self.registry().remove(&topic)
    }

    fn remove_named_subscriber(&self, name: &str) -> bool {
        match self.topic_for(name) {
            Ok(topic) => self.registry().remove(&topic),
            Err(err) => {
                tracing::debug!(name, error = %err, "remove skipped: invalid topic name");
                false
            }
        }
    }

    // ---- 发布 ----

    fn publish<T: Message>(&self, payload: T) -> EvbusResult<()> {
        let topic = self.resolver().topic_name::<T>();
        self.publish_raw(topic, Arc::new(payload))
    }

    fn publish_to<T>(&self, name: &str, payload: T) -> EvbusResult<()>
    where
        T: Send + Sync + 'static,
    {
        let topic = self.topic_for(name)?;
        self.publish_raw(topic, Arc::new(payload))
    }

    async fn publish_async<T: Message>(
        &self,
        payload: T,
        cancel: Option<&CancellationToken>,
    ) -> EvbusResult<()> {
        let topic = self.resolver().topic_name::<T>();
        self.publish_raw_async(topic, Arc::new(payload), cancel).await
    }

    async fn publish_async_to<T>(
        &self,
        name: &str,
        payload: T,
        cancel: Option<&CancellationToken>,
    ) -> EvbusResult<()>
    where
        T: Send + Sync + 'static,
    {
        let topic = self.topic_for(name)?;
        self.publish_raw_async(topic, Arc::new(payload), cancel).await
    }

    /// 按通道投递需要基于传输的实现，进程内管理器一律拒绝
    fn publish_to_channel<T>(&self, channel: &str, payload: T) -> EvbusResult<()>
    where
        T: Send + Sync + 'static,
    {
        let _ = (channel, payload);
        Err(EvbusError::Unsupported(
            "channel routing requires a transport-backed manager",
        ))
    }
}

/// 发布前检查取消信号
pub(crate) fn ensure_not_cancelled(cancel: Option<&CancellationToken>) -> EvbusResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(EvbusError::Cancelled),
        _ => Ok(()),
    }
}
