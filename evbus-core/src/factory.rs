//! 按配置装配总线
//!
//! `PubSubManager` 带有泛型方法，不能作为 trait 对象使用；
//! 需要在运行时选择实现时使用 [`AnyPubSubManager`]，它按变体委托给具体实现。
//!
use crate::config::{ManagerKind, PubSubConfig};
use crate::deferred::DeferredActionQueue;
use crate::direct::DirectPubSubManager;
use crate::error::{EvbusError, EvbusResult};
use crate::manager::PubSubManager;
use crate::message::Payload;
use crate::notify::FailureNotifier;
use crate::queued::{QueuedPubSubManager, RetryPolicy};
use crate::registry::SubscriptionRegistry;
use crate::topic::TopicResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 运行时选定的总线实现
#[derive(Clone, Debug)]
pub enum AnyPubSubManager {
    Queued(QueuedPubSubManager),
    Direct(DirectPubSubManager),
}

impl AnyPubSubManager {
    /// 按配置创建总线
    ///
    /// - `retry` 仅对队列版总线有效，同步版总线直接把错误返回给发布方；
    /// - 配置了 `retry` 但未提供通知器时，重试队列不会被使用。
    pub fn from_config(
        config: &PubSubConfig,
        registry: Arc<SubscriptionRegistry>,
        resolver: Arc<TopicResolver>,
        notifier: Option<Arc<dyn FailureNotifier>>,
    ) -> EvbusResult<Self> {
        match config.kind {
            ManagerKind::Direct => {
                if config.retry.is_some() {
                    return Err(EvbusError::invalid(
                        "retry is only supported by the queued manager",
                    ));
                }
                let manager = DirectPubSubManager::builder()
                    .registry(registry)
                    .resolver(resolver)
                    .build();
                tracing::debug!("direct pubsub manager created");
                Ok(Self::Direct(manager))
            }
            ManagerKind::Queued => {
                let retry = config.retry.as_ref().map(|retry| {
                    if notifier.is_none() {
                        tracing::warn!("retry configured without a failure notifier; it will never be used");
                    }
                    let queue = DeferredActionQueue::with_exhausted_callback(
                        retry.queue.clone(),
                        |exhausted| {
                            tracing::error!(
                                action_id = %exhausted.id,
                                attempts = exhausted.attempts,
                                error = %exhausted.error,
                                "dispatch retry exhausted"
                            );
                        },
                    );
                    RetryPolicy {
                        queue,
                        max_attempts: retry.max_attempts,
                    }
                });

                let manager = QueuedPubSubManager::builder()
                    .registry(registry)
                    .resolver(resolver)
                    .config(config.queued.clone())
                    .maybe_notifier(notifier)
                    .maybe_retry(retry)
                    .build();
                tracing::debug!(config = ?config.queued, "queued pubsub manager created");
                Ok(Self::Queued(manager))
            }
        }
    }

    pub fn kind(&self) -> ManagerKind {
        match self {
            Self::Queued(_) => ManagerKind::Queued,
            Self::Direct(_) => ManagerKind::Direct,
        }
    }

    /// 停止后台线程（含重试队列）；同步版总线无需停止
    pub fn shutdown(&self) {
        if let Self::Queued(manager) = self {
            manager.shutdown();
            if let Some(policy) = manager.retry_policy() {
                policy.queue.shutdown();
            }
        }
    }

    /// 已发布但尚未分发的消息数；同步版总线恒为 0
    pub fn pending(&self) -> usize {
        match self {
            Self::Queued(manager) => manager.pending(),
            Self::Direct(_) => 0,
        }
    }
}

#[async_trait]
impl PubSubManager for AnyPubSubManager {
    fn resolver(&self) -> &TopicResolver {
        match self {
            Self::Queued(m) => m.resolver(),
            Self::Direct(m) => m.resolver(),
        }
    }

    fn registry(&self) -> &SubscriptionRegistry {
        match self {
            Self::Queued(m) => m.registry(),
            Self::Direct(m) => m.registry(),
        }
    }

    fn publish_raw(&self, topic: Arc<str>, payload: Payload) -> EvbusResult<()> {
        match self {
            Self::Queued(m) => m.publish_raw(topic, payload),
            Self::Direct(m) => m.publish_raw(topic, payload),
        }
    }

    async fn publish_raw_async(
        &self,
        topic: Arc<str>,
        payload: Payload,
        cancel: Option<&CancellationToken>,
    ) -> EvbusResult<()> {
        match self {
            Self::Queued(m) => m.publish_raw_async(topic, payload, cancel).await,
            Self::Direct(m) => m.publish_raw_async(topic, payload, cancel).await,
        }
    }
}
