//! 同步版总线（DirectPubSubManager）
//!
//! `publish` 在调用方线程上直接执行 `SubscriptionRegistry::accept`，
//! 所有匹配的订阅者执行完毕后才返回；订阅者的错误同步返回给发布方。
//!
//! 没有后台线程；并发发布同一主题时，不同线程上的订阅者执行可能交错，
//! 不提供跨发布调用的互斥。
//!
use crate::error::{EvbusError, EvbusResult};
use crate::manager::{PubSubManager, ensure_not_cancelled};
use crate::message::Payload;
use crate::registry::SubscriptionRegistry;
use crate::topic::TopicResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct DirectPubSubManager {
    registry: Arc<SubscriptionRegistry>,
    resolver: Arc<TopicResolver>,
}

#[bon::bon]
impl DirectPubSubManager {
    #[builder]
    pub fn new(
        #[builder(default = Arc::new(SubscriptionRegistry::new()))]
        registry: Arc<SubscriptionRegistry>,
        #[builder(default)] resolver: Arc<TopicResolver>,
    ) -> Self {
        Self { registry, resolver }
    }
}

impl Default for DirectPubSubManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[async_trait]
impl PubSubManager for DirectPubSubManager {
    fn resolver(&self) -> &TopicResolver {
        &self.resolver
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn publish_raw(&self, topic: Arc<str>, payload: Payload) -> EvbusResult<()> {
        self.registry.accept(&topic, &payload)?;
        Ok(())
    }

    /// 在阻塞线程池上分发并等待其完成，发布方仍能拿到订阅者的错误；
    /// 异步订阅者在该阻塞线程上由当前运行时驱动，单线程运行时同样适用
    async fn publish_raw_async(
        &self,
        topic: Arc<str>,
        payload: Payload,
        cancel: Option<&CancellationToken>,
    ) -> EvbusResult<()> {
        ensure_not_cancelled(cancel)?;

        let handle = Handle::try_current()
            .map_err(|_| EvbusError::Unsupported("async publish requires a tokio runtime"))?;
        let registry = self.registry.clone();
        let dispatch_topic = topic.clone();
        let driver = handle.clone();
        let joined = handle
            .spawn_blocking(move || registry.accept_blocking(&dispatch_topic, &payload, &driver))
            .await;

        match joined {
            Ok(result) => result.map(|_| ()),
            Err(err) if err.is_panic() => Err(EvbusError::HandlerPanicked {
                topic: topic.to_string(),
                reason: crate::error::panic_message(err.into_panic().as_ref()),
            }),
            Err(err) => Err(EvbusError::Worker {
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct OrderPlaced(u32);
    impl Message for OrderPlaced {
        const TOPIC: Option<&'static str> = Some("orders.placed");
    }

    #[test]
    fn publish_returns_after_every_handler_completed() {
        let manager = DirectPubSubManager::default();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        manager
            .add_subscriber::<OrderPlaced, _>(move |_: &OrderPlaced| {
                std::thread::sleep(Duration::from_millis(50));
                flag.store(true, Ordering::SeqCst);
                anyhow::Ok(())
            })
            .unwrap();

        manager.publish(OrderPlaced(1)).unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn handler_error_reaches_publisher() {
        let manager = DirectPubSubManager::default();
        manager
            .add_subscriber::<OrderPlaced, _>(|o: &OrderPlaced| -> anyhow::Result<()> {
                anyhow::ensure!(o.0 > 0, "empty order");
                Ok(())
            })
            .unwrap();

        assert!(manager.publish(OrderPlaced(3)).is_ok());
        let err = manager.publish(OrderPlaced(0)).unwrap_err();
        assert!(err.is_handler_failure());
        assert_eq!(err.to_string(), "subscriber failed: topic=orders.placed, reason=empty order");
    }

    #[test]
    fn channel_publication_is_unsupported() {
        let manager = DirectPubSubManager::default();
        let err = manager.publish_to_channel("orders", OrderPlaced(1)).unwrap_err();
        assert!(matches!(err, EvbusError::Unsupported(_)));
    }

    #[test]
    fn concurrent_publishers_all_complete() {
        let manager = Arc::new(DirectPubSubManager::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        manager
            .add_subscriber_to::<u8, _>("t", move |_: &u8| {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            })
            .unwrap();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        manager.publish_to("t", 1_u8).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 200);
    }

    #[tokio::test]
    async fn publish_async_drives_async_subscribers_on_current_thread_runtime() {
        let manager = DirectPubSubManager::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        manager
            .add_async_subscriber_to::<u8, _>("t", move |n: Arc<u8>| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.fetch_add(*n as usize, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            })
            .unwrap();

        manager.publish_async_to("t", 4_u8, None).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn publish_async_reports_panics_with_their_topic() {
        let manager = DirectPubSubManager::default();
        manager
            .add_async_subscriber::<OrderPlaced, _>(|_: Arc<OrderPlaced>| async move {
                if true {
                    panic!("projection exploded");
                }
                anyhow::Ok(())
            })
            .unwrap();

        let err = manager
            .publish_async(OrderPlaced(1), None)
            .await
            .unwrap_err();
        match err {
            EvbusError::HandlerPanicked { topic, reason } => {
                assert_eq!(topic, "orders.placed");
                assert_eq!(reason, "projection exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_async_awaits_dispatch_and_surfaces_errors() {
        let manager = DirectPubSubManager::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        manager
            .add_async_subscriber::<OrderPlaced, _>(move |o: Arc<OrderPlaced>| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    anyhow::ensure!(o.0 != 13, "unlucky order");
                    counter.fetch_add(o.0 as usize, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        manager.publish_async(OrderPlaced(2), None).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        let err = manager
            .publish_async(OrderPlaced(13), None)
            .await
            .unwrap_err();
        assert!(err.is_handler_failure());
    }
}
