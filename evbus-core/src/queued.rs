//! 队列版总线（QueuedPubSubManager）
//!
//! - `publish` 只把信封 `{topic, payload}` 放入无界队列并立即返回，不等待订阅者执行；
//! - 单个专用消费线程（首次发布时惰性启动）按入队顺序取出信封并交给 `SubscriptionRegistry::accept`；
//! - 一个实例内所有主题共享同一队列与同一消费者，因此保证跨主题的全局 FIFO；
//! - 订阅者失败（错误或 panic）在消费循环边界被捕获，不影响后续分发，
//!   可选地交给 `FailureNotifier`；通知器要求重试且附加了重试队列时，
//!   失败的分发被显式组合到 `DeferredActionQueue` 中重放。
//!
//! 发布方永远无法同步感知投递失败。
//!
use crate::config::QueuedConfig;
use crate::deferred::DeferredActionQueue;
use crate::error::{EvbusError, EvbusResult, panic_message};
use crate::manager::{PubSubManager, ensure_not_cancelled};
use crate::message::{Envelope, Payload};
use crate::notify::{FailureContext, FailureNotifier};
use crate::registry::SubscriptionRegistry;
use crate::topic::TopicResolver;
use crate::worker::{self, PollingWorker};
use async_trait::async_trait;
use crossbeam::queue::SegQueue;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 失败分发的重试组合：重放到指定的延迟动作队列
#[derive(Clone)]
pub struct RetryPolicy {
    pub queue: DeferredActionQueue,
    /// 首次重放失败后的最大重试次数
    pub max_attempts: u32,
}

struct QueuedShared {
    registry: Arc<SubscriptionRegistry>,
    resolver: Arc<TopicResolver>,
    queue: SegQueue<Envelope>,
    pending: AtomicUsize,
    running: AtomicBool,
    stop: CancellationToken,
    config: QueuedConfig,
    notifier: Option<Arc<dyn FailureNotifier>>,
    retry: Option<RetryPolicy>,
}

/// 队列版总线，克隆后共享同一队列与消费线程
#[derive(Clone)]
pub struct QueuedPubSubManager {
    shared: Arc<QueuedShared>,
}

#[bon::bon]
impl QueuedPubSubManager {
    #[builder]
    pub fn new(
        #[builder(default = Arc::new(SubscriptionRegistry::new()))]
        registry: Arc<SubscriptionRegistry>,
        #[builder(default)] resolver: Arc<TopicResolver>,
        #[builder(default)] config: QueuedConfig,
        notifier: Option<Arc<dyn FailureNotifier>>,
        retry: Option<RetryPolicy>,
    ) -> Self {
        Self {
            shared: Arc::new(QueuedShared {
                registry,
                resolver,
                queue: SegQueue::new(),
                pending: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                stop: CancellationToken::new(),
                config,
                notifier,
                retry,
            }),
        }
    }
}

impl Default for QueuedPubSubManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl QueuedPubSubManager {
    /// 已发布但尚未完成分发的信封数
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.shared.retry.as_ref()
    }

    /// 停止消费线程；之后的发布将被拒绝，未分发的信封保留在队列中
    pub fn shutdown(&self) {
        tracing::debug!(pending = self.pending(), "queued pubsub manager shutting down");
        self.shared.stop.cancel();
    }

    fn enqueue(&self, topic: Arc<str>, payload: Payload) -> EvbusResult<()> {
        if self.shared.stop.is_cancelled() {
            return Err(EvbusError::ShutDown);
        }

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.shared.queue.push(Envelope { topic, payload });
        worker::ensure_started(&self.shared)
    }
}

impl QueuedShared {
    fn dispatch(&self, envelope: Envelope) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.registry.accept(&envelope.topic, &envelope.payload)
        }));

        let error = match outcome {
            Ok(Ok(_)) => return,
            Ok(Err(err)) => err,
            Err(panic) => EvbusError::HandlerPanicked {
                topic: envelope.topic.to_string(),
                reason: panic_message(panic.as_ref()),
            },
        };

        tracing::warn!(topic = %envelope.topic, error = %error, "queued dispatch failed");
        self.report_failure(envelope, error);
    }

    fn report_failure(&self, envelope: Envelope, error: EvbusError) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let context = FailureContext::new(envelope.topic.clone(), envelope.payload.clone(), error);
        let wants_retry = match catch_unwind(AssertUnwindSafe(|| notifier.on_failure(&context))) {
            Ok(retry) => retry,
            Err(panic) => {
                tracing::error!(
                    topic = %envelope.topic,
                    reason = %panic_message(panic.as_ref()),
                    "failure notifier panicked"
                );
                false
            }
        };
        if !wants_retry {
            return;
        }

        let Some(policy) = &self.retry else {
            tracing::warn!(topic = %envelope.topic, "retry requested but no retry queue is attached");
            return;
        };

        let registry = self.registry.clone();
        let Envelope { topic, payload } = envelope;
        let replay = move || -> anyhow::Result<()> {
            registry.accept(&topic, &payload)?;
            Ok(())
        };
        if let Err(err) = policy.queue.push(replay, policy.max_attempts) {
            tracing::error!(topic = %context.topic, error = %err, "failed to schedule retry");
        }
    }
}

impl PollingWorker for QueuedShared {
    const NAME: &'static str = "evbus-queued";

    fn running(&self) -> &AtomicBool {
        &self.running
    }

    fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    fn poll_once(&self) -> bool {
        match self.queue.pop() {
            Some(envelope) => {
                self.dispatch(envelope);
                self.pending.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PubSubManager for QueuedPubSubManager {
    fn resolver(&self) -> &TopicResolver {
        &self.shared.resolver
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.shared.registry
    }

    fn publish_raw(&self, topic: Arc<str>, payload: Payload) -> EvbusResult<()> {
        self.enqueue(topic, payload)
    }

    async fn publish_raw_async(
        &self,
        topic: Arc<str>,
        payload: Payload,
        cancel: Option<&CancellationToken>,
    ) -> EvbusResult<()> {
        ensure_not_cancelled(cancel)?;
        // 让出一次调度，把入队放到运行时的下一个轮次
        tokio::task::yield_now().await;
        ensure_not_cancelled(cancel)?;
        self.enqueue(topic, payload)
    }
}

impl std::fmt::Debug for QueuedPubSubManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedPubSubManager")
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crossbeam::channel;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn fast_config() -> QueuedConfig {
        QueuedConfig::builder()
            .poll_interval(Duration::from_millis(2))
            .build()
    }

    fn drain(manager: &QueuedPubSubManager) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.pending() > 0 {
            assert!(Instant::now() < deadline, "queue did not drain");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn publish_returns_before_subscribers_run() {
        let manager = QueuedPubSubManager::builder().config(fast_config()).build();
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let (done_tx, done_rx) = channel::bounded::<u8>(1);

        manager
            .add_subscriber_to::<u8, _>("slow", move |n: &u8| {
                gate_rx.recv_timeout(Duration::from_secs(2))?;
                done_tx.send(*n)?;
                anyhow::Ok(())
            })
            .unwrap();

        manager.publish_to("slow", 9_u8).unwrap();
        // 订阅者仍阻塞在 gate 上，发布已返回
        assert_eq!(manager.pending(), 1);
        gate_tx.send(()).unwrap();
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)).unwrap(), 9);
        manager.shutdown();
    }

    #[test]
    fn failing_subscriber_does_not_stop_later_dispatch() {
        let manager = QueuedPubSubManager::builder().config(fast_config()).build();
        let seen = Arc::new(Mutex::new(Vec::new()));

        manager
            .add_subscriber_to::<i32, _>("t", |n: &i32| -> anyhow::Result<()> {
                if *n == 2 {
                    anyhow::bail!("two is unlucky");
                }
                Ok(())
            })
            .unwrap();
        let log = seen.clone();
        manager
            .add_subscriber_to::<i32, _>("u", move |n: &i32| {
                log.lock().push(*n);
                anyhow::Ok(())
            })
            .unwrap();

        manager.publish_to("t", 2_i32).unwrap();
        manager.publish_to("u", 3_i32).unwrap();
        drain(&manager);

        assert_eq!(*seen.lock(), vec![3]);
        assert!(manager.is_running());
        manager.shutdown();
    }

    #[test]
    fn panicking_subscriber_is_contained() {
        let manager = QueuedPubSubManager::builder().config(fast_config()).build();
        let (tx, rx) = channel::unbounded();

        manager
            .add_subscriber_to::<u8, _>("boom", |_: &u8| -> anyhow::Result<()> { panic!("nope") })
            .unwrap();
        manager
            .add_subscriber_to::<u8, _>("ok", move |n: &u8| {
                tx.send(*n)?;
                anyhow::Ok(())
            })
            .unwrap();

        manager.publish_to("boom", 1_u8).unwrap();
        manager.publish_to("ok", 2_u8).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        manager.shutdown();
    }

    #[test]
    fn notifier_receives_failure_context() {
        let (tx, rx) = channel::unbounded();
        let notifier: Arc<dyn FailureNotifier> = Arc::new(move |ctx: &FailureContext| {
            let _ = tx.send((ctx.topic.to_string(), ctx.payload_as::<u32>().copied(), ctx.error.to_string()));
            false
        });
        let manager = QueuedPubSubManager::builder()
            .config(fast_config())
            .notifier(notifier)
            .build();
        manager
            .add_subscriber_to::<u32, _>("t", |_: &u32| -> anyhow::Result<()> { anyhow::bail!("bad") })
            .unwrap();

        manager.publish_to("t", 42_u32).unwrap();

        let (topic, payload, error) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(topic, "t");
        assert_eq!(payload, Some(42));
        assert_eq!(error, "subscriber failed: topic=t, reason=bad");
        manager.shutdown();
    }

    #[test]
    fn retry_request_replays_through_deferred_queue() {
        struct Flaky;
        impl Message for Flaky {
            const TOPIC: Option<&'static str> = Some("flaky");
        }

        let retry_queue = DeferredActionQueue::new(
            crate::config::DeferredActionConfig::builder()
                .poll_interval(Duration::from_millis(2))
                .build(),
        );
        let manager = QueuedPubSubManager::builder()
            .config(fast_config())
            .notifier(Arc::new(|_: &FailureContext| true) as Arc<dyn FailureNotifier>)
            .retry(RetryPolicy {
                queue: retry_queue.clone(),
                max_attempts: 2,
            })
            .build();

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = channel::unbounded();
        let counter = calls.clone();
        manager
            .add_subscriber::<Flaky, _>(move |_: &Flaky| -> anyhow::Result<()> {
                // 前两次失败，第三次成功
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("not yet");
                }
                tx.send(())?;
                Ok(())
            })
            .unwrap();

        manager.publish(Flaky).unwrap();

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        manager.shutdown();
        retry_queue.shutdown();
    }

    #[test]
    fn publish_after_shutdown_is_rejected() {
        let manager = QueuedPubSubManager::default();
        manager.shutdown();
        let err = manager.publish_to("t", 1_u8).unwrap_err();
        assert!(matches!(err, EvbusError::ShutDown));
        assert_eq!(manager.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_async_honours_cancellation() {
        let manager = QueuedPubSubManager::builder().config(fast_config()).build();
        let token = CancellationToken::new();
        token.cancel();

        let err = manager
            .publish_async_to("t", 1_u8, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, EvbusError::Cancelled));
        assert_eq!(manager.pending(), 0);

        manager.publish_async_to("t", 1_u8, None).await.unwrap();
        manager.shutdown();
    }

    #[test]
    fn dispatch_thread_drives_async_subscribers_on_supplied_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let manager = QueuedPubSubManager::builder()
            .registry(Arc::new(SubscriptionRegistry::with_runtime(
                runtime.handle().clone(),
            )))
            .config(fast_config())
            .build();
        let (tx, rx) = channel::bounded::<u8>(1);

        manager
            .add_async_subscriber_to::<u8, _>("timed", move |n: Arc<u8>| {
                let tx = tx.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    tx.send(*n)?;
                    anyhow::Ok(())
                }
            })
            .unwrap();

        manager.publish_to("timed", 9_u8).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 9);

        drain(&manager);
        manager.shutdown();
        drop(runtime);
    }
}
