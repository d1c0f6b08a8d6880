//! 订阅表（SubscriptionRegistry）
//!
//! 维护 `topic -> 有序订阅者列表`，并负责把载荷分发给某个主题的全部订阅者：
//! - 订阅条目为带标签的变体 `Dispatch::{Sync, Async}`，通过统一的 `invoke` 调用；
//! - 异步订阅者在分发线程上被阻塞等待完成，对调用方没有额外的非阻塞路径；
//! - `accept` 在调用时取快照，释放内部锁后再执行订阅者，
//!   因此订阅者内部注册/注销不会死锁，分发过程中新增的订阅者可能不会被本次看到。
//!
//! 订阅表是显式构造的实例，通常在启动时创建一次并以 `Arc` 共享给各个管理器。
//!
use crate::error::{EvbusError, EvbusResult};
use crate::handler::{AsyncMessageHandler, MessageHandler, RawHandler};
use crate::message::{MessageKind, Payload, PayloadKind};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};

type SyncInvoke = Arc<dyn Fn(&str, &Payload) -> EvbusResult<()> + Send + Sync>;
type AsyncInvoke =
    Arc<dyn Fn(&str, &Payload) -> EvbusResult<BoxFuture<'static, anyhow::Result<()>>> + Send + Sync>;

/// 订阅者的分发方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    Sync,
    Async,
}

enum Dispatch {
    Sync(SyncInvoke),
    Async(AsyncInvoke),
}

/// 一条订阅：{声明的载荷类型, 订阅者, 分发方式}
pub struct Subscription {
    kind: PayloadKind,
    dispatch: Dispatch,
}

impl Subscription {
    /// 由同步订阅者构建
    pub fn sync<T, H>(handler: H) -> Self
    where
        T: Send + Sync + 'static,
        H: MessageHandler<T>,
    {
        let f: SyncInvoke = Arc::new(move |topic: &str, payload: &Payload| {
            let Some(message) = payload.downcast_ref::<T>() else {
                return Err(mismatch::<T>(topic));
            };
            handler.handle(message).map_err(|source| EvbusError::Handler {
                topic: topic.to_string(),
                source,
            })
        });

        Self {
            kind: PayloadKind::of::<T>(),
            dispatch: Dispatch::Sync(f),
        }
    }

    /// 由异步订阅者构建
    pub fn asynchronous<T, H>(handler: H) -> Self
    where
        T: Send + Sync + 'static,
        H: AsyncMessageHandler<T>,
    {
        let handler = Arc::new(handler);
        let f: AsyncInvoke = Arc::new(move |topic: &str, payload: &Payload| {
            let message = payload
                .clone()
                .downcast::<T>()
                .map_err(|_| mismatch::<T>(topic))?;
            let handler = handler.clone();
            let fut: BoxFuture<'static, anyhow::Result<()>> =
                Box::pin(async move { handler.handle(message).await });
            Ok(fut)
        });

        Self {
            kind: PayloadKind::of::<T>(),
            dispatch: Dispatch::Async(f),
        }
    }

    /// 由类型擦除订阅者构建，载荷类型取自 `kind`
    pub fn raw(kind: &MessageKind, handler: RawHandler) -> Self {
        let f: SyncInvoke = Arc::new(move |topic: &str, payload: &Payload| {
            let message: &(dyn Any + Send + Sync) = payload.as_ref();
            handler(message).map_err(|source| EvbusError::Handler {
                topic: topic.to_string(),
                source,
            })
        });

        Self {
            kind: kind.payload_kind(),
            dispatch: Dispatch::Sync(f),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        match self.dispatch {
            Dispatch::Sync(_) => DispatchMode::Sync,
            Dispatch::Async(_) => DispatchMode::Async,
        }
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.kind
    }

    fn invoke(&self, topic: &str, payload: &Payload, driver: Driver<'_>) -> EvbusResult<()> {
        if (**payload).type_id() != self.kind.type_id {
            return Err(EvbusError::TypeMismatch {
                topic: topic.to_string(),
                expected: self.kind.type_name,
            });
        }

        match &self.dispatch {
            Dispatch::Sync(f) => f(topic, payload),
            Dispatch::Async(f) => {
                let fut = f(topic, payload)?;
                block_on_handler(fut, driver).and_then(|res| {
                    res.map_err(|source| EvbusError::Handler {
                        topic: topic.to_string(),
                        source,
                    })
                })
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("payload", &self.kind.type_name)
            .field("mode", &self.mode())
            .finish()
    }
}

fn mismatch<T>(topic: &str) -> EvbusError {
    EvbusError::TypeMismatch {
        topic: topic.to_string(),
        expected: std::any::type_name::<T>(),
    }
}

/// 异步订阅者的驱动方式
#[derive(Clone, Copy)]
enum Driver<'a> {
    /// 按当前线程所处的运行时环境决定，`Option` 为订阅表捕获的运行时
    Ambient(Option<&'a Handle>),
    /// 已位于运行时的阻塞线程池上，直接在给定运行时上等待
    Blocking(&'a Handle),
}

// 在当前线程上阻塞等待异步订阅者：
// - 位于阻塞线程池：直接在调用方给出的运行时上等待；
// - 位于多线程运行时内：block_in_place 后在当前运行时上等待；
// - 位于单线程运行时内：无法安全阻塞，直接报错；
// - 不在任何运行时内：优先使用订阅表创建时捕获的运行时，否则退回到 futures 执行器。
fn block_on_handler(
    fut: BoxFuture<'static, anyhow::Result<()>>,
    driver: Driver<'_>,
) -> EvbusResult<anyhow::Result<()>> {
    let runtime = match driver {
        Driver::Blocking(handle) => return Ok(handle.block_on(fut)),
        Driver::Ambient(runtime) => runtime,
    };

    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
            }
            _ => Err(EvbusError::Unsupported(
                "async subscriber dispatched from a current-thread runtime",
            )),
        },
        Err(_) => match runtime {
            Some(handle) => Ok(handle.block_on(fut)),
            None => Ok(futures_executor::block_on(fut)),
        },
    }
}

/// 订阅表
pub struct SubscriptionRegistry {
    table: DashMap<Arc<str>, Vec<Arc<Subscription>>>,
    runtime: Option<Handle>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self {
            table: DashMap::new(),
            runtime: Handle::try_current().ok(),
        }
    }
}

impl SubscriptionRegistry {
    /// 创建订阅表；若在 tokio 运行时内创建，会捕获当前运行时用于驱动异步订阅者
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定驱动异步订阅者的运行时（用于运行时之外的分发线程）
    pub fn with_runtime(handle: Handle) -> Self {
        Self {
            table: DashMap::new(),
            runtime: Some(handle),
        }
    }

    /// 注册同步订阅者
    pub fn add_sync<T, H>(&self, topic: &str, handler: H) -> EvbusResult<()>
    where
        T: Send + Sync + 'static,
        H: MessageHandler<T>,
    {
        self.add(topic, Subscription::sync::<T, H>(handler))
    }

    /// 注册异步订阅者
    pub fn add_async<T, H>(&self, topic: &str, handler: H) -> EvbusResult<()>
    where
        T: Send + Sync + 'static,
        H: AsyncMessageHandler<T>,
    {
        self.add(topic, Subscription::asynchronous::<T, H>(handler))
    }

    /// 追加订阅条目（保持注册顺序）
    pub fn add(&self, topic: &str, subscription: Subscription) -> EvbusResult<()> {
        if topic.trim().is_empty() {
            return Err(EvbusError::invalid("topic name must not be empty"));
        }

        tracing::debug!(
            topic,
            payload = subscription.kind.type_name,
            mode = ?subscription.mode(),
            "subscriber added"
        );
        self.table
            .entry(Arc::from(topic))
            .or_default()
            .push(Arc::new(subscription));
        Ok(())
    }

    /// 将载荷分发给 `topic` 的全部订阅者，返回被调用的订阅者数量。
    ///
    /// 按注册顺序依次调用；任一订阅者失败即中止并把错误返回给调用方。
    pub fn accept(&self, topic: &str, payload: &Payload) -> EvbusResult<usize> {
        self.dispatch(topic, payload, Driver::Ambient(self.runtime.as_ref()))
    }

    /// 在 `spawn_blocking` 线程上分发，异步订阅者直接由 `handle` 驱动
    pub(crate) fn accept_blocking(
        &self,
        topic: &str,
        payload: &Payload,
        handle: &Handle,
    ) -> EvbusResult<usize> {
        self.dispatch(topic, payload, Driver::Blocking(handle))
    }

    fn dispatch(&self, topic: &str, payload: &Payload, driver: Driver<'_>) -> EvbusResult<usize> {
        let Some(snapshot) = self.snapshot(topic) else {
            return Ok(0);
        };

        for subscription in &snapshot {
            subscription.invoke(topic, payload, driver)?;
        }
        Ok(snapshot.len())
    }

    /// `accept` 的泛型便捷版本
    pub fn accept_message<T>(&self, topic: &str, message: T) -> EvbusResult<usize>
    where
        T: Send + Sync + 'static,
    {
        let payload: Payload = Arc::new(message);
        self.accept(topic, &payload)
    }

    /// 删除主题的全部订阅者，返回是否存在
    pub fn remove(&self, topic: &str) -> bool {
        let removed = self.table.remove(topic).is_some();
        if removed {
            tracing::debug!(topic, "subscribers removed");
        }
        removed
    }

    pub fn clear(&self) {
        self.table.clear();
    }

    pub fn topics(&self) -> Vec<String> {
        self.table.iter().map(|e| e.key().to_string()).collect()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.table.get(topic).map(|e| e.value().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn snapshot(&self, topic: &str) -> Option<Vec<Arc<Subscription>>> {
        // 克隆后立即释放分片锁
        self.table.get(topic).map(|e| e.value().clone())
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.table.len())
            .field("has_runtime", &self.runtime.is_some())
            .finish()
    }
}
