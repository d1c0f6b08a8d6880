//! 订阅者（Subscriber）契约
//!
//! - [`MessageHandler`]：同步订阅者，借用载荷处理；
//! - [`AsyncMessageHandler`]：异步订阅者，持有载荷的共享引用；
//! - [`RawHandler`]：面向 `MessageKind` 的类型擦除订阅者（非泛型注册入口）。
//!
//! 两个 trait 都为闭包提供了 blanket 实现，可以直接注册闭包，
//! 也可以注册由容器构建的处理器实例。
//!
use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// 同步订阅者
pub trait MessageHandler<T>: Send + Sync + 'static {
    fn handle(&self, message: &T) -> anyhow::Result<()>;
}

impl<T, F> MessageHandler<T> for F
where
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, message: &T) -> anyhow::Result<()> {
        (self)(message)
    }
}

/// 异步订阅者
///
/// 分发端会阻塞等待其完成，对外仍表现为统一的阻塞式调用。
#[async_trait]
pub trait AsyncMessageHandler<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    async fn handle(&self, message: Arc<T>) -> anyhow::Result<()>;
}

#[async_trait]
impl<T, F, Fut> AsyncMessageHandler<T> for F
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: Arc<T>) -> anyhow::Result<()> {
        (self)(message).await
    }
}

/// 类型擦除的同步订阅者，载荷以 `&dyn Any` 传入
pub type RawHandler = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync>;
