//! 进程内发布/订阅核心库（evbus-core）
//!
//! 提供按主题路由的进程内消息总线及其配套构件：
//! - 主题解析（`topic`）：为消息类型解析稳定的主题/通道名；
//! - 订阅注册表（`registry`）：主题到有序订阅者列表的并发安全映射；
//! - 两种总线实现（`queued`/`direct`）：异步单消费者分发与同步直接分发；
//! - 延迟动作队列（`deferred`）：带重试的后台工作队列；
//! - 优先级批处理（`batch`）：按优先级一次性执行的工作单元集合；
//! - 失败通知（`notify`）、配置（`config`）、按配置装配（`factory`）与宿主生命周期（`hosting`）。
//!
//! 典型用法：
//! 1. 用 `#[derive(Message)]` 声明消息及其主题；
//! 2. 创建 `QueuedPubSubManager`（或经 `AnyPubSubManager::from_config` 按配置创建）；
//! 3. 通过 `SubscriberHost` 在启动时注册订阅者；
//! 4. 调用 `publish`/`publish_async` 发布消息。
//!
pub mod batch;
pub mod config;
pub mod deferred;
pub mod direct;
pub mod error;
pub mod factory;
pub mod handler;
pub mod hosting;
pub mod manager;
pub mod message;
pub mod notify;
pub mod queued;
pub mod registry;
pub mod topic;

mod worker;

pub use error::{EvbusError, EvbusResult};
pub use manager::PubSubManager;
pub use message::{Message, MessageKind};

#[cfg(feature = "derive")]
pub use evbus_macros::Message;

// 允许在本 crate 内部通过 ::evbus_core 进行自引用，
// 以便派生宏在本 crate 的单元测试中也能解析到 ::evbus_core 路径。
extern crate self as evbus_core;
