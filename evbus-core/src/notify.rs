//! 失败通知扩展点（FailureNotifier）
//!
//! 分发失败时，总线把 `{topic, 原始载荷, 错误}` 交给外部通知器，
//! 由通知器决定是否需要重试。进程内总线只暴露该扩展点，
//! 重试/持久化的具体机制由外部实现或显式组合的 `DeferredActionQueue` 提供。
//!
use crate::error::EvbusError;
use crate::message::Payload;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 失败上下文
#[derive(Debug)]
pub struct FailureContext {
    pub topic: Arc<str>,
    pub payload: Payload,
    pub error: EvbusError,
    pub failed_at: DateTime<Utc>,
}

impl FailureContext {
    pub fn new(topic: Arc<str>, payload: Payload, error: EvbusError) -> Self {
        Self {
            topic,
            payload,
            error,
            failed_at: Utc::now(),
        }
    }

    /// 尝试以具体类型读取载荷
    pub fn payload_as<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

/// 失败通知器：返回 `true` 表示希望重试
pub trait FailureNotifier: Send + Sync {
    fn on_failure(&self, context: &FailureContext) -> bool;
}

impl<F> FailureNotifier for F
where
    F: Fn(&FailureContext) -> bool + Send + Sync,
{
    fn on_failure(&self, context: &FailureContext) -> bool {
        (self)(context)
    }
}
