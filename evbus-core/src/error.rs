//! 消息总线统一错误定义
//!
//! 覆盖注册参数校验、订阅者执行失败、载荷类型不匹配、
//! 不支持的操作与取消等最小必要集合。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EvbusError {
    // --- 注册/参数 ---
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // --- 分发 ---
    #[error("subscriber failed: topic={topic}, reason={source}")]
    Handler {
        topic: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("subscriber panicked: topic={topic}, reason={reason}")]
    HandlerPanicked { topic: String, reason: String },
    #[error("type mismatch: topic={topic}, expected={expected}")]
    TypeMismatch {
        topic: String,
        expected: &'static str,
    },

    // --- 运行时 ---
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("operation cancelled")]
    Cancelled,
    #[error("worker has been shut down")]
    ShutDown,
    #[error("worker error: {reason}")]
    Worker { reason: String },

    // --- 配置 ---
    #[error("config error: {source}")]
    Config {
        #[from]
        source: serde_json::Error,
    },
}

/// 统一 Result 类型别名
pub type EvbusResult<T> = Result<T, EvbusError>;

impl EvbusError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        EvbusError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// 是否由订阅者自身的执行失败引起（区别于框架层错误）
    pub fn is_handler_failure(&self) -> bool {
        matches!(
            self,
            EvbusError::Handler { .. } | EvbusError::HandlerPanicked { .. }
        )
    }
}

/// 将 `catch_unwind` 捕获的 panic 载荷转为可读文本
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
