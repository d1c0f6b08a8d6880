//! 延迟动作队列（DeferredActionQueue）
//!
//! 把“决定执行某项工作”与“何时执行”解耦：调用方只负责入队，
//! 单个后台消费线程按入队顺序逐个执行，以少量调度延迟换取对瞬时失败的容忍。
//!
//! 单个条目的状态流转：
//! `Queued -> Running -> { Succeeded(移除) | Failed-Retryable(剩余次数-1, 重新排到队尾) | Failed-Exhausted }`
//!
//! - 重试条目排在当前所有已入队条目之后，不做退避，也不区分优先级；
//! - 耗尽重试次数的条目交给 `on_exhausted` 回调（未设置则记录日志后丢弃）；
//! - 工作单元返回错误或 panic 都在条目边界被捕获，不会终止消费线程。
//!
use crate::config::DeferredActionConfig;
use crate::error::{EvbusError, EvbusResult, panic_message};
use crate::worker::{self, PollingWorker};
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 可重复执行的工作单元
pub type UnitOfWork = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// 耗尽重试后的回调
pub type ExhaustedCallback = Arc<dyn Fn(ExhaustedAction) + Send + Sync>;

/// 入队后返回的不透明标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(Uuid);

impl ActionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 耗尽重试次数的动作
#[derive(Debug)]
pub struct ExhaustedAction {
    pub id: ActionId,
    /// 实际执行次数（首次 + 重试）
    pub attempts: u32,
    /// 最后一次失败的原因
    pub error: anyhow::Error,
}

struct DeferredAction {
    id: ActionId,
    work: UnitOfWork,
    attempts_remaining: u32,
    attempts: u32,
}

struct Shared {
    queue: SegQueue<DeferredAction>,
    running: AtomicBool,
    stop: CancellationToken,
    config: DeferredActionConfig,
    on_exhausted: Option<ExhaustedCallback>,
}

/// 延迟动作队列，克隆后共享同一个队列与消费线程
#[derive(Clone)]
pub struct DeferredActionQueue {
    shared: Arc<Shared>,
}

impl Default for DeferredActionQueue {
    fn default() -> Self {
        Self::new(DeferredActionConfig::default())
    }
}

impl DeferredActionQueue {
    pub fn new(config: DeferredActionConfig) -> Self {
        Self::build(config, None)
    }

    /// 创建带耗尽回调的队列
    pub fn with_exhausted_callback(
        config: DeferredActionConfig,
        on_exhausted: impl Fn(ExhaustedAction) + Send + Sync + 'static,
    ) -> Self {
        Self::build(config, Some(Arc::new(on_exhausted)))
    }

    fn build(config: DeferredActionConfig, on_exhausted: Option<ExhaustedCallback>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: SegQueue::new(),
                running: AtomicBool::new(false),
                stop: CancellationToken::new(),
                config,
                on_exhausted,
            }),
        }
    }

    /// 入队一个工作单元，`max_attempts` 为首次失败后的最大重试次数。
    ///
    /// 首次入队时启动消费线程；队列已关闭时返回 `EvbusError::ShutDown`。
    pub fn push<F>(&self, work: F, max_attempts: u32) -> EvbusResult<ActionId>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        if self.shared.stop.is_cancelled() {
            return Err(EvbusError::ShutDown);
        }

        let id = ActionId::generate();
        self.shared.queue.push(DeferredAction {
            id,
            work: Box::new(work),
            attempts_remaining: max_attempts,
            attempts: 0,
        });
        worker::ensure_started(&self.shared)?;

        Ok(id)
    }

    /// 当前排队（不含正在执行）的条目数
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(std::sync::atomic::Ordering::Acquire)
    }

    /// 停止消费线程；正在执行的条目会执行完，其余条目保留在队列中
    pub fn shutdown(&self) {
        self.shared.stop.cancel();
    }
}

impl Shared {
    fn execute(&self, mut action: DeferredAction) {
        action.attempts += 1;

        let outcome = catch_unwind(AssertUnwindSafe(|| (action.work)()));
        let error = match outcome {
            Ok(Ok(())) => {
                tracing::trace!(action_id = %action.id, attempts = action.attempts, "deferred action succeeded");
                return;
            }
            Ok(Err(err)) => err,
            Err(panic) => anyhow::anyhow!("unit of work panicked: {}", panic_message(panic.as_ref())),
        };

        if action.attempts_remaining > 0 {
            action.attempts_remaining -= 1;
            tracing::warn!(
                action_id = %action.id,
                attempts = action.attempts,
                remaining = action.attempts_remaining,
                error = %error,
                "deferred action failed; requeued"
            );
            self.queue.push(action);
            return;
        }

        tracing::error!(
            action_id = %action.id,
            attempts = action.attempts,
            error = %error,
            "deferred action exhausted its attempts"
        );
        if let Some(callback) = &self.on_exhausted {
            let exhausted = ExhaustedAction {
                id: action.id,
                attempts: action.attempts,
                error,
            };
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(exhausted))) {
                tracing::error!(reason = %panic_message(panic.as_ref()), "exhausted callback panicked");
            }
        }
    }
}

impl PollingWorker for Shared {
    const NAME: &'static str = "evbus-deferred";

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
            Some(action) => {
                self.execute(action);
                true
            }
            None => false,
        }
    }
}
