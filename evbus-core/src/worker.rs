//! 后台轮询线程
//!
//! 延迟动作队列与队列版总线共用的"单消费者 + 空闲轮询"线程模型：
//! - 首次入队时通过原子 CAS 惰性、幂等地启动；
//! - 线程退出（包括意外崩溃）时复位运行标记，下一次入队会重新拉起消费者，
//!   队列中尚未取出的条目不会丢失；
//! - 每次轮询检查停止信号，支持协作式关闭。
//!
use crate::error::{EvbusError, EvbusResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) trait PollingWorker: Send + Sync + 'static {
    /// 线程名
    const NAME: &'static str;

    fn running(&self) -> &AtomicBool;

    fn stop_token(&self) -> &CancellationToken;

    fn poll_interval(&self) -> Duration;

    /// 处理一个条目；队列为空时返回 `false`
    fn poll_once(&self) -> bool;
}

/// 若消费线程未运行则启动之
pub(crate) fn ensure_started<W: PollingWorker>(worker: &Arc<W>) -> EvbusResult<()> {
    if worker
        .running()
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(());
    }

    let owned = worker.clone();
    let spawned = thread::Builder::new()
        .name(W::NAME.to_string())
        .spawn(move || run(owned));

    match spawned {
        Ok(_) => Ok(()),
        Err(err) => {
            worker.running().store(false, Ordering::Release);
            tracing::error!(worker = W::NAME, error = %err, "failed to spawn worker thread");
            Err(EvbusError::Worker {
                reason: err.to_string(),
            })
        }
    }
}

fn run<W: PollingWorker>(worker: Arc<W>) {
    let _guard = RunningGuard(worker.running());
    tracing::debug!(worker = W::NAME, "worker started");

    while !worker.stop_token().is_cancelled() {
        if !worker.poll_once() {
            thread::sleep(worker.poll_interval());
        }
    }

    tracing::debug!(worker = W::NAME, "worker stopped");
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!("worker thread terminated by panic; it will be restarted on next enqueue");
        }
        self.0.store(false, Ordering::Release);
    }
}
