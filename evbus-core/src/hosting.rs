//! 宿主生命周期（SubscriberHost）
//!
//! 应用启动时一次性把固定的一组订阅者注册到总线上：
//! - `register` 收集安装器（通常是注册闭包），不立即执行；
//! - `start` 按注册顺序执行全部安装器，仅首次调用生效；
//! - `stop` 不需要清理任何状态，只记录日志。
//!
use crate::error::EvbusResult;
use crate::manager::PubSubManager;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 订阅者安装器：把一组订阅者注册到给定总线
pub trait SubscriberInstaller<M: ?Sized>: Send {
    fn install(&self, manager: &M) -> EvbusResult<()>;
}

impl<M, F> SubscriberInstaller<M> for F
where
    M: ?Sized,
    F: Fn(&M) -> EvbusResult<()> + Send,
{
    fn install(&self, manager: &M) -> EvbusResult<()> {
        (self)(manager)
    }
}

struct NamedInstaller<M: ?Sized> {
    name: Cow<'static, str>,
    installer: Box<dyn SubscriberInstaller<M>>,
}

pub struct SubscriberHost<M> {
    manager: Arc<M>,
    installers: Mutex<Vec<NamedInstaller<M>>>,
    started: AtomicBool,
}

impl<M: PubSubManager> SubscriberHost<M> {
    pub fn new(manager: Arc<M>) -> Self {
        Self {
            manager,
            installers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// 登记一个安装器；`start` 之后登记的安装器不会再被执行
    pub fn register<I>(&self, name: impl Into<Cow<'static, str>>, installer: I) -> &Self
    where
        I: SubscriberInstaller<M> + 'static,
    {
        let name = name.into();
        if self.is_started() {
            tracing::warn!(installer = %name, "host already started; installer ignored");
            return self;
        }
        self.installers.lock().push(NamedInstaller {
            name,
            installer: Box::new(installer),
        });
        self
    }

    /// 执行全部安装器；重复调用直接返回
    ///
    /// 任一安装器失败即返回错误，已完成的注册保留在总线上。
    pub fn start(&self) -> EvbusResult<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let installers = std::mem::take(&mut *self.installers.lock());
        let total = installers.len();
        for entry in installers {
            if let Err(err) = entry.installer.install(self.manager.as_ref()) {
                tracing::error!(installer = %entry.name, error = %err, "subscriber installer failed");
                return Err(err);
            }
            tracing::debug!(installer = %entry.name, "subscribers installed");
        }

        tracing::info!(installers = total, "subscriber host started");
        Ok(())
    }

    pub fn stop(&self) {
        tracing::info!("subscriber host stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }
}
