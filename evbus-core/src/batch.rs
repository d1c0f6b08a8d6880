//! 优先级批处理队列（BatchPriorityQueue）
//!
//! 收集带整数优先级的无参工作单元，一次性按“优先级升序 -> 同优先级内入队顺序”执行后清空。
//!
//! 与 [`DeferredActionQueue`](crate::deferred::DeferredActionQueue) 不同：
//! - 没有后台线程，也没有重试；
//! - 任一工作单元失败会立即中止本批次并把错误返回给 `invoke` 的调用方，
//!   批次在执行前已被整体取出，未执行的剩余单元随之丢弃；
//! - `add`/`invoke` 需要 `&mut self`，单线程批处理约束由借用规则静态保证。
//!
use std::borrow::Cow;
use std::collections::BTreeMap;

type BatchWork = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct BatchUnit {
    name: Option<Cow<'static, str>>,
    work: BatchWork,
}

/// `for_each` 访问到的只读条目
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchEntry<'a> {
    pub priority: i32,
    /// 在同优先级桶内的位置
    pub index: usize,
    pub name: Option<&'a str>,
}

/// 优先级批处理队列（数值越小越先执行）
#[derive(Default)]
pub struct BatchPriorityQueue {
    buckets: BTreeMap<i32, Vec<BatchUnit>>,
}

impl BatchPriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, priority: i32, work: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push(priority, None, Box::new(work));
    }

    /// 添加带名称的工作单元，名称仅用于 `for_each` 观察与日志
    pub fn add_named<F>(&mut self, priority: i32, name: impl Into<Cow<'static, str>>, work: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push(priority, Some(name.into()), Box::new(work));
    }

    fn push(&mut self, priority: i32, name: Option<Cow<'static, str>>, work: BatchWork) {
        self.buckets
            .entry(priority)
            .or_default()
            .push(BatchUnit { name, work });
    }

    /// 执行并清空当前批次，返回成功执行的单元数
    pub fn invoke(&mut self) -> anyhow::Result<usize> {
        let batch = std::mem::take(&mut self.buckets);
        let mut executed = 0;

        for (priority, units) in batch {
            for unit in units {
                if let Err(err) = (unit.work)() {
                    tracing::warn!(
                        priority,
                        unit = unit.name.as_deref().unwrap_or("<unnamed>"),
                        executed,
                        error = %err,
                        "batch unit failed; remaining units discarded"
                    );
                    return Err(err);
                }
                executed += 1;
            }
        }

        Ok(executed)
    }

    /// 按执行顺序只读遍历，不执行也不清空
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(BatchEntry<'_>),
    {
        for (priority, units) in &self.buckets {
            for (index, unit) in units.iter().enumerate() {
                visitor(BatchEntry {
                    priority: *priority,
                    index,
                    name: unit.name.as_deref(),
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl std::fmt::Debug for BatchPriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPriorityQueue")
            .field("buckets", &self.buckets.len())
            .field("units", &self.len())
            .finish()
    }
}
