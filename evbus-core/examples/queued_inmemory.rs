/// 队列版总线（内存版）示例
/// 展示非阻塞发布、跨主题全局 FIFO、失败通知与经延迟动作队列的重试
use anyhow::Result as AnyResult;
use evbus_core::config::{DeferredActionConfig, QueuedConfig};
use evbus_core::deferred::DeferredActionQueue;
use evbus_core::notify::{FailureContext, FailureNotifier};
use evbus_core::queued::{QueuedPubSubManager, RetryPolicy};
use evbus_core::{Message, PubSubManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Message)]
#[message(topic = "user.created")]
struct UserCreated {
    name: String,
}

#[derive(Debug, Message)]
#[message(topic = "user.deleted")]
struct UserDeleted {
    name: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    println!("=== 队列版总线（内存版）示例 ===\n");

    let retry_queue = DeferredActionQueue::with_exhausted_callback(
        DeferredActionConfig::builder()
            .poll_interval(Duration::from_millis(20))
            .build(),
        |exhausted| println!("❌ 重试耗尽: {} (attempts={})", exhausted.id, exhausted.attempts),
    );

    let notifier: Arc<dyn FailureNotifier> = Arc::new(|ctx: &FailureContext| {
        println!("⚠️  分发失败: topic={}, error={}", ctx.topic, ctx.error);
        true
    });

    let bus = QueuedPubSubManager::builder()
        .config(
            QueuedConfig::builder()
                .poll_interval(Duration::from_millis(20))
                .build(),
        )
        .notifier(notifier)
        .retry(RetryPolicy {
            queue: retry_queue.clone(),
            max_attempts: 3,
        })
        .build();

    bus.add_subscriber::<UserCreated, _>(|e: &UserCreated| {
        println!("  -> [printer] user created: {}", e.name);
        anyhow::Ok(())
    })?;

    // 删除处理器前两次失败，之后成功
    let deletes = Arc::new(AtomicUsize::new(0));
    let counter = deletes.clone();
    bus.add_subscriber::<UserDeleted, _>(move |e: &UserDeleted| -> AnyResult<()> {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            anyhow::bail!("storage unavailable");
        }
        println!("  -> [cleanup] user deleted: {}", e.name);
        Ok(())
    })?;

    bus.publish(UserCreated { name: "alice".into() })?;
    bus.publish(UserDeleted { name: "bob".into() })?;
    bus.publish_async(UserCreated { name: "carol".into() }, None)
        .await?;
    println!("✅ 已发布 3 条消息（发布方不等待处理）");

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("\n删除处理器共执行 {} 次", deletes.load(Ordering::SeqCst));

    bus.shutdown();
    retry_queue.shutdown();
    println!("✅ 已关闭");
    Ok(())
}
