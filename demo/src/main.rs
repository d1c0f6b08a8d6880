use async_trait::async_trait;
use evbus_core::config::PubSubConfig;
use evbus_core::factory::AnyPubSubManager;
use evbus_core::handler::AsyncMessageHandler;
use evbus_core::hosting::SubscriberHost;
use evbus_core::notify::{FailureContext, FailureNotifier};
use evbus_core::registry::SubscriptionRegistry;
use evbus_core::topic::TopicResolver;
use evbus_core::{EvbusResult, Message, PubSubManager};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{
    "kind": "queued",
    "queued": { "poll_interval_ms": 10 },
    "retry": { "max_attempts": 2, "queue": { "poll_interval_ms": 10 } }
}"#;

#[derive(Debug, Clone, Message)]
#[message(topic = "account.opened")]
struct AccountOpened {
    account_id: String,
    initial_balance: i64,
}

#[derive(Debug, Clone, Message)]
#[message(topic = "account.deposited")]
struct Deposited {
    account_id: String,
    amount: i64,
}

/// 异步订阅者：模拟写入读模型
struct LedgerProjection;

#[async_trait]
impl AsyncMessageHandler<Deposited> for LedgerProjection {
    async fn handle(&self, event: Arc<Deposited>) -> anyhow::Result<()> {
        anyhow::ensure!(event.amount > 0, "non-positive deposit: {}", event.amount);
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracing::info!(account = %event.account_id, amount = event.amount, "ledger updated");
        Ok(())
    }
}

fn install_accounts(bus: &AnyPubSubManager) -> EvbusResult<()> {
    bus.add_subscriber::<AccountOpened, _>(|e: &AccountOpened| {
        tracing::info!(
            account = %e.account_id,
            balance = e.initial_balance,
            "account opened"
        );
        anyhow::Ok(())
    })
}

fn install_ledger(bus: &AnyPubSubManager) -> EvbusResult<()> {
    bus.add_async_subscriber::<Deposited, _>(LedgerProjection)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,evbus_core=debug")),
        )
        .init();

    let config = PubSubConfig::from_json_str(CONFIG)?;
    let notifier: Arc<dyn FailureNotifier> = Arc::new(|ctx: &FailureContext| {
        tracing::warn!(topic = %ctx.topic, error = %ctx.error, "dispatch failed; scheduling retry");
        ctx.error.is_handler_failure()
    });
    let bus = AnyPubSubManager::from_config(
        &config,
        Arc::new(SubscriptionRegistry::new()),
        Arc::new(TopicResolver::new()),
        Some(notifier),
    )?;

    let host = SubscriberHost::new(Arc::new(bus));
    host.register("accounts", install_accounts)
        .register("ledger", install_ledger);
    host.start()?;

    let bus = host.manager();
    bus.publish(AccountOpened {
        account_id: "acc-1".to_string(),
        initial_balance: 100,
    })?;
    for amount in [50, -5, 25] {
        bus.publish_async(
            Deposited {
                account_id: "acc-1".to_string(),
                amount,
            },
            None,
        )
        .await?;
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while bus.pending() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // 给重试队列留出执行时间
    tokio::time::sleep(Duration::from_millis(200)).await;

    host.stop();
    bus.shutdown();
    Ok(())
}
