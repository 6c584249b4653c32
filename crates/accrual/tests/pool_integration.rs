//! Integration tests for the accrual worker pool running against the
//! in-memory store and the scripted accrual service.

use std::time::Duration;

use accrual::{InMemoryAccrualClient, PoolConfig, RetryPolicy, StubReply, WorkerPool};
use common::order_number::luhn_valid;
use order_store::{
    InMemoryOrderStore, NewOrder, OrderNumber, OrderStatus, OrderStore, OrderStoreExt, UserId,
};

type TestPool = WorkerPool<InMemoryOrderStore, InMemoryAccrualClient>;

struct TestHarness {
    store: InMemoryOrderStore,
    client: InMemoryAccrualClient,
    pool: TestPool,
}

impl TestHarness {
    fn new(config: PoolConfig) -> Self {
        Self::with_store(InMemoryOrderStore::new(), config)
    }

    fn with_store(store: InMemoryOrderStore, config: PoolConfig) -> Self {
        let client = InMemoryAccrualClient::new();
        let pool = WorkerPool::start(store.clone(), client.clone(), config);
        Self {
            store,
            client,
            pool,
        }
    }

    async fn submit(&self, number: OrderNumber) {
        self.store
            .create(NewOrder::new(number, UserId::new(1)))
            .await
            .unwrap();
        self.pool.submitter().submit(number).await.unwrap();
    }

    async fn status(&self, number: OrderNumber) -> OrderStatus {
        self.store.require_order(number).await.unwrap().status
    }

    /// Polls the store until every order is terminal.
    async fn wait_until_settled(&self, numbers: &[OrderNumber]) {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let mut settled = true;
                for number in numbers {
                    if !self.status(*number).await.is_terminal() {
                        settled = false;
                        break;
                    }
                }
                if settled {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("orders did not settle in time");
    }
}

fn number(raw: &str) -> OrderNumber {
    raw.parse().unwrap()
}

fn luhn_numbers(count: usize) -> Vec<OrderNumber> {
    (1000u64..)
        .filter(|n| luhn_valid(*n))
        .take(count)
        .map(|n| OrderNumber::new(n).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_workers_settle_every_order_exactly_once() {
    let harness = TestHarness::new(PoolConfig::default().with_workers(8).with_queue_capacity(16));
    let numbers = luhn_numbers(50);

    for (i, n) in numbers.iter().enumerate() {
        let reply = if i % 5 == 0 {
            StubReply::RemoteInvalid
        } else {
            StubReply::Processed(i as f64)
        };
        harness
            .client
            .script(*n, vec![StubReply::Registered, StubReply::Processing, reply]);
    }

    for n in &numbers {
        harness.submit(*n).await;
        // Duplicate work items must be harmless.
        harness.pool.submitter().submit(*n).await.unwrap();
    }

    harness.wait_until_settled(&numbers).await;

    for (i, n) in numbers.iter().enumerate() {
        let order = harness.store.require_order(*n).await.unwrap();
        if i % 5 == 0 {
            assert_eq!(order.status, OrderStatus::Invalid);
            assert_eq!(order.accrual, None);
        } else {
            assert_eq!(order.status, OrderStatus::Processed);
            assert_eq!(order.accrual, Some(i as f64));
        }
    }

    harness.pool.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reference_scenarios() {
    let harness = TestHarness::new(PoolConfig::default().with_workers(2));
    let processed = number("79927398713");
    let throttled = number("12345678903");
    let unknown = number("4561261212345467");

    harness
        .client
        .script(processed, vec![StubReply::Processed(500.0)]);
    harness.client.script(
        throttled,
        vec![
            StubReply::Throttled(Some(Duration::from_secs(60))),
            StubReply::Processed(42.0),
        ],
    );

    let started = tokio::time::Instant::now();
    for n in [processed, throttled, unknown] {
        harness.submit(n).await;
    }
    harness
        .wait_until_settled(&[processed, throttled, unknown])
        .await;

    // Only the worker that received the cooldown pauses; the other one
    // finishes the requeued order.
    assert!(started.elapsed() < Duration::from_secs(60));

    let order = harness.store.require_order(processed).await.unwrap();
    assert_eq!(order.accrual, Some(500.0));
    assert_eq!(harness.status(throttled).await, OrderStatus::Processed);
    assert_eq!(harness.client.query_count(throttled), 2);
    assert_eq!(harness.status(unknown).await, OrderStatus::Invalid);
    assert_eq!(harness.client.query_count(unknown), 1);

    // Shutdown interrupts the cooldown.
    harness.pool.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn shutdown_leaves_pending_orders_for_recovery() {
    let store = InMemoryOrderStore::new();
    let n = number("79927398713");

    let first = TestHarness::with_store(store.clone(), PoolConfig::default().with_workers(2));
    first.client.script(n, vec![StubReply::Processing]);
    first.submit(n).await;

    while first.client.query_count(n) < 3 {
        tokio::task::yield_now().await;
    }
    first.pool.shutdown().await;
    assert_eq!(
        store.require_order(n).await.unwrap().status,
        OrderStatus::Processing
    );

    let second = TestHarness::with_store(store, PoolConfig::default().with_workers(2));
    second.client.script(n, vec![StubReply::Processed(12.5)]);
    assert_eq!(second.pool.recover_pending().await.unwrap(), 1);

    second.wait_until_settled(&[n]).await;
    assert_eq!(
        second.store.require_order(n).await.unwrap().accrual,
        Some(12.5)
    );
    second.pool.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_succeed() {
    let harness = TestHarness::new(PoolConfig::default().with_workers(1));
    let n = number("18");
    harness.client.script(
        n,
        vec![
            StubReply::Failure(502),
            StubReply::Failure(503),
            StubReply::Processed(7.5),
        ],
    );

    let started = tokio::time::Instant::now();
    harness.submit(n).await;
    harness.wait_until_settled(&[n]).await;

    // 1s after the first failure, 2s after the second.
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(harness.client.query_count(n), 3);
    assert_eq!(harness.status(n).await, OrderStatus::Processed);
    harness.pool.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_retry_budget_leaves_order_pending() {
    let retry = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(60));
    let harness = TestHarness::new(PoolConfig::default().with_workers(1).with_retry(retry));
    let n = number("26");
    harness.client.script(n, vec![StubReply::Failure(500)]);

    harness.submit(n).await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(harness.client.query_count(n), 3);
    assert_eq!(harness.status(n).await, OrderStatus::New);
    assert_eq!(harness.store.list_pending().await.unwrap(), vec![n]);
    harness.pool.shutdown().await;
}

#[tokio::test]
async fn isolated_pools_do_not_share_work() {
    let a = TestHarness::new(PoolConfig::default().with_workers(0));
    let b = TestHarness::new(PoolConfig::default().with_workers(0));

    a.submit(number("34")).await;

    assert_eq!(a.pool.queue().len(), 1);
    assert!(b.pool.queue().is_empty());
}
