//! End-to-end runs of the workload driver against the in-memory backend.

mod common;

use common::{fast_config, insert_only_config};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use workload_core::{
    MemoryBackend, MetricsSnapshot, OperationKind, SkipPolicy, WorkloadDriver, WorkloadError,
};

fn assert_sorted_and_bounded(snapshot: &MetricsSnapshot) {
    macro_rules! check {
        ($series:expr) => {
            for pair in $series.windows(2) {
                assert!(pair[0].timing.measured_at <= pair[1].timing.measured_at);
            }
            for m in $series.iter() {
                assert!(m.timing.measured_at <= snapshot.created_at);
            }
        };
    }
    check!(snapshot.insert);
    check!(snapshot.select);
    check!(snapshot.update);
    check!(snapshot.delete);
    check!(snapshot.maintenance);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_insert_only_fixed_batch() {
    let backend = MemoryBackend::new();
    let mut driver = WorkloadDriver::new(Arc::new(backend.clone()), insert_only_config(100));

    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let exits = driver.stop().await;
    assert!(exits.iter().all(|e| e.is_ok()));

    let snapshot = driver.snapshot();
    // A batch in flight at cancellation is reported with zero items.
    assert!(snapshot
        .insert
        .iter()
        .all(|m| m.inserted_items == 100 || m.inserted_items == 0));
    let full = snapshot
        .insert
        .iter()
        .filter(|m| m.inserted_items == 100)
        .count() as u64;
    assert!(full >= 3, "only {full} full batches");
    assert_eq!(driver.already_written(), 100 * full);
    assert_eq!(backend.len() as u64, 100 * full);

    let written: Vec<u64> = snapshot
        .insert
        .iter()
        .filter(|m| m.inserted_items == 100)
        .map(|m| m.already_written_items)
        .collect();
    let expected: Vec<u64> = (1..=full).map(|i| i * 100).collect();
    assert_eq!(written, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inserted_timestamps_continue_across_batches() {
    let backend = MemoryBackend::new();
    let config = insert_only_config(5);
    let start = config.insert.start_date;
    let step = chrono::TimeDelta::from_std(config.insert.step).unwrap();
    let mut driver = WorkloadDriver::new(Arc::new(backend.clone()), config);

    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    driver.stop().await;

    let rows = backend.rows();
    assert!(!rows.is_empty());
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.created_at, start + step * (i as i32 + 1));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_skip_policy_behind_head() {
    let mut config = insert_only_config(30);
    // One insert of 30 rows, then updates race ahead.
    config.insert.pause = Duration::from_secs(3600);
    config.update.min_items_to_update = 1;
    config.update.max_items_to_update = 10;
    config.update.pause = Duration::from_millis(1);
    config.update.skip_policy = SkipPolicy::BehindHead { window: 50 };

    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), config);
    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    driver.stop().await;

    let snapshot = driver.snapshot();
    assert!(snapshot.update.len() > 1);
    assert!(snapshot.update.iter().all(|m| m.offset == 0));
    assert!(snapshot.update.iter().all(|m| m.already_written_items <= 30));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_skip_policy_sees_counter() {
    let mut config = fast_config();
    config.update.min_items_to_skip = 3;
    config.update.skip_policy = SkipPolicy::custom(|written| written + 10);

    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), config);
    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    driver.stop().await;

    let snapshot = driver.snapshot();
    assert!(!snapshot.update.is_empty());
    assert!(snapshot.update.iter().all(|m| m.offset >= 3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshots_grow_monotonically() {
    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), fast_config());
    driver.start().await.unwrap();

    let mut previous = driver.snapshot();
    assert_sorted_and_bounded(&previous);
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let next = driver.snapshot();
        assert_sorted_and_bounded(&next);
        assert!(next.created_at >= previous.created_at);
        for kind in OperationKind::ALL {
            assert!(next.len(kind) >= previous.len(kind), "{kind} shrank");
        }
        assert_eq!(&next.insert[..previous.insert.len()], &previous.insert[..]);
        assert_eq!(&next.maintenance[..previous.maintenance.len()], &previous.maintenance[..]);
        previous = next;
    }

    driver.stop().await;
    for kind in OperationKind::ALL {
        assert!(previous.len(kind) > 0, "no {kind} measurements");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_counter_matches_inserted_items() {
    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), fast_config());
    driver.start().await.unwrap();

    let mut last = 0;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let now = driver.already_written();
        assert!(now >= last);
        last = now;
    }
    driver.stop().await;

    let snapshot = driver.snapshot();
    let inserted: u64 = snapshot.insert.iter().map(|m| m.inserted_items).sum();
    assert_eq!(driver.already_written(), inserted);
    if let Some(last) = snapshot.insert.last() {
        assert_eq!(last.already_written_items, inserted);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_joins_every_loop() {
    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), fast_config());
    assert!(!driver.is_running());
    driver.start().await.unwrap();
    assert!(driver.is_running());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let exits = driver.stop().await;
    let kinds: Vec<_> = exits.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, OperationKind::ALL.to_vec());
    assert!(exits.iter().all(|e| e.is_ok()));
    assert!(!driver.is_running());

    let after_stop = driver.snapshot();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = driver.snapshot();
    assert!(after_stop.same_measurements(&later));

    assert!(driver.stop().await.is_empty());
    assert!(matches!(
        driver.start().await,
        Err(WorkloadError::AlreadyStarted)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parent_token_stops_loops() {
    let parent = CancellationToken::new();
    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), fast_config())
        .with_parent_token(&parent);
    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    parent.cancel();
    let exits = tokio::time::timeout(Duration::from_secs(5), driver.stop())
        .await
        .unwrap();
    assert_eq!(exits.len(), 5);
    assert!(exits.iter().all(|e| e.is_ok()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_interrupts_long_pauses() {
    let mut config = fast_config();
    config.select.pause = Duration::from_secs(3600);
    config.maintenance.pause = Duration::from_secs(3600);
    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), config);
    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let exits = tokio::time::timeout(Duration::from_secs(5), driver.stop())
        .await
        .unwrap();
    assert_eq!(exits.len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_before_start_is_empty() {
    let driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), fast_config());
    let snapshot = driver.snapshot();
    assert!(snapshot.is_empty());
    assert_eq!(driver.already_written(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_config_is_rejected_before_prepare() {
    let backend = MemoryBackend::new();
    let mut config = fast_config();
    config.select.min_items_to_select = 10;
    config.select.max_items_to_select = 1;

    let mut driver = WorkloadDriver::new(Arc::new(backend.clone()), config);
    assert!(matches!(driver.start().await, Err(WorkloadError::Config(_))));
    assert_eq!(backend.prepare_runs(), 0);
    assert!(!driver.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_serializes_to_json() {
    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), fast_config());
    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    driver.stop().await;

    let snapshot = driver.snapshot();
    let json = serde_json::to_value(&snapshot).unwrap();
    let first_insert = &json["insert"][0];
    assert!(first_insert["inserted_items"].is_u64());
    assert!(first_insert["duration_us"].is_u64());
    assert!(first_insert["rate_per_second"].is_string());

    let parsed: MetricsSnapshot = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, snapshot);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_select_iterations_are_spaced_by_pause() {
    let pause = Duration::from_millis(50);
    let mut config = fast_config();
    config.select.pause = pause;
    let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), config);
    driver.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    driver.stop().await;

    let snapshot = driver.snapshot();
    assert!(snapshot.select.len() >= 3, "{} selects", snapshot.select.len());
    assert!(snapshot.select.len() <= 10, "{} selects", snapshot.select.len());
    assert!(snapshot.select.iter().all(|m| m.timing.configured_pause == pause));
    for pair in snapshot.select.windows(2) {
        let gap = (pair[1].timing.measured_at - pair[0].timing.measured_at).to_std().unwrap();
        assert!(gap >= pause, "gap {gap:?} shorter than pause");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_after_stop_is_rejected() {
    let backend = MemoryBackend::new();
    let mut driver = WorkloadDriver::new(Arc::new(backend.clone()), fast_config());

    assert!(driver.stop().await.is_empty());
    assert!(matches!(driver.start().await, Err(WorkloadError::Cancelled)));
    assert_eq!(backend.prepare_runs(), 0);
    assert!(!driver.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_with_cancelled_parent_is_rejected() {
    let parent = CancellationToken::new();
    parent.cancel();
    let backend = MemoryBackend::new();
    let mut driver = WorkloadDriver::new(Arc::new(backend.clone()), fast_config())
        .with_parent_token(&parent);

    assert!(matches!(driver.start().await, Err(WorkloadError::Cancelled)));
    assert_eq!(backend.prepare_runs(), 0);
}
