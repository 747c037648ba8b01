//! End-to-end run against the in-process backend.

use clap::Parser;
use db_loadtest::{run_workload, CommonRunArgs, RunReport};
use std::sync::Arc;
use workload_core::{MemoryBackend, OperationKind};

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    args: CommonRunArgs,
}

fn write_profile(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("profile.yaml");
    std::fs::write(
        &path,
        r#"insert:
  min_batch_size: 10
  max_batch_size: 50
  pause: 10ms
select:
  min_items_to_select: 1
  max_items_to_select: 20
  pause: 10ms
update:
  min_items_to_update: 1
  max_items_to_update: 10
  pause: 10ms
delete:
  min_items_to_delete: 1
  max_items_to_delete: 5
  pause: 20ms
maintenance:
  pause: 100ms
"#,
    )
    .unwrap();
    path
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_memory_run_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let profile = write_profile(dir.path());
    let report_path = dir.path().join("report.json");

    let cli = Cli::parse_from([
        "test",
        "--duration",
        "1500ms",
        "--poll-interval",
        "500ms",
        "--config",
        profile.to_str().unwrap(),
        "--report",
        report_path.to_str().unwrap(),
        "--seed",
        "7",
    ]);

    let backend = MemoryBackend::new();
    let report = run_workload(Arc::new(backend.clone()), &cli.args).await.unwrap();

    assert_eq!(report.backend, "memory");
    assert_eq!(report.loops.len(), OperationKind::ALL.len());
    assert!(report.loops.iter().all(|l| l.ok));
    assert!(report.snapshot.len(OperationKind::Insert) > 0);
    assert!(report.finished_at >= report.started_at);
    assert_eq!(backend.prepare_runs(), 1);

    let written = RunReport::read_json(&report_path).unwrap();
    assert_eq!(written.backend, "memory");
    assert_eq!(written.config.seed, Some(7));
    assert_eq!(
        written.snapshot.len(OperationKind::Insert),
        report.snapshot.len(OperationKind::Insert)
    );
}

#[tokio::test]
async fn test_invalid_profile_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("profile.yaml");
    std::fs::write(&profile, "insert:\n  min_batch_size: 10\n  max_batch_size: 5\n").unwrap();
    let report_path = dir.path().join("report.json");

    let cli = Cli::parse_from([
        "test",
        "--config",
        profile.to_str().unwrap(),
        "--report",
        report_path.to_str().unwrap(),
    ]);

    let backend = MemoryBackend::new();
    assert!(run_workload(Arc::new(backend.clone()), &cli.args).await.is_err());
    assert_eq!(backend.prepare_runs(), 0);
    assert!(!report_path.exists());
}
