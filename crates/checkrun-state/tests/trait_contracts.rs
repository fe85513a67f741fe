//! Trait contract tests for RunLedger.
//!
//! Every check runs against both the in-memory and the filesystem backend;
//! any conforming implementation must pass these.

use chrono::Utc;
use checkrun_state::fakes::MemoryRunLedger;
use checkrun_state::storage_traits::*;
use checkrun_state::{FsRunLedger, StorageError};
use serde_json::json;

fn metadata(branch: &str) -> RunMetadata {
    RunMetadata {
        workflow_name: "quality".to_string(),
        event: "push".to_string(),
        branch: branch.to_string(),
        git_sha: Some("abc123".to_string()),
        tags: json!({ "steps": 10 }),
    }
}

fn event(seq: u64, kind: &str) -> RunEvent {
    RunEvent {
        seq,
        kind: kind.to_string(),
        payload: json!({ "seq": seq }),
        timestamp: Utc::now(),
    }
}

fn summary(success: bool) -> RunSummary {
    RunSummary {
        total_events: 2,
        duration_ms: 42,
        success,
    }
}

async fn check_create_then_get(ledger: &dyn RunLedger) {
    let digest = ContentDigest::from_bytes(b"workflow");
    let run_id = ledger.create_run(&digest, metadata("master")).await.unwrap();

    let record = ledger.get_run(&run_id).await.unwrap();
    assert_eq!(record.run_id, run_id);
    assert_eq!(record.workflow_digest, digest);
    assert_eq!(record.status, RunStatus::Running);
    assert_eq!(record.metadata.branch, "master");
    assert!(record.summary.is_none());
    assert!(record.completed_at.is_none());
}

async fn check_events_ordered_by_seq(ledger: &dyn RunLedger) {
    let digest = ContentDigest::from_bytes(b"workflow");
    let run_id = ledger.create_run(&digest, metadata("master")).await.unwrap();

    ledger.append_event(&run_id, event(2, "step_started")).await.unwrap();
    ledger.append_event(&run_id, event(1, "run_started")).await.unwrap();
    ledger.append_event(&run_id, event(3, "step_finished")).await.unwrap();

    let events = ledger.get_events(&run_id).await.unwrap();
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(events[0].kind, "run_started");
}

async fn check_complete_is_terminal(ledger: &dyn RunLedger) {
    let digest = ContentDigest::from_bytes(b"workflow");
    let run_id = ledger.create_run(&digest, metadata("master")).await.unwrap();
    ledger.complete_run(&run_id, summary(true)).await.unwrap();

    let record = ledger.get_run(&run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.summary.as_ref().unwrap().success);
    assert!(record.completed_at.is_some());

    let err = ledger.append_event(&run_id, event(9, "late")).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRunState { .. }));

    let err = ledger.fail_run(&run_id, summary(false)).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRunState { .. }));
}

async fn check_fail_and_cancel(ledger: &dyn RunLedger) {
    let digest = ContentDigest::from_bytes(b"workflow");

    let failed = ledger.create_run(&digest, metadata("master")).await.unwrap();
    ledger.fail_run(&failed, summary(false)).await.unwrap();
    assert_eq!(ledger.get_run(&failed).await.unwrap().status, RunStatus::Failed);

    let cancelled = ledger.create_run(&digest, metadata("master")).await.unwrap();
    ledger.cancel_run(&cancelled, summary(false)).await.unwrap();
    assert_eq!(
        ledger.get_run(&cancelled).await.unwrap().status,
        RunStatus::Cancelled
    );
}

async fn check_missing_run(ledger: &dyn RunLedger) {
    let bogus = RunId::new();
    assert!(matches!(
        ledger.get_run(&bogus).await.unwrap_err(),
        StorageError::RunNotFound { .. }
    ));
    assert!(matches!(
        ledger.get_events(&bogus).await.unwrap_err(),
        StorageError::RunNotFound { .. }
    ));
    assert!(matches!(
        ledger.append_event(&bogus, event(1, "x")).await.unwrap_err(),
        StorageError::RunNotFound { .. }
    ));
    assert!(matches!(
        ledger.complete_run(&bogus, summary(true)).await.unwrap_err(),
        StorageError::RunNotFound { .. }
    ));
}

async fn check_list_filters_by_digest(ledger: &dyn RunLedger) {
    let a = ContentDigest::from_bytes(b"workflow-a");
    let b = ContentDigest::from_bytes(b"workflow-b");
    let first = ledger.create_run(&a, metadata("master")).await.unwrap();
    let second = ledger.create_run(&a, metadata("master")).await.unwrap();
    ledger.create_run(&b, metadata("master")).await.unwrap();

    let all = ledger.list_runs(None).await.unwrap();
    assert_eq!(all.len(), 3);

    let only_a = ledger.list_runs(Some(&a)).await.unwrap();
    assert_eq!(only_a.len(), 2);
    let ids: Vec<&RunId> = only_a.iter().map(|r| &r.run_id).collect();
    assert!(ids.contains(&&first));
    assert!(ids.contains(&&second));
    assert!(only_a.iter().all(|r| r.workflow_digest == a));
}

async fn check_runs_are_isolated(ledger: &dyn RunLedger) {
    let digest = ContentDigest::from_bytes(b"workflow");
    let one = ledger.create_run(&digest, metadata("master")).await.unwrap();
    let two = ledger.create_run(&digest, metadata("master")).await.unwrap();

    ledger.append_event(&one, event(1, "run_started")).await.unwrap();
    ledger.fail_run(&one, summary(false)).await.unwrap();

    assert!(ledger.get_events(&two).await.unwrap().is_empty());
    assert_eq!(ledger.get_run(&two).await.unwrap().status, RunStatus::Running);
    ledger.append_event(&two, event(1, "run_started")).await.unwrap();
}

macro_rules! contract_tests {
    ($($name:ident => $check:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let ledger = MemoryRunLedger::new();
                    $check(&ledger).await;
                }
            )*
        }

        mod filesystem {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let dir = tempfile::tempdir().unwrap();
                    let ledger = FsRunLedger::new(dir.path()).unwrap();
                    $check(&ledger).await;
                }
            )*
        }
    };
}

contract_tests! {
    create_then_get => check_create_then_get,
    events_ordered_by_seq => check_events_ordered_by_seq,
    complete_is_terminal => check_complete_is_terminal,
    fail_and_cancel => check_fail_and_cancel,
    missing_run => check_missing_run,
    list_filters_by_digest => check_list_filters_by_digest,
    runs_are_isolated => check_runs_are_isolated,
}
