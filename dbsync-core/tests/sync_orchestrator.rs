//! Orchestrator behavior against in-memory doubles.
//!
//! This test suite covers:
//! - Paging and batched inserts
//! - Skip-and-continue versus abort-on-first-failure
//! - Deployment order, trigger synthesis and DEFINER stripping
//! - Cancellation and progress reporting

mod common;

use common::{FakeRemote, FakeTable, RecordingSink};
use dbsync_core::sync::{CancelHandle, LogLevel, SyncPhase};
use dbsync_core::{ErrorCode, ProgressTracker, SyncOptions, SyncOrchestrator, TriggerDefinition};
use proptest::prelude::*;

fn options(chunk_size: u64) -> SyncOptions {
    SyncOptions::new("shop_copy").with_chunk_size(chunk_size)
}

#[tokio::test]
async fn test_three_rows_in_pages_of_two() {
    let remote = FakeRemote::with_tables(vec![FakeTable::new("users", 3)]);
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(2)).run(&remote, &mut sink).await;

    assert!(report.success, "report: {:?}", report);
    assert_eq!(
        remote.calls_starting_with("get_table_data"),
        vec!["get_table_data:users:0:2", "get_table_data:users:2:2"]
    );
    assert_eq!(sink.inserts().len(), 2);
    assert_eq!(report.stats.rows, 3);
    assert_eq!(report.stats.tables, 1);
}

#[tokio::test]
async fn test_missing_table_ddl_is_skipped_by_default() {
    let remote = FakeRemote::with_tables(vec![
        FakeTable::new("orders", 2).without_ddl(),
        FakeTable::new("users", 1),
    ]);
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(100)).run(&remote, &mut sink).await;

    assert!(report.success);
    assert_eq!(report.stats.tables, 1);
    assert_eq!(report.stats.skipped_tables, vec!["orders".to_string()]);
    assert!(report.logs.iter().any(|entry| {
        entry.level == LogLevel::Error && entry.message.contains("orders")
    }));
    assert!(remote.calls_starting_with("get_table_data:orders").is_empty());
    assert!(
        sink.statements()
            .iter()
            .any(|s| s.starts_with("INSERT INTO `users`"))
    );
}

#[tokio::test]
async fn test_missing_table_ddl_aborts_when_requested() {
    let remote = FakeRemote::with_tables(vec![
        FakeTable::new("orders", 2).without_ddl(),
        FakeTable::new("users", 1),
    ]);
    let mut sink = RecordingSink::new();
    let orchestrator =
        SyncOrchestrator::new(options(100).with_abort_on_missing_structure(true));

    let report = orchestrator.run(&remote, &mut sink).await;

    assert!(!report.success);
    assert_eq!(report.error_code(), Some(ErrorCode::FatalMissingDdl));
    assert_eq!(report.stats.tables, 0);
    assert!(remote.calls_starting_with("structure:table:users").is_empty());
    assert!(!report.logs.is_empty());
}

#[tokio::test]
async fn test_table_execution_failure_follows_abort_flag() {
    let remote = FakeRemote::with_tables(vec![FakeTable::new("a", 1), FakeTable::new("b", 1)]);

    let mut sink = RecordingSink::failing_on("CREATE TABLE `a`");
    let report = SyncOrchestrator::new(options(100)).run(&remote, &mut sink).await;
    assert!(report.success);
    assert_eq!(report.stats.skipped_tables, vec!["a".to_string()]);
    assert_eq!(report.stats.tables, 1);

    let mut sink = RecordingSink::failing_on("CREATE TABLE `a`");
    let report = SyncOrchestrator::new(options(100).with_abort_on_missing_structure(true))
        .run(&remote, &mut sink)
        .await;
    assert_eq!(report.error_code(), Some(ErrorCode::SqlExecutionError));
    assert!(
        report
            .error
            .as_ref()
            .is_some_and(|e| e.message.contains("Simulated failure"))
    );
}

#[tokio::test]
async fn test_objects_deploy_in_order() {
    let mut remote = FakeRemote::with_tables(vec![FakeTable::new("users", 1)]);
    remote.views = vec![(
        "active_users".to_string(),
        "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER VIEW `active_users` AS select 1".to_string(),
    )];
    remote.procedures = vec![(
        "cleanup".to_string(),
        "CREATE DEFINER=`app`@`localhost` PROCEDURE `cleanup`() BEGIN END".to_string(),
    )];
    remote.functions = vec![(
        "one".to_string(),
        "CREATE FUNCTION `one`() RETURNS int DETERMINISTIC RETURN 1".to_string(),
    )];
    remote.triggers = vec![TriggerDefinition {
        trigger: "users_bi".to_string(),
        timing: "BEFORE".to_string(),
        event: "INSERT".to_string(),
        table: "users".to_string(),
        statement: "SET NEW.name = UPPER(NEW.name)".to_string(),
    }];
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(100)).run(&remote, &mut sink).await;
    assert!(report.success, "report: {:?}", report);

    let statements = sink.statements();
    let position = |prefix: &str| {
        statements
            .iter()
            .position(|s| s.starts_with(prefix))
            .unwrap_or_else(|| panic!("missing statement {}", prefix))
    };
    assert_eq!(position("CREATE DATABASE IF NOT EXISTS `shop_copy`"), 0);
    assert!(position("DROP TABLE IF EXISTS `users`") < position("CREATE TABLE `users`"));
    assert!(position("INSERT INTO `users`") < position("DROP VIEW IF EXISTS `active_users`"));
    assert!(position("CREATE ALGORITHM") < position("DROP PROCEDURE IF EXISTS `cleanup`"));
    assert!(position("CREATE PROCEDURE `cleanup`") < position("DROP FUNCTION IF EXISTS `one`"));
    assert!(position("CREATE FUNCTION `one`") < position("DROP TRIGGER IF EXISTS `users_bi`"));
    assert_eq!(
        statements.last().map(String::as_str),
        Some("CREATE TRIGGER `users_bi` BEFORE INSERT ON `users` FOR EACH ROW SET NEW.name = UPPER(NEW.name)")
    );
    assert!(statements.iter().all(|s| !s.contains("DEFINER=")));

    assert_eq!(report.stats.views, 1);
    assert_eq!(report.stats.procedures, 1);
    assert_eq!(report.stats.functions, 1);
    assert_eq!(report.stats.triggers, 1);
    assert!(sink.executed.iter().all(|e| e.target_db == "shop_copy"));
    assert!(sink.executed.iter().all(|e| e.disable_foreign_keys));
}

#[tokio::test]
async fn test_definers_kept_when_stripping_is_off() {
    let mut remote = FakeRemote::default();
    remote.procedures = vec![(
        "p".to_string(),
        "CREATE DEFINER=`app`@`%` PROCEDURE `p`() SELECT 1".to_string(),
    )];
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(100).with_strip_definers(false))
        .run(&remote, &mut sink)
        .await;
    assert!(report.success);
    assert!(sink.statements().iter().any(|s| s.contains("DEFINER=`app`@`%`")));
}

#[tokio::test]
async fn test_missing_view_ddl_is_always_fatal() {
    let mut remote = FakeRemote::with_tables(vec![FakeTable::new("users", 1)]);
    remote.views = vec![("broken".to_string(), "  ".to_string())];
    remote.functions = vec![("f".to_string(), "CREATE FUNCTION `f`() RETURNS int RETURN 1".to_string())];
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(100)).run(&remote, &mut sink).await;

    assert_eq!(report.error_code(), Some(ErrorCode::FatalMissingDdl));
    assert_eq!(report.stats.tables, 1);
    assert_eq!(report.stats.rows, 1);
    assert!(remote.calls_starting_with("list:functions").is_empty());
}

#[tokio::test]
async fn test_foreign_key_toggle_is_forwarded() {
    let remote = FakeRemote::with_tables(vec![FakeTable::new("users", 1)]);
    let mut sink = RecordingSink::new();

    SyncOrchestrator::new(options(100).with_disable_foreign_keys(false))
        .run(&remote, &mut sink)
        .await;
    assert!(sink.executed.iter().all(|e| !e.disable_foreign_keys));
}

#[tokio::test]
async fn test_structure_clone_is_repeatable() {
    let remote = FakeRemote::with_tables(vec![FakeTable::new("users", 0)]);

    let mut first = RecordingSink::new();
    let mut second = RecordingSink::new();
    let orchestrator = SyncOrchestrator::new(options(100));
    assert!(orchestrator.run(&remote, &mut first).await.success);
    assert!(orchestrator.run(&remote, &mut second).await.success);

    assert_eq!(first.statements(), second.statements());
    let statements = first.statements();
    assert_eq!(statements[1], "DROP TABLE IF EXISTS `users`");
    assert!(statements[2].starts_with("CREATE TABLE `users`"));
}

#[tokio::test]
async fn test_empty_page_claiming_more_rows_stops() {
    let mut remote = FakeRemote::with_tables(vec![FakeTable::new("ghost", 5), FakeTable::new("users", 1)]);
    remote.endless_table = Some("ghost".to_string());
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(100)).run(&remote, &mut sink).await;

    assert!(report.success);
    assert_eq!(remote.calls_starting_with("get_table_data:ghost").len(), 1);
    assert_eq!(report.stats.skipped_tables, vec!["ghost".to_string()]);
    assert_eq!(report.stats.tables, 1);
}

#[tokio::test]
async fn test_enumeration_failure_is_fatal() {
    let remote = FakeRemote {
        fail_listing: true,
        ..FakeRemote::default()
    };
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(100)).run(&remote, &mut sink).await;

    assert!(!report.success);
    assert_eq!(report.error_code(), Some(ErrorCode::ApplicationError));
    let failure = report.error.unwrap();
    assert_eq!(failure.remote_code.as_deref(), Some("INVALID_API_KEY"));
    assert!(failure.message.contains("Unauthorized: Invalid API key"));
    assert_eq!(sink.statements().len(), 1, "only CREATE DATABASE ran");
}

#[tokio::test]
async fn test_local_database_failure_is_fatal() {
    let remote = FakeRemote::with_tables(vec![FakeTable::new("users", 1)]);
    let mut sink = RecordingSink::failing_on("CREATE DATABASE");

    let report = SyncOrchestrator::new(options(100)).run(&remote, &mut sink).await;

    assert_eq!(report.error_code(), Some(ErrorCode::SqlExecutionError));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_before_start() {
    let remote = FakeRemote::with_tables(vec![FakeTable::new("users", 1)]);
    let mut sink = RecordingSink::new();
    let orchestrator = SyncOrchestrator::new(options(100));
    orchestrator.cancel_handle().cancel();

    let report = orchestrator.run(&remote, &mut sink).await;

    assert_eq!(report.error_code(), Some(ErrorCode::Cancelled));
    assert!(sink.statements().is_empty());
    assert_eq!(orchestrator.subscribe().borrow().phase, SyncPhase::Failed);
}

#[tokio::test]
async fn test_cancel_between_pages() {
    let cancel = CancelHandle::new();
    let mut remote = FakeRemote::with_tables(vec![FakeTable::new("users", 5), FakeTable::new("later", 1)]);
    remote.cancel_on_first_page = Some(cancel.clone());
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(options(2))
        .with_cancel_handle(cancel)
        .run(&remote, &mut sink)
        .await;

    assert_eq!(report.error_code(), Some(ErrorCode::Cancelled));
    assert_eq!(report.stats.rows, 2);
    assert_eq!(remote.calls_starting_with("get_table_data").len(), 1);
    assert!(remote.calls_starting_with("structure:table:later").is_empty());
    assert!(report.stats.skipped_tables.is_empty());
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completes() {
    let mut remote = FakeRemote::with_tables(vec![
        FakeTable::new("a", 3),
        FakeTable::new("b", 3),
        FakeTable::new("c", 0),
    ]);
    remote.views = vec![("v".to_string(), "CREATE VIEW `v` AS select 1".to_string())];
    let tracker = ProgressTracker::new();
    let mut sink = RecordingSink {
        observe: Some(tracker.clone()),
        ..RecordingSink::default()
    };

    let orchestrator = SyncOrchestrator::new(options(2)).with_progress(tracker.clone());
    let receiver = orchestrator.subscribe();
    let report = orchestrator.run(&remote, &mut sink).await;

    assert!(report.success);
    let observed = &sink.observed_percent;
    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{:?}", observed);
    assert!(observed.iter().all(|p| *p < 100.0));
    assert!(observed.iter().any(|p| *p >= 15.0 && *p < 75.0));
    assert_eq!(receiver.borrow().percent, 100.0);
    assert_eq!(receiver.borrow().phase, SyncPhase::Done);
}

#[tokio::test]
async fn test_invalid_options_fail_the_report() {
    let remote = FakeRemote::default();
    let mut sink = RecordingSink::new();

    let report = SyncOrchestrator::new(SyncOptions::new("").with_chunk_size(100))
        .run(&remote, &mut sink)
        .await;

    assert_eq!(report.error_code(), Some(ErrorCode::MissingParameter));
    assert!(sink.statements().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_paging_terminates_with_exact_request_count(rows in 1usize..60, chunk in 1u64..12) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let remote = FakeRemote::with_tables(vec![FakeTable::new("t", rows)]);
        let mut sink = RecordingSink::new();

        let report = runtime.block_on(SyncOrchestrator::new(options(chunk)).run(&remote, &mut sink));

        let expected_pages = (rows as u64).div_ceil(chunk);
        prop_assert!(report.success);
        prop_assert_eq!(remote.calls_starting_with("get_table_data").len() as u64, expected_pages);
        prop_assert_eq!(sink.inserts().len() as u64, expected_pages);
        prop_assert_eq!(report.stats.rows, rows as u64);
    }
}
