//! Tests for the SQL API delegate

mod common;

use common::{test_params, values, StubFactory};
use sqlbridge::prelude::*;
use std::sync::Arc;

async fn wired_api(pool_name: Option<&str>) -> (SqlApi, Arc<common::Recorder>) {
    let (factory, recorder) = StubFactory::new();
    let provider = ConnectionProvider::new(factory.clone(), test_params());
    let pool = match pool_name {
        Some(name) => Some(
            NamedPool::new(PoolConfig::new(name).with_size(2), factory, test_params())
                .await
                .unwrap(),
        ),
        None => None,
    };

    let api = SqlApi::new();
    api.wire(provider.get_connection().await.unwrap(), pool);
    (api, recorder)
}

// ==================== Wiring Tests ====================

#[tokio::test]
async fn test_unwired_api_rejects_calls() {
    let api = SqlApi::new();
    assert!(!api.is_wired());

    let err = api.check_liveness().await.unwrap_err();
    assert!(matches!(err, Error::NotWired { .. }));
    assert_eq!(err.category(), ErrorCategory::Wiring);

    let err = api
        .execute_using_connection("SELECT 1", &TemplateValues::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotWired { .. }));

    let err = api
        .execute_using_pool("SELECT 1", &TemplateValues::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotWired { .. }));
}

#[tokio::test]
async fn test_check_liveness_reports_connection_state() {
    let (api, recorder) = wired_api(None).await;
    assert!(api.is_wired());
    assert!(api.check_liveness().await.unwrap());

    recorder.set_alive(false);
    assert!(!api.check_liveness().await.unwrap());
}

#[tokio::test]
async fn test_rewire_replaces_connection() {
    let (api, first) = wired_api(None).await;
    let (factory, second) = StubFactory::new();
    let provider = ConnectionProvider::new(factory, test_params());
    api.wire(provider.get_connection().await.unwrap(), None);

    api.execute_using_connection("SELECT 1", &TemplateValues::new())
        .await
        .unwrap();

    assert!(first.statements().is_empty());
    assert_eq!(second.statements(), vec!["SELECT 1"]);
}

// ==================== Single Connection Tests ====================

#[tokio::test]
async fn test_execute_renders_and_commits() {
    let (api, recorder) = wired_api(None).await;

    let outcome = api
        .execute_using_connection(
            "UPDATE users SET name = '$name' WHERE id = ${id}",
            &values(&[("name", "ada"), ("id", "7")]),
        )
        .await
        .unwrap();

    assert!(outcome.is_committed());
    assert_eq!(outcome.rows_affected(), Some(1));
    assert_eq!(
        outcome.statement(),
        "UPDATE users SET name = 'ada' WHERE id = 7"
    );
    assert_eq!(recorder.statements(), vec![outcome.statement().to_string()]);
    assert_eq!(recorder.commits(), 1);
    assert_eq!(recorder.rollbacks(), 0);
}

#[tokio::test]
async fn test_execute_failure_rolls_back() {
    let (api, recorder) = wired_api(None).await;
    recorder.set_fail_execute(true);

    let outcome = api
        .execute_using_connection("DELETE FROM t", &TemplateValues::new())
        .await
        .unwrap();

    assert!(!outcome.is_committed());
    assert_eq!(outcome.error().unwrap().category(), ErrorCategory::Statement);
    assert_eq!(recorder.commits(), 0);
    assert_eq!(recorder.rollbacks(), 1);
    assert!(outcome.into_result().is_err());
}

#[tokio::test]
async fn test_commit_failure_rolls_back() {
    let (api, recorder) = wired_api(None).await;
    recorder.set_fail_commit(true);

    let outcome = api
        .execute_using_connection("INSERT INTO t VALUES (1)", &TemplateValues::new())
        .await
        .unwrap();

    assert!(!outcome.is_committed());
    assert_eq!(recorder.commits(), 1);
    assert_eq!(recorder.rollbacks(), 1);
}

#[tokio::test]
async fn test_rollback_failure_is_reported() {
    let (api, recorder) = wired_api(None).await;
    recorder.set_fail_execute(true);
    recorder.set_fail_rollback(true);

    let outcome = api
        .execute_using_connection("DELETE FROM t", &TemplateValues::new())
        .await
        .unwrap();

    match outcome {
        ExecutionOutcome::RolledBack { rollback_error, .. } => assert!(rollback_error.is_some()),
        other => panic!("expected rollback, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_value_fails_before_driver_call() {
    let (api, recorder) = wired_api(None).await;

    let err = api
        .execute_using_connection("SELECT * FROM t WHERE id = $id", &TemplateValues::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Template { .. }));
    assert!(recorder.statements().is_empty());
    assert_eq!(recorder.commits(), 0);
    assert_eq!(recorder.rollbacks(), 0);
}

#[tokio::test]
async fn test_malformed_template_fails_before_driver_call() {
    let (api, recorder) = wired_api(Some("api_malformed_pool")).await;

    let err = api
        .execute_using_pool("SELECT $ FROM t", &TemplateValues::new())
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Template);
    assert!(recorder.statements().is_empty());
}

#[tokio::test]
async fn test_dollar_escape_renders_literal() {
    let (api, recorder) = wired_api(None).await;

    api.execute_using_connection(
        "SELECT '$$' || name FROM t WHERE id = $id",
        &values(&[("id", "3")]),
    )
    .await
    .unwrap();

    assert_eq!(
        recorder.statements(),
        vec!["SELECT '$' || name FROM t WHERE id = 3"]
    );
}

// ==================== Pool Tests ====================

#[tokio::test]
async fn test_execute_using_pool_without_pool() {
    let (api, recorder) = wired_api(None).await;

    let err = api
        .execute_using_pool("SELECT 1", &TemplateValues::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotWired { .. }));
    assert!(recorder.statements().is_empty());
}

#[tokio::test]
async fn test_execute_using_pool_checks_connection_back_in() {
    let (factory, recorder) = StubFactory::new();
    let provider = ConnectionProvider::new(factory.clone(), test_params());
    let pool = NamedPool::new(
        PoolConfig::new("api_checkin_pool").with_size(2),
        factory,
        test_params(),
    )
    .await
    .unwrap();

    let api = SqlApi::new();
    api.wire(provider.get_connection().await.unwrap(), Some(Arc::clone(&pool)));

    let outcome = api
        .execute_using_pool("DELETE FROM carts WHERE id = $id", &values(&[("id", "9")]))
        .await
        .unwrap();
    assert!(outcome.is_committed());

    recorder.set_fail_execute(true);
    let outcome = api
        .execute_using_pool("DELETE FROM carts WHERE id = $id", &values(&[("id", "10")]))
        .await
        .unwrap();
    assert!(!outcome.is_committed());

    let stats = pool.stats();
    assert_eq!(stats.checkouts, 2);
    assert_eq!(stats.checkins, 2);
    assert_eq!(pool.available(), 2);
    assert_eq!(recorder.commits(), 1);
    assert_eq!(recorder.rollbacks(), 1);
}

#[tokio::test]
async fn test_execute_using_pool_exhausted() {
    let (factory, recorder) = StubFactory::new();
    let provider = ConnectionProvider::new(factory.clone(), test_params());
    let pool = NamedPool::new(
        PoolConfig::new("api_exhausted_pool").with_size(1),
        factory,
        test_params(),
    )
    .await
    .unwrap();

    let api = SqlApi::new();
    api.wire(provider.get_connection().await.unwrap(), Some(Arc::clone(&pool)));

    let held = pool.checkout().await.unwrap();
    let err = api
        .execute_using_pool("SELECT 1", &TemplateValues::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolExhausted { .. }));
    assert!(recorder.statements().is_empty());

    held.release().await;
}
