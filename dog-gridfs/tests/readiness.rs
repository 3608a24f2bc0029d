mod common;

use std::time::Duration;

use common::{memory_store, name};
use dog_gridfs::{GridConfig, GridError, StoreCell};

#[tokio::test]
async fn test_pending_cell_fails_fast() {
    let cell = StoreCell::pending();
    assert!(!cell.is_ready());

    let err = cell.get().unwrap_err();
    assert!(matches!(err, GridError::StoreUnavailable { .. }));
}

#[tokio::test]
async fn test_ready_waits_for_publication() {
    let cell = StoreCell::pending();
    let (store, _) = memory_store(4);

    let publisher = cell.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.set(store);
    });

    let store = tokio::time::timeout(Duration::from_secs(1), cell.ready())
        .await
        .expect("store should become ready")
        .unwrap();
    assert!(cell.is_ready());
    assert!(cell.get().is_ok());
    assert!(store.health_check().await.is_ok());
}

#[tokio::test]
async fn test_background_connect_to_sqlite() {
    common::init_tracing();
    let cell = StoreCell::connect_in_background(GridConfig::default().with_chunk_size(4));

    let store = cell.ready().await.unwrap();
    let mut handle = store.images().open_write(name("ready.png")).await.unwrap();
    handle.write(b"ok").await.unwrap();
    handle.commit().await.unwrap();

    // every clone observes the same store
    let other = cell.clone().get().unwrap();
    assert!(other.images().find(&name("ready.png")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_background_connect_failure_is_reported() {
    let cell = StoreCell::connect_in_background(GridConfig::default().with_chunk_size(0));

    let err = cell.ready().await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(err.to_string().contains("chunk_size"));
    assert!(cell.get().is_err());
}

#[tokio::test]
async fn test_explicit_failure() {
    let cell = StoreCell::pending();
    cell.fail("disk full");

    let err = cell.ready().await.unwrap_err();
    assert!(err.to_string().contains("disk full"));
}
