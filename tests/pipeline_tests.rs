//! End-to-end fixity pipeline tests.
//!
//! Deposit, expiry, re-verification and failure notification over real
//! on-disk state.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use fixity::daemon::{Dispatcher, Disposition, Trigger};
use fixity::failure::NotificationKind;
use fixity::object::ObjectRef;
use fixity::reliability::RetryConfig;
use fixity::schedule::{Clock, ExpiryWatcher};
use fixity::store::FilesystemObjectStore;
use fixity::sweep::SweepFilter;

use crate::common::{self, HELLO_MD5};

fn fast_retry() -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(1)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(2))
}

// =============================================================================
// Deposit -> expiry -> verify -> failure notification
// =============================================================================

#[tokio::test]
async fn test_bit_rot_is_detected_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    let mut t = common::open(&config);

    let objects = FilesystemObjectStore::open(&config.storage.root).unwrap();
    let object = ObjectRef::new("archive", "scans/001.tif").unwrap();
    objects.put(&object, b"hello world").await.unwrap();

    let verifier = t.engine.verifier().clone();
    let quoted = format!("\"{}\"", HELLO_MD5.to_uppercase());
    let record = verifier.deposit(&object, Some(quoted.as_str())).await.unwrap();
    assert!(record.is_ok());
    assert_eq!(record.checksum, HELLO_MD5);

    let watcher = ExpiryWatcher::new(
        verifier.schedule().clone(),
        t.clock.clone(),
        Duration::from_millis(10),
        10,
    );

    // Not due yet
    assert!(watcher.poll_once().await.unwrap().is_empty());

    // Base interval plus the largest jitter is well under a year
    t.clock.advance(ChronoDuration::days(365));
    let due = watcher.poll_once().await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].object(), &object);
    assert!(watcher.poll_once().await.unwrap().is_empty());

    // Bytes rot on disk
    objects.put(&object, b"hello w0rld").await.unwrap();

    let detector = t.engine.failure_detector();
    let mut changes = verifier.ledger().subscribe();
    let dispatcher = Dispatcher::new(
        verifier.clone(),
        t.engine.notifier().clone(),
        t.engine.clock().clone(),
    )
    .with_retry(fast_retry());

    let disposition = dispatcher
        .dispatch(Trigger::VerificationDue {
            object: object.clone(),
        })
        .await;
    assert_eq!(disposition, Disposition::Processed);

    let change = changes.recv().await.unwrap();
    assert!(detector.handle(&change).await);

    let notification = t.notifications.recv().await.unwrap();
    assert_eq!(notification.kind, NotificationKind::ChecksumFailure);
    assert_eq!(notification.container, "archive");
    assert_eq!(notification.key, "scans/001.tif");
    assert_eq!(notification.deployment.as_deref(), Some("test"));
    assert!(notification.message.contains(HELLO_MD5));

    let stored = verifier.ledger().get(&object).await.unwrap();
    assert!(!stored.is_ok());
    assert_eq!(stored.checksum, HELLO_MD5);

    // Held: no new schedule entry after a failed verification
    assert!(verifier.schedule().get(&object).await.unwrap().is_none());
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    let object = ObjectRef::new("archive", "doc.pdf").unwrap();

    {
        let t = common::open(&config);
        let objects = FilesystemObjectStore::open(&config.storage.root).unwrap();
        objects.put(&object, b"hello world").await.unwrap();
        t.engine.verifier().deposit(&object, None).await.unwrap();
    }

    let t = common::open(&config);
    let record = t.engine.verifier().ledger().get(&object).await.unwrap();
    assert!(record.is_ok());
    assert_eq!(record.checksum, HELLO_MD5);

    let entry = t.engine.verifier().schedule().get(&object).await.unwrap().unwrap();
    assert_eq!(entry.next_checksum_date(), record.next_checksum_date);
}

#[tokio::test]
async fn test_deleted_object_is_forgotten() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    let t = common::open(&config);

    let objects = FilesystemObjectStore::open(&config.storage.root).unwrap();
    let object = ObjectRef::new("archive", "gone.txt").unwrap();
    objects.put(&object, b"short lived").await.unwrap();
    t.engine.verifier().deposit(&object, None).await.unwrap();

    objects.delete(&object).await.unwrap();
    let dispatcher = Dispatcher::new(
        t.engine.verifier().clone(),
        t.engine.notifier().clone(),
        t.engine.clock().clone(),
    );
    let disposition = dispatcher
        .dispatch(Trigger::Deleted {
            object: object.clone(),
        })
        .await;
    assert_eq!(disposition, Disposition::Processed);

    assert!(t.engine.verifier().ledger().find(&object).await.unwrap().is_none());
    assert!(t.engine.verifier().schedule().get(&object).await.unwrap().is_none());
}

// =============================================================================
// Sweep and background tasks
// =============================================================================

#[tokio::test]
async fn test_sweep_over_redb_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    let t = common::open(&config);
    let objects = FilesystemObjectStore::open(&config.storage.root).unwrap();

    for i in 0..5 {
        let object = ObjectRef::new("archive", format!("item-{i}")).unwrap();
        objects.put(&object, format!("content {i}").as_bytes()).await.unwrap();
        t.engine.verifier().deposit(&object, None).await.unwrap();
    }
    let rotten = ObjectRef::new("archive", "item-2").unwrap();
    objects.put(&rotten, b"tampered").await.unwrap();

    let report = t.engine.sweeper(2).run(SweepFilter::All).await.unwrap();
    assert_eq!(report.pages, 3);
    assert_eq!(report.scanned, 5);
    assert_eq!(report.passed, 4);
    assert_eq!(report.failed, 1);

    let report = t.engine.sweeper(2).run(SweepFilter::Failed).await.unwrap();
    assert_eq!(report.selected, 1);
}

#[tokio::test]
async fn test_watcher_feeds_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    let t = common::open(&config);
    let objects = FilesystemObjectStore::open(&config.storage.root).unwrap();

    let object = ObjectRef::new("archive", "a.bin").unwrap();
    objects.put(&object, b"hello world").await.unwrap();
    let verifier = t.engine.verifier().clone();
    let first = verifier.deposit(&object, None).await.unwrap();
    t.clock.advance(ChronoDuration::days(365));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (due_tx, mut due_rx) = mpsc::channel(8);
    let (trigger_tx, trigger_rx) = mpsc::channel(8);

    let watcher = ExpiryWatcher::new(
        verifier.schedule().clone(),
        t.clock.clone(),
        Duration::from_millis(5),
        10,
    );
    let dispatcher = Arc::new(
        Dispatcher::new(
            verifier.clone(),
            t.engine.notifier().clone(),
            t.engine.clock().clone(),
        )
        .with_retry(fast_retry()),
    );

    let watcher_task = tokio::spawn(watcher.run(due_tx, shutdown_tx.subscribe()));
    let dispatcher_task = tokio::spawn(dispatcher.run(trigger_rx, 2, shutdown_tx.subscribe()));

    let entry = tokio::time::timeout(Duration::from_secs(2), due_rx.recv())
        .await
        .unwrap()
        .unwrap();
    trigger_tx
        .send(Trigger::VerificationDue {
            object: entry.object().clone(),
        })
        .await
        .unwrap();

    // The successful verification writes a fresh schedule entry
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let record = verifier.ledger().get(&object).await.unwrap();
        if record.last_checksum_date > first.last_checksum_date {
            assert!(record.is_ok());
            assert!(record.next_checksum_date > t.clock.now());
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "verification never ran");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    shutdown_tx.send(()).unwrap();
    watcher_task.await.unwrap();
    dispatcher_task.await.unwrap();
}
