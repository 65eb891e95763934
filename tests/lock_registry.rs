use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use mailsink::lock::SyncLockRegistry;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_key_critical_sections_never_overlap() {
    let registry = Arc::new(SyncLockRegistry::new());
    let busy = Arc::new(AtomicBool::new(false));
    let entered = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let busy = busy.clone();
        let entered = entered.clone();
        tasks.push(tokio::spawn(async move {
            let _guard = registry.acquire(1, "INBOX").await;
            assert!(!busy.swap(true, Ordering::SeqCst), "overlapping holders");
            entered.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(5)).await;
            busy.store(false, Ordering::SeqCst);
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(entered.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn different_keys_do_not_block_each_other() {
    let registry = SyncLockRegistry::new();

    let _inbox = registry.acquire(1, "INBOX").await;

    // Another folder and another account acquire immediately.
    timeout(Duration::from_millis(100), registry.acquire(1, "Sent"))
        .await
        .expect("different folder should not block");
    timeout(Duration::from_millis(100), registry.acquire(2, "INBOX"))
        .await
        .expect("different account should not block");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_are_served_in_arrival_order() {
    let registry = Arc::new(SyncLockRegistry::new());
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let holder = registry.acquire(7, "INBOX").await;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let registry = registry.clone();
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            let _guard = registry.acquire(7, "INBOX").await;
            order.lock().unwrap().push(i);
        }));
        // Make sure each waiter is queued before the next one arrives.
        sleep(Duration::from_millis(20)).await;
    }

    drop(holder);
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_holder_releases_the_lock() {
    let registry = Arc::new(SyncLockRegistry::new());

    let task = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let _guard = registry.acquire(1, "INBOX").await;
            panic!("sync pass blew up");
        })
    };
    assert!(task.await.is_err());

    // The guard dropped during unwind; the key is acquirable again.
    timeout(Duration::from_millis(200), registry.acquire(1, "INBOX"))
        .await
        .expect("lock should be free after panic");
}
