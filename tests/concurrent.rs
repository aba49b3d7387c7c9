use cuckoo_amq::CuckooFilter;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

// The filter does no locking of its own; these tests share it the way callers
// are expected to, behind a lock that serializes mutation.

#[test]
fn test_concurrent_reads() {
    let mut filter = CuckooFilter::with_capacity(1024);

    // Insert test data
    for i in 0..100u32 {
        assert!(filter.insert(&i.to_le_bytes()).is_ok());
    }

    let filter = Arc::new(RwLock::new(filter));
    let mut handles = vec![];

    // Spawn multiple reader threads
    for _ in 0..5 {
        let filter_clone = Arc::clone(&filter);
        handles.push(thread::spawn(move || {
            let filter = filter_clone.read().unwrap();
            for i in 0..100u32 {
                assert!(filter.lookup(&i.to_le_bytes()));
            }
        }));
    }

    // All reads should succeed
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_insert() {
    let filter = Arc::new(Mutex::new(CuckooFilter::with_capacity(1024)));
    let mut handles = vec![];

    // Spawn writer threads
    for thread_id in 0..5 {
        let filter_clone = Arc::clone(&filter);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let item = format!("thread_{thread_id}_item_{i}");
                filter_clone.lock().unwrap().insert(&item).unwrap();
            }
        }));
    }

    // Wait for all threads
    for handle in handles {
        handle.join().unwrap();
    }

    // check if all items are inserted
    let filter = filter.lock().unwrap();
    for thread_id in 0..5 {
        for i in 0..100 {
            let item = format!("thread_{thread_id}_item_{i}");
            assert!(filter.lookup(&item));
        }
    }

    // Should have inserted 500 items total
    assert_eq!(filter.len(), 500);
}

#[test]
fn test_concurrent_insert_and_delete() {
    let filter = Arc::new(RwLock::new(CuckooFilter::with_capacity(1024)));
    let mut handles = vec![];

    // Spawn writer threads
    for thread_id in 0..5 {
        let filter_clone = Arc::clone(&filter);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let item = format!("thread_{thread_id}_item_{i}");
                filter_clone.write().unwrap().insert(&item).unwrap();
            }
        }));
    }

    // Spawn deleter threads, each waiting for its writer's items
    for thread_id in 0..5 {
        let filter_clone = Arc::clone(&filter);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let item = format!("thread_{thread_id}_item_{i}");
                while filter_clone.write().unwrap().delete(&item).is_err() {
                    thread::yield_now();
                }
            }
        }));
    }

    // Wait for all threads
    for handle in handles {
        handle.join().unwrap();
    }

    // Should have deleted all items
    assert!(filter.read().unwrap().is_empty());
}
