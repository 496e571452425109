//! # Integration Tests
//!
//! Integration and end-to-end tests.
//!
//! Covers:
//! - Contract snapshot tests
//! - Routing, ordering, backpressure and shutdown across crates
//! - Config file to running dispatcher

#[cfg(test)]
mod contract_tests {
    use contracts::{DiscardReason, HandlerError, RoutingMode, ShutdownPolicy};

    #[test]
    fn test_contract_defaults() {
        let _ = contracts::ConfigVersion::V1;
        assert_eq!(RoutingMode::default(), RoutingMode::Hash);
        assert_eq!(ShutdownPolicy::default(), ShutdownPolicy::Drain);
    }

    #[test]
    fn test_status_strings_are_stable() {
        // Metric label values; renaming them breaks dashboards
        assert_eq!(HandlerError::failed("x").kind(), "failed");
        assert_eq!(HandlerError::Panicked("x".into()).kind(), "panicked");
        assert_eq!(DiscardReason::Shutdown.as_str(), "shutdown");
        assert_eq!(DiscardReason::NeverStarted.as_str(), "never_started");
        assert_eq!(RoutingMode::RoundRobin.as_str(), "round_robin");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use contracts::{named, HandlerError, HandlerResult, HashFn};
    use dispatcher::{
        Dispatcher, DispatcherHandle, LifecycleState, RoutingMode, ShutdownPolicy, WorkItem,
    };
    use observability::MetricsObserver;

    /// Keys of the form "s<digit>-..." route to shard <digit>
    fn shard_prefix_hash() -> HashFn {
        Arc::new(|key: &str| u32::from(key.as_bytes()[1] - b'0'))
    }

    fn noop(key: &str) -> WorkItem<u32> {
        WorkItem::from_fn(key, 0, |_: &u32| Ok(()))
    }

    /// shard_count=4, buffer_size=1, default hash
    #[test]
    fn test_reference_scenario() {
        let dispatcher = Dispatcher::<u32>::new("scenario", 4, 1, None).unwrap();
        dispatcher.start().unwrap();

        let first = dispatcher.submit_indexed(noop("x"), RoutingMode::Hash);
        let second = dispatcher.submit_indexed(noop("x"), RoutingMode::Hash);
        assert!(first.is_some());
        assert_eq!(first, second);

        let rotation: Vec<usize> = (0..8)
            .map(|i| {
                dispatcher
                    .submit_indexed(noop(&format!("rr-{i}")), RoutingMode::RoundRobin)
                    .unwrap()
            })
            .collect();
        assert_eq!(rotation, vec![0, 1, 2, 3, 0, 1, 2, 3]);

        dispatcher.stop();
    }

    #[test]
    fn test_full_shard_blocks_until_start() {
        let dispatcher = Arc::new(Dispatcher::<u32>::new("backpressure", 4, 1, None).unwrap());
        assert!(dispatcher.submit(noop("x"), RoutingMode::Hash));

        let producer = {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || dispatcher.submit(noop("x"), RoutingMode::Hash))
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!producer.is_finished(), "submit must block on a full shard");

        dispatcher.start().unwrap();
        assert!(producer.join().unwrap());

        dispatcher.stop();
        let shard = dispatcher.router().hash_index("x");
        assert_eq!(dispatcher.metrics()[shard].completed_count, 2);
    }

    #[test]
    fn test_blocked_handler_holds_back_its_shard_only() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let dispatcher = Arc::new(
            Dispatcher::builder("stalled", 2)
                .buffer_size(1)
                .hash_fn(shard_prefix_hash())
                .build()
                .unwrap(),
        );
        dispatcher.start().unwrap();

        let gate = named("gate", move |_: &u32| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(())
        });
        // Occupies the worker, then the single queue slot
        assert!(dispatcher.submit(WorkItem::new("s0-a", 0, gate.clone()), RoutingMode::Hash));
        thread::sleep(Duration::from_millis(50));
        assert!(dispatcher.submit(WorkItem::new("s0-b", 0, gate), RoutingMode::Hash));

        let blocked = {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || dispatcher.submit(noop("s0-c"), RoutingMode::Hash))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!blocked.is_finished());

        // The other shard is unaffected
        assert!(dispatcher.submit(noop("s1-a"), RoutingMode::Hash));

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert!(blocked.join().unwrap());
        dispatcher.stop();
    }

    #[test]
    fn test_per_key_fifo_under_concurrent_producers() {
        let seen: Arc<Mutex<HashMap<String, Vec<u32>>>> = Arc::default();
        let dispatcher = Arc::new(Dispatcher::<u32>::new("fifo", 4, 8, None).unwrap());
        dispatcher.start().unwrap();

        let record = {
            let seen = Arc::clone(&seen);
            move |key: String| {
                let seen = Arc::clone(&seen);
                move |seq: &u32| -> HandlerResult {
                    seen.lock().unwrap().entry(key.clone()).or_default().push(*seq);
                    Ok(())
                }
            }
        };

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let dispatcher = Arc::clone(&dispatcher);
                let record = record.clone();
                thread::spawn(move || {
                    for seq in 0..200u32 {
                        let key = format!("producer-{p}-key-{}", seq % 5);
                        let item = WorkItem::from_fn(key.clone(), seq, record(key));
                        assert!(dispatcher.submit(item, RoutingMode::Hash));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        dispatcher.stop();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 20);
        for (key, seqs) in seen.iter() {
            assert_eq!(seqs.len(), 40, "key {key}");
            assert!(seqs.windows(2).all(|w| w[0] < w[1]), "out of order for {key}");
        }
    }

    #[test]
    fn test_concurrent_round_robin_is_balanced() {
        let dispatcher = Arc::new(Dispatcher::<u32>::new("rr", 4, 16, None).unwrap());
        dispatcher.start().unwrap();

        let producers: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(dispatcher.submit(noop("same-key"), RoutingMode::RoundRobin));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        dispatcher.stop();

        assert!(dispatcher.metrics().iter().all(|m| m.submitted_count == 200));
        assert_eq!(dispatcher.router().cursor(), 0);
    }

    #[test]
    fn test_panic_on_one_shard_does_not_affect_others() {
        let observer = Arc::new(MetricsObserver::new());
        let dispatcher = Dispatcher::builder("isolation", 4)
            .buffer_size(4)
            .hash_fn(shard_prefix_hash())
            .observer(observer.clone())
            .build()
            .unwrap();
        dispatcher.start().unwrap();

        let done = Arc::new(AtomicUsize::new(0));
        let handler = {
            let done = Arc::clone(&done);
            named("maybe_panic", move |value: &u32| {
                if *value == 2 {
                    panic!("poisoned payload");
                }
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        for round in 0..10 {
            for shard in 0..4u32 {
                // Shard 2 panics on every other item and must keep draining
                let value = if shard == 2 && round % 2 == 0 { 2 } else { 0 };
                let item = WorkItem::new(format!("s{shard}-{round}"), value, handler.clone());
                assert!(dispatcher.submit(item, RoutingMode::Hash));
            }
        }
        dispatcher.stop();

        let metrics = dispatcher.metrics();
        for shard in [0, 1, 3] {
            assert_eq!(metrics[shard].completed_count, 10);
            assert_eq!(metrics[shard].panic_count, 0);
        }
        assert_eq!(metrics[2].panic_count, 5);
        assert_eq!(metrics[2].completed_count, 5);
        assert_eq!(done.load(Ordering::SeqCst), 35);

        let summary = observer.summary();
        assert_eq!(summary.panicked, 5);
        assert_eq!(summary.total_items, 40);
    }

    #[test]
    fn test_drain_then_stop_completes_everything_queued() {
        let done = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::<u32>::new("drain", 2, 64, None).unwrap();
        dispatcher.start().unwrap();

        let handler = {
            let done = Arc::clone(&done);
            named("slow", move |_: &u32| {
                thread::sleep(Duration::from_millis(2));
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        for i in 0..100 {
            assert!(dispatcher.submit(
                WorkItem::new(format!("k{i}"), i, handler.clone()),
                RoutingMode::RoundRobin
            ));
        }

        dispatcher.stop();
        assert_eq!(dispatcher.state(), LifecycleState::Stopped);
        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert!(!dispatcher.submit(noop("late"), RoutingMode::Hash));
        assert!(!dispatcher.submit(None, RoutingMode::Hash));
    }

    #[test]
    fn test_immediate_stop_accounts_for_every_accepted_item() {
        let observer = Arc::new(MetricsObserver::new());
        let dispatcher = Arc::new(
            Dispatcher::builder("immediate", 4)
                .buffer_size(8)
                .shutdown_policy(ShutdownPolicy::Immediate)
                .observer(observer.clone())
                .build()
                .unwrap(),
        );
        dispatcher.start().unwrap();

        let accepted = Arc::new(AtomicUsize::new(0));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let dispatcher = Arc::clone(&dispatcher);
                let accepted = Arc::clone(&accepted);
                thread::spawn(move || {
                    for i in 0..1_000u32 {
                        let item = WorkItem::from_fn(format!("p{p}-{i}"), i, |_: &u32| {
                            thread::sleep(Duration::from_micros(200));
                            Ok(())
                        });
                        if !dispatcher.submit(item, RoutingMode::Hash) {
                            break;
                        }
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        dispatcher.stop();
        for producer in producers {
            producer.join().unwrap();
        }

        let summary = observer.summary();
        assert_eq!(
            (summary.total_items + summary.discarded) as usize,
            accepted.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn test_handler_errors_only_reach_observers() {
        let observer = Arc::new(MetricsObserver::new());
        let dispatcher = Dispatcher::builder("errors", 2)
            .observer(observer.clone())
            .build()
            .unwrap();
        dispatcher.start().unwrap();

        for i in 0..6u32 {
            let item = WorkItem::from_fn(format!("k{i}"), i, |v: &u32| {
                if v % 2 == 0 {
                    Err(HandlerError::failed("even"))
                } else {
                    Ok(())
                }
            });
            // Accepted regardless of how the handler will fare
            assert!(dispatcher.submit(item, RoutingMode::RoundRobin));
        }
        dispatcher.stop();

        let summary = observer.summary();
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.succeeded, 3);
        assert!((summary.error_rate - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_async_handle_end_to_end() {
        let observer = Arc::new(MetricsObserver::new());
        let dispatcher = Dispatcher::builder("async-e2e", 3)
            .buffer_size(0)
            .observer(observer.clone())
            .build()
            .unwrap();
        let handle = DispatcherHandle::spawn(dispatcher).unwrap();

        let mut tasks = Vec::new();
        for p in 0..4 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25u32 {
                    assert!(handle.submit(noop(&format!("{p}-{i}")), RoutingMode::Hash).await);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        handle.stop().await;

        assert_eq!(observer.summary().total_items, 100);
        assert!(!handle.submit(noop("late"), RoutingMode::Hash).await);
    }
}

#[cfg(test)]
mod config_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::ShutdownPolicy;
    use dispatcher::{DispatcherBuilder, RoutingMode, WorkItem};
    use observability::MetricsObserver;

    const CONFIG: &str = r#"
[dispatcher]
name = "from-config"
shard_count = 3
buffer_size = 2
shutdown_policy = "drain"
handler_timeout_ms = 50

[load]
mode = "round_robin"
"#;

    #[test]
    fn test_config_drives_dispatcher() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        assert_eq!(config.dispatcher.shutdown_policy, ShutdownPolicy::Drain);

        let observer = Arc::new(MetricsObserver::new());
        let dispatcher = DispatcherBuilder::from_config(&config.dispatcher)
            .observer(observer.clone())
            .build()
            .unwrap();
        assert_eq!(dispatcher.name(), "from-config");
        assert_eq!(dispatcher.shard_count(), 3);
        assert_eq!(dispatcher.buffer_size(), 2);
        dispatcher.start().unwrap();

        for i in 0..6u64 {
            // Item 0 overruns the configured handler timeout
            let delay = if i == 0 { 300 } else { 0 };
            let item = WorkItem::from_fn(format!("k{i}"), delay, |ms: &u64| {
                std::thread::sleep(Duration::from_millis(*ms));
                Ok(())
            });
            assert!(dispatcher.submit(item, config.load.mode));
        }
        dispatcher.stop();

        let summary = observer.summary();
        assert_eq!(summary.total_items, 6);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.succeeded, 5);
        assert_eq!(config.load.mode, RoutingMode::RoundRobin);
    }
}
