use std::sync::Arc;
use std::thread;

use outpost::protocol::Level;
use outpost::test::with_captured_events;
use outpost::{Hub, OutpostFutureExt};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[test]
fn test_threads_have_isolated_scopes() {
    init_logging();
    let events = with_captured_events(|| {
        outpost::configure_scope(|scope| scope.set_tag("origin", "main"));

        let handles: Vec<_> = (0..4)
            .map(|idx| {
                let hub = Arc::new(Hub::new_from_top(Hub::current()));
                thread::spawn(move || {
                    Hub::run(hub, || {
                        outpost::configure_scope(|scope| scope.set_tag("worker", idx));
                        outpost::capture_message("from worker", Level::Info);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        outpost::capture_message("from main", Level::Info);
    });

    assert_eq!(events.len(), 5);
    let mut workers: Vec<_> = events
        .iter()
        .filter_map(|event| event.tags.get("worker").cloned())
        .collect();
    workers.sort();
    assert_eq!(workers, ["0", "1", "2", "3"]);
    assert!(events
        .iter()
        .all(|event| event.tags.get("origin").map(String::as_str) == Some("main")));

    let main = events.last().unwrap();
    assert_eq!(main.message.as_deref(), Some("from main"));
    assert!(!main.tags.contains_key("worker"));
}

#[test]
fn test_futures_carry_their_hub() {
    init_logging();
    let events = with_captured_events(|| {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let first = async {
                outpost::configure_scope(|scope| scope.set_tag("task", "first"));
                tokio::task::yield_now().await;
                outpost::capture_message("first", Level::Info);
            }
            .bind_hub(Hub::new_from_top(Hub::current()));
            let second = async {
                tokio::task::yield_now().await;
                outpost::configure_scope(|scope| scope.set_tag("task", "second"));
                outpost::capture_message("second", Level::Info);
            }
            .bind_hub(Hub::new_from_top(Hub::current()));
            tokio::join!(first, second);
        });
    });

    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(
            event.tags.get("task").map(String::as_str),
            event.message.as_deref()
        );
    }
}

#[test]
fn test_hub_without_client_is_inert() {
    let hub = Arc::new(Hub::new(None, Default::default()));
    Hub::run(hub, || {
        assert!(outpost::capture_message("nowhere", Level::Error).is_nil());
        assert!(outpost::last_event_id().is_none());
    });
}
