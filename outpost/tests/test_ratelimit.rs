use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use outpost::protocol::{DataCategory, Level};
use outpost::transports::{AsyncTransport, DeliveryResponse};
use outpost::{Client, ClientOptions, Hub, Transport};

fn options() -> ClientOptions {
    ClientOptions {
        dsn: "https://public@outpost.invalid/1".parse().ok(),
        transport_batch_size: 8,
        transport_batch_timeout: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Binds a client whose transport answers every request with `response`.
fn run_with_response<F: FnOnce(&Arc<AsyncTransport>)>(
    response: DeliveryResponse,
    f: F,
) -> usize {
    let sent = Arc::new(AtomicUsize::new(0));
    let counter = sent.clone();
    let transport = Arc::new(AsyncTransport::new(&options(), move |_envelope| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(response.clone())
    }));
    let client = Arc::new(Client::with_options(ClientOptions {
        transport: Some(Arc::new(transport.clone())),
        ..options()
    }));
    let hub = Arc::new(Hub::new(Some(client.clone()), Default::default()));
    Hub::run(hub, || f(&transport));
    client.close(Some(Duration::from_secs(2)));
    sent.load(Ordering::SeqCst)
}

#[test]
fn test_429_suppresses_errors_for_the_window() {
    let sent = run_with_response(
        DeliveryResponse {
            status: 429,
            retry_after: None,
            rate_limits: Some("60:error:organization".into()),
        },
        |transport| {
            outpost::capture_message("first", Level::Error);
            assert!(outpost::flush(Some(Duration::from_secs(2))));
            assert!(transport.is_rate_limited(DataCategory::Error));

            for _ in 0..20 {
                assert!(outpost::capture_message("suppressed", Level::Error).is_nil());
            }
            assert!(outpost::flush(Some(Duration::from_secs(2))));
        },
    );
    assert_eq!(sent, 1);
}

#[test]
fn test_bare_429_applies_default_cooldown() {
    let sent = run_with_response(
        DeliveryResponse {
            status: 429,
            ..Default::default()
        },
        |transport| {
            outpost::capture_message("first", Level::Error);
            assert!(outpost::flush(Some(Duration::from_secs(2))));
            assert!(transport.is_rate_limited(DataCategory::Error));
            assert!(transport.is_rate_limited(DataCategory::Transaction));
            outpost::capture_message("suppressed", Level::Error);
        },
    );
    assert_eq!(sent, 1);
}

#[test]
fn test_sends_resume_after_the_window() {
    let sent = run_with_response(
        DeliveryResponse {
            status: 429,
            retry_after: None,
            rate_limits: Some("1:error:organization".into()),
        },
        |transport| {
            outpost::capture_message("first", Level::Error);
            assert!(outpost::flush(Some(Duration::from_secs(2))));
            assert!(transport.is_rate_limited(DataCategory::Error));
            outpost::capture_message("suppressed", Level::Error);

            std::thread::sleep(Duration::from_millis(2100));
            assert!(!transport.is_rate_limited(DataCategory::Error));
            outpost::capture_message("after the window", Level::Error);
            assert!(outpost::flush(Some(Duration::from_secs(2))));
        },
    );
    assert_eq!(sent, 2);
}

#[test]
fn test_limits_are_per_category() {
    let sent = run_with_response(
        DeliveryResponse {
            status: 200,
            retry_after: None,
            rate_limits: Some("60:transaction:organization".into()),
        },
        |_| {
            outpost::capture_message("first", Level::Error);
            assert!(outpost::flush(Some(Duration::from_secs(2))));
            outpost::capture_message("second", Level::Error);
            assert!(outpost::flush(Some(Duration::from_secs(2))));
        },
    );
    assert_eq!(sent, 2);
}
