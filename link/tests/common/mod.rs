#![allow(dead_code)]

use relay_link::{
    EventHandlers, MemoryTransport, RelayLinkClient, RelayLinkTimeouts, Subscription,
    SubscriptionOptions, TransportId,
};
use serde_json::json;
use std::future::Future;
use std::time::Duration;

/// Upper bound for any single await in the suite.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Install `env_logger` once; `RUST_LOG=debug` shows the lifecycle lines.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn client(transport: &MemoryTransport) -> RelayLinkClient {
    client_with_handlers(transport, EventHandlers::new())
}

pub fn client_with_handlers(transport: &MemoryTransport, handlers: EventHandlers) -> RelayLinkClient {
    init_logging();
    RelayLinkClient::builder()
        .transport(transport.clone())
        .timeouts(RelayLinkTimeouts::fast())
        .event_handlers(handlers)
        .build()
        .expect("client should build")
}

/// Options with auto-reconnect and millisecond-scale backoff.
pub fn fast_reconnect(max_reconnects: u32) -> SubscriptionOptions {
    SubscriptionOptions::new()
        .with_auto_reconnect(true)
        .with_reconnect_base_delay_ms(5)
        .with_reconnect_max_delay_ms(20)
        .with_max_reconnects(max_reconnects)
}

pub async fn subscribe(client: &RelayLinkClient, options: SubscriptionOptions) -> Subscription {
    within(client.subscribe("feed.events", json!({ "topic": "t" }), options))
        .await
        .expect("subscribe should succeed")
}

pub fn current_transport_id(sub: &Subscription) -> TransportId {
    sub.transport_id().expect("subscription should have a transport id")
}

/// Await `fut`, failing the test if it does not settle within [`DEADLINE`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("operation did not settle in time")
}

/// Poll `condition` until it holds or [`DEADLINE`] passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
}
