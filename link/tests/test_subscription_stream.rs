//! Integration tests for the pull side of a subscription: ordering, errors,
//! termination, cancellation and cleanup, all against `MemoryTransport`.

use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use relay_link::{
    CancellationToken, EventHandlers, MemoryTransport, RelayLinkError, RemoteError, ResumeMarker,
    SubscriptionOptions, SubscriptionStatus, TransportEvent,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;

use common::{client, client_with_handlers, current_transport_id, eventually, subscribe, within};

// ── ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn values_arrive_in_push_order_then_end() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    for n in 1..=3 {
        assert!(transport.emit(&tid, TransportEvent::data(json!(n))));
    }
    transport.emit(&tid, TransportEvent::Completed);

    assert_eq!(within(sub.next()).await, Some(Ok(json!(1))));
    assert_eq!(within(sub.next()).await, Some(Ok(json!(2))));
    assert_eq!(within(sub.next()).await, Some(Ok(json!(3))));
    assert_eq!(within(sub.next()).await, None);
    assert_eq!(within(sub.next()).await, None);
    assert_eq!(sub.status(), SubscriptionStatus::Completed);
}

#[tokio::test]
async fn buffered_value_precedes_stream_error() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    transport.emit(&tid, TransportEvent::data(json!(1)));
    transport.emit(&tid, TransportEvent::error(RemoteError::code("X")));

    assert_eq!(within(sub.next()).await, Some(Ok(json!(1))));
    for _ in 0..2 {
        let err = within(sub.next()).await.unwrap().unwrap_err();
        assert_eq!(err.code(), Some("X"));
    }
    assert_eq!(sub.status(), SubscriptionStatus::Failed);
}

#[tokio::test]
async fn ten_thousand_values_drain_in_order() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    for n in 0..10_000u32 {
        transport.emit(&tid, TransportEvent::data(json!(n)));
    }
    transport.emit(&tid, TransportEvent::Completed);

    let drained: Vec<u32> = within(
        sub.into_stream()
            .map(|item| serde_json::from_value::<u32>(item.unwrap()).unwrap())
            .collect::<Vec<_>>(),
    )
    .await;
    assert_eq!(drained, (0..10_000).collect::<Vec<_>>());
}

#[tokio::test]
async fn early_pulls_are_served_first_come_first_served() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    let mut first = Box::pin(sub.next());
    let mut second = Box::pin(sub.next());
    assert!((&mut first).now_or_never().is_none());
    assert!((&mut second).now_or_never().is_none());

    transport.emit(&tid, TransportEvent::data(json!("a")));
    transport.emit(&tid, TransportEvent::data(json!("b")));

    assert_eq!(within(first).await, Some(Ok(json!("a"))));
    assert_eq!(within(second).await, Some(Ok(json!("b"))));
}

#[tokio::test]
async fn abandoned_pull_does_not_lose_a_value() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    {
        let mut abandoned = Box::pin(sub.next());
        assert!((&mut abandoned).now_or_never().is_none());
    }
    transport.emit(&tid, TransportEvent::data(json!("kept")));

    assert_eq!(within(sub.next()).await, Some(Ok(json!("kept"))));
}

#[tokio::test]
async fn typed_pulls_decode_each_value() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Price {
        symbol: String,
        cents: u64,
    }

    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    transport.emit(&tid, TransportEvent::data(json!({ "symbol": "ABC", "cents": 1250 })));
    transport.emit(&tid, TransportEvent::data(json!({ "symbol": "ABC" })));

    let price = within(sub.next_as::<Price>()).await.unwrap().unwrap();
    assert_eq!(price, Price { symbol: "ABC".into(), cents: 1250 });
    assert!(matches!(
        within(sub.next_as::<Price>()).await,
        Some(Err(RelayLinkError::SerializationError(_)))
    ));
}

// ── start ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_start_returns_error_and_leaves_nothing_behind() {
    let transport = MemoryTransport::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();
    let client = client_with_handlers(
        &transport,
        EventHandlers::new().on_error(move |e| seen.lock().push(e)),
    );
    let rejection = RelayLinkError::SubscribeRejected(RemoteError::new("DENIED", "not allowed"));
    transport.reject_next_subscribe(rejection.clone());

    let err = within(client.subscribe("feed.events", json!({}), SubscriptionOptions::new()))
        .await
        .unwrap_err();

    assert_eq!(err, rejection);
    assert_eq!(err.code(), Some("DENIED"));
    assert_eq!(transport.subscribe_count(), 1);
    assert_eq!(transport.listener_count(), 0);
    assert!(transport.unsubscribed().is_empty());
    assert_eq!(client.active_subscription_count(), 0);

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(!errors[0].recoverable);
}

#[tokio::test]
async fn slow_start_times_out_and_is_stopped() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    transport.delay_subscribe(Some(std::time::Duration::from_secs(3)));

    let err = within(client.subscribe("feed.events", json!({}), SubscriptionOptions::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, RelayLinkError::TimeoutError(_)));
    assert_eq!(transport.listener_count(), 0);
    // The host may have accepted the late start; it is told to stop anyway.
    assert_eq!(transport.unsubscribed().len(), 1);
    assert_eq!(client.active_subscription_count(), 0);
}

#[tokio::test]
async fn completion_before_start_returns_leaves_no_connection_behind() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    transport.delay_subscribe(Some(std::time::Duration::from_millis(100)));

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.subscribe("feed.events", json!({}), SubscriptionOptions::new()).await }
    });
    eventually(|| transport.listener_count() == 1).await;
    let transport_id = transport.listening_transport_ids()[0].clone();
    assert!(transport.emit(&transport_id, TransportEvent::data(json!("early"))));
    assert!(transport.emit(&transport_id, TransportEvent::Completed));

    let sub = within(pending).await.unwrap().unwrap();
    assert_eq!(sub.status(), SubscriptionStatus::Completed);
    assert_eq!(transport.listener_count(), 0);
    assert!(transport.active_transport_ids().is_empty());
    assert_eq!(transport.unsubscribed(), vec![transport_id]);

    assert_eq!(within(sub.next()).await, Some(Ok(json!("early"))));
    assert_eq!(within(sub.next()).await, None);
}

#[tokio::test]
async fn start_request_carries_input_and_resume_marker() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new().with_resume_marker("m-1")).await;
    let tid = current_transport_id(&sub);

    let requests = transport.subscribe_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].transport_id, tid);
    assert_eq!(requests[0].path, "feed.events");
    assert_eq!(requests[0].input, json!({ "topic": "t" }));
    assert_eq!(requests[0].resume_marker, Some(ResumeMarker::new("m-1")));

    transport.emit(&tid, TransportEvent::data(json!(1)));
    transport.emit(&tid, TransportEvent::data_with_marker(json!(2), "m-2"));
    transport.emit(&tid, TransportEvent::data(json!(3)));
    assert_eq!(sub.last_resume_marker(), Some(ResumeMarker::new("m-2")));
}

// ── termination ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn terminate_resolves_pending_pull_with_end() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    let mut pending = Box::pin(sub.next());
    assert!((&mut pending).now_or_never().is_none());

    within(sub.terminate()).await;

    assert_eq!(within(pending).await, None);
    assert!(sub.is_terminated());
    assert!(!transport.is_listening(&tid));
    assert_eq!(transport.unsubscribed(), vec![tid.clone()]);
    assert!(!transport.emit(&tid, TransportEvent::data(json!("late"))));
}

#[tokio::test]
async fn terminate_discards_buffer_and_hides_errors() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    transport.emit(&tid, TransportEvent::data(json!(1)));
    transport.emit(&tid, TransportEvent::error(RemoteError::code("X")));
    within(sub.terminate()).await;

    assert_eq!(within(sub.next()).await, None);
}

#[tokio::test]
async fn terminate_is_idempotent() {
    let transport = MemoryTransport::new();
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    let client = client_with_handlers(
        &transport,
        EventHandlers::new().on_disconnect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let sub = subscribe(&client, SubscriptionOptions::new()).await;

    within(sub.terminate()).await;
    within(sub.terminate()).await;
    within(sub.close()).await.unwrap();

    assert_eq!(transport.unsubscribed().len(), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(sub.status(), SubscriptionStatus::Closed);
}

#[tokio::test]
async fn failed_stop_call_is_swallowed_and_reported() {
    let transport = MemoryTransport::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();
    let client = client_with_handlers(
        &transport,
        EventHandlers::new().on_error(move |e| seen.lock().push(e)),
    );
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    transport.fail_unsubscribe(true);

    within(sub.terminate()).await;

    assert!(sub.is_terminated());
    assert_eq!(transport.listener_count(), 0);
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Failed to unsubscribe"));
    assert!(!errors[0].recoverable);
}

#[tokio::test]
async fn cancellation_token_terminates_subscription() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let token = CancellationToken::new();
    let sub = subscribe(
        &client,
        SubscriptionOptions::new().with_cancellation_token(token.clone()),
    )
    .await;

    let mut pending = Box::pin(sub.next());
    assert!((&mut pending).now_or_never().is_none());

    token.cancel();

    assert_eq!(within(pending).await, None);
    within(transport.wait_for_unsubscribes(1)).await;
    assert!(sub.is_terminated());
    assert_eq!(client.active_subscription_count(), 0);

    // Explicit terminate after cancellation is a no-op.
    within(sub.terminate()).await;
    assert_eq!(transport.unsubscribed().len(), 1);
}

#[tokio::test]
async fn dropping_the_handle_stops_the_stream() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    drop(sub);

    within(transport.wait_for_unsubscribes(1)).await;
    assert_eq!(transport.unsubscribed(), vec![tid.clone()]);
    assert!(!transport.is_listening(&tid));
    assert_eq!(client.active_subscription_count(), 0);
}

// ── registry and hooks ───────────────────────────────────────────────────────

#[tokio::test]
async fn registry_lists_live_subscriptions() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let first = subscribe(&client, SubscriptionOptions::new()).await;
    let second = subscribe(&client, SubscriptionOptions::new()).await;

    let ids: Vec<String> = client.subscriptions().into_iter().map(|info| info.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.id().to_string()));
    assert!(ids.contains(&second.id().to_string()));

    transport.emit(&current_transport_id(&second), TransportEvent::data_with_marker(json!(1), 7u64));
    within(first.terminate()).await;

    let infos = client.subscriptions();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].id, second.id());
    assert_eq!(infos[0].status, SubscriptionStatus::Streaming);
    assert_eq!(infos[0].last_resume_marker, Some(ResumeMarker::from(7u64)));
    assert!(infos[0].last_event_time_ms.is_some());
}

#[tokio::test]
async fn lifecycle_hooks_observe_connect_receive_and_disconnect() {
    let transport = MemoryTransport::new();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let (on_connect, on_receive, on_disconnect) = (log.clone(), log.clone(), log.clone());
    let client = client_with_handlers(
        &transport,
        EventHandlers::new()
            .on_connect(move |info| {
                on_connect.lock().push(format!("connect:{}", info.reconnected))
            })
            .on_receive(move |event| on_receive.lock().push(format!("receive:{}", event.kind())))
            .on_disconnect(move |reason| {
                on_disconnect.lock().push(format!("disconnect:{}", reason.message))
            }),
    );
    let sub = subscribe(&client, SubscriptionOptions::new()).await;
    let tid = current_transport_id(&sub);

    transport.emit(&tid, TransportEvent::data(json!(1)));
    transport.emit(&tid, TransportEvent::Completed);
    within(sub.terminate()).await;

    assert_eq!(
        *log.lock(),
        vec![
            "connect:false".to_string(),
            "receive:data".to_string(),
            "receive:completed".to_string(),
            "disconnect:completed".to_string(),
        ]
    );
}

#[tokio::test]
async fn concurrent_consumers_share_one_stream() {
    let transport = MemoryTransport::new();
    let client = client(&transport);
    let sub = Arc::new(subscribe(&client, SubscriptionOptions::new()).await);
    let tid = current_transport_id(&sub);

    let reader = {
        let sub = sub.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = sub.next().await {
                seen.push(item.unwrap());
            }
            seen
        })
    };

    for n in 0..50 {
        transport.emit(&tid, TransportEvent::data(json!(n)));
        if n % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }
    transport.emit(&tid, TransportEvent::Completed);

    let seen = within(reader).await.unwrap();
    assert_eq!(seen, (0..50).map(|n| json!(n)).collect::<Vec<_>>());
    eventually(|| sub.status() == SubscriptionStatus::Completed).await;
}
