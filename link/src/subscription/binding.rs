//! One physical connection of a subscription to the transport.

use super::state::SubscriptionState;
use crate::{
    error::{RelayLinkError, Result},
    event_handlers::{ConnectionError, EventHandlers},
    models::{ResumeMarker, SubscribeRequest, TransportId},
    timeouts::{with_timeout, RelayLinkTimeouts},
    transport::{EventListener, ListenerRegistration, Transport},
};
use std::sync::Arc;

/// Listener registration plus the transport-level id it is scoped to.
pub(crate) struct TransportBinding {
    transport_id: TransportId,
    registration: ListenerRegistration,
}

impl TransportBinding {
    /// Register the listener, then issue the start call.
    ///
    /// The listener exists before the start call so no early event is lost.
    /// If the start call fails the listener is unregistered again and the
    /// error is returned. A start call that timed out may still have been
    /// accepted, so it is followed by a best-effort stop call.
    pub(crate) async fn establish(
        state: &Arc<SubscriptionState>,
        generation: u64,
        transport_id: TransportId,
        resume_marker: Option<ResumeMarker>,
    ) -> Result<Self> {
        let context = state.context();
        let weak = Arc::downgrade(state);
        let listener: EventListener = Arc::new(move |event| {
            if let Some(state) = weak.upgrade() {
                state.handle_event(generation, event);
            }
        });
        let registration = context.transport.register_listener(&transport_id, listener);

        let request = SubscribeRequest {
            transport_id: transport_id.clone(),
            path: state.path().to_string(),
            input: state.input().clone(),
            resume_marker,
        };
        log::debug!(
            "[relay-link] Starting {} for subscription {} (transport id {}, resume from {:?})",
            request.path,
            state.id(),
            transport_id,
            request.resume_marker.as_ref().map(|m| m.as_str())
        );

        let started = with_timeout(
            context.timeouts.subscribe_timeout,
            "subscribe",
            context.transport.subscribe(&request),
        )
        .await;

        match started {
            Ok(()) => Ok(Self {
                transport_id,
                registration,
            }),
            Err(e) => {
                registration.unregister();
                if matches!(e, RelayLinkError::TimeoutError(_)) {
                    let stopped = with_timeout(
                        context.timeouts.unsubscribe_timeout,
                        "unsubscribe",
                        context.transport.unsubscribe(&transport_id),
                    )
                    .await;
                    if let Err(stop_err) = stopped {
                        log::warn!(
                            "[relay-link] Ignoring failed unsubscribe for timed out {}: {}",
                            transport_id,
                            stop_err
                        );
                    }
                }
                Err(e)
            },
        }
    }

    pub(crate) fn transport_id(&self) -> &TransportId {
        &self.transport_id
    }

    /// Unregister the listener without telling the transport.
    pub(crate) fn detach(&self) {
        self.registration.unregister();
    }

    /// Unregister the listener and issue the best-effort stop call.
    /// Failures are logged and reported to `on_error`, never returned.
    pub(crate) async fn release(
        self,
        transport: &dyn Transport,
        timeouts: &RelayLinkTimeouts,
        handlers: &EventHandlers,
    ) {
        self.registration.unregister();
        let stopped = with_timeout(
            timeouts.unsubscribe_timeout,
            "unsubscribe",
            transport.unsubscribe(&self.transport_id),
        )
        .await;

        match stopped {
            Ok(()) => log::debug!("[relay-link] Stopped transport id {}", self.transport_id),
            Err(e) => {
                log::warn!(
                    "[relay-link] Ignoring failed unsubscribe for {}: {}",
                    self.transport_id,
                    e
                );
                handlers.emit_error(ConnectionError::new(
                    format!("Failed to unsubscribe {}: {}", self.transport_id, e),
                    false,
                ));
            },
        }
    }
}
