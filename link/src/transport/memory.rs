//! In-process [`Transport`] implementation.
//!
//! Events pushed with [`MemoryTransport::emit`] are delivered synchronously
//! to the listener registered for the transport-level id. Every control call
//! is recorded so tests can assert on the exact start/stop sequence.

use super::{EventListener, ListenerRegistration, Transport};
use crate::{
    error::{RelayLinkError, Result},
    models::{SubscribeRequest, TransportEvent, TransportId},
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct MemoryState {
    /// Listener per transport id, tagged so a stale detach cannot remove a
    /// newer registration.
    listeners: HashMap<TransportId, (u64, EventListener)>,
    next_token: u64,
    active: HashSet<TransportId>,
    latest: Option<TransportId>,
    subscribe_requests: Vec<SubscribeRequest>,
    unsubscribed: Vec<TransportId>,
    pending_rejections: VecDeque<RelayLinkError>,
    fail_unsubscribe: bool,
    subscribe_delay: Option<Duration>,
}

#[derive(Default)]
struct MemoryInner {
    state: Mutex<MemoryState>,
    changed: Notify,
}

/// In-memory transport. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to the listener of `transport_id`.
    ///
    /// Returns `false` when no listener is registered for that id.
    pub fn emit(&self, transport_id: &TransportId, event: TransportEvent) -> bool {
        let listener = self
            .inner
            .state
            .lock()
            .listeners
            .get(transport_id)
            .map(|(_, listener)| listener.clone());
        match listener {
            Some(listener) => {
                listener(event);
                true
            },
            None => {
                log::debug!("[memory-transport] Dropping {} event for {}", event.kind(), transport_id);
                false
            },
        }
    }

    /// Deliver `event` to the most recently started transport id.
    pub fn emit_latest(&self, event: TransportEvent) -> bool {
        match self.latest_transport_id() {
            Some(transport_id) => self.emit(&transport_id, event),
            None => false,
        }
    }

    /// Make the next start call fail with `error`.
    pub fn reject_next_subscribe(&self, error: RelayLinkError) {
        self.inner.state.lock().pending_rejections.push_back(error);
    }

    /// Make the next `count` start calls fail with `error`.
    pub fn reject_next_subscribes(&self, count: usize, error: RelayLinkError) {
        let mut state = self.inner.state.lock();
        for _ in 0..count {
            state.pending_rejections.push_back(error.clone());
        }
    }

    /// Make every stop call fail while `fail` is set.
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.inner.state.lock().fail_unsubscribe = fail;
    }

    /// Delay every start call by `delay` before it completes.
    pub fn delay_subscribe(&self, delay: Option<Duration>) {
        self.inner.state.lock().subscribe_delay = delay;
    }

    /// Every start call received, including rejected ones.
    pub fn subscribe_requests(&self) -> Vec<SubscribeRequest> {
        self.inner.state.lock().subscribe_requests.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.inner.state.lock().subscribe_requests.len()
    }

    /// Every stop call received, in order.
    pub fn unsubscribed(&self) -> Vec<TransportId> {
        self.inner.state.lock().unsubscribed.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    pub fn is_listening(&self, transport_id: &TransportId) -> bool {
        self.inner.state.lock().listeners.contains_key(transport_id)
    }

    /// Transport ids with a registered listener, including ones whose start
    /// call is still in flight.
    pub fn listening_transport_ids(&self) -> Vec<TransportId> {
        let mut ids: Vec<_> = self.inner.state.lock().listeners.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Transport ids started and not yet stopped.
    pub fn active_transport_ids(&self) -> Vec<TransportId> {
        let mut ids: Vec<_> = self.inner.state.lock().active.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Id of the most recent successful start call.
    pub fn latest_transport_id(&self) -> Option<TransportId> {
        self.inner.state.lock().latest.clone()
    }

    /// Wait until at least `count` start calls were received.
    pub async fn wait_for_subscribes(&self, count: usize) {
        loop {
            let notified = self.inner.changed.notified();
            if self.subscribe_count() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Wait until at least `count` stop calls were received.
    pub async fn wait_for_unsubscribes(&self, count: usize) {
        loop {
            let notified = self.inner.changed.notified();
            if self.inner.state.lock().unsubscribed.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    fn register_listener(
        &self,
        transport_id: &TransportId,
        listener: EventListener,
    ) -> ListenerRegistration {
        let token = {
            let mut state = self.inner.state.lock();
            state.next_token += 1;
            let token = state.next_token;
            state.listeners.insert(transport_id.clone(), (token, listener));
            token
        };

        let weak = Arc::downgrade(&self.inner);
        let transport_id = transport_id.clone();
        ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut state = inner.state.lock();
                if state.listeners.get(&transport_id).map(|(t, _)| *t) == Some(token) {
                    state.listeners.remove(&transport_id);
                }
            }
        })
    }

    async fn subscribe(&self, request: &SubscribeRequest) -> Result<()> {
        let delay = self.inner.state.lock().subscribe_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = {
            let mut state = self.inner.state.lock();
            state.subscribe_requests.push(request.clone());
            match state.pending_rejections.pop_front() {
                Some(err) => Err(err),
                None => {
                    state.active.insert(request.transport_id.clone());
                    state.latest = Some(request.transport_id.clone());
                    Ok(())
                },
            }
        };
        self.inner.changed.notify_waiters();
        outcome
    }

    async fn unsubscribe(&self, transport_id: &TransportId) -> Result<()> {
        let outcome = {
            let mut state = self.inner.state.lock();
            state.unsubscribed.push(transport_id.clone());
            state.active.remove(transport_id);
            if state.fail_unsubscribe {
                Err(RelayLinkError::TransportError(format!(
                    "unsubscribe rejected for {}",
                    transport_id
                )))
            } else {
                Ok(())
            }
        };
        self.inner.changed.notify_waiters();
        outcome
    }
}
