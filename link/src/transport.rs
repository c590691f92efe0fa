//! Transport collaborator contract.
//!
//! The subscription core does not know how events travel. A [`Transport`]
//! starts and stops server-side streams for a transport-level id and pushes
//! [`TransportEvent`]s for that id into a registered [`EventListener`].
//!
//! Listeners are always registered before the start call is issued, so a
//! transport may deliver events as soon as `subscribe` has been invoked.

mod memory;

pub use memory::MemoryTransport;

use crate::{
    error::Result,
    models::{SubscribeRequest, TransportEvent, TransportId},
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Callback receiving the push events of one transport-level id.
pub type EventListener = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Host side of a subscription: start/stop control calls plus push delivery.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Attach `listener` to the events tagged with `transport_id`.
    ///
    /// The returned registration detaches the listener when unregistered or
    /// dropped.
    fn register_listener(
        &self,
        transport_id: &TransportId,
        listener: EventListener,
    ) -> ListenerRegistration;

    /// Start delivering events for `request.transport_id`.
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<()>;

    /// Stop delivering events for `transport_id`. Best-effort; callers do not
    /// surface failures.
    async fn unsubscribe(&self, transport_id: &TransportId) -> Result<()>;
}

type Detach = Box<dyn FnOnce() + Send>;

/// Ownership of one registered listener.
///
/// `unregister` runs the detach hook at most once; dropping the registration
/// unregisters it.
pub struct ListenerRegistration {
    detach: Mutex<Option<Detach>>,
}

impl ListenerRegistration {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// A registration with nothing to detach.
    pub fn noop() -> Self {
        Self {
            detach: Mutex::new(None),
        }
    }

    /// Detach the listener. Later calls are no-ops.
    pub fn unregister(&self) {
        let detach = self.detach.lock().take();
        if let Some(detach) = detach {
            detach();
        }
    }

    pub fn is_registered(&self) -> bool {
        self.detach.lock().is_some()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("registered", &self.is_registered())
            .finish()
    }
}
