//! Shared state of one logical subscription.
//!
//! Owned jointly by the caller's [`Subscription`](crate::Subscription)
//! handle, the reconnect controller and the cancellation watcher. The
//! transport listener only holds a weak reference.
//!
//! Lock order: `link` before the channel's internal lock. Callbacks are
//! never invoked with `link` held.

use super::binding::TransportBinding;
use super::channel::SubscriptionChannel;
use super::registry::SubscriptionRegistry;
use crate::{
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{
        ReconnectPolicy, RemoteError, ResumeMarker, SubscriptionInfo, SubscriptionStatus,
        TransportEvent, TransportId,
    },
    timeouts::RelayLinkTimeouts,
    transport::Transport,
};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Current time in millis since Unix epoch.
#[inline]
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Client-wide collaborators shared by every subscription.
#[derive(Clone)]
pub(crate) struct LinkContext {
    pub transport: Arc<dyn Transport>,
    pub timeouts: RelayLinkTimeouts,
    pub handlers: EventHandlers,
    pub registry: SubscriptionRegistry,
}

struct LinkState {
    status: SubscriptionStatus,
    transport_id: Option<TransportId>,
    binding: Option<TransportBinding>,
    /// Bumped per connection attempt and when a stream error is absorbed;
    /// events tagged with an older generation are dropped.
    generation: u64,
    last_marker: Option<ResumeMarker>,
    reconnect_attempts: u32,
    last_event_time_ms: Option<u64>,
    /// Stream error that cut short the start call in flight.
    aborted_by: Option<RemoteError>,
}

/// One start call about to be issued.
pub(crate) struct Attempt {
    pub generation: u64,
    pub transport_id: TransportId,
    pub resume_marker: Option<ResumeMarker>,
}

pub(crate) enum AttemptDecision {
    Proceed(u32),
    Exhausted,
    /// Closed, completed or failed meanwhile.
    Ended,
}

enum Notice {
    None,
    Interrupted(RemoteError),
    Failed(RemoteError),
    Completed,
}

struct Closing {
    previous: SubscriptionStatus,
    binding: Option<TransportBinding>,
}

pub(crate) struct SubscriptionState {
    id: String,
    path: String,
    input: JsonValue,
    policy: ReconnectPolicy,
    created_at_ms: u64,
    pub(crate) channel: SubscriptionChannel<JsonValue>,
    link: Mutex<LinkState>,
    shutdown: CancellationToken,
    failures: Option<mpsc::UnboundedSender<RemoteError>>,
    context: LinkContext,
}

impl SubscriptionState {
    pub(crate) fn new(
        id: String,
        path: String,
        input: JsonValue,
        policy: ReconnectPolicy,
        resume_marker: Option<ResumeMarker>,
        context: LinkContext,
        failures: Option<mpsc::UnboundedSender<RemoteError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            path,
            input,
            policy,
            created_at_ms: now_ms(),
            channel: SubscriptionChannel::new(),
            link: Mutex::new(LinkState {
                status: SubscriptionStatus::Connecting,
                transport_id: None,
                binding: None,
                generation: 0,
                last_marker: resume_marker,
                reconnect_attempts: 0,
                last_event_time_ms: None,
                aborted_by: None,
            }),
            shutdown: CancellationToken::new(),
            failures,
            context,
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn input(&self) -> &JsonValue {
        &self.input
    }

    pub(crate) fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub(crate) fn context(&self) -> &LinkContext {
        &self.context
    }

    /// Cancelled once the subscription is terminated.
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn status(&self) -> SubscriptionStatus {
        self.link.lock().status
    }

    pub(crate) fn transport_id(&self) -> Option<TransportId> {
        self.link.lock().transport_id.clone()
    }

    pub(crate) fn last_resume_marker(&self) -> Option<ResumeMarker> {
        self.link.lock().last_marker.clone()
    }

    pub(crate) fn reconnect_attempts(&self) -> u32 {
        self.link.lock().reconnect_attempts
    }

    pub(crate) fn info(&self) -> SubscriptionInfo {
        let link = self.link.lock();
        SubscriptionInfo {
            id: self.id.clone(),
            path: self.path.clone(),
            transport_id: link.transport_id.clone(),
            last_resume_marker: link.last_marker.clone(),
            reconnect_attempts: link.reconnect_attempts,
            status: link.status,
            created_at_ms: self.created_at_ms,
            last_event_time_ms: link.last_event_time_ms,
        }
    }

    /// Allocate a fresh transport-level id for the next start call.
    ///
    /// Returns `None` once the subscription is closed.
    pub(crate) fn begin_attempt(&self) -> Option<Attempt> {
        let mut link = self.link.lock();
        if link.status == SubscriptionStatus::Closed {
            return None;
        }
        link.generation += 1;
        link.aborted_by = None;
        let transport_id = TransportId::generate();
        link.transport_id = Some(transport_id.clone());
        Some(Attempt {
            generation: link.generation,
            transport_id,
            resume_marker: link.last_marker.clone(),
        })
    }

    /// Install the binding of a successful start call.
    ///
    /// Hands the binding back if the subscription ended (closed, completed
    /// or failed) or the attempt was superseded meanwhile; the caller must
    /// release it. See [`take_abort_error`](Self::take_abort_error) for the
    /// attempt cut short by a stream error.
    pub(crate) fn install(
        &self,
        generation: u64,
        binding: TransportBinding,
    ) -> std::result::Result<(), TransportBinding> {
        let mut link = self.link.lock();
        if link.status.is_final() || link.generation != generation {
            return Err(binding);
        }
        debug_assert!(link.binding.is_none(), "previous binding must be released first");
        link.status = SubscriptionStatus::Streaming;
        link.reconnect_attempts = 0;
        link.binding = Some(binding);
        Ok(())
    }

    /// Stream error that arrived while the last start call was in flight.
    ///
    /// Set only when auto-reconnect is enabled; the attempt then counts as
    /// failed and the error replaces the one that started the outage.
    pub(crate) fn take_abort_error(&self) -> Option<RemoteError> {
        self.link.lock().aborted_by.take()
    }

    /// Pass a stream error that cut short the first start call to the
    /// reconnect controller.
    ///
    /// Returns `false` if the subscription is no longer connecting or has
    /// no controller.
    pub(crate) fn hand_over(&self, error: RemoteError) -> bool {
        let mut link = self.link.lock();
        if link.status != SubscriptionStatus::Connecting {
            return false;
        }
        let Some(failures) = &self.failures else {
            return false;
        };
        if failures.send(error).is_err() {
            return false;
        }
        link.status = SubscriptionStatus::Reconnecting;
        true
    }

    /// Detach the live binding so it can be released before a new one is
    /// established.
    pub(crate) fn take_binding(&self) -> Option<TransportBinding> {
        self.link.lock().binding.take()
    }

    /// Count one more reconnect attempt, if the policy still allows it.
    pub(crate) fn next_reconnect_attempt(&self) -> AttemptDecision {
        let mut link = self.link.lock();
        if link.status.is_final() {
            return AttemptDecision::Ended;
        }
        if !self.policy.allows_attempt(link.reconnect_attempts) {
            return AttemptDecision::Exhausted;
        }
        link.reconnect_attempts += 1;
        link.status = SubscriptionStatus::Reconnecting;
        AttemptDecision::Proceed(link.reconnect_attempts)
    }

    /// Apply one push event from the transport binding of `generation`.
    pub(crate) fn handle_event(&self, generation: u64, event: TransportEvent) {
        self.context.handlers.emit_receive(&event);

        let notice = {
            let mut link = self.link.lock();
            if link.generation != generation || link.status == SubscriptionStatus::Closed {
                log::debug!(
                    "[relay-link] Ignoring stale {} event for subscription {}",
                    event.kind(),
                    self.id
                );
                return;
            }
            link.last_event_time_ms = Some(now_ms());

            match event {
                TransportEvent::Data {
                    value,
                    resume_marker,
                } => {
                    if self.channel.push(value) {
                        if let Some(marker) = resume_marker {
                            link.last_marker = Some(marker);
                        }
                    }
                    Notice::None
                },
                TransportEvent::Completed => {
                    if self.channel.complete() {
                        link.status = SubscriptionStatus::Completed;
                        Notice::Completed
                    } else {
                        Notice::None
                    }
                },
                TransportEvent::Error { error } => {
                    if self.absorb_error(&mut link, &error) || self.abort_attempt(&mut link, &error)
                    {
                        Notice::Interrupted(error)
                    } else if self.channel.fail(error.clone()) {
                        link.status = SubscriptionStatus::Failed;
                        Notice::Failed(error)
                    } else {
                        Notice::None
                    }
                },
            }
        };

        let handlers = &self.context.handlers;
        match notice {
            Notice::Interrupted(error) => {
                log::warn!(
                    "[relay-link] Stream error on subscription {}: {} (reconnecting)",
                    self.id,
                    error
                );
                handlers.emit_error(ConnectionError::new(
                    format!("Stream error on {}: {}", self.id, error),
                    true,
                ));
            },
            Notice::Failed(error) => {
                log::warn!("[relay-link] Stream error on subscription {}: {}", self.id, error);
                handlers.emit_error(ConnectionError::new(
                    format!("Stream error on {}: {}", self.id, error),
                    false,
                ));
                handlers.emit_disconnect(DisconnectReason::new(
                    &self.id,
                    format!("stream failed: {}", error),
                ));
            },
            Notice::Completed => {
                log::debug!("[relay-link] Subscription {} completed by producer", self.id);
                handlers.emit_disconnect(DisconnectReason::new(&self.id, "completed"));
            },
            Notice::None => {},
        }
    }

    /// Hand a stream error to the reconnect controller instead of failing
    /// the channel. Suspended pulls are still rejected with the error.
    fn absorb_error(&self, link: &mut LinkState, error: &RemoteError) -> bool {
        if link.status != SubscriptionStatus::Streaming
            || !self.policy.allows_attempt(link.reconnect_attempts)
        {
            return false;
        }
        let Some(failures) = &self.failures else {
            return false;
        };
        if failures.send(error.clone()).is_err() {
            return false;
        }
        link.status = SubscriptionStatus::Reconnecting;
        link.generation += 1;
        self.channel.interrupt(error);
        true
    }

    /// Invalidate the start call in flight because its stream already
    /// failed. The binding it produces is then refused by
    /// [`install`](Self::install) and the attempt counts as failed.
    fn abort_attempt(&self, link: &mut LinkState, error: &RemoteError) -> bool {
        if self.failures.is_none()
            || !matches!(
                link.status,
                SubscriptionStatus::Connecting | SubscriptionStatus::Reconnecting
            )
        {
            return false;
        }
        link.generation += 1;
        link.aborted_by = Some(error.clone());
        self.channel.interrupt(error);
        true
    }

    /// Make the subscription permanently failed after reconnection gave up.
    pub(crate) fn fail_terminal(&self, error: RemoteError) {
        let attempts = {
            let mut link = self.link.lock();
            if link.status.is_final() {
                return;
            }
            link.status = SubscriptionStatus::Failed;
            self.channel.fail(error.clone());
            link.reconnect_attempts
        };

        log::warn!(
            "[relay-link] Giving up on subscription {} after {} reconnect attempt(s): {}",
            self.id,
            attempts,
            error
        );
        let handlers = &self.context.handlers;
        handlers.emit_error(ConnectionError::new(
            format!("Max reconnection attempts ({}) reached", self.policy.max_reconnects),
            false,
        ));
        handlers.emit_disconnect(DisconnectReason::new(
            &self.id,
            format!("stream failed: {}", error),
        ));
    }

    /// Terminate the subscription: close the channel, release the listener
    /// and stop the transport stream. Idempotent and never fails.
    pub(crate) async fn terminate(&self) {
        let Some(closing) = self.begin_close() else {
            return;
        };
        if let Some(binding) = closing.binding {
            let context = &self.context;
            binding
                .release(context.transport.as_ref(), &context.timeouts, &context.handlers)
                .await;
        }
        self.announce_close(closing.previous);
    }

    /// [`terminate`](Self::terminate) for synchronous contexts such as
    /// `Drop`: the stop call is spawned onto the current runtime, or skipped
    /// if there is none.
    pub(crate) fn terminate_detached(&self) {
        let Some(closing) = self.begin_close() else {
            return;
        };
        if let Some(binding) = closing.binding {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let LinkContext {
                        transport,
                        timeouts,
                        handlers,
                        ..
                    } = self.context.clone();
                    handle.spawn(async move {
                        binding.release(transport.as_ref(), &timeouts, &handlers).await;
                    });
                },
                Err(_) => {
                    log::debug!(
                        "[relay-link] No runtime available; skipping stop call for {}",
                        binding.transport_id()
                    );
                    binding.detach();
                },
            }
        }
        self.announce_close(closing.previous);
    }

    fn begin_close(&self) -> Option<Closing> {
        let closing = {
            let mut link = self.link.lock();
            if link.status == SubscriptionStatus::Closed {
                return None;
            }
            let previous = std::mem::replace(&mut link.status, SubscriptionStatus::Closed);
            Closing {
                previous,
                binding: link.binding.take(),
            }
        };
        self.shutdown.cancel();
        self.channel.close();
        self.context.registry.remove(&self.id);
        log::debug!("[relay-link] Subscription {} terminated", self.id);
        Some(closing)
    }

    fn announce_close(&self, previous: SubscriptionStatus) {
        if matches!(
            previous,
            SubscriptionStatus::Completed | SubscriptionStatus::Failed
        ) {
            return;
        }
        self.context
            .handlers
            .emit_disconnect(DisconnectReason::new(&self.id, "terminated"));
    }
}
