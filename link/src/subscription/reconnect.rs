//! Automatic reconnection of a subscription after a stream error.
//!
//! The controller is a background task per subscription with
//! `auto_reconnect` enabled. It idles on the failure queue fed by
//! [`SubscriptionState::handle_event`]; each received error starts one
//! recovery: release the dead binding, back off, re-issue the start call
//! with a fresh transport-level id and the last resume marker, and repeat
//! until a start call succeeds or the attempt budget runs out. A stream
//! error on the connection still being started fails that attempt too.

use super::binding::TransportBinding;
use super::state::{AttemptDecision, SubscriptionState};
use crate::{
    event_handlers::{ConnectInfo, ConnectionError, ReconnectAttempt},
    models::RemoteError,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) struct ReconnectController {
    state: Arc<SubscriptionState>,
    failures: mpsc::UnboundedReceiver<RemoteError>,
}

impl ReconnectController {
    pub(crate) fn spawn(
        state: Arc<SubscriptionState>,
        failures: mpsc::UnboundedReceiver<RemoteError>,
    ) -> JoinHandle<()> {
        tokio::spawn(Self { state, failures }.run())
    }

    async fn run(mut self) {
        let shutdown = self.state.shutdown_token();
        loop {
            let error = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.failures.recv() => match next {
                    Some(error) => error,
                    None => break,
                },
            };
            self.recover(error).await;
        }
        log::debug!(
            "[relay-link] Reconnect controller for {} stopped",
            self.state.id()
        );
    }

    async fn recover(&self, mut error: RemoteError) {
        let state = &self.state;
        let context = state.context();
        let shutdown = state.shutdown_token();

        // The old listener goes away before anything new is registered.
        if let Some(stale) = state.take_binding() {
            stale
                .release(context.transport.as_ref(), &context.timeouts, &context.handlers)
                .await;
        }

        loop {
            let attempt = match state.next_reconnect_attempt() {
                AttemptDecision::Proceed(attempt) => attempt,
                AttemptDecision::Exhausted => {
                    state.fail_terminal(error);
                    return;
                },
                AttemptDecision::Ended => return,
            };

            let delay = state.policy().backoff_delay(attempt);
            log::info!(
                "[relay-link] Reconnecting subscription {} in {}ms (attempt {}/{})",
                state.id(),
                delay.as_millis(),
                attempt,
                state.policy().max_reconnects
            );
            context.handlers.emit_reconnect(ReconnectAttempt {
                subscription_id: state.id().to_string(),
                attempt,
                delay,
                error: error.clone(),
            });

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {},
            }

            let Some(next) = state.begin_attempt() else {
                return;
            };
            let transport_id = next.transport_id.clone();
            match TransportBinding::establish(
                state,
                next.generation,
                next.transport_id,
                next.resume_marker,
            )
            .await
            {
                Ok(binding) => match state.install(next.generation, binding) {
                    Ok(()) => {
                        log::info!(
                            "[relay-link] Subscription {} reconnected (transport id {})",
                            state.id(),
                            transport_id
                        );
                        context.handlers.emit_connect(ConnectInfo {
                            subscription_id: state.id().to_string(),
                            transport_id,
                            reconnected: true,
                        });
                        return;
                    },
                    Err(orphan) => {
                        orphan
                            .release(context.transport.as_ref(), &context.timeouts, &context.handlers)
                            .await;
                        // Otherwise the subscription ended while the start
                        // call was in flight.
                        let Some(stream_error) = state.take_abort_error() else {
                            return;
                        };
                        log::warn!(
                            "[relay-link] Reconnection attempt {} for {} failed: stream error {}",
                            attempt,
                            state.id(),
                            stream_error
                        );
                        error = stream_error;
                    },
                },
                Err(e) => {
                    log::warn!(
                        "[relay-link] Reconnection attempt {} for {} failed: {}",
                        attempt,
                        state.id(),
                        e
                    );
                    context.handlers.emit_error(ConnectionError::new(
                        format!("Reconnection attempt {} failed: {}", attempt, e),
                        state.policy().allows_attempt(attempt),
                    ));
                    if let Some(stream_error) = state.take_abort_error() {
                        error = stream_error;
                    }
                },
            }
        }
    }
}
