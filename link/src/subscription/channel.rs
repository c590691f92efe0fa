//! Push-to-pull mailbox for one subscription.
//!
//! Producers call [`push`](SubscriptionChannel::push),
//! [`fail`](SubscriptionChannel::fail) and
//! [`complete`](SubscriptionChannel::complete) whenever the transport
//! delivers something; consumers call
//! [`next_value`](SubscriptionChannel::next_value) whenever they are ready.
//! The queue is either a buffer of undelivered values or a FIFO of suspended
//! pulls, never both, so a value goes straight to the oldest waiter when one
//! exists.
//!
//! Every operation runs to completion under one lock that is never held
//! across an `.await`.

use crate::models::RemoteError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Outcome of one pull.
#[derive(Debug, Clone, PartialEq)]
pub enum Pull<T> {
    Value(T),
    /// The stream failed for good.
    Failed(RemoteError),
    /// The stream failed while this pull was waiting, but auto-reconnect took
    /// over; later pulls see the reconnected stream.
    Interrupted(RemoteError),
    /// End of stream: completed by the producer or closed by the consumer.
    End,
}

type Waiter<T> = oneshot::Sender<Pull<T>>;

enum Queue<T> {
    Empty,
    Buffered(VecDeque<T>),
    Waiting(VecDeque<Waiter<T>>),
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Open,
    Failed(RemoteError),
    Completed,
    Closed,
}

struct ChannelState<T> {
    queue: Queue<T>,
    phase: Phase,
}

impl<T> ChannelState<T> {
    fn take_waiters(&mut self) -> VecDeque<Waiter<T>> {
        match std::mem::replace(&mut self.queue, Queue::Empty) {
            Queue::Waiting(waiters) => waiters,
            other => {
                self.queue = other;
                VecDeque::new()
            },
        }
    }
}

/// Ordered, unbounded buffer/waiter queue bridging push delivery and pull
/// consumption.
pub struct SubscriptionChannel<T> {
    state: Mutex<ChannelState<T>>,
}

impl<T> Default for SubscriptionChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionChannel<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                queue: Queue::Empty,
                phase: Phase::Open,
            }),
        }
    }

    /// Hand `value` to the oldest live waiter, or buffer it.
    ///
    /// Returns `false` if the channel no longer accepts values.
    pub fn push(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            return false;
        }

        let mut value = value;
        let mut waiters = state.take_waiters();
        while let Some(waiter) = waiters.pop_front() {
            match waiter.send(Pull::Value(value)) {
                Ok(()) => {
                    if !waiters.is_empty() {
                        state.queue = Queue::Waiting(waiters);
                    }
                    return true;
                },
                // The pulling future was dropped; try the next one.
                Err(Pull::Value(returned)) => value = returned,
                Err(_) => unreachable!("send returns the rejected message"),
            }
        }

        match &mut state.queue {
            Queue::Buffered(buffer) => buffer.push_back(value),
            queue => *queue = Queue::Buffered(VecDeque::from([value])),
        }
        true
    }

    /// Make the channel terminal with `error` and reject every waiter.
    ///
    /// Values buffered before the failure are still delivered first. Only the
    /// first terminal event counts; later calls return `false`.
    pub fn fail(&self, error: RemoteError) -> bool {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            return false;
        }
        state.phase = Phase::Failed(error.clone());
        for waiter in state.take_waiters() {
            let _ = waiter.send(Pull::Failed(error.clone()));
        }
        true
    }

    /// Reject the currently suspended pulls with `error` without making the
    /// channel terminal. Returns how many waiters were live.
    pub fn interrupt(&self, error: &RemoteError) -> usize {
        let mut state = self.state.lock();
        state
            .take_waiters()
            .into_iter()
            .map(|waiter| waiter.send(Pull::Interrupted(error.clone())).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    /// Producer end-of-stream. Buffered values are still delivered.
    pub fn complete(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            return false;
        }
        state.phase = Phase::Completed;
        for waiter in state.take_waiters() {
            let _ = waiter.send(Pull::End);
        }
        true
    }

    /// Consumer-side close: discard buffered values, resolve every current
    /// and future pull with [`Pull::End`]. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase == Phase::Closed {
            return false;
        }
        state.phase = Phase::Closed;
        match std::mem::replace(&mut state.queue, Queue::Empty) {
            Queue::Waiting(waiters) => {
                for waiter in waiters {
                    let _ = waiter.send(Pull::End);
                }
            },
            Queue::Buffered(_) | Queue::Empty => {},
        }
        true
    }

    /// Pull the next outcome, suspending until one is available.
    ///
    /// Concurrent callers are served in call order. Dropping the returned
    /// future before it resolves gives up its place without losing a value.
    pub async fn next_value(&self) -> Pull<T> {
        let receiver = {
            let mut state = self.state.lock();
            let ready = match &mut state.queue {
                Queue::Buffered(buffer) => buffer.pop_front(),
                _ => None,
            };
            if let Some(value) = ready {
                if matches!(&state.queue, Queue::Buffered(buffer) if buffer.is_empty()) {
                    state.queue = Queue::Empty;
                }
                return Pull::Value(value);
            }

            match &state.phase {
                Phase::Failed(error) => return Pull::Failed(error.clone()),
                Phase::Completed | Phase::Closed => return Pull::End,
                Phase::Open => {},
            }

            let (sender, receiver) = oneshot::channel();
            match &mut state.queue {
                Queue::Waiting(waiters) => {
                    waiters.retain(|waiter| !waiter.is_closed());
                    waiters.push_back(sender);
                },
                queue => *queue = Queue::Waiting(VecDeque::from([sender])),
            }
            receiver
        };

        receiver.await.unwrap_or(Pull::End)
    }

    /// Number of values received but not yet pulled.
    pub fn buffered_len(&self) -> usize {
        match &self.state.lock().queue {
            Queue::Buffered(buffer) => buffer.len(),
            _ => 0,
        }
    }

    /// Number of live suspended pulls.
    pub fn waiting_len(&self) -> usize {
        match &self.state.lock().queue {
            Queue::Waiting(waiters) => waiters.iter().filter(|w| !w.is_closed()).count(),
            _ => 0,
        }
    }

    /// Whether the channel stopped accepting values.
    pub fn is_terminal(&self) -> bool {
        self.state.lock().phase != Phase::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().phase == Phase::Closed
    }

    /// Terminal error, if the channel failed.
    pub fn terminal_error(&self) -> Option<RemoteError> {
        match &self.state.lock().phase {
            Phase::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }
}
