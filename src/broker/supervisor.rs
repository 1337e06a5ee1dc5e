//! Connection supervisor for the durable backend
//!
//! Owns the single broker connection/channel pair and its lifecycle:
//!
//! ```text
//! Disconnected --(ensure_connection)--------> Connecting
//! Connecting   --(connect succeeds)---------> Connected      [retries := 0]
//! Connecting   --(connect fails)------------> Reconnecting
//! Connected    --(broker error/close event)-> Reconnecting
//! Reconnecting --(backoff elapses)----------> Connecting
//! Reconnecting --(retries exhausted)--------> Terminated     [fatal]
//! ```
//!
//! Concurrent callers of [`ConnectionSupervisor::ensure_connection`] share one
//! in-flight attempt. Reconnects run from a stored timer task that `close()`
//! and every successful connection cancel.

use crate::broker::backoff::BackoffPolicy;
use crate::broker::transport::{BrokerChannel, BrokerConnection, BrokerConnector, FailureSignal};
use crate::broker::{BrokerError, BrokerResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use strum_macros::Display;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Terminated,
}

/// One observed state change, broadcast to every transition subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Channel handle returned by a successful `ensure_connection`
///
/// The generation identifies the connection the channel belongs to, so a
/// failure reported against it cannot tear down a newer connection.
#[derive(Clone)]
pub struct LiveChannel {
    channel: Arc<dyn BrokerChannel>,
    generation: u64,
}

impl LiveChannel {
    pub fn channel(&self) -> &Arc<dyn BrokerChannel> {
        &self.channel
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveChannel")
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Clone)]
struct Session {
    connection: Arc<dyn BrokerConnection>,
    channel: Arc<dyn BrokerChannel>,
    generation: u64,
}

impl Session {
    fn live(&self) -> LiveChannel {
        LiveChannel {
            channel: Arc::clone(&self.channel),
            generation: self.generation,
        }
    }

    /// Close the channel, then the connection
    async fn shutdown(self) {
        if let Err(e) = self.channel.close().await {
            log::warn!("Error closing broker channel: {}", e);
        }
        if let Err(e) = self.connection.close().await {
            log::warn!("Error closing broker connection: {}", e);
        }
    }
}

type PendingAttempt = Shared<BoxFuture<'static, BrokerResult<LiveChannel>>>;

struct SupervisorState {
    state: ConnectionState,
    retry_counter: u32,
    generation: u64,
    session: Option<Session>,
    in_flight: Option<PendingAttempt>,
    reconnect: Option<JoinHandle<()>>,
    closed: bool,
}

struct SupervisorInner {
    connector: Arc<dyn BrokerConnector>,
    policy: BackoffPolicy,
    state: Mutex<SupervisorState>,
    transitions: broadcast::Sender<StateTransition>,
}

/// Supervises the broker connection used by [`crate::broker::DurableQueueAdapter`]
///
/// Cloning is cheap; clones share the same connection and state.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ConnectionSupervisor {
    pub fn new(connector: Arc<dyn BrokerConnector>, policy: BackoffPolicy) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SupervisorInner {
                connector,
                policy,
                state: Mutex::new(SupervisorState {
                    state: ConnectionState::Disconnected,
                    retry_counter: 0,
                    generation: 0,
                    session: None,
                    in_flight: None,
                    reconnect: None,
                    closed: false,
                }),
                transitions,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn retry_counter(&self) -> u32 {
        self.inner.lock().retry_counter
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.inner.policy
    }

    /// Whether a reconnect timer is currently pending
    pub fn reconnect_pending(&self) -> bool {
        self.inner
            .lock()
            .reconnect
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Receive every subsequent state transition
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.inner.transitions.subscribe()
    }

    /// Return a live channel, connecting first when needed
    ///
    /// Returns immediately when already connected. Otherwise joins the
    /// in-flight attempt or starts one, and waits for its outcome. A failed
    /// attempt schedules a reconnect in the background and is reported to
    /// the caller as [`BrokerError::ChannelUnavailable`]; once the retry
    /// budget is spent every call fails with [`BrokerError::RetryExhausted`]
    /// without touching the network.
    pub async fn ensure_connection(&self) -> BrokerResult<LiveChannel> {
        self.inner.ensure_connection().await
    }

    /// Report a transport failure observed while using a channel
    ///
    /// Ignored unless `generation` is the current connection.
    pub fn report_failure(&self, generation: u64, reason: &str) {
        self.inner.handle_connection_lost(generation, reason);
    }

    /// Cancel any pending reconnect, then close the channel and the connection
    ///
    /// Idempotent, and harmless when no connection was ever made. Later
    /// `ensure_connection` calls fail with [`BrokerError::Closed`].
    pub async fn close(&self) {
        let (timer, session) = {
            let mut guard = self.inner.lock();
            guard.closed = true;
            guard.in_flight = None;
            let timer = guard.reconnect.take();
            let session = guard.session.take();
            if guard.state != ConnectionState::Terminated {
                self.inner.transition(&mut guard, ConnectionState::Disconnected);
            }
            (timer, session)
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(session) = session {
            log::info!("Closing broker connection to {}", self.inner.connector.endpoint());
            session.shutdown().await;
        }
    }
}

impl SupervisorInner {
    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, guard: &mut SupervisorState, to: ConnectionState) {
        let from = guard.state;
        if from == to {
            return;
        }
        guard.state = to;
        log::debug!("Broker connection state: {} -> {}", from, to);
        let _ = self.transitions.send(StateTransition { from, to });
    }

    async fn ensure_connection(self: &Arc<Self>) -> BrokerResult<LiveChannel> {
        let attempt = {
            let mut guard = self.lock();
            if guard.closed {
                return Err(BrokerError::Closed);
            }
            match guard.state {
                ConnectionState::Terminated => {
                    return Err(BrokerError::RetryExhausted {
                        max_retries: self.policy.max_retries,
                    });
                }
                ConnectionState::Connected => {
                    if let Some(session) = &guard.session {
                        return Ok(session.live());
                    }
                }
                _ => {}
            }
            match guard.in_flight.clone() {
                Some(attempt) => attempt,
                None => self.start_attempt(&mut guard),
            }
        };
        attempt.await
    }

    fn start_attempt(self: &Arc<Self>, guard: &mut SupervisorState) -> PendingAttempt {
        guard.generation += 1;
        let generation = guard.generation;
        self.transition(guard, ConnectionState::Connecting);
        log::debug!(
            "Connecting to message broker at {} (generation {})",
            self.connector.endpoint(),
            generation
        );

        // The attempt runs as its own task so it completes, and updates the
        // state, even if every waiting caller is dropped.
        let task = tokio::spawn(Arc::clone(self).run_attempt(generation));
        let attempt = async move {
            task.await.unwrap_or_else(|e| {
                Err(BrokerError::connection(format!(
                    "connection attempt aborted: {e}"
                )))
            })
        }
        .boxed()
        .shared();
        guard.in_flight = Some(attempt.clone());
        attempt
    }

    async fn run_attempt(self: Arc<Self>, generation: u64) -> BrokerResult<LiveChannel> {
        let signal = self.failure_signal(generation);
        let outcome = match self.connector.connect(signal).await {
            Ok(connection) => match connection.open_channel().await {
                Ok(channel) => Ok(Session {
                    connection,
                    channel,
                    generation,
                }),
                Err(e) => {
                    let _ = connection.close().await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        let (result, orphan) = {
            let mut guard = self.lock();
            guard.in_flight = None;
            if guard.closed {
                (Err(BrokerError::Closed), outcome.ok())
            } else {
                match outcome {
                    Ok(session) => {
                        guard.retry_counter = 0;
                        if let Some(timer) = guard.reconnect.take() {
                            timer.abort();
                        }
                        let live = session.live();
                        guard.session = Some(session);
                        self.transition(&mut guard, ConnectionState::Connected);
                        log::info!("Connected to message broker at {}", self.connector.endpoint());
                        (Ok(live), None)
                    }
                    Err(e) => {
                        log::warn!("Failed to connect to message broker: {}", e);
                        let stale = self.schedule_reconnect(&mut guard);
                        let err = if guard.state == ConnectionState::Terminated {
                            BrokerError::RetryExhausted {
                                max_retries: self.policy.max_retries,
                            }
                        } else {
                            BrokerError::channel(e)
                        };
                        (Err(err), stale)
                    }
                }
            }
        };

        if let Some(session) = orphan {
            session.shutdown().await;
        }
        result
    }

    /// Detach the current session and either schedule a reconnect or terminate
    ///
    /// The detached session is returned so the caller can shut it down once
    /// the lock is released.
    #[must_use]
    fn schedule_reconnect(self: &Arc<Self>, guard: &mut SupervisorState) -> Option<Session> {
        let stale = guard.session.take();
        if let Some(timer) = guard.reconnect.take() {
            timer.abort();
        }

        let max_retries = self.policy.max_retries;
        if guard.retry_counter >= max_retries {
            self.transition(guard, ConnectionState::Terminated);
            log::error!(
                "Max reconnection attempts reached ({}); giving up on {}",
                max_retries,
                self.connector.endpoint()
            );
            return stale;
        }

        guard.retry_counter += 1;
        let attempt = guard.retry_counter;
        let delay = self.policy.delay_for(attempt);
        self.transition(guard, ConnectionState::Reconnecting);
        log::info!(
            "Attempting to reconnect in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt,
            max_retries
        );

        let weak = Arc::downgrade(self);
        guard.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(e) = inner.ensure_connection().await {
                log::debug!("Reconnect attempt {} failed: {}", attempt, e);
            }
        }));
        stale
    }

    fn handle_connection_lost(self: &Arc<Self>, generation: u64, reason: &str) {
        let stale = {
            let mut guard = self.lock();
            if guard.closed || guard.state != ConnectionState::Connected {
                return;
            }
            match &guard.session {
                Some(session) if session.generation == generation => {}
                _ => return,
            }
            log::warn!("Broker connection lost: {}", reason);
            self.schedule_reconnect(&mut guard)
        };

        // A channel-level failure leaves the connection itself open.
        if let Some(session) = stale {
            tokio::spawn(session.shutdown());
        }
    }

    fn failure_signal(self: &Arc<Self>, generation: u64) -> FailureSignal {
        let weak: Weak<Self> = Arc::downgrade(self);
        let runtime = tokio::runtime::Handle::current();
        FailureSignal::new(move |reason| {
            let weak = weak.clone();
            // Client libraries may fire this from their own threads.
            runtime.spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_connection_lost(generation, &reason);
                }
            });
        })
    }
}
