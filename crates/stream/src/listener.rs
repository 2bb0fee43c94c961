// SPDX-License-Identifier: MIT

//! The process's single long-lived `LISTEN` connection.
//!
//! State machine: disconnected → connecting → listening, back to
//! disconnected on error. Reconnects use exponential backoff
//! `min(1000·2^(attempt-1), 30000)` ms for up to `max_reconnect_attempts`
//! tries, then a terminal failure event is emitted and the loop stops.
//! Subscribers live in the shared registry and survive reconnects.

use crate::message::{LogNotification, CHANNEL};
use crate::registry::{Subscriber, SubscriberId, SubscriberRegistry, Unsubscribe};
use parking_lot::Mutex;
use sqlx::postgres::{PgListener, PgNotification};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connection state visible in `status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Listening,
}

/// Observable listener events.
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    /// `LISTEN` established (initial connect or reconnect).
    Listening,
    /// Connection lost; a reconnect is scheduled.
    Disconnected,
    /// Reconnect attempts exhausted. Operator intervention required.
    TerminalFailure(String),
}

/// Snapshot returned by `status()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStatus {
    pub state: ListenerState,
    pub reconnect_attempts: u32,
    pub subscribers: usize,
}

/// Listener tuning.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub channel: String,
    pub max_reconnect_attempts: u32,
    pub base_backoff: Duration,
    pub backoff_cap: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel: CHANNEL.to_string(),
            max_reconnect_attempts: 10,
            base_backoff: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Reconnect delay before attempt `attempt` (1-based).
pub fn reconnect_backoff(attempt: u32, config: &ListenerConfig) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1).min(16)).unwrap_or(u32::MAX);
    config.base_backoff.saturating_mul(factor).min(config.backoff_cap)
}

struct ListenerShared {
    registry: Arc<SubscriberRegistry>,
    config: ListenerConfig,
    state: Mutex<ListenerState>,
    attempts: AtomicU32,
    events: broadcast::Sender<ListenerEvent>,
    cancel: CancellationToken,
}

impl ListenerShared {
    fn set_state(&self, state: ListenerState) {
        *self.state.lock() = state;
    }
}

/// Singleton notification listener. Construct once per process via
/// `initialize`, shut down via `shutdown`.
pub struct NotifyListener {
    shared: Arc<ListenerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NotifyListener {
    /// Spawn the listen loop against the primary store.
    ///
    /// Connection failures do not surface here: the loop owns reconnect
    /// scheduling from the first attempt onward.
    pub fn initialize(url: impl Into<String>, registry: Arc<SubscriberRegistry>) -> Self {
        Self::initialize_with_config(url, registry, ListenerConfig::default())
    }

    pub fn initialize_with_config(
        url: impl Into<String>,
        registry: Arc<SubscriberRegistry>,
        config: ListenerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(ListenerShared {
            registry,
            config,
            state: Mutex::new(ListenerState::Disconnected),
            attempts: AtomicU32::new(0),
            events,
            cancel: CancellationToken::new(),
        });
        let handle = tokio::spawn(listen_loop(url.into(), Arc::clone(&shared)));
        Self { shared, handle: Mutex::new(Some(handle)) }
    }

    /// Subscribe to listener lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ListenerEvent> {
        self.shared.events.subscribe()
    }

    /// The registry this listener dispatches into.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.shared.registry
    }

    /// Register a subscriber. Registration survives reconnects; only
    /// `shutdown` (or the returned handle) removes it.
    pub fn subscribe(&self, subscriber: Subscriber) -> Unsubscribe {
        self.shared.registry.subscribe(subscriber)
    }

    /// Remove a subscriber by connection id.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.shared.registry.remove(id)
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus {
            state: *self.shared.state.lock(),
            reconnect_attempts: self.shared.attempts.load(Ordering::Acquire),
            subscribers: self.shared.registry.len(),
        }
    }

    /// Stop listening, close the connection, clear all subscribers.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "listener task panicked during shutdown");
            }
        }
        self.shared.registry.clear();
        self.shared.set_state(ListenerState::Disconnected);
    }
}

async fn listen_loop(url: String, shared: Arc<ListenerShared>) {
    let channel = shared.config.channel.clone();
    let mut attempt: u32 = 0;

    loop {
        if shared.cancel.is_cancelled() {
            return;
        }

        shared.set_state(ListenerState::Connecting);
        let connected = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            connected = connect_and_listen(&url, &channel) => connected,
        };

        match connected {
            Ok(mut listener) => {
                attempt = 0;
                shared.attempts.store(0, Ordering::Release);
                shared.set_state(ListenerState::Listening);
                let _ = shared.events.send(ListenerEvent::Listening);
                tracing::info!(channel, "listening for notifications");

                let clean_exit = recv_loop(&mut listener, &shared).await;
                if clean_exit {
                    // Shutdown: best-effort UNLISTEN before dropping.
                    if let Err(err) = listener.unlisten(&channel).await {
                        tracing::debug!(error = %err, "unlisten failed during shutdown");
                    }
                    return;
                }

                shared.set_state(ListenerState::Disconnected);
                let _ = shared.events.send(ListenerEvent::Disconnected);
                tracing::warn!(channel, "notification connection lost");
            }
            Err(err) => {
                shared.set_state(ListenerState::Disconnected);
                tracing::warn!(channel, error = %err, "listen connect failed");
            }
        }

        attempt += 1;
        shared.attempts.store(attempt, Ordering::Release);
        if attempt > shared.config.max_reconnect_attempts {
            let message = format!(
                "gave up after {} reconnect attempts",
                shared.config.max_reconnect_attempts
            );
            tracing::error!(channel, "{message}");
            let _ = shared.events.send(ListenerEvent::TerminalFailure(message));
            return;
        }

        let backoff = reconnect_backoff(attempt, &shared.config);
        tracing::info!(
            channel,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = shared.cancel.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

async fn connect_and_listen(url: &str, channel: &str) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect(url).await?;
    listener.listen(channel).await?;
    Ok(listener)
}

/// Receive until shutdown (returns true) or connection loss (false).
async fn recv_loop(listener: &mut PgListener, shared: &Arc<ListenerShared>) -> bool {
    loop {
        let received = tokio::select! {
            _ = shared.cancel.cancelled() => return true,
            received = listener.try_recv() => received,
        };
        match received {
            Ok(Some(notification)) => handle_notification(notification, shared).await,
            // `None` means the connection died under us.
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(error = %err, "notification receive failed");
                return false;
            }
        }
    }
}

async fn handle_notification(notification: PgNotification, shared: &Arc<ListenerShared>) {
    if notification.channel() != shared.config.channel {
        tracing::debug!(channel = notification.channel(), "ignoring foreign channel");
        return;
    }
    let parsed: LogNotification = match serde_json::from_str(notification.payload()) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(error = %err, "malformed notification payload, ignoring");
            return;
        }
    };
    shared.registry.dispatch(&parsed).await;
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
