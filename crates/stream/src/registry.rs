// SPDX-License-Identifier: MIT

//! Per-connection subscriber registry and fan-out dispatch.
//!
//! The registry routes by project id only; service/level filters are
//! applied by the subscriber's own callback after hydrating the referenced
//! logs (the channel payload carries ids, not rows).

use crate::message::LogNotification;
use futures_util::future::{join_all, BoxFuture};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tw_core::{LogLevel, LogRecord, ProjectId};

tw_core::define_id! {
    /// Identifier of one live subscriber connection.
    pub struct SubscriberId("sub-");
}

/// Callback delivering one notification to a subscriber connection.
pub type SubscriberCallback = Arc<
    dyn Fn(LogNotification) -> BoxFuture<'static, Result<(), Box<dyn std::error::Error + Send + Sync>>>
        + Send
        + Sync,
>;

/// Filter tuple fixed at subscribe time.
#[derive(Debug, Clone)]
pub struct SubscriberFilter {
    pub project_id: ProjectId,
    /// Empty set means "all services".
    pub services: HashSet<String>,
    /// Empty set means "all levels".
    pub levels: HashSet<LogLevel>,
}

impl SubscriberFilter {
    pub fn project(project_id: impl Into<ProjectId>) -> Self {
        Self {
            project_id: project_id.into(),
            services: HashSet::new(),
            levels: HashSet::new(),
        }
    }

    /// Whether a hydrated batch passes the service/level filters: at least
    /// one referenced log must match each non-empty set.
    pub fn matches_hydrated(&self, logs: &[LogRecord]) -> bool {
        let service_ok =
            self.services.is_empty() || logs.iter().any(|l| self.services.contains(&l.service));
        let level_ok =
            self.levels.is_empty() || logs.iter().any(|l| self.levels.contains(&l.level));
        service_ok && level_ok
    }
}

/// One live subscriber.
#[derive(Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub filter: SubscriberFilter,
    pub callback: SubscriberCallback,
}

/// Handle returned from subscribe; detaches the subscriber when used.
pub struct Unsubscribe {
    registry: Arc<SubscriberRegistry>,
    id: SubscriberId,
}

impl Unsubscribe {
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn unsubscribe(self) {
        self.registry.remove(&self.id);
    }
}

/// Registry of live subscribers, keyed by connection id.
///
/// Mutation is single-writer (exclusive lock); dispatch reads take a
/// snapshot so callbacks never iterate a mutating map.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; returns a detach handle.
    pub fn subscribe(self: &Arc<Self>, subscriber: Subscriber) -> Unsubscribe {
        let id = subscriber.id.clone();
        self.subscribers.write().insert(id.clone(), subscriber);
        tracing::debug!(subscriber = %id, "subscriber registered");
        Unsubscribe { registry: Arc::clone(self), id }
    }

    /// Remove by connection id. Returns whether it was present.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "subscriber removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Drop all subscribers (listener shutdown).
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Snapshot of subscribers routed to a project.
    fn snapshot_for_project(&self, project_id: &str) -> Vec<Subscriber> {
        self.subscribers
            .read()
            .values()
            .filter(|s| s.filter.project_id.as_str() == project_id)
            .cloned()
            .collect()
    }

    /// Deliver one notification to every matching subscriber in parallel.
    /// Callback errors are isolated and logged; the failing subscriber
    /// stays registered.
    pub async fn dispatch(&self, notification: &LogNotification) {
        let targets = self.snapshot_for_project(&notification.project_id);
        if targets.is_empty() {
            return;
        }

        let deliveries = targets.into_iter().map(|subscriber| {
            let notification = notification.clone();
            async move {
                if let Err(err) = (subscriber.callback)(notification).await {
                    tracing::warn!(
                        subscriber = %subscriber.id,
                        error = %err,
                        "subscriber callback failed"
                    );
                }
            }
        });
        join_all(deliveries).await;
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
