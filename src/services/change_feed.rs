//! In-process change notifications for live views.
//!
//! Writers publish a [`ChangeEvent`] after committing; each live view holds a
//! [`Subscription`] scoped to one topic. Dropping the subscription releases it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChangeEvent {
    CatalogChanged,
    ResultRecorded { user_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Topic {
    Catalog,
    UserHistory(String),
}

impl Topic {
    fn matches(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (Topic::Catalog, ChangeEvent::CatalogChanged) => true,
            (Topic::UserHistory(owner), ChangeEvent::ResultRecorded { user_id }) => owner == user_id,
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Topic::Catalog => "catalog",
            Topic::UserHistory(_) => "history",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notification {
    Changed,
    /// Events were dropped; the subscriber must reload its full snapshot.
    Resync,
}

#[derive(Clone)]
pub(crate) struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    active: Arc<AtomicUsize>,
}

impl ChangeFeed {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, active: Arc::new(AtomicUsize::new(0)) }
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        // No receivers is the common case outside of live views.
        let delivered = self.sender.send(event.clone()).unwrap_or(0);
        tracing::debug!(?event, delivered, "Published change event");
    }

    pub(crate) fn subscribe(&self, topic: Topic) -> Subscription {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("live_subscriptions", "topic" => topic.label()).increment(1.0);
        tracing::debug!(topic = topic.label(), active, "Live subscription opened");

        Subscription {
            topic,
            receiver: self.sender.subscribe(),
            active: Arc::clone(&self.active),
        }
    }

    pub(crate) fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub(crate) struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<ChangeEvent>,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    /// Waits for the next event relevant to this topic. `None` once the feed is gone.
    pub(crate) async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.topic.matches(&event) => return Some(Notification::Changed),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = self.topic.label(), skipped, "Live subscriber lagged");
                    return Some(Notification::Resync);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("live_subscriptions", "topic" => self.topic.label()).decrement(1.0);
        tracing::debug!(topic = self.topic.label(), remaining, "Live subscription released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_only_matching_events() {
        let feed = ChangeFeed::new(16);
        let mut history = feed.subscribe(Topic::UserHistory("u1".to_string()));

        feed.publish(ChangeEvent::CatalogChanged);
        feed.publish(ChangeEvent::ResultRecorded { user_id: "u2".to_string() });
        feed.publish(ChangeEvent::ResultRecorded { user_id: "u1".to_string() });

        assert_eq!(history.next().await, Some(Notification::Changed));
        let nothing_more = tokio::time::timeout(Duration::from_millis(50), history.next()).await;
        assert!(nothing_more.is_err());
    }

    #[tokio::test]
    async fn dropping_a_subscription_releases_it() {
        let feed = ChangeFeed::new(4);
        let first = feed.subscribe(Topic::Catalog);
        let second = feed.subscribe(Topic::Catalog);
        assert_eq!(feed.active_subscriptions(), 2);

        drop(first);
        assert_eq!(feed.active_subscriptions(), 1);
        drop(second);
        assert_eq!(feed.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_to_resync() {
        let feed = ChangeFeed::new(2);
        let mut catalog = feed.subscribe(Topic::Catalog);
        for _ in 0..5 {
            feed.publish(ChangeEvent::CatalogChanged);
        }

        assert_eq!(catalog.next().await, Some(Notification::Resync));
        assert_eq!(catalog.next().await, Some(Notification::Changed));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let feed = ChangeFeed::new(2);
        feed.publish(ChangeEvent::CatalogChanged);
        assert_eq!(feed.active_subscriptions(), 0);
    }
}
