//! Topic handlers and the subscription table.
//!
//! Topics are named logical channels multiplexed over the one connection.
//! Callers register a [`TopicHandler`] per topic; the connection task routes
//! each decoded frame to the handler for its topic, one frame at a time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use simwire_schema::DynMessage;
use tracing::debug;

/// Per-topic message handler.
///
/// Handlers run on the connection task, strictly in frame-arrival order, and
/// must return before the next frame is decoded.
pub trait TopicHandler: Send {
    /// Called with each decoded message published on the subscribed topic.
    fn on_message(&mut self, msg: &DynMessage);

    /// Called after the handler is removed from the subscription table.
    fn on_unsubscribe(&mut self) {}
}

struct FnHandler<F>(F);

impl<F: FnMut(&DynMessage) + Send> TopicHandler for FnHandler<F> {
    fn on_message(&mut self, msg: &DynMessage) {
        (self.0)(msg);
    }
}

/// Wrap a closure as a [`TopicHandler`] with no unsubscribe hook.
pub fn handler_fn<F>(f: F) -> impl TopicHandler
where
    F: FnMut(&DynMessage) + Send,
{
    FnHandler(f)
}

/// One entry in the subscription table.
pub struct Subscription {
    topic: String,
    throttle_hz: Option<u32>,
    handler: Box<dyn TopicHandler>,
}

impl Subscription {
    /// Subscribe `handler` to `topic` at the server's native publish rate.
    pub fn new(topic: impl Into<String>, handler: impl TopicHandler + 'static) -> Self {
        Self {
            topic: topic.into(),
            throttle_hz: None,
            handler: Box::new(handler),
        }
    }

    /// Ask the server to throttle this topic to at most `hz` messages per second.
    pub fn with_throttle(mut self, hz: u32) -> Self {
        self.throttle_hz = Some(hz);
        self
    }

    /// The subscribed topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The requested throttle rate, if any.
    pub fn throttle_hz(&self) -> Option<u32> {
        self.throttle_hz
    }

    /// Consume the entry, yielding its handler (for the unsubscribe hook).
    pub fn into_handler(self) -> Box<dyn TopicHandler> {
        self.handler
    }
}

/// A topic advertised by the server.
///
/// The catalogue is refreshed from the server's `topics-types` and `topics`
/// replies and is surfaced for UI inspection — it is not the subscription
/// table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Topic name.
    pub name: String,
    /// Fully-qualified message type, when the server advertises it.
    pub msg_type: Option<String>,
}

/// The subscription table: topic name to handler, unique by name.
#[derive(Default)]
pub struct SubscriptionTable {
    entries: HashMap<String, Subscription>,
}

impl SubscriptionTable {
    /// Record a subscription, replacing any prior handler for the same topic.
    pub fn insert(&mut self, subscription: Subscription) -> Option<Subscription> {
        debug!(topic = %subscription.topic, "subscription recorded");
        self.entries
            .insert(subscription.topic.clone(), subscription)
    }

    /// Remove a subscription by topic name.
    pub fn remove(&mut self, topic: &str) -> Option<Subscription> {
        self.entries.remove(topic)
    }

    /// Route a decoded message to the topic's handler.
    ///
    /// Returns `false` on a miss — an expected occurrence, since the server
    /// broadcasts on topics nobody is watching.
    pub fn dispatch(&mut self, topic: &str, msg: &DynMessage) -> bool {
        match self.entries.get_mut(topic) {
            Some(entry) => {
                entry.handler.on_message(msg);
                true
            }
            None => false,
        }
    }

    /// Currently subscribed topic names.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Whether a topic has a handler.
    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every subscription. Handlers are discarded without their
    /// unsubscribe hook; full-disconnect cleanup is unconditional.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
