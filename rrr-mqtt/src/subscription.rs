use rrr_types::topic_match;

use crate::qos::QosLevel;

/// One entry of a connection's subscription collection.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub filter: String,
    pub qos: QosLevel,
    /// MQTT 5 subscription identifier to attach to matching deliveries, if any.
    pub identifier: Option<u32>,
}

/// A connection's subscriptions, matched token-by-token against an
/// incoming PUBLISH topic (§4.4 Subscription matching). Shares the same
/// wildcard semantics as the broker's holder-level `topic_match`.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionCollection(Vec<Subscription>);

impl SubscriptionCollection {
    pub fn new() -> Self {
        return Self(Vec::new());
    }

    pub fn subscribe(&mut self, filter: impl Into<String>, qos: QosLevel, identifier: Option<u32>) {
        let filter = filter.into();
        self.0.retain(|s| s.filter != filter);
        self.0.push(Subscription { filter, qos, identifier });
    }

    pub fn unsubscribe(&mut self, filter: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s.filter != filter);
        return self.0.len() != before;
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns every subscription whose filter matches `topic`, in
    /// registration order, for the caller to report back to its caller
    /// (§4.4: "report back to caller on each match").
    pub fn matches<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Subscription> + 'a {
        self.0.iter().filter(move |s| topic_match(topic, &s.filter))
    }
}
