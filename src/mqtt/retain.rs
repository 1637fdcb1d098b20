use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use relaymq_protocol::QoS;

use crate::mqtt::topic::Filter;

/// The broker's retained-message store.
///
/// A retained PUBLISH with an empty payload clears the topic; a QoS 0
/// retained PUBLISH replaces whatever is stored; QoS 1 and 2 retained
/// publishes accumulate, so a topic can replay more than one message.
#[derive(Default)]
pub struct RetainedMessages {
    by_topic: BTreeMap<String, Vec<RetainedMessage>>,
}

#[derive(Debug, Clone)]
pub struct RetainedMessage {
    pub qos: QoS,
    pub payload: Bytes,
}

impl RetainedMessages {
    pub fn len(&self) -> usize {
        self.by_topic.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }

    /// Apply a retained PUBLISH to the store.
    pub fn store(&mut self, topic: &str, qos: QoS, payload: &Bytes) {
        if payload.is_empty() {
            // An empty retained payload clears the topic [MQTT-3.3.1-10].
            tracing::debug!(topic, "clearing retained messages");
            self.by_topic.remove(topic);
            return;
        }

        let messages = self.by_topic.entry(topic.to_owned()).or_default();

        if qos == QoS::AtMostOnce {
            // A QoS 0 retained message discards anything stored before it
            // [MQTT-3.3.1-7].
            messages.clear();
        }

        tracing::debug!(topic, "adding retained message");
        messages.push(RetainedMessage {
            qos,
            payload: payload.clone(),
        });
    }

    /// Visit every retained message under every topic matching `filter`.
    pub fn visit_matches(&self, filter: &Filter, mut visit: impl FnMut(&str, &RetainedMessage)) {
        let prefix = match filter.exact_or_prefix() {
            Ok(exact) => {
                // An exact filter will only ever match one topic. The match
                // check still runs so `$`-prefixed topics stay invisible.
                if filter.matches_topic(exact) {
                    if let Some(messages) = self.by_topic.get(exact) {
                        for message in messages {
                            visit(exact, message);
                        }
                    }
                }

                return;
            }
            // The filter contains at least one wildcard, so we need to scan.
            // Start at its wildcard-free prefix.
            Err(prefix) => prefix,
        };

        for (topic, messages) in self
            .by_topic
            // This is the shenanigans required to get a `.range()` call to compile
            // on a `BTreeMap<String, _>`.
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        {
            if filter.matches_topic(topic) {
                for message in messages {
                    visit(topic, message);
                }
            } else if !topic.starts_with(prefix) {
                // The map sorts all topics sharing the prefix together, so the
                // first stranger ends the scan.
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RetainedMessages;
    use bytes::Bytes;
    use relaymq_protocol::QoS;

    fn replay(store: &RetainedMessages, filter: &str) -> Vec<(String, Bytes)> {
        let filter = filter.parse().unwrap();
        let mut out = Vec::new();
        store.visit_matches(&filter, |topic, message| {
            out.push((topic.to_owned(), message.payload.clone()));
        });
        out
    }

    #[test]
    fn qos0_replaces_and_empty_payload_clears() {
        let mut store = RetainedMessages::default();

        store.store("status/sensor1", QoS::AtMostOnce, &Bytes::from("ok"));
        store.store("status/sensor1", QoS::AtMostOnce, &Bytes::from("degraded"));

        assert_eq!(
            replay(&store, "status/+"),
            [("status/sensor1".to_owned(), Bytes::from("degraded"))]
        );

        store.store("status/sensor1", QoS::AtMostOnce, &Bytes::new());
        assert!(replay(&store, "status/+").is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn higher_qos_messages_accumulate() {
        let mut store = RetainedMessages::default();

        store.store("alerts", QoS::AtLeastOnce, &Bytes::from("one"));
        store.store("alerts", QoS::AtLeastOnce, &Bytes::from("two"));

        assert_eq!(
            replay(&store, "alerts"),
            [
                ("alerts".to_owned(), Bytes::from("one")),
                ("alerts".to_owned(), Bytes::from("two")),
            ]
        );

        // A later QoS 0 retained message collapses the list again.
        store.store("alerts", QoS::AtMostOnce, &Bytes::from("three"));
        assert_eq!(
            replay(&store, "alerts"),
            [("alerts".to_owned(), Bytes::from("three"))]
        );
    }

    #[test]
    fn replay_respects_wildcards_and_prefix_scan() {
        let mut store = RetainedMessages::default();

        store.store("home/kitchen/temp", QoS::AtMostOnce, &Bytes::from("21"));
        store.store("home/kitchen/hum", QoS::AtMostOnce, &Bytes::from("40"));
        store.store("home/porch/temp", QoS::AtMostOnce, &Bytes::from("12"));
        store.store("work/desk/temp", QoS::AtMostOnce, &Bytes::from("23"));

        let mut matched = replay(&store, "home/+/temp");
        matched.sort();
        assert_eq!(
            matched,
            [
                ("home/kitchen/temp".to_owned(), Bytes::from("21")),
                ("home/porch/temp".to_owned(), Bytes::from("12")),
            ]
        );

        assert_eq!(replay(&store, "#").len(), 4);
        assert_eq!(replay(&store, "work/desk/temp").len(), 1);
        assert!(replay(&store, "home/cellar/+").is_empty());
    }

    #[test]
    fn system_topics_never_replay() {
        let mut store = RetainedMessages::default();
        store.store("$SYS/broker/uptime", QoS::AtMostOnce, &Bytes::from("42"));

        assert!(replay(&store, "#").is_empty());
        assert!(replay(&store, "$SYS/broker/uptime").is_empty());
    }
}
