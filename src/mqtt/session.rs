use bytes::Bytes;
use relaymq_protocol::{Packet, QoS};
use tokio::sync::mpsc;

use crate::mqtt::keep_alive::KeepAlive;
use crate::mqtt::packets::{IncomingPacketSet, OutboundQueue};
use crate::mqtt::topic::Filter;
use crate::mqtt::{ClientId, ConnectionId};

/// A will message registered at CONNECT time.
///
/// The broker publishes it on the client's behalf if the transport dies
/// without a DISCONNECT [MQTT-3.1.2-8].
#[derive(Debug, Clone)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// One granted subscription. Unique per session by filter; re-subscribing
/// with the same filter replaces the QoS in place.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub filter: Filter,
    pub qos: QoS,
}

/// Broker-side state for one client session.
///
/// Lives in the router's client table. When the client connected with
/// `clean_session = false` this outlives the transport, so subscriptions and
/// both in-flight tables survive until the session is adopted by a new
/// CONNECT or displaced by a clean one.
pub(crate) struct Session {
    pub client_id: ClientId,
    pub username: Option<String>,
    pub keep_alive: KeepAlive,
    pub clean_session: bool,
    pub will: Option<Will>,

    /// Insertion-ordered; SUBACK return codes rely on request order and
    /// resubscriptions replace in place.
    pub subscriptions: Vec<Subscription>,

    /// Packets we sent to this client that await acknowledgment.
    pub outbound: OutboundQueue,

    /// Inbound QoS 2 packet ids reserved until their PUBREL arrives.
    pub incoming: IncomingPacketSet,

    pub connection: Option<AttachedConnection>,
}

/// The live transport currently attached to a session, if any.
pub(crate) struct AttachedConnection {
    pub connection_id: ConnectionId,
    pub packet_tx: mpsc::UnboundedSender<Packet>,
}

impl Session {
    pub fn new(client_id: ClientId) -> Self {
        Session {
            client_id,
            username: None,
            keep_alive: KeepAlive::default(),
            clean_session: true,
            will: None,
            subscriptions: Vec::new(),
            outbound: OutboundQueue::default(),
            incoming: IncomingPacketSet::default(),
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Queue a packet for the attached transport.
    ///
    /// Silently does nothing when the session is detached; in-flight state is
    /// what gets replayed on resumption, not arbitrary queued packets.
    pub fn send(&self, packet: Packet) {
        if let Some(connection) = &self.connection {
            let _ = connection.packet_tx.send(packet);
        }
    }

    /// Insert or replace a subscription; returns `true` if a subscription
    /// with the same filter already existed.
    pub fn subscribe(&mut self, filter: Filter, qos: QoS) -> bool {
        for subscription in &mut self.subscriptions {
            if subscription.filter.as_str() == filter.as_str() {
                subscription.qos = qos;
                return true;
            }
        }

        self.subscriptions.push(Subscription { filter, qos });
        false
    }

    /// Remove the subscription with this exact filter, if present.
    pub fn unsubscribe(&mut self, filter: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|subscription| subscription.filter.as_str() != filter);

        self.subscriptions.len() != before
    }

    /// The highest QoS among this session's subscriptions matching `topic`.
    ///
    /// Overlapping subscriptions yield one delivery at the maximum QoS, not
    /// one delivery per match [MQTT-3.3.5-1].
    pub fn max_matching_qos(&self, topic: &str) -> Option<QoS> {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.filter.matches_topic(topic))
            .map(|subscription| subscription.qos)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use relaymq_protocol::QoS;
    use std::str::FromStr;

    use crate::mqtt::ClientId;

    #[test]
    fn resubscribing_replaces_qos_in_place() {
        let mut session = Session::new(ClientId::from_str("c1").unwrap());

        assert!(!session.subscribe("a/#".parse().unwrap(), QoS::AtMostOnce));
        assert!(!session.subscribe("b/+".parse().unwrap(), QoS::AtLeastOnce));
        assert!(session.subscribe("a/#".parse().unwrap(), QoS::ExactlyOnce));

        assert_eq!(session.subscriptions.len(), 2);
        assert_eq!(session.subscriptions[0].filter.as_str(), "a/#");
        assert_eq!(session.subscriptions[0].qos, QoS::ExactlyOnce);
    }

    #[test]
    fn overlapping_subscriptions_take_the_maximum_qos() {
        let mut session = Session::new(ClientId::from_str("c1").unwrap());

        session.subscribe("sensor/#".parse().unwrap(), QoS::AtMostOnce);
        session.subscribe("sensor/+/temp".parse().unwrap(), QoS::ExactlyOnce);

        assert_eq!(
            session.max_matching_qos("sensor/1/temp"),
            Some(QoS::ExactlyOnce)
        );
        assert_eq!(
            session.max_matching_qos("sensor/1/hum"),
            Some(QoS::AtMostOnce)
        );
        assert_eq!(session.max_matching_qos("other"), None);

        assert!(session.unsubscribe("sensor/#"));
        assert!(!session.unsubscribe("sensor/#"));
        assert_eq!(session.max_matching_qos("sensor/1/hum"), None);
    }
}
