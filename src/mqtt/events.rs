use std::net::SocketAddr;

use bytes::Bytes;
use relaymq_protocol::{ConnectReturnCode, QoS, SubscribeReasonCode};

use crate::mqtt::ClientId;

/// Observer capability for broker-side events.
///
/// A sink is handed to [`MqttBroker::bind`](crate::mqtt::MqttBroker) at
/// construction. Every method is called from the broker's routing loop, so
/// implementations must not block; hand the data off to a channel if there is
/// real work to do.
///
/// All methods default to no-ops so hosts implement only what they observe.
#[allow(unused_variables)]
pub trait BrokerEventSink: Send + Sync + 'static {
    fn client_connected(
        &self,
        client_id: &ClientId,
        username: Option<&str>,
        peer_addr: SocketAddr,
    ) {
    }

    fn client_disconnected(&self, client_id: &ClientId) {}

    /// A packet arrived from the client, resetting its keep-alive window.
    fn client_alive(&self, client_id: &ClientId) {}

    fn publish_received(
        &self,
        client_id: &ClientId,
        packet_id: u16,
        topic: &str,
        payload: &Bytes,
        dup: bool,
    ) {
    }

    /// An outbound PUBLISH to this client completed its delivery flow.
    fn published(&self, client_id: &ClientId, packet_id: u16, topic: &str, payload: &Bytes) {}

    fn client_subscribed(&self, client_id: &ClientId, filter: &str, qos: QoS) {}

    fn client_unsubscribed(&self, client_id: &ClientId, filter: &str) {}
}

/// The no-op sink.
impl BrokerEventSink for () {}

/// Coarse transport state reported through [`ClientEventSink::state_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closing,
    Disconnected,
}

/// Observer capability for client-side events.
///
/// Methods are called from the client's session task, never from inside an
/// [`MqttClient`](crate::mqtt::MqttClient) method call, and must not block.
#[allow(unused_variables)]
pub trait ClientEventSink: Send + Sync + 'static {
    /// The broker answered our CONNECT. On anything but
    /// [`ConnectReturnCode::Accepted`] this is followed by `disconnected`.
    fn connected(&self, return_code: ConnectReturnCode, session_present: bool) {}

    fn disconnected(&self) {}

    fn state_changed(&self, state: ConnectionState) {}

    fn subscribed(&self, packet_id: u16, return_codes: &[SubscribeReasonCode]) {}

    fn unsubscribed(&self, packet_id: u16) {}

    /// An outbound PUBLISH finished its QoS flow. QoS 0 publishes report
    /// packet id 0 on the task turn after the `publish` call.
    fn published(&self, packet_id: u16) {}

    fn publish_received(&self, topic: &str, payload: &Bytes, retained: bool) {}
}

/// The no-op sink.
impl ClientEventSink for () {}
