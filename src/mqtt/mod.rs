pub mod auth;
pub mod broker;
pub mod client;
pub mod client_id;
pub mod events;
pub mod keep_alive;
pub mod packets;
pub mod retain;
pub mod session;
pub mod topic;

mod router;

pub use auth::{Authenticator, StaticUserAuthenticator};
pub use broker::{BrokerConfig, MqttBroker};
pub use client::{MqttClient, MqttClientOptions};
pub use client_id::ClientId;
pub use events::{BrokerEventSink, ClientEventSink, ConnectionState};
pub use keep_alive::KeepAlive;
pub use router::BrokerHandle;
pub use session::Will;
pub use topic::Filter;

slotmap::new_key_type! {
    /// Identifies one accepted transport for the lifetime of the broker.
    pub struct ConnectionId;

    /// Index of a client session in the broker's client table.
    pub struct ClientIndex;
}

// The MQTT spec imposes a maximum topic length of 64 KiB but implementations can impose a smaller limit
pub(crate) const TOPIC_MAX_LENGTH: usize = 1024;
