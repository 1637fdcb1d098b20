use std::net::SocketAddr;
use std::sync::Arc;

use color_eyre::eyre::Context;
use relaymq_protocol::QoS;
use slotmap::SlotMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use connection::Connection;

use crate::mqtt::auth::Authenticator;
use crate::mqtt::events::BrokerEventSink;
use crate::mqtt::router::{BrokerHandle, MqttRouter, RouterCommand};
use crate::mqtt::ConnectionId;

mod connection;

/// Everything pluggable about a broker instance.
pub struct BrokerConfig {
    /// Connection and subscription policy. `None` accepts everyone.
    pub authenticator: Option<Arc<dyn Authenticator>>,
    /// Observer for broker events; `Arc::new(())` observes nothing.
    pub events: Arc<dyn BrokerEventSink>,
    /// Cap on the QoS granted to subscriptions.
    pub maximum_subscription_qos: QoS,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            authenticator: None,
            events: Arc::new(()),
            maximum_subscription_qos: QoS::ExactlyOnce,
        }
    }
}

/// An MQTT 3.1.1 broker bound to a TCP listener.
///
/// Each accepted transport runs on its own task doing framing, the CONNECT
/// handshake, and keep-alive policing; session state and routing live on the
/// router task. `run()` drives the accept loop until shutdown.
pub struct MqttBroker {
    listen_addr: SocketAddr,

    listener: TcpListener,

    token: CancellationToken,

    /// Generator for `ConnectionId`s
    connections: SlotMap<ConnectionId, ()>,
    tasks: JoinSet<ConnectionId>,

    shared: Arc<Shared>,

    router: MqttRouter,
}

pub(crate) struct Shared {
    pub router_tx: mpsc::Sender<RouterCommand>,
    pub authenticator: Option<Arc<dyn Authenticator>>,
}

impl MqttBroker {
    pub async fn bind(listen_addr: SocketAddr, config: BrokerConfig) -> crate::Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .wrap_err_with(|| format!("failed to bind listen_addr: {listen_addr}"))?;

        let token = CancellationToken::new();

        let router = MqttRouter::start(
            config.events,
            config.authenticator.clone(),
            config.maximum_subscription_qos,
            token.clone(),
        );

        Ok(MqttBroker {
            listen_addr,
            listener,
            token,
            connections: SlotMap::with_capacity_and_key(256),
            tasks: JoinSet::new(),
            shared: Arc::new(Shared {
                router_tx: router.command_tx(),
                authenticator: config.authenticator,
            }),
            router,
        })
    }

    /// The address the listener actually bound, which differs from the
    /// requested one when port 0 was asked for.
    pub fn local_addr(&self) -> crate::Result<SocketAddr> {
        self.listener
            .local_addr()
            .wrap_err("failed to read listener address")
    }

    /// Handle for host-side operations: server publishes, client listing,
    /// QoS cap changes.
    pub fn handle(&self) -> BrokerHandle {
        self.router.handle()
    }

    pub async fn run(&mut self) -> crate::Result<()> {
        tracing::info!(listen_addr = %self.listen_addr, "listening for connections");

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                Some(res) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match res {
                        Ok(connection_id) => {
                            self.connections.remove(connection_id);
                        }
                        Err(e) => tracing::error!("connection task failed: {e}"),
                    }
                }
                res = self.listener.accept() => {
                    self.handle_accept(res);
                }
            }
        }

        Ok(())
    }

    fn handle_accept(&mut self, result: std::io::Result<(TcpStream, SocketAddr)>) {
        match result {
            Ok((stream, remote_addr)) => {
                tracing::info!(%remote_addr, "connection received");

                let connection_id = self.connections.insert(());

                let conn = Connection::new(
                    connection_id,
                    stream,
                    remote_addr,
                    self.token.clone(),
                    self.shared.clone(),
                );

                self.tasks.spawn(conn.run());
            }
            // TODO: Some kinds of accept failures are probably fatal
            Err(e) => tracing::error!(?e, "accept failed"),
        }
    }

    /// The number of transports currently being served.
    pub fn connections(&self) -> usize {
        self.tasks.len()
    }

    pub async fn shutdown(mut self) -> crate::Result<()> {
        // Closes any pending connections and stops listening for new ones.
        drop(self.listener);

        self.token.cancel();

        while let Some(res) = self.tasks.join_next().await {
            if let Ok(connection_id) = res {
                self.connections.remove(connection_id);
            }
            tracing::info!("{} connections remaining", self.tasks.len());
        }

        self.router.stopped().await
    }
}
