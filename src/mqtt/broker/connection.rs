use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use relaymq_protocol as protocol;
use relaymq_protocol::{ConnAck, ConnectReturnCode, LastWill, Login, Packet};

use crate::mqtt::broker::Shared;
use crate::mqtt::client_id::ClientId;
use crate::mqtt::keep_alive::KeepAlive;
use crate::mqtt::router::{DisconnectReason, RouterCommand};
use crate::mqtt::session::Will;
use crate::mqtt::ConnectionId;

/// How long a transport may sit silent before its CONNECT arrives.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single control packet. The protocol encoding allows up
/// to 256 MiB; nobody needs that on this broker.
const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// One accepted transport.
///
/// Owns the socket and a per-transport read buffer, frames packets, performs
/// the CONNECT handshake (including authentication), polices the keep-alive
/// window, and shuttles everything else to and from the router.
pub(crate) struct Connection {
    id: ConnectionId,

    remote_addr: SocketAddr,

    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,

    token: CancellationToken,
    shared: Arc<Shared>,
}

#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("packet error: {0}")]
    Protocol(
        #[from]
        #[source]
        protocol::Error,
    ),
    #[error("protocol violation: {0}")]
    Violation(&'static str),
    #[error("error reading from socket: {0}")]
    Read(#[source] io::Error),
    #[error("error writing to socket: {0}")]
    Write(#[source] io::Error),
    #[error("no CONNECT within the pending-connect window")]
    ConnectTimeout,
    #[error("keep-alive window elapsed")]
    KeepAliveTimeout,
    #[error("broker is shutting down")]
    BrokerShutdown,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        remote_addr: SocketAddr,
        token: CancellationToken,
        shared: Arc<Shared>,
    ) -> Self {
        Connection {
            id,
            remote_addr,
            stream,
            read_buf: BytesMut::with_capacity(8192),
            write_buf: BytesMut::with_capacity(8192),
            token,
            shared,
        }
    }

    #[tracing::instrument(name = "Connection::run", skip_all, fields(remote_addr = %self.remote_addr))]
    pub async fn run(mut self) -> ConnectionId {
        let reason = match self.run_inner().await {
            Ok(()) => DisconnectReason::TransportClosed,
            Err(ConnectionError::KeepAliveTimeout) => {
                tracing::warn!("keep-alive window elapsed; dropping connection");
                DisconnectReason::KeepAliveTimeout
            }
            Err(e @ ConnectionError::Violation(_)) => {
                tracing::warn!("{e}");
                DisconnectReason::ProtocolError
            }
            Err(ConnectionError::Protocol(e)) => {
                // Malformed data: the connection is torn down without a
                // response.
                tracing::warn!("bad MQTT packet data, dropping connection: {e}");
                DisconnectReason::ProtocolError
            }
            Err(e) => {
                tracing::debug!("connection closed: {e}");
                DisconnectReason::TransportClosed
            }
        };

        // The router ignores this if the session was already detached (for
        // instance by a takeover).
        let _ = self
            .shared
            .router_tx
            .send(RouterCommand::Disconnected {
                connection_id: self.id,
                reason,
            })
            .await;

        let _ = self.stream.shutdown().await;

        self.id
    }

    async fn run_inner(&mut self) -> Result<(), ConnectionError> {
        // A pending transport has a finite window to produce its CONNECT.
        let packet = match tokio::time::timeout(CONNECT_TIMEOUT, self.recv()).await {
            Ok(res) => res?,
            Err(_) => {
                tracing::warn!(
                    "client connected but did not send data in {CONNECT_TIMEOUT:?}; dropping connection"
                );
                return Err(ConnectionError::ConnectTimeout);
            }
        };

        let Some(packet) = packet else {
            // Closed before sending anything.
            return Ok(());
        };

        let Some((keep_alive, packet_rx)) = self.handle_connect(packet).await? else {
            // Refused: the CONNACK carrying the reason is already on the wire.
            return Ok(());
        };

        self.run_session(keep_alive, packet_rx).await
    }

    /// Validate a CONNECT, consult the authenticator, register the session
    /// with the router, and send the CONNACK.
    ///
    /// Returns `None` when the connection was refused.
    async fn handle_connect(
        &mut self,
        packet: Packet,
    ) -> Result<Option<(KeepAlive, mpsc::UnboundedReceiver<Packet>)>, ConnectionError> {
        let Packet::Connect(connect, last_will, login) = packet else {
            // MQTT-3.1.0-1: the first packet must be a CONNECT.
            return Err(ConnectionError::Violation(
                "client sent data before CONNECT",
            ));
        };

        tracing::trace!(?connect, "received");

        if connect.protocol_level != protocol::PROTOCOL_LEVEL {
            tracing::warn!(
                protocol_level = connect.protocol_level,
                "this broker only supports protocol version 3.1.1"
            );
            return self
                .refuse(ConnectReturnCode::UnacceptableProtocolVersion)
                .await;
        }

        let client_id = if connect.client_id.is_empty() {
            if !connect.clean_session {
                tracing::warn!(
                    "empty client id provided but clean session flag not set; rejecting connection"
                );
                return self.refuse(ConnectReturnCode::IdentifierRejected).await;
            }

            ClientId::generate(&mut rand::thread_rng(), 16)
        } else {
            match connect.client_id.parse::<ClientId>() {
                Ok(client_id) => client_id,
                Err(e) => {
                    tracing::warn!("rejecting client id: {e}");
                    return self.refuse(ConnectReturnCode::IdentifierRejected).await;
                }
            }
        };

        if let Some(authenticator) = &self.shared.authenticator {
            let code = authenticator.validate_connect(
                &client_id,
                login.as_ref().map(|login: &Login| login.username.as_str()),
                login
                    .as_ref()
                    .and_then(|login| login.password.as_deref()),
                self.remote_addr,
            );

            if code != ConnectReturnCode::Accepted {
                tracing::warn!(?code, "rejecting connection due to user validation");
                return self.refuse(code).await;
            }
        }

        let will = convert_will(last_will)?;
        let keep_alive = KeepAlive::from_seconds(connect.keep_alive);

        let (response_tx, response_rx) = oneshot::channel();
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();

        self.shared
            .router_tx
            .send(RouterCommand::Connected {
                connection_id: self.id,
                peer_addr: self.remote_addr,
                client_id,
                clean_session: connect.clean_session,
                keep_alive,
                will,
                username: login.map(|login| login.username),
                packet_tx,
                response_tx,
            })
            .await
            .map_err(|_| ConnectionError::BrokerShutdown)?;

        let response = response_rx
            .await
            .map_err(|_| ConnectionError::BrokerShutdown)?;

        self.send(Packet::ConnAck(ConnAck {
            session_present: response.session_present,
            code: ConnectReturnCode::Accepted,
        }))
        .await?;

        Ok(Some((keep_alive, packet_rx)))
    }

    async fn run_session(
        &mut self,
        keep_alive: KeepAlive,
        mut packet_rx: mpsc::UnboundedReceiver<Packet>,
    ) -> Result<(), ConnectionError> {
        let idle_timeout = keep_alive.as_timeout();
        let mut deadline = idle_timeout.map(|timeout| Instant::now() + timeout);

        'session: loop {
            // Drain every complete packet already buffered before suspending;
            // iterative so a flood of pipelined packets cannot recurse.
            loop {
                match protocol::read_mut(&mut self.read_buf, MAX_PACKET_SIZE) {
                    Ok(packet) => {
                        tracing::trace!(?packet, "received");

                        let disconnect = matches!(packet, Packet::Disconnect(_));

                        self.shared
                            .router_tx
                            .send(RouterCommand::Inbound {
                                connection_id: self.id,
                                packet,
                            })
                            .await
                            .map_err(|_| ConnectionError::BrokerShutdown)?;

                        if disconnect {
                            // Closing: nothing past the DISCONNECT gets
                            // processed; the client closes the socket.
                            tracing::debug!("client disconnected gracefully");
                            break 'session Ok(());
                        }
                    }
                    Err(protocol::Error::InsufficientBytes(_)) => break,
                    Err(e) => break 'session Err(e.into()),
                }
            }

            tokio::select! {
                res = self.stream.read_buf(&mut self.read_buf) => {
                    let read = res.map_err(ConnectionError::Read)?;

                    if read == 0 {
                        tracing::debug!("connection closed by remote peer");
                        break 'session Ok(());
                    }

                    // Every byte from the client pushes the keep-alive
                    // deadline out [MQTT-3.1.2-22].
                    if let Some(timeout) = idle_timeout {
                        deadline = Some(Instant::now() + timeout);
                    }
                }
                maybe_packet = packet_rx.recv() => {
                    match maybe_packet {
                        Some(packet) => {
                            self.send(packet).await?;
                        }
                        None => {
                            // The router dropped our sender: the session was
                            // taken over or destroyed.
                            tracing::debug!("session detached by the broker");
                            break 'session Ok(());
                        }
                    }
                }
                _ = idle_sleep(deadline) => {
                    break 'session Err(ConnectionError::KeepAliveTimeout);
                }
                _ = self.token.cancelled() => {
                    break 'session Ok(());
                }
            }
        }
    }

    /// Read one packet during the handshake phase.
    async fn recv(&mut self) -> Result<Option<Packet>, ConnectionError> {
        loop {
            match protocol::read_mut(&mut self.read_buf, MAX_PACKET_SIZE) {
                Ok(packet) => return Ok(Some(packet)),
                Err(protocol::Error::InsufficientBytes(_)) => {}
                Err(e) => return Err(e.into()),
            }

            tokio::select! {
                res = self.stream.read_buf(&mut self.read_buf) => {
                    let read = res.map_err(ConnectionError::Read)?;

                    if read == 0 {
                        tracing::debug!("connection closed by remote peer");
                        return Ok(None);
                    }
                }
                _ = self.token.cancelled() => {
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        tracing::trace!(?packet, "sending");

        protocol::write(&packet, &mut self.write_buf)?;

        self.stream
            .write_all_buf(&mut self.write_buf)
            .await
            .map_err(ConnectionError::Write)?;

        Ok(())
    }

    /// Answer a failed CONNECT with its return code and close.
    async fn refuse(
        &mut self,
        code: ConnectReturnCode,
    ) -> Result<Option<(KeepAlive, mpsc::UnboundedReceiver<Packet>)>, ConnectionError> {
        self.send(Packet::ConnAck(ConnAck {
            session_present: false,
            code,
        }))
        .await?;

        self.stream
            .shutdown()
            .await
            .map_err(ConnectionError::Write)?;

        Ok(None)
    }
}

/// An empty will topic means no will was registered.
fn convert_will(last_will: Option<LastWill>) -> Result<Option<Will>, ConnectionError> {
    let Some(last_will) = last_will else {
        return Ok(None);
    };

    if last_will.topic.is_empty() {
        return Ok(None);
    }

    let topic = std::str::from_utf8(&last_will.topic)
        .map_err(|_| ConnectionError::Protocol(protocol::Error::InvalidUtf8))?;

    if !protocol::valid_topic(topic) {
        return Err(ConnectionError::Violation("invalid will topic"));
    }

    Ok(Some(Will {
        topic: topic.to_owned(),
        message: last_will.message,
        qos: last_will.qos,
        retain: last_will.retain,
    }))
}

async fn idle_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
