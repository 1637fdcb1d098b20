use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use color_eyre::eyre::eyre;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use relaymq_protocol as protocol;
use relaymq_protocol::{
    ConnAck, Connect, ConnectReturnCode, Disconnect, LastWill, Login, Packet, PingReq, PubAck,
    PubComp, PubRec, PubRel, Publish, QoS, SubAck, Subscribe, SubscribeFilter, UnsubAck,
    Unsubscribe,
};

use crate::mqtt::client_id::ClientId;
use crate::mqtt::events::{ClientEventSink, ConnectionState};
use crate::mqtt::keep_alive::KeepAlive;
use crate::mqtt::packets::{IncomingPacketSet, Inflight, OutboundQueue, PacketId};
use crate::mqtt::session::Will;

const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Pause between redial attempts so a dead broker doesn't spin the dialer.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Everything configurable about a client before it connects.
pub struct MqttClientOptions {
    pub client_id: ClientId,
    pub keep_alive: KeepAlive,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    /// Redial and resume the session when the transport drops. On by default.
    pub auto_reconnect: bool,
}

impl MqttClientOptions {
    pub fn new(client_id: ClientId) -> Self {
        MqttClientOptions {
            client_id,
            keep_alive: KeepAlive::default(),
            will: None,
            username: None,
            password: None,
            auto_reconnect: true,
        }
    }

    pub fn keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: Option<Bytes>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }
}

/// Handle to a client session running on a background task.
///
/// Methods queue work for the session task; observable activity arrives at
/// the [`ClientEventSink`] handed to [`MqttClient::connect`].
pub struct MqttClient {
    command_tx: mpsc::UnboundedSender<Command>,
}

enum Command {
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
        packet_id_tx: oneshot::Sender<u16>,
    },
    Subscribe {
        filters: Vec<(String, QoS)>,
        packet_id_tx: oneshot::Sender<u16>,
    },
    Unsubscribe {
        filters: Vec<String>,
        packet_id_tx: oneshot::Sender<u16>,
    },
    Disconnect,
}

impl MqttClient {
    /// Connect to `host:port` and drive the session on a background task.
    ///
    /// The CONNACK outcome arrives at `events.connected()`; with
    /// auto-reconnect enabled, transport losses redial with the same
    /// parameters and the in-flight state intact.
    pub fn connect(
        host: impl Into<String>,
        port: u16,
        clean_session: bool,
        options: MqttClientOptions,
        events: Arc<dyn ClientEventSink>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = ClientTask {
            host: host.into(),
            port,
            clean_session,
            options,
            events,
            command_rx,
            outbound: OutboundQueue::default(),
            incoming: IncomingPacketSet::default(),
            session_active: true,
            connected: false,
        };

        tokio::spawn(task.run());

        MqttClient { command_tx }
    }

    /// Publish `payload` to `topic`. Returns the packet id driving the QoS
    /// flow, or 0 for QoS 0.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> crate::Result<u16> {
        self.request(|packet_id_tx| Command::Publish {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
            packet_id_tx,
        })
        .await
    }

    /// Subscribe to a single topic filter.
    pub async fn subscribe(&self, filter: impl Into<String>, qos: QoS) -> crate::Result<u16> {
        self.subscribe_many(vec![(filter.into(), qos)]).await
    }

    /// Subscribe to several topic filters with one SUBSCRIBE packet.
    pub async fn subscribe_many(&self, filters: Vec<(String, QoS)>) -> crate::Result<u16> {
        self.request(|packet_id_tx| Command::Subscribe {
            filters,
            packet_id_tx,
        })
        .await
    }

    pub async fn unsubscribe(&self, filter: impl Into<String>) -> crate::Result<u16> {
        self.unsubscribe_many(vec![filter.into()]).await
    }

    pub async fn unsubscribe_many(&self, filters: Vec<String>) -> crate::Result<u16> {
        self.request(|packet_id_tx| Command::Unsubscribe {
            filters,
            packet_id_tx,
        })
        .await
    }

    /// End the session: send DISCONNECT (discarding the will broker-side),
    /// flush, and stop reconnecting.
    pub fn disconnect(&self) {
        let _ = self.command_tx.send(Command::Disconnect);
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<u16>) -> Command,
    ) -> crate::Result<u16> {
        let (packet_id_tx, packet_id_rx) = oneshot::channel();

        self.command_tx
            .send(command(packet_id_tx))
            .map_err(|_| eyre!("client session has shut down"))?;

        packet_id_rx
            .await
            .map_err(|_| eyre!("client session has shut down"))
    }
}

/// How one transport's lifetime ended.
enum SessionEnd {
    /// Transport loss; auto-reconnect may redial.
    Closed,
    /// The broker refused our CONNECT; the session is over.
    Refused,
    /// We disconnected on purpose.
    Graceful,
}

struct ClientTask {
    host: String,
    port: u16,
    clean_session: bool,
    options: MqttClientOptions,
    events: Arc<dyn ClientEventSink>,
    command_rx: mpsc::UnboundedReceiver<Command>,

    /// In-flight packets we sent (`unacked_out`), replayed with DUP=1 after
    /// a reconnect.
    outbound: OutboundQueue,
    /// Inbound QoS 2 reservations (`unacked_in`).
    incoming: IncomingPacketSet,

    session_active: bool,
    /// Set once the CONNACK accepted us; gates the keep-alive ticker.
    connected: bool,
}

impl ClientTask {
    #[tracing::instrument(name = "ClientTask::run", skip_all, fields(client_id = %self.options.client_id))]
    async fn run(mut self) {
        loop {
            self.connected = false;
            self.events.state_changed(ConnectionState::Connecting);

            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(stream) => {
                    let end = match self.run_connection(stream).await {
                        Ok(end) => end,
                        Err(e) => {
                            tracing::debug!("session ended: {e}");
                            SessionEnd::Closed
                        }
                    };

                    if matches!(end, SessionEnd::Refused | SessionEnd::Graceful) {
                        self.session_active = false;
                    }

                    self.events.state_changed(ConnectionState::Disconnected);
                    self.events.disconnected();
                }
                Err(e) => {
                    tracing::warn!("failed to connect to {}:{}: {e}", self.host, self.port);
                    self.events.state_changed(ConnectionState::Disconnected);
                }
            }

            if !(self.session_active && self.options.auto_reconnect) {
                break;
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn run_connection(&mut self, mut stream: TcpStream) -> crate::Result<SessionEnd> {
        let mut read_buf = BytesMut::with_capacity(8192);
        let mut write_buf = BytesMut::new();

        // CONNECT opens every (re)connection.
        let connect = Packet::Connect(
            Connect {
                protocol_level: protocol::PROTOCOL_LEVEL,
                keep_alive: self.options.keep_alive.as_seconds(),
                client_id: self.options.client_id.to_string(),
                clean_session: self.clean_session,
            },
            self.options.will.as_ref().map(|will| LastWill {
                topic: Bytes::copy_from_slice(will.topic.as_bytes()),
                message: will.message.clone(),
                qos: will.qos,
                retain: will.retain,
            }),
            self.options.username.as_ref().map(|username| Login {
                username: username.clone(),
                password: self.options.password.clone(),
            }),
        );

        send_packet(&mut stream, &mut write_buf, connect).await?;
        let mut last_activity = Instant::now();

        loop {
            // Drain complete packets before suspending.
            loop {
                match protocol::read_mut(&mut read_buf, MAX_PACKET_SIZE) {
                    Ok(packet) => {
                        if let Some(end) = self
                            .handle_packet(&mut stream, &mut write_buf, packet)
                            .await?
                        {
                            return Ok(end);
                        }
                    }
                    Err(protocol::Error::InsufficientBytes(_)) => break,
                    Err(e) => {
                        tracing::warn!("bad data from server, dropping connection: {e}");
                        return Ok(SessionEnd::Closed);
                    }
                }
            }

            tokio::select! {
                res = stream.read_buf(&mut read_buf) => {
                    let read = res.map_err(crate::Error::from)?;

                    if read == 0 {
                        tracing::debug!("disconnected from server");
                        return Ok(SessionEnd::Closed);
                    }

                    last_activity = Instant::now();
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(Command::Disconnect) | None => {
                            // Best-effort: flush the DISCONNECT, then drop
                            // the transport.
                            self.events.state_changed(ConnectionState::Closing);
                            let _ = send_packet(&mut stream, &mut write_buf, Packet::Disconnect(Disconnect)).await;
                            let _ = stream.shutdown().await;
                            return Ok(SessionEnd::Graceful);
                        }
                        Some(command) => {
                            self.handle_command(&mut stream, &mut write_buf, command).await?;
                            last_activity = Instant::now();
                        }
                    }
                }
                _ = ping_sleep(last_activity, self.options.keep_alive), if self.connected => {
                    send_packet(&mut stream, &mut write_buf, Packet::PingReq(PingReq)).await?;
                    last_activity = Instant::now();
                }
            }
        }
    }

    async fn handle_command(
        &mut self,
        stream: &mut TcpStream,
        write_buf: &mut BytesMut,
        command: Command,
    ) -> crate::Result<()> {
        match command {
            Command::Publish {
                topic,
                payload,
                qos,
                retain,
                packet_id_tx,
            } => {
                let pkid = match qos {
                    QoS::AtMostOnce => 0,
                    _ => self.outbound.allocate(&self.incoming).get(),
                };

                let publish = Publish {
                    dup: false,
                    qos,
                    pkid,
                    retain,
                    topic: Bytes::from(topic),
                    payload,
                };

                if qos == QoS::AtMostOnce {
                    send_packet(stream, write_buf, Packet::Publish(publish)).await?;
                    // Fire-and-forget publishes complete here, on the session
                    // task's turn, never inside the `publish()` call itself.
                    self.events.published(0);
                } else {
                    let packet_id = PacketId::new(pkid).expect("BUG: allocator produced 0");
                    self.outbound
                        .insert(packet_id, Inflight::Publish(publish.clone()));
                    send_packet(stream, write_buf, Packet::Publish(publish)).await?;
                }

                let _ = packet_id_tx.send(pkid);
            }
            Command::Subscribe {
                filters,
                packet_id_tx,
            } => {
                let packet_id = self.outbound.allocate(&self.incoming);

                let subscribe = Subscribe {
                    pkid: packet_id.get(),
                    filters: filters
                        .into_iter()
                        .map(|(path, qos)| SubscribeFilter { path, qos })
                        .collect(),
                };

                self.outbound
                    .insert(packet_id, Inflight::Subscribe(subscribe.clone()));
                send_packet(stream, write_buf, Packet::Subscribe(subscribe)).await?;

                let _ = packet_id_tx.send(packet_id.get());
            }
            Command::Unsubscribe {
                filters,
                packet_id_tx,
            } => {
                let packet_id = self.outbound.allocate(&self.incoming);

                let unsubscribe = Unsubscribe {
                    pkid: packet_id.get(),
                    filters,
                };

                self.outbound
                    .insert(packet_id, Inflight::Unsubscribe(unsubscribe.clone()));
                send_packet(stream, write_buf, Packet::Unsubscribe(unsubscribe)).await?;

                let _ = packet_id_tx.send(packet_id.get());
            }
            Command::Disconnect => unreachable!("handled by the caller"),
        }

        Ok(())
    }

    /// Returns `Some` when the packet ends this transport's lifetime.
    async fn handle_packet(
        &mut self,
        stream: &mut TcpStream,
        write_buf: &mut BytesMut,
        packet: Packet,
    ) -> crate::Result<Option<SessionEnd>> {
        tracing::trace!(?packet, "received");

        match packet {
            Packet::ConnAck(connack) => return self.handle_connack(stream, write_buf, connack).await,
            Packet::Publish(publish) => {
                return self.handle_publish(stream, write_buf, publish).await;
            }
            Packet::PubAck(PubAck { pkid }) => {
                let Some(packet_id) = PacketId::new(pkid) else {
                    return Ok(Some(SessionEnd::Closed));
                };

                let acked = matches!(
                    self.outbound.get(packet_id),
                    Some(Inflight::Publish(publish)) if publish.qos == QoS::AtLeastOnce
                );

                if acked {
                    self.outbound.remove(packet_id);
                    self.events.published(pkid);
                } else {
                    tracing::trace!(pkid, "PUBACK for an unknown packet id");
                }
            }
            Packet::PubRec(PubRec { pkid }) => {
                let Some(packet_id) = PacketId::new(pkid) else {
                    return Ok(Some(SessionEnd::Closed));
                };

                let publish = match self.outbound.get(packet_id) {
                    Some(Inflight::Publish(publish)) if publish.qos == QoS::ExactlyOnce => {
                        Some(publish.clone())
                    }
                    _ => None,
                };

                match publish {
                    Some(publish) => {
                        // Only the PUBREL is retransmitted from here on.
                        self.outbound.insert(packet_id, Inflight::Release(publish));
                        send_packet(stream, write_buf, Packet::PubRel(PubRel { pkid })).await?;
                    }
                    None => tracing::trace!(pkid, "PUBREC for an unknown packet id"),
                }
            }
            Packet::PubComp(PubComp { pkid }) => {
                let Some(packet_id) = PacketId::new(pkid) else {
                    return Ok(Some(SessionEnd::Closed));
                };

                if matches!(self.outbound.get(packet_id), Some(Inflight::Release(_))) {
                    self.outbound.remove(packet_id);
                    self.events.published(pkid);
                } else {
                    tracing::trace!(pkid, "PUBCOMP for an unknown packet id");
                }
            }
            Packet::PubRel(PubRel { pkid }) => {
                let Some(packet_id) = PacketId::new(pkid) else {
                    return Ok(Some(SessionEnd::Closed));
                };

                if !self.incoming.remove(packet_id) {
                    tracing::trace!(pkid, "PUBREL for an unknown packet id");
                }

                send_packet(stream, write_buf, Packet::PubComp(PubComp { pkid })).await?;
            }
            Packet::SubAck(SubAck { pkid, return_codes }) => {
                let Some(packet_id) = PacketId::new(pkid) else {
                    return Ok(Some(SessionEnd::Closed));
                };

                if matches!(self.outbound.get(packet_id), Some(Inflight::Subscribe(_))) {
                    self.outbound.remove(packet_id);
                    self.events.subscribed(pkid, &return_codes);
                } else {
                    tracing::trace!(pkid, "SUBACK for an unknown packet id");
                }
            }
            Packet::UnsubAck(UnsubAck { pkid }) => {
                let Some(packet_id) = PacketId::new(pkid) else {
                    return Ok(Some(SessionEnd::Closed));
                };

                if !matches!(self.outbound.get(packet_id), Some(Inflight::Unsubscribe(_))) {
                    // UNSUBACK for something we never asked about; the
                    // session state cannot be trusted anymore.
                    tracing::warn!(
                        pkid,
                        "UNSUBACK received but not waiting for it; dropping connection"
                    );
                    return Ok(Some(SessionEnd::Closed));
                }

                self.outbound.remove(packet_id);
                self.events.unsubscribed(pkid);
            }
            Packet::PingResp(_) => {}
            other => {
                tracing::warn!(?other, "unexpected packet from server; dropping connection");
                return Ok(Some(SessionEnd::Closed));
            }
        }

        Ok(None)
    }

    async fn handle_connack(
        &mut self,
        stream: &mut TcpStream,
        write_buf: &mut BytesMut,
        connack: ConnAck,
    ) -> crate::Result<Option<SessionEnd>> {
        self.events.connected(connack.code, connack.session_present);

        if connack.code != ConnectReturnCode::Accepted {
            tracing::warn!(code = ?connack.code, "MQTT connection refused");
            return Ok(Some(SessionEnd::Refused));
        }

        self.connected = true;
        self.events.state_changed(ConnectionState::Connected);

        // Resume the delivery flow: everything unacknowledged goes out
        // again, oldest first, flagged as a duplicate.
        let retransmits: Vec<Packet> = self
            .outbound
            .iter_in_order()
            .map(|(packet_id, inflight)| inflight.to_retransmit(packet_id))
            .collect();

        for packet in retransmits {
            tracing::debug!(?packet, "resending unacked packet");
            send_packet(stream, write_buf, packet).await?;
        }

        Ok(None)
    }

    async fn handle_publish(
        &mut self,
        stream: &mut TcpStream,
        write_buf: &mut BytesMut,
        publish: Publish,
    ) -> crate::Result<Option<SessionEnd>> {
        let Ok(topic) = std::str::from_utf8(&publish.topic) else {
            tracing::warn!("publish topic is not valid UTF-8; dropping connection");
            return Ok(Some(SessionEnd::Closed));
        };

        match publish.qos {
            QoS::AtMostOnce => {
                self.events
                    .publish_received(topic, &publish.payload, publish.retain);
            }
            QoS::AtLeastOnce => {
                self.events
                    .publish_received(topic, &publish.payload, publish.retain);
                send_packet(
                    stream,
                    write_buf,
                    Packet::PubAck(PubAck {
                        pkid: publish.pkid,
                    }),
                )
                .await?;
            }
            QoS::ExactlyOnce => {
                let packet_id = PacketId::new(publish.pkid)
                    .expect("BUG: the codec rejects QoS 2 publishes with packet id 0");

                if self.incoming.contains(packet_id) {
                    if !publish.dup {
                        // Server says it's not a duplicate, but the packet id
                        // is not released yet. Drop the connection.
                        tracing::warn!(
                            pkid = publish.pkid,
                            "DUP not set but the packet id is still in use; dropping connection"
                        );
                        return Ok(Some(SessionEnd::Closed));
                    }
                    // Re-delivery of a message the application already saw:
                    // just repeat the PUBREC.
                } else {
                    self.incoming.insert(packet_id);
                    self.events
                        .publish_received(topic, &publish.payload, publish.retain);
                }

                send_packet(
                    stream,
                    write_buf,
                    Packet::PubRec(PubRec {
                        pkid: publish.pkid,
                    }),
                )
                .await?;
            }
        }

        Ok(None)
    }
}

async fn ping_sleep(last_activity: Instant, keep_alive: KeepAlive) {
    match keep_alive.as_interval() {
        Some(interval) => tokio::time::sleep_until(last_activity + interval).await,
        None => std::future::pending().await,
    }
}

async fn send_packet(
    stream: &mut TcpStream,
    write_buf: &mut BytesMut,
    packet: Packet,
) -> crate::Result<()> {
    tracing::trace!(?packet, "sending");

    protocol::write(&packet, write_buf)?;

    stream
        .write_all_buf(write_buf)
        .await
        .map_err(crate::Error::from)?;

    Ok(())
}
