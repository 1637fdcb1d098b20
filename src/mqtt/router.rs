use std::cmp;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use slotmap::{SecondaryMap, SlotMap};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

use relaymq_protocol as protocol;
use relaymq_protocol::{
    Packet, PingResp, PubAck, PubComp, PubRec, PubRel, Publish, QoS, SubAck, Subscribe,
    SubscribeReasonCode, UnsubAck, Unsubscribe,
};

use crate::collections::HashMap;
use crate::mqtt::auth::Authenticator;
use crate::mqtt::events::BrokerEventSink;
use crate::mqtt::keep_alive::KeepAlive;
use crate::mqtt::packets::{Inflight, PacketId};
use crate::mqtt::retain::RetainedMessages;
use crate::mqtt::session::{AttachedConnection, Session, Will};
use crate::mqtt::topic::Filter;
use crate::mqtt::{ClientId, ClientIndex, ConnectionId, TOPIC_MAX_LENGTH};

// Tokio's channels allocate in slabs of 32.
const COMMAND_CAPACITY: usize = 128;

/// The routing task: the one place where sessions are mutated and publishes
/// are routed, so none of it needs locks. Connection tasks only do transport
/// I/O and feed this loop through its command channel.
pub(crate) struct MqttRouter {
    command_tx: mpsc::Sender<RouterCommand>,
    task: JoinHandle<()>,
}

/// Cloneable handle for host-facing broker operations.
#[derive(Clone)]
pub struct BrokerHandle {
    command_tx: mpsc::Sender<RouterCommand>,
}

pub(crate) enum RouterCommand {
    Connected {
        connection_id: ConnectionId,
        peer_addr: SocketAddr,
        client_id: ClientId,
        clean_session: bool,
        keep_alive: KeepAlive,
        will: Option<Will>,
        username: Option<String>,
        packet_tx: mpsc::UnboundedSender<Packet>,
        response_tx: oneshot::Sender<ConnectedResponse>,
    },
    Inbound {
        connection_id: ConnectionId,
        packet: Packet,
    },
    Disconnected {
        connection_id: ConnectionId,
        reason: DisconnectReason,
    },
    Publish {
        topic: String,
        payload: Bytes,
        response_tx: oneshot::Sender<HashMap<ClientId, u16>>,
    },
    Clients {
        response_tx: oneshot::Sender<Vec<ClientId>>,
    },
    SetMaximumSubscriptionQos(QoS),
}

pub(crate) struct ConnectedResponse {
    pub session_present: bool,
}

/// Why a transport went away. Every variant publishes the will (if one is
/// still registered) and emits `client_disconnected`; the distinction is for
/// the logs.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DisconnectReason {
    TransportClosed,
    KeepAliveTimeout,
    ProtocolError,
}

struct RouterState {
    token: CancellationToken,
    command_rx: mpsc::Receiver<RouterCommand>,

    clients: SlotMap<ClientIndex, Session>,
    by_id: HashMap<ClientId, ClientIndex>,
    /// Which session each live transport is attached to.
    connections: SecondaryMap<ConnectionId, ClientIndex>,

    retained: RetainedMessages,
    maximum_subscription_qos: QoS,

    authenticator: Option<Arc<dyn Authenticator>>,
    events: Arc<dyn BrokerEventSink>,
}

impl MqttRouter {
    pub fn start(
        events: Arc<dyn BrokerEventSink>,
        authenticator: Option<Arc<dyn Authenticator>>,
        maximum_subscription_qos: QoS,
        token: CancellationToken,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let state = RouterState {
            token,
            command_rx,
            clients: SlotMap::with_key(),
            by_id: HashMap::new(),
            connections: SecondaryMap::new(),
            retained: RetainedMessages::default(),
            maximum_subscription_qos,
            authenticator,
            events,
        };

        MqttRouter {
            command_tx,
            task: task::spawn(run(state)),
        }
    }

    pub fn command_tx(&self) -> mpsc::Sender<RouterCommand> {
        self.command_tx.clone()
    }

    pub fn handle(&self) -> BrokerHandle {
        BrokerHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Wait for the routing task to wind down after cancellation.
    pub async fn stopped(self) -> crate::Result<()> {
        drop(self.command_tx);
        self.task.await.map_err(crate::map_join_error)
    }
}

impl BrokerHandle {
    /// Publish a server-originated message through the normal routing path.
    ///
    /// Each receiving client gets the message at its subscription's QoS.
    /// Returns the allocated packet id per receiving client id (0 for QoS 0
    /// deliveries).
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> crate::Result<HashMap<ClientId, u16>> {
        let (response_tx, response_rx) = oneshot::channel();

        self.send(RouterCommand::Publish {
            topic: topic.into(),
            payload: payload.into(),
            response_tx,
        })
        .await?;

        Ok(response_rx.await?)
    }

    /// The client ids with a live transport right now.
    pub async fn clients(&self) -> crate::Result<Vec<ClientId>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(RouterCommand::Clients { response_tx }).await?;

        Ok(response_rx.await?)
    }

    /// Cap the QoS granted on future subscriptions.
    pub async fn set_maximum_subscription_qos(&self, qos: QoS) -> crate::Result<()> {
        self.send(RouterCommand::SetMaximumSubscriptionQos(qos))
            .await
    }

    async fn send(&self, command: RouterCommand) -> crate::Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| color_eyre::eyre::eyre!("broker has shut down"))
    }
}

async fn run(mut state: RouterState) {
    loop {
        tokio::select! {
            _ = state.token.cancelled() => break,
            command = state.command_rx.recv() => {
                let Some(command) = command else { break };
                state.handle_command(command);
            }
        }
    }
}

impl RouterState {
    fn handle_command(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Connected {
                connection_id,
                peer_addr,
                client_id,
                clean_session,
                keep_alive,
                will,
                username,
                packet_tx,
                response_tx,
            } => self.handle_connected(
                connection_id,
                peer_addr,
                client_id,
                clean_session,
                keep_alive,
                will,
                username,
                packet_tx,
                response_tx,
            ),
            RouterCommand::Inbound {
                connection_id,
                packet,
            } => self.handle_inbound(connection_id, packet),
            RouterCommand::Disconnected {
                connection_id,
                reason,
            } => self.handle_disconnected(connection_id, reason),
            RouterCommand::Publish {
                topic,
                payload,
                response_tx,
            } => {
                let receivers = self.route_publish(&topic, &payload, None);
                let _ = response_tx.send(receivers);
            }
            RouterCommand::Clients { response_tx } => {
                let clients = self
                    .clients
                    .values()
                    .filter(|session| session.is_connected())
                    .map(|session| session.client_id.clone())
                    .collect();
                let _ = response_tx.send(clients);
            }
            RouterCommand::SetMaximumSubscriptionQos(qos) => {
                self.maximum_subscription_qos = qos;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_connected(
        &mut self,
        connection_id: ConnectionId,
        peer_addr: SocketAddr,
        client_id: ClientId,
        clean_session: bool,
        keep_alive: KeepAlive,
        will: Option<Will>,
        username: Option<String>,
        packet_tx: mpsc::UnboundedSender<Packet>,
        response_tx: oneshot::Sender<ConnectedResponse>,
    ) {
        let (index, session_present) = match self.by_id.get(&client_id).copied() {
            Some(index) if !clean_session => {
                // Take over the existing session: in-flight tables and
                // subscriptions carry over, and the displaced transport gets
                // neither a will nor a disconnected notification.
                let session = &mut self.clients[index];
                if let Some(old) = session.connection.take() {
                    tracing::debug!(
                        %client_id,
                        "already have a session for this client id; taking over"
                    );
                    // Dropping the sender closes the old transport's outbound
                    // channel, which makes its task exit.
                    self.connections.remove(old.connection_id);
                } else {
                    tracing::debug!(%client_id, "resuming stored session");
                }

                (index, true)
            }
            Some(index) => {
                // A clean session displaces whatever was stored. No will is
                // published (the client itself reconnected), but a live
                // transport being dropped is observable.
                tracing::debug!(
                    %client_id,
                    "already have a session for this client id; dropping old session"
                );

                let session = self
                    .clients
                    .remove(index)
                    .expect("BUG: client table out of sync");
                self.by_id.remove(&client_id);

                if let Some(old) = session.connection {
                    self.connections.remove(old.connection_id);
                    self.events.client_disconnected(&client_id);
                }

                (self.insert_session(client_id.clone()), false)
            }
            None => {
                if !clean_session {
                    tracing::warn!(
                        %client_id,
                        "request to take over an existing session, but there is none"
                    );
                }

                (self.insert_session(client_id.clone()), false)
            }
        };

        let session = &mut self.clients[index];
        session.keep_alive = keep_alive;
        session.clean_session = clean_session;
        session.will = will;
        session.username = username;
        session.connection = Some(AttachedConnection {
            connection_id,
            packet_tx,
        });
        self.connections.insert(connection_id, index);

        let username = session.username.clone();

        // The connection task writes its CONNACK when it sees this response.
        // Anything queued on `packet_tx` after this point stays behind the
        // CONNACK in the channel.
        if response_tx
            .send(ConnectedResponse { session_present })
            .is_err()
        {
            // The client vanished between CONNECT and now.
            self.handle_disconnected(connection_id, DisconnectReason::TransportClosed);
            return;
        }

        self.events
            .client_connected(&client_id, username.as_deref(), peer_addr);

        // Resume the delivery flow: everything unacknowledged goes out again,
        // oldest first, flagged as a duplicate.
        let session = &self.clients[index];
        for (packet_id, inflight) in session.outbound.iter_in_order() {
            tracing::debug!(
                %client_id,
                packet_id = packet_id.get(),
                "resending unacked packet"
            );
            session.send(inflight.to_retransmit(packet_id));
        }
    }

    fn insert_session(&mut self, client_id: ClientId) -> ClientIndex {
        let index = self.clients.insert(Session::new(client_id.clone()));
        self.by_id.insert(client_id, index);
        index
    }

    fn handle_disconnected(&mut self, connection_id: ConnectionId, reason: DisconnectReason) {
        // A stale notification for a transport that was already replaced by a
        // session takeover resolves to nothing here.
        let Some(index) = self.connections.remove(connection_id) else {
            return;
        };

        let session = &mut self.clients[index];
        let is_current = matches!(
            &session.connection,
            Some(attached) if attached.connection_id == connection_id
        );

        if !is_current {
            return;
        }

        session.connection = None;

        let client_id = session.client_id.clone();
        tracing::debug!(%client_id, ?reason, "client disconnected");

        // An abrupt loss publishes the will; a graceful DISCONNECT already
        // cleared it [MQTT-3.1.2-8].
        if let Some(will) = session.will.take() {
            self.publish_will(index, will);
        }

        self.events.client_disconnected(&client_id);

        if self.clients[index].clean_session {
            self.clients.remove(index);
            self.by_id.remove(&client_id);
        } else {
            tracing::debug!(%client_id, "session saved for reconnection");
        }
    }

    fn handle_inbound(&mut self, connection_id: ConnectionId, packet: Packet) {
        // Raced with a disconnect or takeover.
        let Some(index) = self.connections.get(connection_id).copied() else {
            return;
        };

        let session = &self.clients[index];
        self.events.client_alive(&session.client_id);

        match packet {
            Packet::PingReq(_) => session.send(Packet::PingResp(PingResp)),
            Packet::Publish(publish) => self.handle_publish(connection_id, index, publish),
            Packet::PubAck(puback) => self.handle_puback(index, puback),
            Packet::PubRec(pubrec) => self.handle_pubrec(index, pubrec),
            Packet::PubRel(pubrel) => self.handle_pubrel(index, pubrel),
            Packet::PubComp(pubcomp) => self.handle_pubcomp(index, pubcomp),
            Packet::Subscribe(subscribe) => self.handle_subscribe(index, subscribe),
            Packet::Unsubscribe(unsubscribe) => self.handle_unsubscribe(index, unsubscribe),
            Packet::Disconnect(_) => {
                // Graceful shutdown discards the will [MQTT-3.1.2-10]. The
                // rest of the teardown happens when the transport closes.
                self.clients[index].will = None;
            }
            Packet::Connect(..) => {
                // MQTT-3.1.0-2
                tracing::warn!(
                    client_id = %self.clients[index].client_id,
                    "second CONNECT packet; dropping connection"
                );
                self.handle_disconnected(connection_id, DisconnectReason::ProtocolError);
            }
            other => {
                tracing::warn!(
                    client_id = %self.clients[index].client_id,
                    ?other,
                    "unexpected packet from client; dropping connection"
                );
                self.handle_disconnected(connection_id, DisconnectReason::ProtocolError);
            }
        }
    }

    fn handle_publish(&mut self, connection_id: ConnectionId, index: ClientIndex, publish: Publish) {
        let Ok(topic) = std::str::from_utf8(&publish.topic).map(str::to_owned) else {
            tracing::warn!("publish topic is not valid UTF-8; dropping connection");
            self.handle_disconnected(connection_id, DisconnectReason::ProtocolError);
            return;
        };

        if !protocol::valid_topic(&topic) {
            tracing::warn!(topic, "invalid publish topic; dropping connection");
            self.handle_disconnected(connection_id, DisconnectReason::ProtocolError);
            return;
        }

        let session = &mut self.clients[index];

        match publish.qos {
            QoS::AtMostOnce => {
                self.ingest_publish(index, &publish, &topic);
            }
            QoS::AtLeastOnce => {
                let pkid = publish.pkid;
                self.ingest_publish(index, &publish, &topic);
                self.clients[index].send(Packet::PubAck(PubAck { pkid }));
            }
            QoS::ExactlyOnce => {
                let packet_id = PacketId::new(publish.pkid)
                    .expect("BUG: the codec rejects QoS 2 publishes with packet id 0");

                if session.incoming.contains(packet_id) {
                    if publish.dup {
                        // The client never saw our PUBREC. Repeat it, but the
                        // application already got this message exactly once.
                        session.send(Packet::PubRec(PubRec {
                            pkid: publish.pkid,
                        }));
                    } else {
                        // Client claims a fresh packet, but the id was never
                        // released. Drop the connection.
                        tracing::warn!(
                            client_id = %session.client_id,
                            packet_id = publish.pkid,
                            "DUP not set but the packet id is still in use; dropping connection"
                        );
                        self.handle_disconnected(connection_id, DisconnectReason::ProtocolError);
                    }

                    return;
                }

                session.incoming.insert(packet_id);
                let pkid = publish.pkid;
                self.ingest_publish(index, &publish, &topic);
                self.clients[index].send(Packet::PubRec(PubRec { pkid }));
            }
        }
    }

    /// Deliver an inbound PUBLISH: notify observers, update the retained
    /// store, and fan it out to matching subscribers.
    fn ingest_publish(&mut self, index: ClientIndex, publish: &Publish, topic: &str) {
        let session = &self.clients[index];
        tracing::debug!(
            client_id = %session.client_id,
            topic,
            packet_id = publish.pkid,
            qos = publish.qos as u8,
            retain = publish.retain,
            "publish received"
        );

        self.events.publish_received(
            &session.client_id,
            publish.pkid,
            topic,
            &publish.payload,
            publish.dup,
        );

        if publish.retain {
            self.retained.store(topic, publish.qos, &publish.payload);
        }

        self.route_publish(topic, &publish.payload, Some(publish.qos));
    }

    /// Fan a publication out to every connected session with a matching
    /// subscription.
    ///
    /// Each receiver gets one copy at the maximum QoS among its matching
    /// subscriptions, capped by the publish QoS when there is one (routed
    /// traffic); server-originated publishes use the subscription QoS as-is.
    fn route_publish(
        &mut self,
        topic: &str,
        payload: &Bytes,
        original_qos: Option<QoS>,
    ) -> HashMap<ClientId, u16> {
        let RouterState {
            clients, events, ..
        } = self;

        let mut receivers = HashMap::new();

        for (_, session) in clients.iter_mut() {
            if !session.is_connected() {
                continue;
            }

            let Some(match_qos) = session.max_matching_qos(topic) else {
                continue;
            };

            let qos = match original_qos {
                Some(original) => cmp::min(match_qos, original),
                None => match_qos,
            };

            tracing::debug!(client_id = %session.client_id, topic, "relaying packet to subscribed client");

            let pkid = match qos {
                QoS::AtMostOnce => 0,
                _ => session.outbound.allocate(&session.incoming).get(),
            };

            let publish = Publish {
                dup: false,
                qos,
                pkid,
                retain: false,
                topic: Bytes::copy_from_slice(topic.as_bytes()),
                payload: payload.clone(),
            };

            if qos == QoS::AtMostOnce {
                session.send(Packet::Publish(publish));
                // Fire-and-forget: complete as soon as it's on the wire.
                events.published(&session.client_id, 0, topic, payload);
            } else {
                session.outbound.insert(
                    PacketId::new(pkid).expect("BUG: allocator produced 0"),
                    Inflight::Publish(publish.clone()),
                );
                session.send(Packet::Publish(publish));
            }

            receivers.insert(session.client_id.clone(), pkid);
        }

        receivers
    }

    /// Publish the will registered by a dying session, exactly as if the
    /// client had sent it as a normal PUBLISH.
    fn publish_will(&mut self, index: ClientIndex, will: Will) {
        tracing::debug!(
            client_id = %self.clients[index].client_id,
            topic = will.topic,
            retain = will.retain,
            "publishing will message"
        );

        let session = &mut self.clients[index];
        let pkid = match will.qos {
            QoS::AtMostOnce => 0,
            _ => session.outbound.allocate(&session.incoming).get(),
        };

        let publish = Publish {
            dup: false,
            qos: will.qos,
            pkid,
            retain: will.retain,
            topic: Bytes::copy_from_slice(will.topic.as_bytes()),
            payload: will.message,
        };

        self.ingest_publish(index, &publish, &will.topic);
    }

    fn handle_puback(&mut self, index: ClientIndex, puback: PubAck) {
        let Some(packet_id) = PacketId::new(puback.pkid) else {
            return;
        };

        let session = &mut self.clients[index];
        let acked = matches!(
            session.outbound.get(packet_id),
            Some(Inflight::Publish(publish)) if publish.qos == QoS::AtLeastOnce
        );

        if !acked {
            tracing::trace!(?packet_id, "PUBACK for an unknown packet id");
            return;
        }

        let Some(Inflight::Publish(publish)) = session.outbound.remove(packet_id) else {
            unreachable!("BUG: entry changed between get and remove");
        };

        self.notify_published(index, packet_id, &publish);
    }

    fn handle_pubrec(&mut self, index: ClientIndex, pubrec: PubRec) {
        let Some(packet_id) = PacketId::new(pubrec.pkid) else {
            return;
        };

        let session = &mut self.clients[index];
        let publish = match session.outbound.get(packet_id) {
            Some(Inflight::Publish(publish)) if publish.qos == QoS::ExactlyOnce => publish.clone(),
            _ => {
                tracing::trace!(?packet_id, "PUBREC for an unknown packet id");
                return;
            }
        };

        // The PUBLISH half is acknowledged; from here on only the PUBREL is
        // ever retransmitted [MQTT-4.3.3].
        session.outbound.insert(packet_id, Inflight::Release(publish));
        session.send(Packet::PubRel(PubRel { pkid: pubrec.pkid }));
    }

    fn handle_pubcomp(&mut self, index: ClientIndex, pubcomp: PubComp) {
        let Some(packet_id) = PacketId::new(pubcomp.pkid) else {
            return;
        };

        let session = &mut self.clients[index];
        if !matches!(session.outbound.get(packet_id), Some(Inflight::Release(_))) {
            tracing::trace!(?packet_id, "PUBCOMP for an unknown packet id");
            return;
        }

        let Some(Inflight::Release(publish)) = session.outbound.remove(packet_id) else {
            unreachable!("BUG: entry changed between get and remove");
        };

        self.notify_published(index, packet_id, &publish);
    }

    fn handle_pubrel(&mut self, index: ClientIndex, pubrel: PubRel) {
        let Some(packet_id) = PacketId::new(pubrel.pkid) else {
            return;
        };

        let session = &mut self.clients[index];
        if !session.incoming.remove(packet_id) {
            tracing::trace!(?packet_id, "PUBREL for an unknown packet id");
        }

        session.send(Packet::PubComp(PubComp { pkid: pubrel.pkid }));
    }

    fn notify_published(&self, index: ClientIndex, packet_id: PacketId, publish: &Publish) {
        let session = &self.clients[index];
        let topic = String::from_utf8_lossy(&publish.topic);

        self.events.published(
            &session.client_id,
            packet_id.get(),
            &topic,
            &publish.payload,
        );
    }

    fn handle_subscribe(&mut self, index: ClientIndex, subscribe: Subscribe) {
        let authenticator = self.authenticator.clone();
        let maximum_qos = self.maximum_subscription_qos;
        let events = self.events.clone();

        let session = &mut self.clients[index];
        let client_id = session.client_id.clone();
        let username = session.username.clone();

        let mut return_codes = Vec::with_capacity(subscribe.filters.len());
        let mut accepted = Vec::new();

        for filter in subscribe.filters {
            if let Some(authenticator) = &authenticator {
                if !authenticator.validate_subscribe(&filter.path, &client_id, username.as_deref())
                {
                    tracing::warn!(
                        %client_id,
                        filter = filter.path,
                        "subscription filter not allowed for client"
                    );
                    return_codes.push(SubscribeReasonCode::Failure);
                    continue;
                }
            }

            if filter.path.len() > TOPIC_MAX_LENGTH || !protocol::valid_filter(&filter.path) {
                tracing::warn!(
                    %client_id,
                    filter = filter.path,
                    "subscription filter not valid for client"
                );
                return_codes.push(SubscribeReasonCode::Failure);
                continue;
            }

            let Ok(parsed) = filter.path.parse::<Filter>() else {
                return_codes.push(SubscribeReasonCode::Failure);
                continue;
            };

            let granted = cmp::min(filter.qos, maximum_qos);

            if session.subscribe(parsed.clone(), granted) {
                tracing::debug!(
                    %client_id,
                    filter = filter.path,
                    "duplicate topic filter; replacing subscription QoS"
                );
            }

            tracing::debug!(
                %client_id,
                filter = filter.path,
                qos = granted as u8,
                "client subscribed"
            );
            events.client_subscribed(&client_id, &filter.path, granted);

            accepted.push((parsed, granted));
            return_codes.push(SubscribeReasonCode::Success(granted));
        }

        session.send(Packet::SubAck(SubAck {
            pkid: subscribe.pkid,
            return_codes,
        }));

        // Retained messages replay strictly after the SUBACK, once per
        // accepted filter [MQTT-3.3.1-6].
        for (filter, granted) in accepted {
            self.replay_retained(index, &filter, granted);
        }
    }

    fn replay_retained(&mut self, index: ClientIndex, filter: &Filter, granted: QoS) {
        let mut matches = Vec::new();
        self.retained.visit_matches(filter, |topic, message| {
            matches.push((topic.to_owned(), message.clone()));
        });

        let session = &mut self.clients[index];

        for (topic, message) in matches {
            let qos = cmp::min(message.qos, granted);

            let pkid = match qos {
                QoS::AtMostOnce => 0,
                _ => session.outbound.allocate(&session.incoming).get(),
            };

            tracing::debug!(
                client_id = %session.client_id,
                topic,
                "delivering retained message"
            );

            let publish = Publish {
                dup: false,
                qos,
                pkid,
                retain: true,
                topic: Bytes::copy_from_slice(topic.as_bytes()),
                payload: message.payload,
            };

            if qos != QoS::AtMostOnce {
                session.outbound.insert(
                    PacketId::new(pkid).expect("BUG: allocator produced 0"),
                    Inflight::Publish(publish.clone()),
                );
            }

            session.send(Packet::Publish(publish));
        }
    }

    fn handle_unsubscribe(&mut self, index: ClientIndex, unsubscribe: Unsubscribe) {
        let events = self.events.clone();
        let session = &mut self.clients[index];
        let client_id = session.client_id.clone();

        for filter in &unsubscribe.filters {
            if session.unsubscribe(filter) {
                tracing::debug!(%client_id, filter, "client unsubscribed");
                events.client_unsubscribed(&client_id, filter);
            }
        }

        self.clients[index].send(Packet::UnsubAck(UnsubAck {
            pkid: unsubscribe.pkid,
        }));
    }
}
