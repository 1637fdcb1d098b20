use std::num::NonZeroU16;

use relaymq_protocol::{Packet, PubRel, Publish, Subscribe, Unsubscribe};

use crate::collections::{FnvHashMap, FnvHashSet};

/// A nonzero MQTT packet identifier.
#[derive(Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Debug)]
pub struct PacketId(NonZeroU16);

impl PacketId {
    pub const START: PacketId = PacketId(NonZeroU16::MIN);

    pub fn new(id: u16) -> Option<PacketId> {
        NonZeroU16::new(id).map(Self)
    }

    pub fn get(self) -> u16 {
        self.0.get()
    }

    /// Increment `self` or wrap around to 1, returning the previous value.
    pub fn wrapping_increment(&mut self) -> Self {
        let ret = *self;
        *self = PacketId(self.0.checked_add(1).unwrap_or(NonZeroU16::MIN));
        ret
    }
}

/// A packet we sent that is awaiting acknowledgment.
#[derive(Debug, Clone)]
pub enum Inflight {
    /// PUBLISH awaiting a PUBACK (QoS 1) or PUBREC (QoS 2).
    Publish(Publish),
    /// PUBREL sent, awaiting a PUBCOMP. The original PUBLISH is kept so the
    /// completion can report what was published.
    Release(Publish),
    /// SUBSCRIBE awaiting a SUBACK.
    Subscribe(Subscribe),
    /// UNSUBSCRIBE awaiting an UNSUBACK.
    Unsubscribe(Unsubscribe),
}

impl Inflight {
    /// The packet to put back on the wire when the session resumes.
    ///
    /// PUBLISHes are re-sent with DUP set [MQTT-3.3.1-1]. A PUBREL is re-sent
    /// as a PUBREL, never as the original PUBLISH: the receiver already
    /// acknowledged that with its PUBREC. SUBSCRIBE and UNSUBSCRIBE requests
    /// go out again unchanged; they have no DUP flag.
    pub fn to_retransmit(&self, packet_id: PacketId) -> Packet {
        match self {
            Inflight::Publish(publish) => {
                let mut publish = publish.clone();
                publish.dup = true;
                Packet::Publish(publish)
            }
            Inflight::Release(_) => Packet::PubRel(PubRel {
                pkid: packet_id.get(),
            }),
            Inflight::Subscribe(subscribe) => Packet::Subscribe(subscribe.clone()),
            Inflight::Unsubscribe(unsubscribe) => Packet::Unsubscribe(unsubscribe.clone()),
        }
    }
}

/// The sender-side in-flight table: packet ids we allocated whose
/// acknowledgment flow has not completed, in insertion order.
///
/// Insertion order is what gets replayed with DUP=1 when a persistent session
/// resumes [MQTT-4.4.0-1].
#[derive(Debug)]
pub struct OutboundQueue {
    next_packet_id: PacketId,
    order: Vec<PacketId>,
    packets: FnvHashMap<PacketId, Inflight>,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        OutboundQueue {
            next_packet_id: PacketId::START,
            order: Vec::new(),
            packets: FnvHashMap::default(),
        }
    }
}

impl OutboundQueue {
    /// Allocate the next free packet id.
    ///
    /// The counter rolls over a 16-bit space, skipping ids still reserved by
    /// this table or by the inbound QoS 2 flow. Zero is never produced.
    pub fn allocate(&mut self, incoming: &IncomingPacketSet) -> PacketId {
        loop {
            let id = self.next_packet_id.wrapping_increment();
            if !self.packets.contains_key(&id) && !incoming.contains(id) {
                return id;
            }
        }
    }

    /// Insert or replace the in-flight packet for `packet_id`.
    ///
    /// Replacing keeps the id's position in the retransmission order; this is
    /// how a QoS 2 PUBLISH becomes a PUBREL at the same slot.
    pub fn insert(&mut self, packet_id: PacketId, inflight: Inflight) {
        if self.packets.insert(packet_id, inflight).is_none() {
            self.order.push(packet_id);
        }
    }

    pub fn get(&self, packet_id: PacketId) -> Option<&Inflight> {
        self.packets.get(&packet_id)
    }

    pub fn remove(&mut self, packet_id: PacketId) -> Option<Inflight> {
        let inflight = self.packets.remove(&packet_id)?;
        self.order.retain(|&id| id != packet_id);
        Some(inflight)
    }

    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.packets.contains_key(&packet_id)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// In-flight packets in the order they were first sent.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (PacketId, &Inflight)> {
        self.order.iter().map(move |&id| {
            (
                id,
                self.packets
                    .get(&id)
                    .expect("BUG: retransmission order out of sync with the table"),
            )
        })
    }
}

/// The receiver-side in-flight set: QoS 2 packet ids for which a PUBREC was
/// sent and the matching PUBREL has not arrived yet.
///
/// While an id is in this set, a re-delivery of the same PUBLISH (DUP=1) must
/// not reach the application again [MQTT-4.3.3-2].
#[derive(Debug, Default)]
pub struct IncomingPacketSet {
    packets: FnvHashSet<PacketId>,
}

impl IncomingPacketSet {
    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.packets.contains(&packet_id)
    }

    /// Reserve `packet_id`; returns `false` if it was already reserved.
    pub fn insert(&mut self, packet_id: PacketId) -> bool {
        self.packets.insert(packet_id)
    }

    /// Release `packet_id`; returns `false` if it wasn't reserved.
    pub fn remove(&mut self, packet_id: PacketId) -> bool {
        self.packets.remove(&packet_id)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use relaymq_protocol::QoS;

    fn publish(pkid: u16) -> Inflight {
        Inflight::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            pkid,
            retain: false,
            topic: Bytes::from("t"),
            payload: Bytes::from("p"),
        })
    }

    #[test]
    fn allocation_skips_reserved_ids() {
        let mut outbound = OutboundQueue::default();
        let mut incoming = IncomingPacketSet::default();

        let first = outbound.allocate(&incoming);
        assert_eq!(first.get(), 1);
        outbound.insert(first, publish(first.get()));

        // Reserve the next two ids on the inbound side.
        incoming.insert(PacketId::new(2).unwrap());
        incoming.insert(PacketId::new(3).unwrap());

        assert_eq!(outbound.allocate(&incoming).get(), 4);
    }

    #[test]
    fn allocation_wraps_without_producing_zero() {
        let mut outbound = OutboundQueue::default();
        let incoming = IncomingPacketSet::default();

        outbound.next_packet_id = PacketId::new(u16::MAX).unwrap();

        assert_eq!(outbound.allocate(&incoming).get(), u16::MAX);
        assert_eq!(outbound.allocate(&incoming).get(), 1);
    }

    #[test]
    fn replace_keeps_retransmission_order() {
        let mut outbound = OutboundQueue::default();
        let incoming = IncomingPacketSet::default();

        let ids: Vec<_> = (0..3).map(|_| outbound.allocate(&incoming)).collect();
        for &id in &ids {
            outbound.insert(id, publish(id.get()));
        }

        // Swap the middle entry for its PUBREL stage.
        outbound.insert(
            ids[1],
            Inflight::Release(Publish {
                dup: false,
                qos: QoS::ExactlyOnce,
                pkid: ids[1].get(),
                retain: false,
                topic: Bytes::from("t"),
                payload: Bytes::from("p"),
            }),
        );

        let order: Vec<_> = outbound.iter_in_order().map(|(id, _)| id).collect();
        assert_eq!(order, ids);

        outbound.remove(ids[0]).unwrap();
        let order: Vec<_> = outbound.iter_in_order().map(|(id, _)| id).collect();
        assert_eq!(order, ids[1..]);
    }
}
