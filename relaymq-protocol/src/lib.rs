//! Serialization and parsing for the 14 MQTT 3.1.1 control packets.
//!
//! Reference: https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html
//!
//! The entry points are [`read_mut`], which frames and parses exactly one
//! packet from the front of a buffer, and [`write`], which serializes a packet
//! onto the end of one. [`Error::InsufficientBytes`] is not a failure: it
//! reports how many more bytes are needed before the frame at the front of the
//! buffer can be parsed, and leaves the buffer untouched.

use std::slice::Iter;

use bytes::{Buf, BufMut, Bytes, BytesMut};

mod connack;
mod connect;
mod disconnect;
mod ping;
mod puback;
mod pubcomp;
mod publish;
mod pubrec;
mod pubrel;
mod suback;
mod subscribe;
mod unsuback;
mod unsubscribe;

pub use connack::{ConnAck, ConnectReturnCode};
pub use connect::{Connect, LastWill, Login};
pub use disconnect::Disconnect;
pub use ping::{PingReq, PingResp};
pub use puback::PubAck;
pub use pubcomp::PubComp;
pub use publish::Publish;
pub use pubrec::PubRec;
pub use pubrel::PubRel;
pub use suback::{SubAck, SubscribeReasonCode};
pub use subscribe::{Subscribe, SubscribeFilter};
pub use unsuback::UnsubAck;
pub use unsubscribe::Unsubscribe;

/// Protocol level byte identifying MQTT 3.1.1 in the CONNECT variable header.
pub const PROTOCOL_LEVEL: u8 = 4;

/// The largest value encodable in the 1-4 byte base-128 remaining length.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// An MQTT 3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect, Option<LastWill>, Option<Login>),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq(PingReq),
    PingResp(PingResp),
    Disconnect(Disconnect),
}

/// Quality of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// Maps a number to its QoS level. The value 3 is reserved [MQTT-3.3.1-4].
pub fn qos(num: u8) -> Result<QoS, Error> {
    match num {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        num => Err(Error::InvalidQoS(num)),
    }
}

/// MQTT control packet type, from the high nibble of the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

/// Errors during packet framing, parsing, or serialization.
///
/// [`Error::InsufficientBytes`] is recoverable: read more bytes and retry.
/// Everything else means the peer sent (or we were asked to send) something
/// that cannot appear on a conforming connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("at least {0} more bytes required to frame the packet")]
    InsufficientBytes(usize),
    #[error("invalid protocol name")]
    InvalidProtocol,
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),
    #[error("invalid QoS level: {0}")]
    InvalidQoS(u8),
    #[error("invalid connect return code: {0}")]
    InvalidConnectReturnCode(u8),
    #[error("invalid subscribe return code: {0}")]
    InvalidSubscribeReturnCode(u8),
    #[error("packet id must be non-zero")]
    PacketIdZero,
    #[error("payload too long to encode")]
    PayloadTooLong,
    #[error("packet size {0} exceeds the allowed maximum {1}")]
    PayloadSizeLimitExceeded(usize, usize),
    #[error("malformed remaining length")]
    MalformedRemainingLength,
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed packet")]
    MalformedPacket,
}

/// Framing information from the first 2-5 bytes of a control packet.
#[derive(Debug, Clone, Copy)]
pub struct FixedHeader {
    /// Packet type in the high nibble, type-specific flags in the low nibble.
    byte1: u8,
    /// One byte for `byte1` plus 1-4 remaining-length bytes.
    fixed_header_len: usize,
    /// Length of the variable header plus payload.
    remaining_len: usize,
}

impl FixedHeader {
    pub fn byte1(&self) -> u8 {
        self.byte1
    }

    pub fn packet_type(&self) -> Result<PacketType, Error> {
        match self.byte1 >> 4 {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            num => Err(Error::InvalidPacketType(num)),
        }
    }

    pub fn fixed_header_len(&self) -> usize {
        self.fixed_header_len
    }

    pub fn remaining_len(&self) -> usize {
        self.remaining_len
    }

    /// Total byte length of the packet: fixed header plus remaining length.
    pub fn frame_length(&self) -> usize {
        self.fixed_header_len + self.remaining_len
    }
}

/// Checks that a full frame is buffered and returns its fixed header without
/// consuming anything.
pub fn check(stream: Iter<'_, u8>, max_packet_size: usize) -> Result<FixedHeader, Error> {
    let stream_len = stream.len();
    let fixed_header = parse_fixed_header(stream)?;

    if fixed_header.remaining_len > max_packet_size {
        return Err(Error::PayloadSizeLimitExceeded(
            fixed_header.remaining_len,
            max_packet_size,
        ));
    }

    let frame_length = fixed_header.frame_length();
    if stream_len < frame_length {
        return Err(Error::InsufficientBytes(frame_length - stream_len));
    }

    Ok(fixed_header)
}

fn parse_fixed_header(mut stream: Iter<'_, u8>) -> Result<FixedHeader, Error> {
    // The shortest packets (PINGREQ et al.) are 2 bytes.
    let stream_len = stream.len();
    if stream_len < 2 {
        return Err(Error::InsufficientBytes(2 - stream_len));
    }

    let byte1 = *stream.next().expect("BUG: length checked above");
    let (len_len, remaining_len) = length(stream)?;

    Ok(FixedHeader {
        byte1,
        fixed_header_len: len_len + 1,
        remaining_len,
    })
}

/// Decodes the base-128 remaining length. Returns the number of length bytes
/// consumed along with the decoded length.
fn length(stream: Iter<'_, u8>) -> Result<(usize, usize), Error> {
    let mut len = 0;
    let mut len_len = 0;
    let mut done = false;
    let mut shift = 0;

    for &byte in stream {
        len_len += 1;
        len += ((byte as usize) & 0x7F) << shift;

        done = (byte & 0x80) == 0;
        if done {
            break;
        }

        shift += 7;
        // Four bytes encode values up to 268,435,455; a fifth continuation
        // byte is malformed [MQTT-2.2.3].
        if shift > 21 {
            return Err(Error::MalformedRemainingLength);
        }
    }

    if !done {
        return Err(Error::InsufficientBytes(1));
    }

    Ok((len_len, len))
}

/// Parses one packet from the front of `stream`, consuming exactly its frame.
///
/// `Error::InsufficientBytes` leaves the buffer untouched; any other error
/// means the connection cannot be trusted to stay in sync and should be torn
/// down.
pub fn read_mut(stream: &mut BytesMut, max_size: usize) -> Result<Packet, Error> {
    let fixed_header = check(stream.iter(), max_size)?;

    // The whole frame is buffered; split it off so the remainder of the
    // stream stays queued for the next call.
    let frame = stream.split_to(fixed_header.frame_length()).freeze();

    let packet = match fixed_header.packet_type()? {
        PacketType::Connect => {
            let (connect, last_will, login) = connect::read(fixed_header, frame)?;
            Packet::Connect(connect, last_will, login)
        }
        PacketType::ConnAck => Packet::ConnAck(connack::read(fixed_header, frame)?),
        PacketType::Publish => Packet::Publish(publish::read(fixed_header, frame)?),
        PacketType::PubAck => Packet::PubAck(puback::read(fixed_header, frame)?),
        PacketType::PubRec => Packet::PubRec(pubrec::read(fixed_header, frame)?),
        PacketType::PubRel => Packet::PubRel(pubrel::read(fixed_header, frame)?),
        PacketType::PubComp => Packet::PubComp(pubcomp::read(fixed_header, frame)?),
        PacketType::Subscribe => Packet::Subscribe(subscribe::read(fixed_header, frame)?),
        PacketType::SubAck => Packet::SubAck(suback::read(fixed_header, frame)?),
        PacketType::Unsubscribe => Packet::Unsubscribe(unsubscribe::read(fixed_header, frame)?),
        PacketType::UnsubAck => Packet::UnsubAck(unsuback::read(fixed_header, frame)?),
        PacketType::PingReq => Packet::PingReq(PingReq),
        PacketType::PingResp => Packet::PingResp(PingResp),
        PacketType::Disconnect => Packet::Disconnect(Disconnect),
    };

    Ok(packet)
}

/// Serializes `packet` onto the end of `buffer`, returning the frame length.
pub fn write(packet: &Packet, buffer: &mut BytesMut) -> Result<usize, Error> {
    match packet {
        Packet::Connect(connect, last_will, login) => {
            connect::write(connect, last_will, login, buffer)
        }
        Packet::ConnAck(connack) => connack::write(connack, buffer),
        Packet::Publish(publish) => publish::write(publish, buffer),
        Packet::PubAck(puback) => puback::write(puback, buffer),
        Packet::PubRec(pubrec) => pubrec::write(pubrec, buffer),
        Packet::PubRel(pubrel) => pubrel::write(pubrel, buffer),
        Packet::PubComp(pubcomp) => pubcomp::write(pubcomp, buffer),
        Packet::Subscribe(subscribe) => subscribe::write(subscribe, buffer),
        Packet::SubAck(suback) => suback::write(suback, buffer),
        Packet::Unsubscribe(unsubscribe) => unsubscribe::write(unsubscribe, buffer),
        Packet::UnsubAck(unsuback) => unsuback::write(unsuback, buffer),
        Packet::PingReq(_) => ping::write_req(buffer),
        Packet::PingResp(_) => ping::write_resp(buffer),
        Packet::Disconnect(_) => disconnect::write(buffer),
    }
}

/// Checks if a topic name is valid for a PUBLISH:
/// non-empty with no wildcard characters [MQTT-3.3.2-2].
pub fn valid_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains('+') && !topic.contains('#')
}

/// Checks if a topic filter is well-formed [MQTT-4.7.1]:
/// non-empty, every `#` stands alone as the final level, and every `+`
/// stands alone in its level.
pub fn valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let mut levels = filter.split('/').peekable();

    while let Some(level) = levels.next() {
        if level.contains('#') {
            return level == "#" && levels.peek().is_none();
        }

        if level.contains('+') && level != "+" {
            return false;
        }
    }

    true
}

pub(crate) fn read_u8(stream: &mut Bytes) -> Result<u8, Error> {
    if stream.is_empty() {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.get_u8())
}

pub(crate) fn read_u16(stream: &mut Bytes) -> Result<u16, Error> {
    if stream.len() < 2 {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.get_u16())
}

/// Reads a length-prefixed byte string [MQTT-1.5.3].
pub(crate) fn read_mqtt_bytes(stream: &mut Bytes) -> Result<Bytes, Error> {
    let len = read_u16(stream)? as usize;

    // The declared length may not reach past the end of the frame.
    if len > stream.len() {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.split_to(len))
}

pub(crate) fn read_mqtt_string(stream: &mut Bytes) -> Result<String, Error> {
    let bytes = read_mqtt_bytes(stream)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8)
}

pub(crate) fn write_mqtt_bytes(buffer: &mut BytesMut, bytes: &[u8]) {
    buffer.put_u16(bytes.len() as u16);
    buffer.extend_from_slice(bytes);
}

pub(crate) fn write_mqtt_string(buffer: &mut BytesMut, string: &str) {
    write_mqtt_bytes(buffer, string.as_bytes());
}

/// Encodes the remaining length, returning the number of bytes written.
pub(crate) fn write_remaining_length(buffer: &mut BytesMut, len: usize) -> Result<usize, Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::PayloadTooLong);
    }

    let mut len = len;
    let mut count = 0;

    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }

        buffer.put_u8(byte);
        count += 1;

        if len == 0 {
            return Ok(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::Connect(
                Connect {
                    protocol_level: PROTOCOL_LEVEL,
                    keep_alive: 60,
                    client_id: "sensor-1".into(),
                    clean_session: true,
                },
                Some(LastWill {
                    topic: Bytes::from("lwt/sensor-1"),
                    message: Bytes::from("gone"),
                    qos: QoS::AtLeastOnce,
                    retain: false,
                }),
                Some(Login {
                    username: "user".into(),
                    password: Some(Bytes::from("hunter2")),
                }),
            ),
            Packet::Connect(
                Connect {
                    protocol_level: PROTOCOL_LEVEL,
                    keep_alive: 0,
                    client_id: String::new(),
                    clean_session: true,
                },
                None,
                None,
            ),
            Packet::ConnAck(ConnAck {
                session_present: true,
                code: ConnectReturnCode::Accepted,
            }),
            Packet::ConnAck(ConnAck {
                session_present: false,
                code: ConnectReturnCode::NotAuthorized,
            }),
            Packet::Publish(Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                pkid: 0,
                retain: false,
                topic: Bytes::from("sensor/1/temp"),
                payload: Bytes::from("23"),
            }),
            Packet::Publish(Publish {
                dup: true,
                qos: QoS::ExactlyOnce,
                pkid: 42,
                retain: true,
                topic: Bytes::from("a/b"),
                payload: Bytes::from_static(&[0, 1, 2, 3]),
            }),
            Packet::PubAck(PubAck { pkid: 1 }),
            Packet::PubRec(PubRec { pkid: 2 }),
            Packet::PubRel(PubRel { pkid: 3 }),
            Packet::PubComp(PubComp { pkid: 4 }),
            Packet::Subscribe(Subscribe {
                pkid: 5,
                filters: vec![
                    SubscribeFilter {
                        path: "sport/+".into(),
                        qos: QoS::AtLeastOnce,
                    },
                    SubscribeFilter {
                        path: "#".into(),
                        qos: QoS::AtMostOnce,
                    },
                ],
            }),
            Packet::SubAck(SubAck {
                pkid: 5,
                return_codes: vec![
                    SubscribeReasonCode::Success(QoS::AtLeastOnce),
                    SubscribeReasonCode::Failure,
                ],
            }),
            Packet::Unsubscribe(Unsubscribe {
                pkid: 6,
                filters: vec!["sport/+".into()],
            }),
            Packet::UnsubAck(UnsubAck { pkid: 6 }),
            Packet::PingReq(PingReq),
            Packet::PingResp(PingResp),
            Packet::Disconnect(Disconnect),
        ]
    }

    #[test]
    fn round_trips_consume_exactly_one_frame() {
        for packet in sample_packets() {
            let mut buffer = BytesMut::new();
            let written = write(&packet, &mut buffer).unwrap();
            assert_eq!(written, buffer.len(), "wrong length for {packet:?}");

            // Bytes past the frame must be left in the buffer untouched.
            buffer.extend_from_slice(b"garbage");

            let parsed = read_mut(&mut buffer, usize::MAX)
                .unwrap_or_else(|e| panic!("failed to parse {packet:?}: {e}"));

            assert_eq!(parsed, packet);
            assert_eq!(&buffer[..], b"garbage", "wrong consumption for {packet:?}");
        }
    }

    #[test]
    fn truncated_packets_need_more_bytes() {
        for packet in sample_packets() {
            let mut buffer = BytesMut::new();
            write(&packet, &mut buffer).unwrap();
            let frame = buffer.freeze();

            for cut in 0..frame.len() {
                let mut partial = BytesMut::from(&frame[..cut]);
                match read_mut(&mut partial, usize::MAX) {
                    Err(Error::InsufficientBytes(_)) => {}
                    other => panic!("prefix of {cut} bytes of {packet:?} parsed as {other:?}"),
                }

                // A partial frame must not be consumed.
                assert_eq!(partial.len(), cut);
            }
        }
    }

    #[test]
    fn rejects_reserved_qos() {
        // A PUBLISH with the QoS bits set to the reserved value 3.
        let mut buffer = BytesMut::from(&[0x36, 0x05, 0x00, 0x03, b'a', b'/', b'b'][..]);
        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::InvalidQoS(3))
        ));
    }

    #[test]
    fn rejects_unknown_packet_type() {
        let mut buffer = BytesMut::from(&[0x00, 0x00][..]);
        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::InvalidPacketType(0))
        ));

        let mut buffer = BytesMut::from(&[0xF0, 0x00][..]);
        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::InvalidPacketType(15))
        ));
    }

    #[test]
    fn rejects_overlong_remaining_length() {
        // Five continuation bytes in the remaining length.
        let mut buffer = BytesMut::from(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);
        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::MalformedRemainingLength)
        ));
    }

    #[test]
    fn remaining_length_limits() {
        let mut buffer = BytesMut::new();
        let written = write_remaining_length(&mut buffer, MAX_REMAINING_LENGTH).unwrap();
        assert_eq!(written, 4);
        assert_eq!(&buffer[..], &[0xFF, 0xFF, 0xFF, 0x7F]);

        assert!(matches!(
            write_remaining_length(&mut buffer, MAX_REMAINING_LENGTH + 1),
            Err(Error::PayloadTooLong)
        ));
    }

    #[test]
    fn enforces_max_packet_size() {
        let mut buffer = BytesMut::new();
        write(
            &Packet::Publish(Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                pkid: 0,
                retain: false,
                topic: Bytes::from("a"),
                payload: Bytes::from(vec![0u8; 64]),
            }),
            &mut buffer,
        )
        .unwrap();

        assert!(matches!(
            read_mut(&mut buffer, 16),
            Err(Error::PayloadSizeLimitExceeded(67, 16))
        ));
    }

    #[test]
    fn topic_validation() {
        assert!(valid_topic("sensor/1/temp"));
        assert!(valid_topic("/"));
        assert!(!valid_topic(""));
        assert!(!valid_topic("sensor/+/temp"));
        assert!(!valid_topic("sensor/#"));
    }

    #[test]
    fn filter_validation() {
        assert!(valid_filter("sport/tennis/player1"));
        assert!(valid_filter("sport/+"));
        assert!(valid_filter("+"));
        assert!(valid_filter("#"));
        assert!(valid_filter("sport/#"));
        assert!(valid_filter("+/tennis/#"));

        assert!(!valid_filter(""));
        assert!(!valid_filter("sport/tennis#"));
        assert!(!valid_filter("sport/#/ranking"));
        assert!(!valid_filter("sport+"));
        assert!(!valid_filter("sp+ort/tennis"));
    }
}
