use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{qos, read_mqtt_bytes, read_u16, write_remaining_length, Error, FixedHeader, QoS};

/// PUBLISH: an application message flowing in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Set when this packet is a retransmission after a reconnect
    /// [MQTT-3.3.1-1].
    pub dup: bool,
    pub qos: QoS,
    /// Zero for QoS 0; QoS 0 publishes carry no packet id on the wire
    /// [MQTT-2.3.1-5].
    pub pkid: u16,
    pub retain: bool,
    pub topic: Bytes,
    pub payload: Bytes,
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Publish, Error> {
    let byte1 = fixed_header.byte1();
    let dup = byte1 & 0b1000 != 0;
    let qos = qos((byte1 & 0b0110) >> 1)?;
    let retain = byte1 & 0b0001 != 0;

    bytes.advance(fixed_header.fixed_header_len());

    let topic = read_mqtt_bytes(&mut bytes)?;

    let pkid = match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce | QoS::ExactlyOnce => {
            let pkid = read_u16(&mut bytes)?;
            if pkid == 0 {
                return Err(Error::PacketIdZero);
            }

            pkid
        }
    };

    // Whatever is left of the frame is the payload.
    Ok(Publish {
        dup,
        qos,
        pkid,
        retain,
        topic,
        payload: bytes,
    })
}

fn len(publish: &Publish) -> usize {
    let mut len = 2 + publish.topic.len();
    if publish.qos != QoS::AtMostOnce {
        len += 2;
    }

    len + publish.payload.len()
}

pub(crate) fn write(publish: &Publish, buffer: &mut BytesMut) -> Result<usize, Error> {
    let len = len(publish);

    let byte1 = 0x30
        | ((publish.dup as u8) << 3)
        | ((publish.qos as u8) << 1)
        | publish.retain as u8;

    buffer.put_u8(byte1);
    let count = write_remaining_length(buffer, len)?;

    buffer.put_u16(publish.topic.len() as u16);
    buffer.extend_from_slice(&publish.topic);

    if publish.qos != QoS::AtMostOnce {
        if publish.pkid == 0 {
            return Err(Error::PacketIdZero);
        }

        buffer.put_u16(publish.pkid);
    }

    buffer.extend_from_slice(&publish.payload);

    Ok(1 + count + len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read_mut, Packet};

    #[test]
    fn qos0_carries_no_packet_id() {
        let mut buffer = BytesMut::new();
        write(
            &Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                pkid: 0,
                retain: false,
                topic: Bytes::from("t"),
                payload: Bytes::from("p"),
            },
            &mut buffer,
        )
        .unwrap();

        // byte1, remaining len, topic length prefix, topic, payload.
        assert_eq!(&buffer[..], &[0x30, 0x04, 0x00, 0x01, b't', b'p']);
    }

    #[test]
    fn qos1_packet_id_zero_is_malformed() {
        let mut buffer = BytesMut::from(&[0x32, 0x05, 0x00, 0x01, b't', 0x00, 0x00][..]);
        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::PacketIdZero)
        ));
    }

    #[test]
    fn empty_payload_round_trips() {
        let publish = Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            pkid: 9,
            retain: true,
            topic: Bytes::from("status/sensor1"),
            payload: Bytes::new(),
        };

        let mut buffer = BytesMut::new();
        write(&publish, &mut buffer).unwrap();

        assert_eq!(
            read_mut(&mut buffer, usize::MAX).unwrap(),
            Packet::Publish(publish)
        );
    }
}
