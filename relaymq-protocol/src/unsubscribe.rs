use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_mqtt_string, read_u16, write_mqtt_string, write_remaining_length, Error, FixedHeader};

/// UNSUBSCRIBE: removes one or more topic-filter subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub pkid: u16,
    pub filters: Vec<String>,
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Unsubscribe, Error> {
    // The low nibble is fixed at 0b0010 [MQTT-3.10.1-1].
    if fixed_header.byte1() & 0x0F != 0b0010 {
        return Err(Error::MalformedPacket);
    }

    bytes.advance(fixed_header.fixed_header_len());

    let pkid = read_u16(&mut bytes)?;
    if pkid == 0 {
        return Err(Error::PacketIdZero);
    }

    let mut filters = Vec::new();
    while bytes.has_remaining() {
        filters.push(read_mqtt_string(&mut bytes)?);
    }

    // The payload must contain at least one filter [MQTT-3.10.3-2].
    if filters.is_empty() {
        return Err(Error::MalformedPacket);
    }

    Ok(Unsubscribe { pkid, filters })
}

fn len(unsubscribe: &Unsubscribe) -> usize {
    2 + unsubscribe
        .filters
        .iter()
        .map(|filter| 2 + filter.len())
        .sum::<usize>()
}

pub(crate) fn write(unsubscribe: &Unsubscribe, buffer: &mut BytesMut) -> Result<usize, Error> {
    let len = len(unsubscribe);

    buffer.put_u8(0xA2);
    let count = write_remaining_length(buffer, len)?;
    buffer.put_u16(unsubscribe.pkid);

    for filter in &unsubscribe.filters {
        write_mqtt_string(buffer, filter);
    }

    Ok(1 + count + len)
}
