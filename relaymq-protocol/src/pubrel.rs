use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_u16, write_remaining_length, Error, FixedHeader};

/// PUBREL: releases a QoS 2 packet id on the receiver.
///
/// Retransmitted as-is after a reconnect; PUBREL has no DUP flag of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRel {
    pub pkid: u16,
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRel, Error> {
    // The low nibble is fixed at 0b0010 [MQTT-3.6.1-1].
    if fixed_header.byte1() & 0x0F != 0b0010 {
        return Err(Error::MalformedPacket);
    }

    bytes.advance(fixed_header.fixed_header_len());

    let pkid = read_u16(&mut bytes)?;
    if pkid == 0 {
        return Err(Error::PacketIdZero);
    }

    Ok(PubRel { pkid })
}

pub(crate) fn write(pubrel: &PubRel, buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_u8(0x62);
    let count = write_remaining_length(buffer, 2)?;
    buffer.put_u16(pubrel.pkid);

    Ok(1 + count + 2)
}
