use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_u16, write_remaining_length, Error, FixedHeader};

/// PUBACK: acknowledges a QoS 1 PUBLISH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub pkid: u16,
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubAck, Error> {
    bytes.advance(fixed_header.fixed_header_len());

    let pkid = read_u16(&mut bytes)?;
    if pkid == 0 {
        return Err(Error::PacketIdZero);
    }

    Ok(PubAck { pkid })
}

pub(crate) fn write(puback: &PubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_u8(0x40);
    let count = write_remaining_length(buffer, 2)?;
    buffer.put_u16(puback.pkid);

    Ok(1 + count + 2)
}
