use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_u16, write_remaining_length, Error, FixedHeader};

/// UNSUBACK: confirms an UNSUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAck {
    pub pkid: u16,
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<UnsubAck, Error> {
    bytes.advance(fixed_header.fixed_header_len());

    let pkid = read_u16(&mut bytes)?;
    if pkid == 0 {
        return Err(Error::PacketIdZero);
    }

    Ok(UnsubAck { pkid })
}

pub(crate) fn write(unsuback: &UnsubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_u8(0xB0);
    let count = write_remaining_length(buffer, 2)?;
    buffer.put_u16(unsuback.pkid);

    Ok(1 + count + 2)
}
