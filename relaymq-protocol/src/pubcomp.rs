use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_u16, write_remaining_length, Error, FixedHeader};

/// PUBCOMP: final acknowledgment of a QoS 2 exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubComp {
    pub pkid: u16,
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubComp, Error> {
    bytes.advance(fixed_header.fixed_header_len());

    let pkid = read_u16(&mut bytes)?;
    if pkid == 0 {
        return Err(Error::PacketIdZero);
    }

    Ok(PubComp { pkid })
}

pub(crate) fn write(pubcomp: &PubComp, buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_u8(0x70);
    let count = write_remaining_length(buffer, 2)?;
    buffer.put_u16(pubcomp.pkid);

    Ok(1 + count + 2)
}
