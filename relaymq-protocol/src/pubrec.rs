use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_u16, write_remaining_length, Error, FixedHeader};

/// PUBREC: first acknowledgment of a QoS 2 PUBLISH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRec {
    pub pkid: u16,
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRec, Error> {
    bytes.advance(fixed_header.fixed_header_len());

    let pkid = read_u16(&mut bytes)?;
    if pkid == 0 {
        return Err(Error::PacketIdZero);
    }

    Ok(PubRec { pkid })
}

pub(crate) fn write(pubrec: &PubRec, buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_u8(0x50);
    let count = write_remaining_length(buffer, 2)?;
    buffer.put_u16(pubrec.pkid);

    Ok(1 + count + 2)
}
