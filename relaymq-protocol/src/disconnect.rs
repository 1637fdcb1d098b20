use bytes::{BufMut, BytesMut};

use crate::Error;

/// DISCONNECT: graceful end of a session; the broker discards the will.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect;

pub(crate) fn write(buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_slice(&[0xE0, 0x00]);
    Ok(2)
}
