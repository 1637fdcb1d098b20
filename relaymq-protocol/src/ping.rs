use bytes::{BufMut, BytesMut};

use crate::Error;

/// PINGREQ: keep-alive probe from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReq;

/// PINGRESP: the broker's answer to a PINGREQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResp;

pub(crate) fn write_req(buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_slice(&[0xC0, 0x00]);
    Ok(2)
}

pub(crate) fn write_resp(buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_slice(&[0xD0, 0x00]);
    Ok(2)
}
