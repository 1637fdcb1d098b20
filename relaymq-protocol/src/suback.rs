use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_u16, read_u8, write_remaining_length, Error, FixedHeader, QoS};

/// SUBACK: grants (or refuses) each filter of a SUBSCRIBE, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub pkid: u16,
    pub return_codes: Vec<SubscribeReasonCode>,
}

/// Per-filter SUBACK return code [MQTT-3.9.3].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReasonCode {
    /// The subscription was accepted at the granted QoS.
    Success(QoS),
    Failure,
}

fn reason(code: u8) -> Result<SubscribeReasonCode, Error> {
    let code = match code {
        0 => SubscribeReasonCode::Success(QoS::AtMostOnce),
        1 => SubscribeReasonCode::Success(QoS::AtLeastOnce),
        2 => SubscribeReasonCode::Success(QoS::ExactlyOnce),
        0x80 => SubscribeReasonCode::Failure,
        // Return codes other than 0x00, 0x01, 0x02 and 0x80 are reserved
        // [MQTT-3.9.3-2].
        code => return Err(Error::InvalidSubscribeReturnCode(code)),
    };

    Ok(code)
}

fn code(reason: SubscribeReasonCode) -> u8 {
    match reason {
        SubscribeReasonCode::Success(qos) => qos as u8,
        SubscribeReasonCode::Failure => 0x80,
    }
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<SubAck, Error> {
    bytes.advance(fixed_header.fixed_header_len());

    let pkid = read_u16(&mut bytes)?;
    if pkid == 0 {
        return Err(Error::PacketIdZero);
    }

    if !bytes.has_remaining() {
        return Err(Error::MalformedPacket);
    }

    let mut return_codes = Vec::new();
    while bytes.has_remaining() {
        return_codes.push(reason(read_u8(&mut bytes)?)?);
    }

    Ok(SubAck { pkid, return_codes })
}

fn len(suback: &SubAck) -> usize {
    2 + suback.return_codes.len()
}

pub(crate) fn write(suback: &SubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
    let len = len(suback);

    buffer.put_u8(0x90);
    let count = write_remaining_length(buffer, len)?;
    buffer.put_u16(suback.pkid);

    for &return_code in &suback.return_codes {
        buffer.put_u8(code(return_code));
    }

    Ok(1 + count + len)
}
