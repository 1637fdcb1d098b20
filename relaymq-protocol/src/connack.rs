use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{read_u8, write_remaining_length, Error, FixedHeader};

/// CONNACK: the broker's answer to a CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// Set when the broker resumed a stored session for this client id
    /// [MQTT-3.2.2-2].
    pub session_present: bool,
    pub code: ConnectReturnCode,
}

/// CONNACK return codes [MQTT-3.2.2-4].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

fn return_code(num: u8) -> Result<ConnectReturnCode, Error> {
    match num {
        0 => Ok(ConnectReturnCode::Accepted),
        1 => Ok(ConnectReturnCode::UnacceptableProtocolVersion),
        2 => Ok(ConnectReturnCode::IdentifierRejected),
        3 => Ok(ConnectReturnCode::ServerUnavailable),
        4 => Ok(ConnectReturnCode::BadUsernameOrPassword),
        5 => Ok(ConnectReturnCode::NotAuthorized),
        num => Err(Error::InvalidConnectReturnCode(num)),
    }
}

pub(crate) fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<ConnAck, Error> {
    bytes.advance(fixed_header.fixed_header_len());

    let flags = read_u8(&mut bytes)?;

    // Bits 7-1 of the acknowledge flags are reserved [MQTT-3.2.2-1].
    if flags & !0x01 != 0 {
        return Err(Error::MalformedPacket);
    }

    let code = return_code(read_u8(&mut bytes)?)?;

    Ok(ConnAck {
        session_present: flags & 0x01 != 0,
        code,
    })
}

pub(crate) fn write(connack: &ConnAck, buffer: &mut BytesMut) -> Result<usize, Error> {
    buffer.put_u8(0x20);
    let count = write_remaining_length(buffer, 2)?;
    buffer.put_u8(connack.session_present as u8);
    buffer.put_u8(connack.code as u8);

    Ok(1 + count + 2)
}
