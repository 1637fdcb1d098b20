use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    qos, read_mqtt_bytes, read_mqtt_string, read_u16, read_u8, write_mqtt_bytes,
    write_mqtt_string, write_remaining_length, Error, FixedHeader, QoS,
};

/// CONNECT: the first packet a client sends on a new network connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// The protocol level byte; 4 for MQTT 3.1.1.
    ///
    /// Parsing surfaces the level instead of rejecting it so the session
    /// layer can answer an unsupported level with the proper CONNACK
    /// return code [MQTT-3.1.2-2].
    pub protocol_level: u8,
    /// Keep Alive interval in seconds. Zero disables the keep alive.
    pub keep_alive: u16,
    pub client_id: String,
    pub clean_session: bool,
}

/// The will message the broker publishes on the client's behalf if the
/// connection is lost without a DISCONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: Bytes,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub username: String,
    /// The password is binary data, not a string [MQTT-3.1.3.6].
    pub password: Option<Bytes>,
}

pub(crate) fn read(
    fixed_header: FixedHeader,
    mut bytes: Bytes,
) -> Result<(Connect, Option<LastWill>, Option<Login>), Error> {
    bytes.advance(fixed_header.fixed_header_len());

    let protocol_name = read_mqtt_string(&mut bytes)?;
    if protocol_name != "MQTT" {
        return Err(Error::InvalidProtocol);
    }

    let protocol_level = read_u8(&mut bytes)?;
    let connect_flags = read_u8(&mut bytes)?;

    // The low bit of the connect flags is reserved and must be zero
    // [MQTT-3.1.2-3].
    if connect_flags & 0x01 != 0 {
        return Err(Error::MalformedPacket);
    }

    let clean_session = connect_flags & 0x02 != 0;
    let keep_alive = read_u16(&mut bytes)?;
    let client_id = read_mqtt_string(&mut bytes)?;

    let last_will = read_last_will(connect_flags, &mut bytes)?;
    let login = read_login(connect_flags, &mut bytes)?;

    Ok((
        Connect {
            protocol_level,
            keep_alive,
            client_id,
            clean_session,
        },
        last_will,
        login,
    ))
}

fn read_last_will(connect_flags: u8, bytes: &mut Bytes) -> Result<Option<LastWill>, Error> {
    if connect_flags & 0x04 == 0 {
        // Will QoS and Will Retain must be zero when the Will flag is unset
        // [MQTT-3.1.2-11, MQTT-3.1.2-13, MQTT-3.1.2-15].
        if connect_flags & 0x38 != 0 {
            return Err(Error::MalformedPacket);
        }

        return Ok(None);
    }

    // The Will QoS spans two flag bits; the value 3 is reserved.
    let will_qos = qos((connect_flags & 0x18) >> 3)?;
    let retain = connect_flags & 0x20 != 0;

    let topic = read_mqtt_bytes(bytes)?;
    let message = read_mqtt_bytes(bytes)?;

    Ok(Some(LastWill {
        topic,
        message,
        qos: will_qos,
        retain,
    }))
}

fn read_login(connect_flags: u8, bytes: &mut Bytes) -> Result<Option<Login>, Error> {
    let has_username = connect_flags & 0x80 != 0;
    let has_password = connect_flags & 0x40 != 0;

    if !has_username {
        // A password may not be present without a username [MQTT-3.1.2-22].
        if has_password {
            return Err(Error::MalformedPacket);
        }

        return Ok(None);
    }

    let username = read_mqtt_string(bytes)?;
    let password = has_password.then(|| read_mqtt_bytes(bytes)).transpose()?;

    Ok(Some(Login { username, password }))
}

fn len(connect: &Connect, last_will: &Option<LastWill>, login: &Option<Login>) -> usize {
    let mut len = 2 + "MQTT".len() // protocol name
        + 1  // protocol level
        + 1  // connect flags
        + 2; // keep alive

    len += 2 + connect.client_id.len();

    if let Some(will) = last_will {
        len += 2 + will.topic.len() + 2 + will.message.len();
    }

    if let Some(login) = login {
        len += 2 + login.username.len();
        if let Some(password) = &login.password {
            len += 2 + password.len();
        }
    }

    len
}

pub(crate) fn write(
    connect: &Connect,
    last_will: &Option<LastWill>,
    login: &Option<Login>,
    buffer: &mut BytesMut,
) -> Result<usize, Error> {
    let len = len(connect, last_will, login);

    buffer.put_u8(0x10);
    let count = write_remaining_length(buffer, len)?;

    write_mqtt_string(buffer, "MQTT");
    buffer.put_u8(connect.protocol_level);

    let mut connect_flags = 0;
    if connect.clean_session {
        connect_flags |= 0x02;
    }

    if let Some(will) = last_will {
        connect_flags |= 0x04 | ((will.qos as u8) << 3);
        if will.retain {
            connect_flags |= 0x20;
        }
    }

    if let Some(login) = login {
        connect_flags |= 0x80;
        if login.password.is_some() {
            connect_flags |= 0x40;
        }
    }

    buffer.put_u8(connect_flags);
    buffer.put_u16(connect.keep_alive);
    write_mqtt_string(buffer, &connect.client_id);

    if let Some(will) = last_will {
        write_mqtt_bytes(buffer, &will.topic);
        write_mqtt_bytes(buffer, &will.message);
    }

    if let Some(login) = login {
        write_mqtt_string(buffer, &login.username);
        if let Some(password) = &login.password {
            write_mqtt_bytes(buffer, password);
        }
    }

    Ok(1 + count + len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read_mut, Packet};

    #[test]
    fn rejects_reserved_flag_bit() {
        let mut buffer = BytesMut::new();
        write(
            &Connect {
                protocol_level: 4,
                keep_alive: 10,
                client_id: "c1".into(),
                clean_session: true,
            },
            &None,
            &None,
            &mut buffer,
        )
        .unwrap();

        // Flip the reserved bit in the connect flags.
        buffer[9] |= 0x01;

        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::MalformedPacket)
        ));
    }

    #[test]
    fn rejects_password_without_username() {
        let mut buffer = BytesMut::new();
        write(
            &Connect {
                protocol_level: 4,
                keep_alive: 10,
                client_id: "c1".into(),
                clean_session: true,
            },
            &None,
            &None,
            &mut buffer,
        )
        .unwrap();

        buffer[9] |= 0x40;

        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::MalformedPacket)
        ));
    }

    #[test]
    fn surfaces_unknown_protocol_level() {
        let mut buffer = BytesMut::new();
        write(
            &Connect {
                protocol_level: 3,
                keep_alive: 10,
                client_id: "c1".into(),
                clean_session: false,
            },
            &None,
            &None,
            &mut buffer,
        )
        .unwrap();

        let Ok(Packet::Connect(connect, None, None)) = read_mut(&mut buffer, usize::MAX) else {
            panic!("expected a CONNECT");
        };

        assert_eq!(connect.protocol_level, 3);
    }

    #[test]
    fn reserved_will_qos_is_malformed() {
        let mut buffer = BytesMut::new();
        write(
            &Connect {
                protocol_level: 4,
                keep_alive: 10,
                client_id: "c1".into(),
                clean_session: true,
            },
            &Some(LastWill {
                topic: Bytes::from("lwt"),
                message: Bytes::from("x"),
                qos: QoS::AtMostOnce,
                retain: false,
            }),
            &None,
            &mut buffer,
        )
        .unwrap();

        // Set both Will QoS bits.
        buffer[9] |= 0x18;

        assert!(matches!(
            read_mut(&mut buffer, usize::MAX),
            Err(Error::InvalidQoS(3))
        ));
    }
}
