use std::borrow::Borrow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use rand::distributions::{Alphanumeric, Distribution};
use rand::Rng;

/// The maximum length a `ClientId` is allowed to be.
///
/// The specification allows implementations to reject client IDs longer than this.
pub const MAX_LEN: usize = 23;

/// A validated MQTT client identifier.
///
/// Cheap to clone; doubles as the key of the broker's client table.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientId(Arc<str>);

impl ClientId {
    /// Generate a random client ID of the given length.
    ///
    /// Used by the broker when a client connects with an empty client ID and
    /// the clean session flag set [MQTT-3.1.3-6].
    ///
    /// ### Panics
    /// If `length` is not in the range `1 ..= MAX_LEN`.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, length: usize) -> Self {
        assert!(
            (1..=MAX_LEN).contains(&length),
            "{length} not in the range `1 ..= {MAX_LEN}`"
        );

        let id: String = (0..length)
            .map(|_| Alphanumeric.sample(rng) as char)
            .collect();

        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ClientId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for ClientId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl Debug for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientId").field(&self.as_str()).finish()
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl PartialEq<str> for ClientId {
    fn eq(&self, other: &str) -> bool {
        self.as_str().eq(other)
    }
}

impl From<ClientId> for String {
    fn from(value: ClientId) -> Self {
        value.as_str().into()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("client ID cannot be empty")]
    Empty,
    #[error("expected a client ID length between 1 and 23, got {0}")]
    InvalidLength(usize),
    #[error("invalid byte {byte:02X} in client ID at position {position}")]
    InvalidByte { byte: u8, position: usize },
}

impl FromStr for ClientId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if s.len() > MAX_LEN {
            return Err(ParseError::InvalidLength(s.len()));
        }

        for (position, &byte) in s.as_bytes().iter().enumerate() {
            // http://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718031
            //
            // The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded bytes in length,
            // and that contain only the characters
            // "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ" [MQTT-3.1.3-5].
            //
            // The Server MAY allow ClientId's that contain characters not included in the list
            // given above; `-` and `_` are common in the wild (MQTT.js generates
            // `mqttjs_` + hex by default) so those are admitted too.
            if !matches!(
                byte,
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_',
            ) {
                return Err(ParseError::InvalidByte { byte, position });
            }
        }

        Ok(Self(s.into()))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use expect_test::expect;

    use super::ClientId;

    #[test]
    fn from_str() {
        expect![[r#"
            Err(
                Empty,
            )
        "#]]
        .assert_debug_eq(&ClientId::from_str(""));

        // All `Ok()` variants indirectly test `.as_str()` as well.
        expect![[r#"
            Ok(
                ClientId(
                    "0",
                ),
            )
        "#]]
        .assert_debug_eq(&ClientId::from_str("0"));

        expect![[r#"
            Ok(
                ClientId(
                    "mqttjs_684dbee5",
                ),
            )
        "#]]
        .assert_debug_eq(&ClientId::from_str("mqttjs_684dbee5"));

        expect![[r#"
            Err(
                InvalidByte {
                    byte: 42,
                    position: 1,
                },
            )
        "#]]
        .assert_debug_eq(&ClientId::from_str("2*4*6*8*11*14*17*20*23*"));

        expect![[r#"
            Err(
                InvalidLength(
                    35,
                ),
            )
        "#]]
        .assert_debug_eq(&ClientId::from_str("2*4*6*8*11*14*17*20*23*26*29*32*35*"));

        expect![[r#"
            Ok(
                ClientId(
                    "2-4-6-8-11-14-17-20-23-",
                ),
            )
        "#]]
        .assert_debug_eq(&ClientId::from_str("2-4-6-8-11-14-17-20-23-"));
    }

    #[test]
    fn generated_ids_are_valid() {
        let mut rng = rand::thread_rng();

        for length in [1, 16, super::MAX_LEN] {
            let id = ClientId::generate(&mut rng, length);
            assert_eq!(id.as_str().len(), length);
            assert!(ClientId::from_str(id.as_str()).is_ok());
        }
    }
}
