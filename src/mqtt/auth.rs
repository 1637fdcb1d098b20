use std::net::SocketAddr;

use relaymq_protocol::ConnectReturnCode;

use crate::config::Users;
use crate::password;

/// Host-supplied connection and subscription policy.
///
/// Consulted synchronously while a CONNECT or SUBSCRIBE is being processed;
/// implementations must not block.
pub trait Authenticator: Send + Sync + 'static {
    /// Decide the CONNACK return code for a connection attempt.
    ///
    /// Anything but [`ConnectReturnCode::Accepted`] is sent back to the
    /// client verbatim before the transport is closed.
    fn validate_connect(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
        peer_addr: SocketAddr,
    ) -> ConnectReturnCode;

    /// Decide whether `client_id` may subscribe to `filter`.
    ///
    /// A rejection fails that filter with `SubscribeReasonCode::Failure`;
    /// other filters in the same SUBSCRIBE proceed normally.
    fn validate_subscribe(
        &self,
        filter: &str,
        client_id: &str,
        username: Option<&str>,
    ) -> bool {
        let _ = (filter, client_id, username);
        true
    }
}

/// Authenticator backed by a fixed user table with argon2 password hashes,
/// as loaded from a `users.toml` file.
pub struct StaticUserAuthenticator {
    users: Users,
    allow_anonymous: bool,
}

impl StaticUserAuthenticator {
    pub fn new(users: Users, allow_anonymous: bool) -> Self {
        StaticUserAuthenticator {
            users,
            allow_anonymous,
        }
    }
}

impl Authenticator for StaticUserAuthenticator {
    fn validate_connect(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
        _peer_addr: SocketAddr,
    ) -> ConnectReturnCode {
        let Some(username) = username else {
            if self.allow_anonymous {
                return ConnectReturnCode::Accepted;
            }

            tracing::warn!(
                client_id,
                "client tried to login anonymously, but anonymous logins are not enabled"
            );
            return ConnectReturnCode::NotAuthorized;
        };

        let Some(user) = self.users.users.get(username) else {
            tracing::warn!(client_id, username, "unknown user");
            return ConnectReturnCode::BadUsernameOrPassword;
        };

        match password::verify(password.unwrap_or_default(), &user.password_hash) {
            Ok(true) => ConnectReturnCode::Accepted,
            Ok(false) => {
                tracing::warn!(client_id, username, "invalid password");
                ConnectReturnCode::BadUsernameOrPassword
            }
            Err(e) => {
                tracing::error!(username, "error verifying password: {e:?}");
                ConnectReturnCode::ServerUnavailable
            }
        }
    }
}
