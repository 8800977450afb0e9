//! Connection and identity settings.

use std::fmt;

use crate::ClientError;

/// Port used when the target has none.
pub const DEFAULT_PORT: u16 = 6667;

/// Display name used when none is given.
pub const DEFAULT_REALNAME: &str = "realname";

/// Server address plus the credentials sent in the login burst.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Account name, used as both nick and user
    pub username: String,
    /// Connection password, sent with `PASS`. Empty means none.
    pub password: String,
    /// Display name sent with `USER`
    pub realname: String,
}

impl Config {
    /// Build a config from a `HOST[:PORT]` target.
    ///
    /// The target is split on its last `:`, so `irc.example.net:6697` and
    /// `irc.example.net` both work.
    ///
    /// # Errors
    ///
    /// - `ClientError::Config` if the host is empty or the port is not a
    ///   number in `1..=65535`
    pub fn from_target(
        target: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        realname: Option<String>,
    ) -> Result<Self, ClientError> {
        let (host, port) = match target.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| ClientError::Config(format!("invalid port {port:?}")))?;
                (host, port)
            },
            None => (target, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(ClientError::Config(format!("missing host in {target:?}")));
        }

        let username = username.into();
        if username.is_empty() || username.contains([' ', ':']) {
            return Err(ClientError::Config(format!("invalid username {username:?}")));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            username,
            password: password.into(),
            realname: realname.unwrap_or_else(|| DEFAULT_REALNAME.to_owned()),
        })
    }

    /// `host:port` for display and connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("realname", &self.realname)
            .finish()
    }
}
