use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Default Rust game server query port.
pub const DEFAULT_PORT: u16 = 28015;

/// A `host:port` pair identifying a server to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Builds an endpoint from an already validated host and port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the host is empty or the port is zero.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, Error> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(invalid(&host, "host is empty"));
        }
        if port == 0 {
            return Err(invalid(&format!("{host}:{port}"), "port must be 1-65535"));
        }
        Ok(Self { host, port })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// File name used for the append-only poll log of this endpoint.
    #[must_use]
    pub fn log_file_name(&self) -> String {
        format!("{}_{}_ping.log", self.host.replace('.', "_"), self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parses `host[:port]`, splitting on the first colon.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        match input.split_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .trim()
                    .parse()
                    .map_err(|_| invalid(input, "port must be a number between 1 and 65535"))?;
                Self::new(host, port).map_err(|_| invalid(input, "expected host[:port]"))
            }
            None => Self::new(input, DEFAULT_PORT),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidEndpoint {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
