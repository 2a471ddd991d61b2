//! Minimal A2S_INFO client.
//!
//! Sends the fixed `TSource Engine Query` datagram, waits for a single reply
//! and extracts the server name. Every transport failure (timeout, DNS
//! failure, ICMP refusal, malformed reply) is reported as a DOWN result; this
//! module never returns an error to its caller.

use chrono::{DateTime, Utc};
use log::debug;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time;

use crate::endpoint::Endpoint;

/// `FF FF FF FF` + `"TSource Engine Query"` + NUL.
pub const A2S_INFO_REQUEST: [u8; 25] = *b"\xFF\xFF\xFF\xFFTSource Engine Query\0";

/// Byte offset of the NUL-terminated server name in a reply.
pub const NAME_OFFSET: usize = 6;

/// Default time to wait for a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const RECV_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Up,
    Down,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => f.write_str("UP"),
            Status::Down => f.write_str("DOWN"),
        }
    }
}

/// Outcome of a single query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub alive: bool,
    pub server_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl QueryResult {
    #[must_use]
    pub fn up(server_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            alive: true,
            server_name: Some(server_name.into()),
            timestamp,
        }
    }

    #[must_use]
    pub fn down(timestamp: DateTime<Utc>) -> Self {
        Self {
            alive: false,
            server_name: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        if self.alive { Status::Up } else { Status::Down }
    }
}

/// Queries `endpoint` once and classifies the outcome.
///
/// Returns within `timeout` (plus scheduling slack) whatever the remote does.
/// The socket lives only for the duration of the call.
pub async fn query(endpoint: &Endpoint, timeout: Duration) -> QueryResult {
    let timestamp = Utc::now();

    let reply = match time::timeout(timeout, exchange(endpoint)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            debug!("{endpoint}: query failed: {e}");
            return QueryResult::down(timestamp);
        }
        Err(_) => {
            debug!("{endpoint}: no reply within {}ms", timeout.as_millis());
            return QueryResult::down(timestamp);
        }
    };

    match parse_server_name(&reply) {
        Some(name) => QueryResult::up(name, timestamp),
        None => {
            debug!("{endpoint}: malformed reply of {} bytes", reply.len());
            QueryResult::down(timestamp)
        }
    }
}

/// Extracts the server name from a raw reply.
///
/// The name starts at [`NAME_OFFSET`] and runs to the first NUL (or the end
/// of the datagram). Invalid UTF-8 is replaced rather than rejected.
/// Returns `None` if the reply is too short to contain the name field.
#[must_use]
pub fn parse_server_name(reply: &[u8]) -> Option<String> {
    let field = reply.get(NAME_OFFSET..)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    Some(String::from_utf8_lossy(&field[..end]).into_owned())
}

async fn exchange(endpoint: &Endpoint) -> io::Result<Vec<u8>> {
    let target = lookup_host((endpoint.host(), endpoint.port()))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host did not resolve"))?;

    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local).await?;
    socket.send_to(&A2S_INFO_REQUEST, target).await?;

    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let (len, _) = socket.recv_from(&mut buf).await?;
    buf.truncate(len);
    Ok(buf)
}
