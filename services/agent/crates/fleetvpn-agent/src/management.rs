//! Client for the OpenVPN management interface (`management <ip> <port>`).
//!
//! Each call opens its own connection, issues one command and reads the
//! reply up to its terminator. Lines starting with `>` are real-time
//! notifications and are skipped.

use std::net::SocketAddr;
use std::time::Duration;

use fleetvpn_common::{ClientName, Connection};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Column names used by OpenVPN 2.4+ when no `HEADER` line precedes the rows.
const DEFAULT_CLIENT_COLUMNS: [&str; 7] = [
    "Common Name",
    "Real Address",
    "Virtual Address",
    "Virtual IPv6 Address",
    "Bytes Received",
    "Bytes Sent",
    "Connected Since",
];

#[derive(Debug, Error)]
pub enum ManagementError {
    #[error("management interface at {addr} unreachable: {source}")]
    Unreachable {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("management interface I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("management interface did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("management interface closed the connection early")]
    Closed,

    #[error("management interface rejected the command: {0}")]
    Rejected(String),
}

/// Result of `kill <cn>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    Killed(String),
    NotConnected,
}

pub struct ManagementClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl ManagementClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Current sessions from `status 2`.
    pub async fn status(&self) -> Result<Vec<Connection>, ManagementError> {
        let reply = self
            .exchange("status 2", |line| line == "END")
            .await?;
        Ok(parse_status(&reply))
    }

    /// Terminate every session of `name`.
    pub async fn kill(&self, name: &ClientName) -> Result<KillOutcome, ManagementError> {
        let reply = self
            .exchange(&format!("kill {name}"), |line| {
                line.starts_with("SUCCESS:") || line.starts_with("ERROR:")
            })
            .await?;
        let last = reply.lines().last().unwrap_or_default();
        if let Some(msg) = last.strip_prefix("SUCCESS:") {
            Ok(KillOutcome::Killed(msg.trim().to_string()))
        } else if last.contains("not found") {
            Ok(KillOutcome::NotConnected)
        } else {
            Err(ManagementError::Rejected(last.to_string()))
        }
    }

    async fn exchange<F>(&self, command: &str, is_last: F) -> Result<String, ManagementError>
    where
        F: Fn(&str) -> bool,
    {
        tokio::time::timeout(self.timeout, self.exchange_inner(command, is_last))
            .await
            .map_err(|_| ManagementError::Timeout(self.timeout))?
    }

    async fn exchange_inner<F>(&self, command: &str, is_last: F) -> Result<String, ManagementError>
    where
        F: Fn(&str) -> bool,
    {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|source| ManagementError::Unreachable {
                addr: self.addr,
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        tracing::debug!(addr = %self.addr, command, "management command");
        write_half.write_all(format!("{command}\n").as_bytes()).await?;

        let mut reply = String::new();
        loop {
            let Some(line) = lines.next_line().await? else {
                return Err(ManagementError::Closed);
            };
            let line = line.trim_end_matches('\r');
            if line.starts_with('>') {
                continue;
            }
            reply.push_str(line);
            reply.push('\n');
            if is_last(line) {
                break;
            }
        }
        let _ = write_half.write_all(b"quit\n").await;
        Ok(reply)
    }
}

/// Parse `CLIENT_LIST` rows of a `status 2` dump.
pub fn parse_status(text: &str) -> Vec<Connection> {
    let mut columns: Vec<String> = DEFAULT_CLIENT_COLUMNS.iter().map(ToString::to_string).collect();
    let mut connections = Vec::new();

    for line in text.lines().map(str::trim) {
        let fields: Vec<&str> = line.split(',').collect();
        match fields.as_slice() {
            ["HEADER", "CLIENT_LIST", rest @ ..] => {
                columns = rest.iter().map(ToString::to_string).collect();
            }
            ["CLIENT_LIST", rest @ ..] => {
                let column = |name: &str| -> &str {
                    columns
                        .iter()
                        .position(|c| c == name)
                        .and_then(|i| rest.get(i))
                        .copied()
                        .unwrap_or_default()
                };
                connections.push(Connection {
                    common_name: column("Common Name").to_string(),
                    real_address: column("Real Address").to_string(),
                    virtual_address: column("Virtual Address").to_string(),
                    bytes_received: column("Bytes Received").parse().unwrap_or(0),
                    bytes_sent: column("Bytes Sent").parse().unwrap_or(0),
                    connected_since: column("Connected Since").to_string(),
                });
            }
            _ => {}
        }
    }
    connections
}
