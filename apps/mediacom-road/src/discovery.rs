//! LAN scan for running brokers.
//!
//! Every host `<prefix>.1` .. `<prefix>.254` is asked for `/status`. At most
//! `concurrency` probes are in flight, each bounded by `probe_timeout`.
//! When a stop condition is set the scan ends at the first match and the
//! probes still in flight are dropped.

use futures::stream::{self, StreamExt};
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::DEFAULT_PORT;
use crate::handlers::StatusResponse;
use crate::signaling::RoomSummary;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid subnet prefix {0:?}, expected three octets like 192.168.0")]
    InvalidPrefix(String),
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A broker that answered the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub host: Ipv4Addr,
    pub port: u16,
    pub rooms: Vec<RoomSummary>,
}

impl DiscoveredServer {
    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.iter().any(|room| room.id == room_id)
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub port: u16,
    pub concurrency: usize,
    pub probe_timeout: Duration,
    /// Stop at the first server that answers
    pub first_only: bool,
    /// Stop at the first server hosting this room
    pub room: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            concurrency: 32,
            probe_timeout: Duration::from_millis(1500),
            first_only: false,
            room: None,
        }
    }
}

impl ScanOptions {
    fn stops_at(&self, server: &DiscoveredServer) -> bool {
        match &self.room {
            Some(room) => server.has_room(room),
            None => self.first_only,
        }
    }
}

/// Parse `a.b.c` into the /24 base used for the scan
pub fn parse_prefix(prefix: &str) -> Result<[u8; 3], DiscoveryError> {
    let octets: Vec<u8> = prefix
        .trim()
        .trim_end_matches('.')
        .split('.')
        .map(|part| part.parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| DiscoveryError::InvalidPrefix(prefix.to_string()))?;

    match octets.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(DiscoveryError::InvalidPrefix(prefix.to_string())),
    }
}

/// Candidate hosts of a /24, skipping network and broadcast addresses
pub fn subnet_hosts(base: [u8; 3]) -> impl Iterator<Item = Ipv4Addr> {
    (1..=254u8).map(move |last| Ipv4Addr::new(base[0], base[1], base[2], last))
}

/// Scan a /24 subnet, returning servers sorted by address
pub async fn scan_subnet(
    prefix: &str,
    options: &ScanOptions,
) -> Result<Vec<DiscoveredServer>, DiscoveryError> {
    let base = parse_prefix(prefix)?;
    scan_hosts(subnet_hosts(base), options).await
}

/// Probe an explicit host list with the same limits as [`scan_subnet`]
pub async fn scan_hosts(
    hosts: impl IntoIterator<Item = Ipv4Addr>,
    options: &ScanOptions,
) -> Result<Vec<DiscoveredServer>, DiscoveryError> {
    if options.concurrency == 0 {
        return Err(DiscoveryError::ZeroConcurrency);
    }

    let client = reqwest::Client::builder()
        .timeout(options.probe_timeout)
        .build()?;

    let mut probes = stream::iter(hosts)
        .map(|host| probe(&client, host, options.port))
        .buffer_unordered(options.concurrency);

    let mut found = Vec::new();
    while let Some(result) = probes.next().await {
        let Some(server) = result else {
            continue;
        };
        let stop = options.stops_at(&server);
        found.push(server);
        if stop {
            debug!("stop condition met, cancelling remaining probes");
            break;
        }
    }

    found.sort_by_key(|server| server.host);
    Ok(found)
}

async fn probe(client: &reqwest::Client, host: Ipv4Addr, port: u16) -> Option<DiscoveredServer> {
    let url = format!("http://{}:{}/status", host, port);
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            trace!(%host, "probe failed: {}", e);
            return None;
        }
    };

    let status: StatusResponse = response.json().await.ok()?;
    if status.status != "ok" {
        return None;
    }

    debug!(%host, rooms = status.rooms.len(), "found server");
    Some(DiscoveredServer {
        host,
        port,
        rooms: status.rooms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn prefix_parsing() {
        assert_eq!(parse_prefix("192.168.0").unwrap(), [192, 168, 0]);
        assert_eq!(parse_prefix("10.0.7.").unwrap(), [10, 0, 7]);
        assert!(parse_prefix("192.168").is_err());
        assert!(parse_prefix("192.168.0.1").is_err());
        assert!(parse_prefix("192.168.300").is_err());
        assert!(parse_prefix("").is_err());
    }

    #[test_timeout::timeout]
    fn subnet_covers_usable_hosts() {
        let hosts: Vec<Ipv4Addr> = subnet_hosts([192, 168, 1]).collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(192, 168, 1, 254));
    }

    #[test_timeout::timeout]
    fn stop_conditions() {
        let server = DiscoveredServer {
            host: Ipv4Addr::LOCALHOST,
            port: DEFAULT_PORT,
            rooms: vec![RoomSummary {
                id: "stage".into(),
                name: "stage".into(),
                user_count: 2,
            }],
        };

        assert!(!ScanOptions::default().stops_at(&server));
        let first = ScanOptions {
            first_only: true,
            ..ScanOptions::default()
        };
        assert!(first.stops_at(&server));
        let wanted = ScanOptions {
            room: Some("stage".into()),
            ..ScanOptions::default()
        };
        assert!(wanted.stops_at(&server));
        let missing = ScanOptions {
            room: Some("foyer".into()),
            first_only: true,
            ..ScanOptions::default()
        };
        assert!(!missing.stops_at(&server));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn zero_concurrency_is_rejected() {
        let options = ScanOptions {
            concurrency: 0,
            ..ScanOptions::default()
        };
        assert!(matches!(
            scan_hosts(Vec::new(), &options).await,
            Err(DiscoveryError::ZeroConcurrency)
        ));
    }
}
