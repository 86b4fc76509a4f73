use crate::rules::ScoringRules;
use photon_shared::{DEFAULT_DEST_HOST, RECEIVE_PORT, SEND_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Everything an engine needs to run a match
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Local address the hit listener binds to.
    pub bind_addr: SocketAddr,
    /// Where acknowledgements, codes and broadcasts are sent.
    pub destination: SocketAddr,
    /// Match length in seconds.
    pub duration: u32,
    /// Delay between `start` and the start code going out.
    pub start_grace: Duration,
    /// Time given to the loops to see the stop before sockets are released.
    pub stop_grace: Duration,
    /// Longest a single receive waits before the listener re-checks for shutdown.
    pub recv_timeout: Duration,
    /// Longest a single dequeue waits before the sender re-checks for shutdown.
    pub send_timeout: Duration,
    pub rules: ScoringRules,
}

impl Default for MatchConfig {
    fn default() -> Self {
        let dest_ip = DEFAULT_DEST_HOST
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), RECEIVE_PORT),
            destination: SocketAddr::new(dest_ip, SEND_PORT),
            duration: 360,
            start_grace: Duration::from_secs(3),
            stop_grace: Duration::from_millis(200),
            recv_timeout: Duration::from_secs(1),
            send_timeout: Duration::from_millis(500),
            rules: ScoringRules::default(),
        }
    }
}

/// Resolves a destination given as `host:port`, or as a bare IP that keeps
/// the port of `current`.
pub fn parse_destination(address: &str, current: SocketAddr) -> Option<SocketAddr> {
    let address = address.trim();
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Some(addr);
    }
    address
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, current.port()))
}
