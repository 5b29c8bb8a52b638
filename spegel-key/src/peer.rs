use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::Error;

/// A peer reachable for HTTP mirror GETs, i.e. the IP discovered via the substrate's own
/// transport plus the registry port that peer advertised alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerEndpoint {
    pub host: IpAddr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(host: IpAddr, port: u16) -> Self {
        PeerEndpoint { host, port }
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host {
            IpAddr::V4(v4) => write!(f, "{}:{}", v4, self.port),
            IpAddr::V6(v6) => write!(f, "[{}]:{}", v6, self.port),
        }
    }
}

impl FromStr for PeerEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::BadPeerEndpoint(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let host: IpAddr = host
            .parse()
            .map_err(|_| Error::BadPeerEndpoint(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::BadPeerEndpoint(s.to_string()))?;
        Ok(PeerEndpoint::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_v4() {
        let e: PeerEndpoint = "10.0.0.1:5000".parse().unwrap();
        assert_eq!(e.to_string(), "10.0.0.1:5000");
    }

    #[test]
    fn round_trip_v6() {
        let e: PeerEndpoint = "[::1]:5000".parse().unwrap();
        assert_eq!(e.to_string(), "[::1]:5000");
    }
}
