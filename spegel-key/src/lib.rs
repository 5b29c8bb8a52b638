mod descriptor;
mod key;
mod peer;
mod reference;

use std::time::Duration;

pub use descriptor::{ImageDescriptor, Platform, TargetDescriptor};
pub use key::ContentKey;
pub use peer::PeerEndpoint;
pub use reference::{upstream_host_for, Reference};

/// TTL applied to each DHT advertisement. The tracker re-advertises at
/// `KEY_TTL - RE_ADVERTISE_MARGIN`.
pub const KEY_TTL: Duration = Duration::from_secs(10 * 60);

/// How far ahead of expiry the tracker re-advertises.
pub const RE_ADVERTISE_MARGIN: Duration = Duration::from_secs(60);

pub fn re_advertise_interval() -> Duration {
    KEY_TTL
        .checked_sub(RE_ADVERTISE_MARGIN)
        .unwrap_or(KEY_TTL)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("empty reference")]
    EmptyReference,
    #[error("bad reference: {0}")]
    BadReference(String),
    #[error("bad peer endpoint: {0}")]
    BadPeerEndpoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_advertise_interval_is_ttl_minus_margin() {
        assert_eq!(re_advertise_interval(), Duration::from_secs(9 * 60));
    }
}
