use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use spegel_key::{ContentKey, PeerEndpoint};

pub type EndpointStream = Pin<Box<dyn Stream<Item = PeerEndpoint> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("substrate is closed")]
    Closed,
    #[error("advertise failed, retry next tick: {0}")]
    AdvertiseFailed(String),
}

/// The content-routing substrate contract. Implementations wrap whatever the real DHT
/// transport looks like; the rest of the system only ever depends on this trait.
#[async_trait]
pub trait ContentRouter: Send + Sync {
    /// True once membership has at least one peer and the underlying DHT is bootstrapped.
    async fn ready(&self) -> bool;

    /// Idempotent: records `(self-endpoint, key)` with TTL for every key given. Failures are
    /// transient; the caller (the tracker) retries on its next tick.
    async fn advertise(&self, keys: &[ContentKey]) -> Result<(), Error>;

    /// Stream of endpoints holding `key`, deduplicated, in arrival order, bounded by `timeout`.
    /// If `self_allowed` is false the substrate's own endpoint is filtered out.
    fn resolve(&self, key: &ContentKey, self_allowed: bool, timeout: Duration) -> EndpointStream;

    /// Tear down transports. Idempotent.
    async fn close(&self) -> Result<(), Error>;
}
