use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use log::{trace, warn};
use spegel_key::{ContentKey, PeerEndpoint};
use tokio::sync::RwLock;

use crate::gate::Gate;
use crate::router::{ContentRouter, EndpointStream, Error};

struct Registration {
    endpoint: PeerEndpoint,
    expires_at: Instant,
}

/// The backing table a `ContentRouter` advertises into and resolves from. Split out from
/// `InMemoryRouter` so that a test harness simulating several peers can construct one router per
/// peer sharing a single `Table`, mirroring how several real Spegel instances all publish into
/// the same DHT.
#[derive(Default)]
pub struct Table {
    entries: RwLock<HashMap<ContentKey, Vec<Registration>>>,
}

impl Table {
    pub fn new() -> Arc<Table> {
        Arc::new(Table::default())
    }
}

/// An in-process stand-in for a Kademlia-like content-routing substrate. Suitable for tests
/// and single-process deployments; a real deployment would swap this for an adapter over an
/// actual DHT transport without the rest of the system noticing.
pub struct InMemoryRouter {
    table: Arc<Table>,
    self_endpoint: PeerEndpoint,
    gate: Arc<Gate>,
    closed: AtomicBool,
    ttl: Duration,
}

impl InMemoryRouter {
    pub fn new(table: Arc<Table>, self_endpoint: PeerEndpoint, ttl: Duration) -> Self {
        InMemoryRouter {
            table,
            self_endpoint,
            gate: Arc::new(Gate::new()),
            closed: AtomicBool::new(false),
            ttl,
        }
    }

    /// Mark membership established: called once bootstrap has produced an initial peer
    /// list and the transport considers itself connected.
    pub fn mark_bootstrapped(&self) {
        self.gate.open();
    }
}

#[async_trait]
impl ContentRouter for InMemoryRouter {
    async fn ready(&self) -> bool {
        self.gate.is_open()
    }

    async fn advertise(&self, keys: &[ContentKey]) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let expires_at = Instant::now() + self.ttl;
        let mut entries = self.table.entries.write().await;
        for key in keys {
            let regs = entries.entry(key.clone()).or_default();
            if let Some(existing) = regs.iter_mut().find(|r| r.endpoint == self.self_endpoint) {
                existing.expires_at = expires_at;
            } else {
                regs.push(Registration {
                    endpoint: self.self_endpoint,
                    expires_at,
                });
            }
        }
        trace!("advertised {} keys", keys.len());
        Ok(())
    }

    fn resolve(&self, key: &ContentKey, self_allowed: bool, timeout: Duration) -> EndpointStream {
        if self.closed.load(Ordering::Acquire) {
            return Box::pin(futures::stream::empty());
        }
        let table = self.table.clone();
        let key = key.clone();
        let self_endpoint = self.self_endpoint;

        let lookup = async move {
            let now = Instant::now();
            let entries = table.entries.read().await;
            entries
                .get(&key)
                .map(|regs| {
                    regs.iter()
                        .filter(|r| r.expires_at > now)
                        .map(|r| r.endpoint)
                        .filter(|e| self_allowed || *e != self_endpoint)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        let timed = async move {
            match tokio::time::timeout(timeout, lookup).await {
                Ok(endpoints) => endpoints,
                Err(_) => {
                    warn!("resolve timed out after {:?}", timeout);
                    Vec::new()
                }
            }
        };

        Box::pin(futures::stream::once(timed).flat_map(futures::stream::iter))
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        self.gate.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::net::Ipv4Addr;

    fn endpoint(last: u8) -> PeerEndpoint {
        PeerEndpoint::new(Ipv4Addr::new(10, 0, 0, last).into(), 5000)
    }

    #[tokio::test]
    async fn advertise_then_resolve_excludes_self_by_default() {
        let table = Table::new();
        let router = InMemoryRouter::new(table, endpoint(1), Duration::from_secs(60));
        let key = ContentKey::digest("sha256:abc");
        router.advertise(&[key.clone()]).await.unwrap();

        let peers: Vec<_> = router
            .resolve(&key, false, Duration::from_millis(100))
            .collect()
            .await;
        assert!(peers.is_empty(), "self should be filtered out");

        let peers: Vec<_> = router
            .resolve(&key, true, Duration::from_millis(100))
            .collect()
            .await;
        assert_eq!(peers, vec![endpoint(1)]);
    }

    #[tokio::test]
    async fn shared_table_lets_one_peer_see_anothers_advertisement() {
        let table = Table::new();
        let a = InMemoryRouter::new(table.clone(), endpoint(1), Duration::from_secs(60));
        let b = InMemoryRouter::new(table, endpoint(2), Duration::from_secs(60));

        let key = ContentKey::digest("sha256:abc");
        a.advertise(&[key.clone()]).await.unwrap();

        let peers: Vec<_> = b
            .resolve(&key, false, Duration::from_millis(100))
            .collect()
            .await;
        assert_eq!(peers, vec![endpoint(1)]);
    }

    #[tokio::test]
    async fn expired_registration_is_not_resolved() {
        let table = Table::new();
        let router = InMemoryRouter::new(table, endpoint(1), Duration::from_millis(10));
        let key = ContentKey::digest("sha256:abc");
        router.advertise(&[key.clone()]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let peers: Vec<_> = router
            .resolve(&key, true, Duration::from_millis(100))
            .collect()
            .await;
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn closed_router_rejects_advertise_and_resolve() {
        let table = Table::new();
        let router = InMemoryRouter::new(table, endpoint(1), Duration::from_secs(60));
        router.close().await.unwrap();
        assert!(router
            .advertise(&[ContentKey::digest("sha256:abc")])
            .await
            .is_err());
        let peers: Vec<_> = router
            .resolve(
                &ContentKey::digest("sha256:abc"),
                true,
                Duration::from_millis(50),
            )
            .collect()
            .await;
        assert!(peers.is_empty());
    }
}
