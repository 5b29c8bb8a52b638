use async_trait::async_trait;
use spegel_key::PeerEndpoint;

/// Provides the initial peer list the substrate bootstraps from. Consulted exactly once,
/// at startup.
///
/// DNS-based and Kubernetes-leader-election bootstrap are out-of-scope external collaborators;
/// only the contract and the static case live here.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn peers(&self) -> Vec<PeerEndpoint>;
}

/// A fixed, operator-supplied peer list.
pub struct StaticBootstrap {
    peers: Vec<PeerEndpoint>,
}

impl StaticBootstrap {
    pub fn new(peers: Vec<PeerEndpoint>) -> Self {
        StaticBootstrap { peers }
    }
}

#[async_trait]
impl Bootstrap for StaticBootstrap {
    async fn peers(&self) -> Vec<PeerEndpoint> {
        self.peers.clone()
    }
}
