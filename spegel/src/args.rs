use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use spegel_key::PeerEndpoint;

/// Everything startup needs that the core itself treats as an external collaborator's
/// responsibility: listen addresses, the static peer list, and the node's local store root.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address the mirror registry listens on.
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub registry_addr: SocketAddr,

    /// Address this node advertises to the routing substrate for peers to dial back on.
    /// Defaults to `registry_addr` when unset, which only works when that bind address is
    /// itself externally routable.
    #[arg(long)]
    pub local_addr: Option<SocketAddr>,

    /// Address the Prometheus text exporter listens on.
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_addr: SocketAddr,

    /// Directory backing the local content store.
    #[arg(long, default_value = "/var/lib/spegel")]
    pub store_root: PathBuf,

    /// Peer endpoints to seed the routing substrate with (`host:port`, repeatable).
    #[arg(long = "peer")]
    pub peers: Vec<PeerEndpoint>,

    /// Only track references whose string contains this substring.
    #[arg(long)]
    pub filter: Option<String>,

    /// Attempts per mirror resolve before falling back to upstream.
    #[arg(long, default_value_t = 3)]
    pub mirror_resolve_retries: u32,

    /// Per-peer proxy timeout, in seconds.
    #[arg(long, default_value_t = 20)]
    pub mirror_resolve_timeout_secs: u64,

    /// Whether `:latest`-tagged manifests are eligible for mirror resolution.
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    pub resolve_latest_tag: bool,

    /// Grace period for in-flight requests to drain on shutdown, in seconds.
    #[arg(long, default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    /// Optional TOML file layering config on top of the defaults above (CLI flags win).
    #[arg(long)]
    pub config_file: Option<PathBuf>,
}

impl Args {
    /// The address to advertise into the routing substrate: `local_addr` if the operator set
    /// one, else the registry bind address.
    pub fn effective_local_addr(&self) -> SocketAddr {
        self.local_addr.unwrap_or(self.registry_addr)
    }

    pub fn mirror_resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.mirror_resolve_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Fills in fields still at their hardcoded default from `file`, leaving any value the
    /// operator passed explicitly on the command line untouched. Peers from both sources are
    /// concatenated rather than one replacing the other, since a static peer list is additive.
    pub fn merge_file_config(
        mut self,
        file: crate::config_file::FileConfig,
    ) -> Result<Self, crate::config_file::MergeError> {
        use crate::config_file::MergeError;

        if self.registry_addr == default_registry_addr() {
            if let Some(v) = file.registry_addr {
                self.registry_addr = v.parse().map_err(|_| MergeError::BadSocketAddr(v))?;
            }
        }
        if self.metrics_addr == default_metrics_addr() {
            if let Some(v) = file.metrics_addr {
                self.metrics_addr = v.parse().map_err(|_| MergeError::BadSocketAddr(v))?;
            }
        }
        if self.local_addr.is_none() {
            if let Some(v) = file.local_addr {
                self.local_addr = Some(v.parse().map_err(|_| MergeError::BadSocketAddr(v))?);
            }
        }
        if self.store_root == PathBuf::from(DEFAULT_STORE_ROOT) {
            if let Some(v) = file.store_root {
                self.store_root = PathBuf::from(v);
            }
        }
        if let Some(peers) = file.peers {
            for p in peers {
                self.peers.push(p.parse().map_err(|_| MergeError::BadPeer(p))?);
            }
        }
        if self.filter.is_none() {
            self.filter = file.filter;
        }
        if self.mirror_resolve_retries == 3 {
            if let Some(v) = file.mirror_resolve_retries {
                self.mirror_resolve_retries = v;
            }
        }
        if self.mirror_resolve_timeout_secs == 20 {
            if let Some(v) = file.mirror_resolve_timeout_secs {
                self.mirror_resolve_timeout_secs = v;
            }
        }
        if self.resolve_latest_tag {
            if let Some(v) = file.resolve_latest_tag {
                self.resolve_latest_tag = v;
            }
        }
        if self.shutdown_grace_secs == 30 {
            if let Some(v) = file.shutdown_grace_secs {
                self.shutdown_grace_secs = v;
            }
        }
        Ok(self)
    }
}

const DEFAULT_STORE_ROOT: &str = "/var/lib/spegel";

fn default_registry_addr() -> SocketAddr {
    "0.0.0.0:5000".parse().unwrap()
}

fn default_metrics_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::FileConfig;

    fn defaults() -> Args {
        Args::parse_from(["spegel"])
    }

    #[test]
    fn file_value_fills_in_an_untouched_default() {
        let file = FileConfig {
            mirror_resolve_retries: Some(7),
            ..Default::default()
        };
        let merged = defaults().merge_file_config(file).unwrap();
        assert_eq!(merged.mirror_resolve_retries, 7);
    }

    #[test]
    fn explicit_cli_value_is_not_overridden_by_file() {
        let args = Args::parse_from(["spegel", "--mirror-resolve-retries", "9"]);
        let file = FileConfig {
            mirror_resolve_retries: Some(7),
            ..Default::default()
        };
        let merged = args.merge_file_config(file).unwrap();
        assert_eq!(merged.mirror_resolve_retries, 9);
    }

    #[test]
    fn peers_from_file_and_cli_are_concatenated() {
        let args = Args::parse_from(["spegel", "--peer", "10.0.0.1:5000"]);
        let file = FileConfig {
            peers: Some(vec!["10.0.0.2:5000".to_string()]),
            ..Default::default()
        };
        let merged = args.merge_file_config(file).unwrap();
        assert_eq!(merged.peers.len(), 2);
    }

    #[test]
    fn effective_local_addr_falls_back_to_registry_addr_when_unset() {
        let args = defaults();
        assert_eq!(args.effective_local_addr(), args.registry_addr);
    }

    #[test]
    fn effective_local_addr_prefers_explicit_value() {
        let args = Args::parse_from(["spegel", "--local-addr", "10.0.0.4:5000"]);
        assert_eq!(
            args.effective_local_addr(),
            "10.0.0.4:5000".parse().unwrap()
        );
    }

    #[test]
    fn local_addr_from_file_fills_in_when_cli_unset() {
        let file = FileConfig {
            local_addr: Some("10.0.0.5:5000".to_string()),
            ..Default::default()
        };
        let merged = defaults().merge_file_config(file).unwrap();
        assert_eq!(
            merged.effective_local_addr(),
            "10.0.0.5:5000".parse().unwrap()
        );
    }
}
