use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_REGISTRY_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";
const DEFAULT_MIRROR_RESOLVE_RETRIES: u32 = 3;
const DEFAULT_MIRROR_RESOLVE_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Everything the mirror registry engine needs, as a record rather than positional constructor
/// arguments. Built with [`ConfigBuilder`].
#[derive(Debug, Clone)]
pub struct Config {
    pub registry_addr: SocketAddr,
    /// The address advertised to the routing substrate for this node, i.e. the address peers
    /// dial back on. Distinct from `registry_addr` (the local bind address) since the bind
    /// address is often `0.0.0.0` or a NAT-internal address that isn't reachable from outside.
    pub local_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    pub mirror_resolve_retries: u32,
    pub mirror_resolve_timeout: Duration,
    pub resolve_latest_tag: bool,
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            registry_addr: DEFAULT_REGISTRY_ADDR.parse().unwrap(),
            local_addr: DEFAULT_REGISTRY_ADDR.parse().unwrap(),
            metrics_addr: DEFAULT_METRICS_ADDR.parse().unwrap(),
            mirror_resolve_retries: DEFAULT_MIRROR_RESOLVE_RETRIES,
            mirror_resolve_timeout: DEFAULT_MIRROR_RESOLVE_TIMEOUT,
            resolve_latest_tag: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder::default()
    }

    pub fn registry_addr(mut self, addr: SocketAddr) -> Self {
        self.config.registry_addr = addr;
        self
    }

    pub fn local_addr(mut self, addr: SocketAddr) -> Self {
        self.config.local_addr = addr;
        self
    }

    pub fn metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.config.metrics_addr = addr;
        self
    }

    pub fn mirror_resolve_retries(mut self, retries: u32) -> Self {
        self.config.mirror_resolve_retries = retries;
        self
    }

    pub fn mirror_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.mirror_resolve_timeout = timeout;
        self
    }

    pub fn resolve_latest_tag(mut self, resolve: bool) -> Self {
        self.config.resolve_latest_tag = resolve;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.mirror_resolve_retries, 3);
        assert_eq!(config.mirror_resolve_timeout, Duration::from_secs(20));
        assert_eq!(config.shutdown_grace, Duration::from_secs(30));
    }

    #[test]
    fn builder_overrides_selected_fields_only() {
        let config = ConfigBuilder::new().mirror_resolve_retries(5).build();
        assert_eq!(config.mirror_resolve_retries, 5);
        assert_eq!(config.mirror_resolve_timeout, Duration::from_secs(20));
    }

    #[test]
    fn local_addr_defaults_to_registry_addr_but_can_diverge() {
        let default = Config::default();
        assert_eq!(default.local_addr, default.registry_addr);

        let overridden = ConfigBuilder::new()
            .registry_addr("0.0.0.0:5000".parse().unwrap())
            .local_addr("10.0.0.4:5000".parse().unwrap())
            .build();
        assert_ne!(overridden.local_addr, overridden.registry_addr);
    }
}
