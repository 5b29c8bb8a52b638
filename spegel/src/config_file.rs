use std::path::Path;

use serde::Deserialize;

/// Optional TOML overlay for the handful of [`crate::args::Args`] fields an operator might want
/// to manage as a config file rather than flags (e.g. baked into a container image). Every field
/// is optional; anything left unset keeps the CLI default.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub registry_addr: Option<String>,
    pub local_addr: Option<String>,
    pub metrics_addr: Option<String>,
    pub store_root: Option<String>,
    pub peers: Option<Vec<String>>,
    pub filter: Option<String>,
    pub mirror_resolve_retries: Option<u32>,
    pub mirror_resolve_timeout_secs: Option<u64>,
    pub resolve_latest_tag: Option<bool>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("bad socket address in config file: {0}")]
    BadSocketAddr(String),
    #[error("bad peer endpoint in config file: {0}")]
    BadPeer(String),
}

pub fn load(path: &Path) -> Result<FileConfig, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| Error::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_none() {
        let cfg: FileConfig = toml::from_str("registry_addr = \"0.0.0.0:6000\"").unwrap();
        assert_eq!(cfg.registry_addr.as_deref(), Some("0.0.0.0:6000"));
        assert!(cfg.metrics_addr.is_none());
        assert!(cfg.peers.is_none());
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let err = load(Path::new("/nonexistent/spegel.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
