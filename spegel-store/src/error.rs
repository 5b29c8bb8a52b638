#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reference: {0}")]
    Reference(#[from] spegel_key::Error),
    #[error("oci spec: {0}")]
    OciSpec(#[from] oci_spec::OciSpecError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("pointer serialization: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("bad pointer file for {0}")]
    BadPointer(String),
    #[error("manifest not found for digest {0}")]
    ManifestNotFound(String),
    #[error("no manifest matches platform {os:?}/{arch:?}")]
    NoMatchingManifest {
        os: oci_spec::image::Os,
        arch: oci_spec::image::Arch,
    },
    #[error("runtime content store not reachable: {0}")]
    NotReachable(String),
}
