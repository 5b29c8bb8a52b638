use async_trait::async_trait;
use bytes::Bytes;
use spegel_key::{ContentKey, ImageDescriptor, Reference};
use tokio::sync::broadcast;

use crate::error::Error;
use crate::event::Event;

/// The OCI store adapter contract: what the tracker and the registry-serving sub-handler
/// need from the node's local content store. A real implementation talks to containerd (or
/// whichever runtime) over its content-store API; `DirStore` is a self-contained stand-in used
/// here and in tests.
#[async_trait]
pub trait OciStore: Send + Sync {
    /// Confirms the runtime is reachable and correctly configured to mirror through us.
    async fn verify(&self) -> Result<(), Error>;

    /// A fresh subscription to the store's (best-effort ordered) event stream. Must be called
    /// before any scan that depends on not missing events raised concurrently with the scan.
    fn subscribe(&self) -> broadcast::Receiver<Event>;

    /// Maps a reference to its local descriptor, if present.
    async fn resolve(&self, reference: &Reference) -> Result<Option<ImageDescriptor>, Error>;

    /// Size of a blob by digest, if present locally.
    async fn size(&self, digest: &str) -> Result<Option<u64>, Error>;

    /// Bytes of a blob by digest, if present locally.
    async fn read_blob(&self, digest: &str) -> Result<Option<Bytes>, Error>;

    /// The full, transitively-referenced key set for `reference`, including a matched index child.
    async fn enumerate(&self, reference: &Reference) -> Result<Vec<ContentKey>, Error>;

    /// Every reference this store currently holds (used for the tracker's full rescan).
    async fn list_references(&self) -> Result<Vec<String>, Error>;
}
