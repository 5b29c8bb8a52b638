use std::io::Cursor;
use std::path::PathBuf;

use bytes::Bytes;
use log::{info, warn};
use oci_spec::image::{ImageIndex, ImageManifest};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use spegel_key::{ContentKey, ImageDescriptor, Platform, Reference, TargetDescriptor};
use tokio::sync::broadcast;

use crate::enumerate::{is_index_media_type, manifest_keys, matching_child};
use crate::error::Error;
use crate::event::{Event, EventKind};
use crate::trait_::OciStore;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
struct Pointer {
    reference: String,
    digest: String,
    media_type: String,
    size: u64,
}

/// A self-contained stand-in for a containerd-style local content store, laid out as
/// `<root>/images/<hash-of-reference>.json` pointer files plus a shared
/// `<root>/blobs/<algo>/<hex>` blob pool — the same blob addressing scheme as an OCI image
/// layout directory, generalized to hold more than one image.
pub struct DirStore {
    root: PathBuf,
    platform: Platform,
    events: broadcast::Sender<Event>,
}

impl DirStore {
    pub async fn open(root: impl Into<PathBuf>, platform: Platform) -> Result<Self, Error> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("images")).await?;
        tokio::fs::create_dir_all(root.join("blobs")).await?;
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(DirStore {
            root,
            platform,
            events: tx,
        })
    }

    fn pointer_path(&self, reference: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(reference.as_bytes());
        self.root
            .join("images")
            .join(format!("{}.json", hex::encode(hasher.finalize())))
    }

    fn blob_path(&self, digest: &str) -> Option<PathBuf> {
        let (algo, hex) = digest.split_once(':')?;
        if algo.is_empty() || hex.is_empty() || hex.contains('/') || hex.contains('.') {
            return None;
        }
        Some(self.root.join("blobs").join(algo).join(hex))
    }

    async fn read_pointer(&self, reference: &str) -> Result<Option<Pointer>, Error> {
        let path = self.pointer_path(reference);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|_| Error::BadPointer(reference.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a blob and the pointer for `reference`, then announces a `Create` event. Stands in
    /// for whatever the container runtime does when it finishes pulling an image; exists so
    /// tests (and the demo binary) can populate a `DirStore` without a real runtime.
    pub async fn put_image(
        &self,
        reference: &str,
        digest: &str,
        media_type: &str,
        blob: &[u8],
    ) -> Result<(), Error> {
        if let Some(path) = self.blob_path(digest) {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, blob).await?;
        }
        let pointer = Pointer {
            reference: reference.to_string(),
            digest: digest.to_string(),
            media_type: media_type.to_string(),
            size: blob.len() as u64,
        };
        let path = self.pointer_path(reference);
        tokio::fs::write(&path, serde_json::to_vec(&pointer)?).await?;
        info!("image created/updated reference={reference} digest={digest}");
        let _ = self.events.send(Event {
            kind: EventKind::Create,
            reference: reference.to_string(),
        });
        Ok(())
    }

    /// Writes a content-addressed blob without pointing any reference at it yet (manifests,
    /// configs, and layers all go through here before `put_image` links a reference to one).
    pub async fn put_blob(&self, digest: &str, data: &[u8]) -> Result<(), Error> {
        let path = self.blob_path(digest).ok_or(Error::BadPointer(digest.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    pub async fn delete_image(&self, reference: &str) -> Result<(), Error> {
        let path = self.pointer_path(reference);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("delete_image: {reference} was already gone");
            }
            Err(e) => return Err(e.into()),
        }
        let _ = self.events.send(Event {
            kind: EventKind::Delete,
            reference: reference.to_string(),
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl OciStore for DirStore {
    async fn verify(&self) -> Result<(), Error> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::NotReachable(self.root.display().to_string()))
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn resolve(&self, reference: &Reference) -> Result<Option<ImageDescriptor>, Error> {
        let key = canonical_reference_string(reference);
        let Some(pointer) = self.read_pointer(&key).await? else {
            return Ok(None);
        };
        Ok(Some(ImageDescriptor {
            name: reference.name.clone(),
            target: TargetDescriptor {
                digest: pointer.digest,
                media_type: pointer.media_type,
                size: pointer.size,
            },
            platform: None,
        }))
    }

    async fn size(&self, digest: &str) -> Result<Option<u64>, Error> {
        let Some(path) = self.blob_path(digest) else {
            return Ok(None);
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_blob(&self, digest: &str) -> Result<Option<Bytes>, Error> {
        let Some(path) = self.blob_path(digest) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data.into())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn enumerate(&self, reference: &Reference) -> Result<Vec<ContentKey>, Error> {
        let key = canonical_reference_string(reference);
        let pointer = self
            .read_pointer(&key)
            .await?
            .ok_or_else(|| Error::ManifestNotFound(key.clone()))?;

        let mut keys = Vec::new();
        if let Some(tag_key) = ContentKey::tag_for(reference) {
            keys.push(tag_key);
        }
        keys.push(ContentKey::digest(pointer.digest.clone()));

        let blob = self
            .read_blob(&pointer.digest)
            .await?
            .ok_or_else(|| Error::ManifestNotFound(pointer.digest.clone()))?;

        if is_index_media_type(&pointer.media_type) {
            let index = ImageIndex::from_reader(Cursor::new(&blob))?;
            let child = matching_child(&index, self.platform.clone()).ok_or(
                Error::NoMatchingManifest {
                    os: self.platform.os.clone(),
                    arch: self.platform.arch.clone(),
                },
            )?;
            let child_digest = child.digest().to_string();
            keys.push(ContentKey::digest(child_digest.clone()));
            let child_blob = self
                .read_blob(&child_digest)
                .await?
                .ok_or(Error::ManifestNotFound(child_digest))?;
            let manifest = ImageManifest::from_reader(Cursor::new(&child_blob))?;
            keys.extend(manifest_keys(&manifest));
        } else {
            let manifest = ImageManifest::from_reader(Cursor::new(&blob))?;
            keys.extend(manifest_keys(&manifest));
        }

        Ok(keys)
    }

    async fn list_references(&self) -> Result<Vec<String>, Error> {
        let mut refs = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join("images")).await?;
        while let Some(entry) = dir.next_entry().await? {
            let bytes = tokio::fs::read(entry.path()).await?;
            let pointer: Pointer = serde_json::from_slice(&bytes)
                .map_err(|_| Error::BadPointer(entry.path().display().to_string()))?;
            refs.push(pointer.reference);
        }
        Ok(refs)
    }
}

/// The string used to key a pointer file: registry (key-matching form) + name + tag, or
/// registry + name + digest when the reference has no tag.
fn canonical_reference_string(reference: &Reference) -> String {
    match &reference.tag {
        Some(tag) => format!("{}/{}:{}", reference.registry, reference.name, tag),
        None => format!(
            "{}/{}@{}",
            reference.registry,
            reference.name,
            reference.digest.as_deref().unwrap_or("")
        ),
    }
}
