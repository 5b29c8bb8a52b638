use oci_spec::image::{Descriptor, ImageIndex, ImageManifest};
use spegel_key::{ContentKey, Platform};

pub const OCI_IMAGE_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_IMAGE_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == OCI_IMAGE_INDEX_V1 || media_type == DOCKER_IMAGE_MANIFEST_LIST_V2
}

/// Config digest + every layer digest for a resolved manifest.
pub fn manifest_keys(manifest: &ImageManifest) -> Vec<ContentKey> {
    let mut keys = Vec::with_capacity(1 + manifest.layers().len());
    keys.push(ContentKey::digest(manifest.config().digest().to_string()));
    keys.extend(
        manifest
            .layers()
            .iter()
            .map(|d| ContentKey::digest(d.digest().to_string())),
    );
    keys
}

/// The single child manifest descriptor matching `platform`, if the index carries one. Only
/// ever returns the one match, never the full set of children.
pub fn matching_child<'a>(index: &'a ImageIndex, platform: Platform) -> Option<&'a Descriptor> {
    index.manifests().iter().find(|d| {
        d.platform()
            .as_ref()
            .map(|p| *p.os() == platform.os && *p.architecture() == platform.arch)
            .unwrap_or(false)
    })
}
