mod dirstore;
mod enumerate;
mod error;
mod event;
mod trait_;

pub use dirstore::DirStore;
pub use enumerate::{
    is_index_media_type, manifest_keys, matching_child, DOCKER_IMAGE_MANIFEST_LIST_V2,
    OCI_IMAGE_INDEX_V1,
};
pub use error::Error;
pub use event::{Event, EventKind};
pub use trait_::OciStore;
