use oci_spec::image::{Arch, Os};

/// `{digest, media-type, size}`. Kept as plain fields rather than reusing
/// `oci_spec::image::Descriptor` directly so callers that only have the three scalars (e.g. from
/// a cache) don't need to round-trip through the full oci-spec type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub digest: String,
    pub media_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

/// `{name, target-descriptor, platform}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub name: String,
    pub target: TargetDescriptor,
    pub platform: Option<Platform>,
}

impl From<&oci_spec::image::Descriptor> for TargetDescriptor {
    fn from(d: &oci_spec::image::Descriptor) -> Self {
        TargetDescriptor {
            digest: d.digest().to_string(),
            media_type: d.media_type().to_string(),
            size: d.size(),
        }
    }
}
