use std::fmt;

use crate::reference::Reference;

/// A content key as advertised in, and resolved from, the routing substrate.
///
/// * `Tag` keys are only ever constructed for a reference that parsed successfully *and*
///   carries a tag component — see `ContentKey::tag_for`.
/// * `Digest` keys are the canonical `algo:hex` string; layers are always keyed this way, never
///   by tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentKey {
    Tag(String),
    Digest(String),
}

impl ContentKey {
    /// `registry/name:tag`, or `None` if `reference` has no tag (e.g. it is digest-only).
    /// `registry` here is the key-matching host (`docker.io`, never `registry-1.docker.io`).
    pub fn tag_for(reference: &Reference) -> Option<ContentKey> {
        let tag = reference.tag.as_ref()?;
        Some(ContentKey::Tag(format!(
            "{}/{}:{}",
            reference.registry, reference.name, tag
        )))
    }

    pub fn digest(digest: impl Into<String>) -> ContentKey {
        ContentKey::Digest(digest.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentKey::Tag(s) => s,
            ContentKey::Digest(s) => s,
        }
    }

    pub fn is_digest(&self) -> bool {
        matches!(self, ContentKey::Digest(_))
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_key_matches_docker_io_literal() {
        let r = Reference::parse("docker.io/library/busybox:1.36").unwrap();
        let key = ContentKey::tag_for(&r).unwrap();
        assert_eq!(key.as_str(), "docker.io/library/busybox:1.36");
    }

    #[test]
    fn digest_only_reference_has_no_tag_key() {
        let r = Reference::parse("ghcr.io/foo/bar@sha256:abcd").unwrap();
        assert_eq!(ContentKey::tag_for(&r), None);
    }
}
