//! A small, self-contained redux of an OCI image reference.
//!
//! We don't reuse a third-party `Reference` type here because the one thing that matters for
//! key-matching ("docker.io normalized to registry-1.docker.io for upstream but
//! retained as docker.io for key matching") needs the *raw* registry host kept around
//! separately from whatever host we'd actually dial. Redoing the small grammar ourselves keeps
//! that distinction explicit instead of hoping a pull-oriented reference parser preserves it.

use crate::Error;

const DEFAULT_REGISTRY: &str = "docker.io";
const DEFAULT_TAG: &str = "latest";

/// `registry/name[:tag][@digest]`, already split into parts. `registry` is always present
/// (defaulted to `docker.io`) and already lowercased; `name` is the repository path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub registry: String,
    pub name: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl Reference {
    /// Parse a reference string. Silently permissive about most of the distribution grammar's
    /// edge cases (no validation of name-component character classes) since the only thing we
    /// need is a correct split into registry/name/tag/digest.
    pub fn parse(s: &str) -> Result<Reference, Error> {
        if s.is_empty() {
            return Err(Error::EmptyReference);
        }

        let (rest, digest) = match s.rsplit_once('@') {
            Some((rest, digest)) => {
                if !looks_like_digest(digest) {
                    return Err(Error::BadReference(s.to_string()));
                }
                (rest, Some(digest.to_string()))
            }
            None => (s, None),
        };

        if rest.is_empty() {
            return Err(Error::BadReference(s.to_string()));
        }

        let (first, remainder) = match rest.split_once('/') {
            Some((first, remainder)) => (first, remainder),
            None => (rest, ""),
        };

        let (registry, name_and_tag) = if is_registry_host(first) {
            (first.to_lowercase(), remainder)
        } else {
            (DEFAULT_REGISTRY.to_string(), rest)
        };

        if name_and_tag.is_empty() {
            return Err(Error::BadReference(s.to_string()));
        }

        // a ':' in the last path segment (not preceded by another '/') is the tag; a ':' that
        // shows up earlier is part of a registry port and was already consumed above.
        let (name, tag) = match name_and_tag.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') && !tag.is_empty() => {
                (name.to_string(), Some(tag.to_string()))
            }
            _ => (name_and_tag.to_string(), None),
        };

        if name.is_empty() {
            return Err(Error::BadReference(s.to_string()));
        }

        let tag = match (tag, &digest) {
            (Some(tag), _) => Some(tag),
            (None, Some(_)) => None, // digest-only reference, no implicit tag
            (None, None) => Some(DEFAULT_TAG.to_string()),
        };

        Ok(Reference {
            registry,
            name: name.to_lowercase(),
            tag,
            digest,
        })
    }

    /// The host to actually dial for this reference's registry, per the `docker.io` →
    /// `registry-1.docker.io` upstream rewrite. The key-matching registry name (`self.registry`)
    /// is untouched by this rewrite.
    pub fn upstream_host(&self) -> String {
        upstream_host_for(&self.registry)
    }
}

/// `docker.io` is dialed at `registry-1.docker.io`; every other registry is dialed as named.
pub fn upstream_host_for(registry: &str) -> String {
    if registry.eq_ignore_ascii_case(DEFAULT_REGISTRY) {
        "registry-1.docker.io".to_string()
    } else {
        registry.to_string()
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment == "localhost" || segment.contains('.') || segment.contains(':')
}

fn looks_like_digest(s: &str) -> bool {
    match s.split_once(':') {
        Some((algo, hex)) => !algo.is_empty() && !hex.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_and_tag() {
        let r = Reference::parse("library/gcc").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.name, "library/gcc");
        assert_eq!(r.tag.as_deref(), Some("latest"));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn explicit_registry_and_tag() {
        let r = Reference::parse("ghcr.io/foo/bar:v1.2.3").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.name, "foo/bar");
        assert_eq!(r.tag.as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn digest_only() {
        let r = Reference::parse("quay.io/fedora/fedora@sha256:abcd").unwrap();
        assert_eq!(r.registry, "quay.io");
        assert_eq!(r.name, "fedora/fedora");
        assert_eq!(r.tag, None);
        assert_eq!(r.digest.as_deref(), Some("sha256:abcd"));
    }

    #[test]
    fn tag_and_digest_keeps_both_parses_but_key_prefers_digest() {
        let r = Reference::parse("quay.io/fedora/fedora:latest@sha256:fff").unwrap();
        assert_eq!(r.tag.as_deref(), Some("latest"));
        assert_eq!(r.digest.as_deref(), Some("sha256:fff"));
    }

    #[test]
    fn registry_with_port() {
        let r = Reference::parse("localhost:5000/foo:bar").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.name, "foo");
        assert_eq!(r.tag.as_deref(), Some("bar"));
    }

    #[test]
    fn docker_io_upstream_rewrite_but_key_unchanged() {
        let r = Reference::parse("docker.io/library/busybox:1.36").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.upstream_host(), "registry-1.docker.io");
    }

    #[test]
    fn unparseable_reference_rejected() {
        assert!(Reference::parse("").is_err());
        assert!(Reference::parse("ghcr.io/").is_err());
        assert!(Reference::parse("ghcr.io/foo@bad-digest").is_err());
    }
}
