use spegel_key::ContentKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Manifest,
    Blob,
}

/// The result of parsing a `/v2/...` path plus the registry that disambiguates the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: Kind,
    pub name: String,
    pub reference: String,
    pub key: ContentKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("not a v2 path")]
    NotV2,
    #[error("malformed manifests/blobs path")]
    BadPath,
}

/// Parses the part of the path after `/v2/`, keying manifests-by-tag as
/// `ContentKey::Tag("<registry>/<name>:<tag>")` (matching `ContentKey::tag_for`'s convention) and
/// everything else (manifests-by-digest, blobs) as `ContentKey::Digest`.
///
/// Accepts `<name>/manifests/<reference>` and `<name>/blobs/<digest>`, where `<name>` may itself
/// contain `/` — multi-segment repository names like `library/alpine` are routine.
pub fn classify(path_after_v2: &str, registry: &str) -> Result<Classified, Error> {
    if path_after_v2.is_empty() {
        return Err(Error::NotV2);
    }

    let (kind_marker, name, reference) =
        split_on_kind_marker(path_after_v2).ok_or(Error::BadPath)?;
    if name.is_empty() || reference.is_empty() {
        return Err(Error::BadPath);
    }

    let kind = match kind_marker {
        "manifests" => Kind::Manifest,
        "blobs" => Kind::Blob,
        _ => return Err(Error::BadPath),
    };

    let key = match kind {
        Kind::Manifest if !looks_like_digest(reference) => {
            ContentKey::Tag(format!("{registry}/{name}:{reference}"))
        }
        _ => ContentKey::digest(reference.to_string()),
    };

    Ok(Classified {
        kind,
        name: name.to_string(),
        reference: reference.to_string(),
        key,
    })
}

fn split_on_kind_marker(path: &str) -> Option<(&str, &str, &str)> {
    for marker in ["manifests", "blobs"] {
        let needle = format!("/{marker}/");
        if let Some(idx) = path.find(&needle) {
            let name = &path[..idx];
            let reference = &path[idx + needle.len()..];
            return Some((marker, name, reference));
        }
    }
    None
}

fn looks_like_digest(s: &str) -> bool {
    matches!(s.split_once(':'), Some((algo, hex)) if !algo.is_empty() && !hex.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_by_tag_keys_on_registry_name_and_tag() {
        let c = classify("library/alpine/manifests/3.20", "docker.io").unwrap();
        assert_eq!(c.kind, Kind::Manifest);
        assert_eq!(c.name, "library/alpine");
        assert_eq!(c.reference, "3.20");
        assert_eq!(c.key.as_str(), "docker.io/library/alpine:3.20");
        assert!(!c.key.is_digest());
    }

    #[test]
    fn manifest_by_digest_keys_on_digest_only() {
        let c = classify("library/alpine/manifests/sha256:abc", "docker.io").unwrap();
        assert_eq!(c.key.as_str(), "sha256:abc");
        assert!(c.key.is_digest());
    }

    #[test]
    fn blob_always_keys_on_digest() {
        let c = classify("library/alpine/blobs/sha256:abc", "docker.io").unwrap();
        assert_eq!(c.kind, Kind::Blob);
        assert_eq!(c.key.as_str(), "sha256:abc");
    }

    #[test]
    fn empty_path_is_rejected() {
        assert_eq!(classify("", "docker.io"), Err(Error::NotV2));
    }

    #[test]
    fn path_missing_a_kind_marker_is_rejected() {
        assert_eq!(classify("library/alpine", "docker.io"), Err(Error::BadPath));
    }
}
