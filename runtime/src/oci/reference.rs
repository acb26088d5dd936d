//! Image reference parsing.
//!
//! Parses references like `ghcr.io/org/app:v1` or
//! `ghcr.io/org/app@sha256:...` into structured components.

use a3s_refs_core::error::{RefsError, Result};

use super::digest::ContentHash;

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Longest tag registries accept.
const MAX_TAG_LEN: usize = 128;

/// Parsed image reference: `<registry>/<repository>[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<ContentHash>,
}

impl ImageReference {
    /// Parse a reference string.
    ///
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `localhost:5000/app` → localhost:5000/app:latest
    /// - `ghcr.io/org/app:v1@sha256:...` keeps both tag and digest
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RefsError::InvalidReference("Empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name_tag, digest)) => {
                let digest = digest.parse::<ContentHash>().map_err(|e| {
                    RefsError::InvalidReference(format!("'{}': {}", reference, e))
                })?;
                (name_tag, Some(digest))
            }
            None => (reference, None),
        };

        // A colon after the last slash separates the tag; one before it
        // belongs to a registry port.
        let last_slash = name_tag.rfind('/').map_or(0, |p| p + 1);
        let (name, tag) = match name_tag[last_slash..].rfind(':') {
            Some(colon) => {
                let colon = last_slash + colon;
                (&name_tag[..colon], Some(name_tag[colon + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        if let Some(ref tag) = tag {
            validate_tag(tag).map_err(|msg| {
                RefsError::InvalidReference(format!("'{}': {}", reference, msg))
            })?;
        }

        let (registry, repository) = Self::split_registry_repository(name, reference)?;

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(name: &str, original: &str) -> Result<(String, String)> {
        // The first component is a registry if it looks like a hostname.
        if let Some((first, rest)) = name.split_once('/') {
            if first.contains('.') || first.contains(':') || first == "localhost" {
                validate_repository(rest, original)?;
                return Ok((first.to_string(), rest.to_string()));
            }
        }

        validate_repository(name, original)?;
        let repository = if name.contains('/') {
            name.to_string()
        } else {
            format!("library/{}", name)
        };
        Ok((DEFAULT_REGISTRY.to_string(), repository))
    }

    /// `<registry>/<repository>` without tag or digest.
    pub fn repository_name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Same repository, addressed by digest only.
    pub fn with_digest(&self, digest: ContentHash) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest),
        }
    }

    /// Same repository, addressed by tag only.
    pub fn with_tag(&self, tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        validate_tag(&tag).map_err(|msg| {
            RefsError::InvalidReference(format!("'{}:{}': {}", self.repository_name(), tag, msg))
        })?;
        Ok(Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag),
            digest: None,
        })
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.repository_name();
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(&digest.to_string());
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = RefsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_tag(tag: &str) -> std::result::Result<(), &'static str> {
    let mut chars = tag.chars();
    match chars.next() {
        None => return Err("empty tag"),
        Some(c) if !(c.is_ascii_alphanumeric() || c == '_') => {
            return Err("tag must start with a letter, digit or underscore")
        }
        _ => {}
    }
    if tag.len() > MAX_TAG_LEN {
        return Err("tag longer than 128 characters");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err("tag contains invalid characters");
    }
    Ok(())
}

fn validate_repository(repository: &str, original: &str) -> Result<()> {
    let valid = !repository.is_empty()
        && repository.split('/').all(|component| {
            !component.is_empty()
                && component.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
                })
        });
    if valid {
        Ok(())
    } else {
        Err(RefsError::InvalidReference(format!(
            "Invalid repository '{}' in reference '{}'",
            repository, original
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890";

    #[test]
    fn test_parse_simple_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, Some("latest".to_string()));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_user_repo_with_tag() {
        let r = ImageReference::parse("myuser/myimage:v1.0").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "myuser/myimage");
        assert_eq!(r.tag, Some("v1.0".to_string()));
    }

    #[test]
    fn test_parse_custom_registry() {
        let r = ImageReference::parse("ghcr.io/a3s-lab/refs:v0.1.0").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "a3s-lab/refs");
        assert_eq!(r.tag, Some("v0.1.0".to_string()));
    }

    #[test]
    fn test_parse_registry_with_port_no_tag() {
        let r = ImageReference::parse("localhost:5000/app").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "app");
        assert_eq!(r.tag, Some("latest".to_string()));
    }

    #[test]
    fn test_parse_registry_with_port_and_tag() {
        let r = ImageReference::parse("myregistry.io:5000/myimage:v1").unwrap();
        assert_eq!(r.registry, "myregistry.io:5000");
        assert_eq!(r.repository, "myimage");
        assert_eq!(r.tag, Some("v1".to_string()));
    }

    #[test]
    fn test_parse_digest_only() {
        let r = ImageReference::parse(&format!("ghcr.io/org/app@sha256:{}", HEX)).unwrap();
        assert_eq!(r.tag, None);
        assert_eq!(r.digest.unwrap().hex(), HEX);
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse(&format!("ghcr.io/org/app:v1@sha256:{}", HEX)).unwrap();
        assert_eq!(r.tag, Some("v1".to_string()));
        assert!(r.digest.is_some());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in [
            "",
            "   ",
            "nginx@invaliddigest",
            "nginx@sha256:abc",
            "ghcr.io/",
            "Upper/Case",
            "nginx:",
            "nginx:-bad",
            "a//b",
        ] {
            assert!(
                matches!(ImageReference::parse(bad), Err(RefsError::InvalidReference(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_whitespace_is_trimmed() {
        let r = ImageReference::parse("  nginx  ").unwrap();
        assert_eq!(r.repository, "library/nginx");
    }

    #[test]
    fn test_full_reference_round_trip() {
        for s in [
            "ghcr.io/org/app:v1".to_string(),
            format!("localhost:5000/app@sha256:{}", HEX),
            format!("ghcr.io/org/sub/app:v1@sha256:{}", HEX),
        ] {
            let r = ImageReference::parse(&s).unwrap();
            assert_eq!(r.full_reference(), s);
            assert_eq!(ImageReference::parse(&r.to_string()).unwrap(), r);
        }
    }

    #[test]
    fn test_with_digest_drops_tag() {
        let r = ImageReference::parse("ghcr.io/org/app:v1").unwrap();
        let digest: ContentHash = format!("sha256:{}", HEX).parse().unwrap();
        let by_digest = r.with_digest(digest);
        assert_eq!(by_digest.to_string(), format!("ghcr.io/org/app@sha256:{}", HEX));
    }

    #[test]
    fn test_with_tag() {
        let r = ImageReference::parse(&format!("ghcr.io/org/app@sha256:{}", HEX)).unwrap();
        let tagged = r.with_tag(format!("sha256-{}", HEX)).unwrap();
        assert_eq!(tagged.tag.as_deref(), Some(format!("sha256-{}", HEX).as_str()));
        assert!(tagged.digest.is_none());
        assert!(r.with_tag("bad tag").is_err());
    }

    #[test]
    fn test_repository_name() {
        let r = ImageReference::parse("nginx:1.25").unwrap();
        assert_eq!(r.repository_name(), "docker.io/library/nginx");
        assert_eq!(format!("{}", r), "docker.io/library/nginx:1.25");
    }
}
