use crate::error::{ReaperError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host marker shared by every ECR registry endpoint.
pub const ECR_HOST_MARKER: &str = ".dkr.ecr.";

// ---------------------------------------------------------------------------
// ImageReference
// ---------------------------------------------------------------------------

/// A parsed `[registry/]repository[:tag][@digest]` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() || input.chars().any(char::is_whitespace) {
            return Err(ReaperError::InvalidReference(input.to_string()));
        }

        let (name_and_tag, digest) = match input.split_once('@') {
            Some((rest, digest)) if !digest.is_empty() => (rest, Some(digest.to_string())),
            Some(_) => return Err(ReaperError::InvalidReference(input.to_string())),
            None => (input, None),
        };

        // A ':' after the last '/' starts the tag; earlier ones belong to a host port.
        let last_slash = name_and_tag.rfind('/');
        let (name, tag) = match name_and_tag.rfind(':') {
            Some(colon) if last_slash.map_or(true, |s| colon > s) => {
                let tag = &name_and_tag[colon + 1..];
                if tag.is_empty() {
                    return Err(ReaperError::InvalidReference(input.to_string()));
                }
                (&name_and_tag[..colon], Some(tag.to_string()))
            }
            _ => (name_and_tag, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if looks_like_host(first) => (Some(first.to_string()), rest),
            _ => (None, name),
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(ReaperError::InvalidReference(input.to_string()));
        }

        Ok(Self {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn looks_like_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

// ---------------------------------------------------------------------------
// ReferenceFilter
// ---------------------------------------------------------------------------

/// Decides which running-container images are worth tracking as active.
///
/// Only tagged references can match a `uri:tag` reference built from the
/// inventory, so untagged and digest-pinned images are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFilter {
    /// Substring the registry host must contain, e.g. `.dkr.ecr.`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_marker: Option<String>,
}

impl ReferenceFilter {
    pub fn ecr() -> Self {
        Self {
            host_marker: Some(ECR_HOST_MARKER.to_string()),
        }
    }

    pub fn accepts(&self, image: &str) -> bool {
        let Ok(reference) = ImageReference::parse(image) else {
            return false;
        };
        if reference.tag().is_none() || reference.digest().is_some() {
            return false;
        }
        match &self.host_marker {
            Some(marker) => reference
                .registry()
                .is_some_and(|host| host.contains(marker.as_str())),
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ecr_reference() {
        let r = ImageReference::parse("123.dkr.ecr.us-east-1.amazonaws.com/team/web:v42").unwrap();
        assert_eq!(r.registry(), Some("123.dkr.ecr.us-east-1.amazonaws.com"));
        assert_eq!(r.repository(), "team/web");
        assert_eq!(r.tag(), Some("v42"));
        assert_eq!(r.digest(), None);
    }

    #[test]
    fn host_port_is_not_a_tag() {
        let r = ImageReference::parse("localhost:5000/web").unwrap();
        assert_eq!(r.registry(), Some("localhost:5000"));
        assert_eq!(r.repository(), "web");
        assert_eq!(r.tag(), None);
    }

    #[test]
    fn bare_name_has_no_registry() {
        let r = ImageReference::parse("nginx:1.25").unwrap();
        assert_eq!(r.registry(), None);
        assert_eq!(r.repository(), "nginx");
        assert_eq!(r.tag(), Some("1.25"));
    }

    #[test]
    fn digest_pinned_reference() {
        let r = ImageReference::parse("ghcr.io/org/app@sha256:abc").unwrap();
        assert_eq!(r.digest(), Some("sha256:abc"));
        assert_eq!(r.tag(), None);
        assert_eq!(r.to_string(), "ghcr.io/org/app@sha256:abc");
    }

    #[test]
    fn rejects_garbage() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("web:").is_err());
        assert!(ImageReference::parse("a b:c").is_err());
        assert!(ImageReference::parse("app@").is_err());
    }

    #[test]
    fn ecr_filter_requires_ecr_host_and_tag() {
        let filter = ReferenceFilter::ecr();
        assert!(filter.accepts("123.dkr.ecr.us-east-1.amazonaws.com/web:v1"));
        assert!(!filter.accepts("123.dkr.ecr.us-east-1.amazonaws.com/web"));
        assert!(!filter.accepts("docker.io/library/nginx:1.25"));
        assert!(!filter.accepts("123.dkr.ecr.us-east-1.amazonaws.com/web@sha256:abc"));
    }

    #[test]
    fn open_filter_only_requires_tag() {
        let filter = ReferenceFilter::default();
        assert!(filter.accepts("nginx:1.25"));
        assert!(!filter.accepts("nginx"));
    }
}
