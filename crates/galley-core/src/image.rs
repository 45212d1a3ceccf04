//! Container image references.

use std::fmt;

/// A parsed `[registry/]repository[:tag][@digest]` reference.
///
/// # Examples
///
/// ```
/// use galley_core::ImageRef;
///
/// let image = ImageRef::parse("python:3.7-alpine").unwrap();
/// assert_eq!(image.repository, "python");
/// assert_eq!(image.tag.as_deref(), Some("3.7-alpine"));
/// assert!(image.is_pinned());
///
/// assert!(!ImageRef::parse("python").unwrap().is_pinned());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Everything before the tag, registry and port included
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    pub fn parse(reference: &str) -> crate::Result<Self> {
        let invalid = |reason| crate::Error::InvalidImageRef {
            reference: reference.to_owned(),
            reason,
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) if digest.contains(':') => (name, Some(digest.to_owned())),
            Some(_) => return Err(invalid("digest must be algorithm:hex")),
            None => (reference, None),
        };

        // A ':' before the last '/' belongs to a registry port, not a tag.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_owned()))
            }
            None => (name, None),
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(invalid("missing repository name"));
        }
        if tag.as_deref() == Some("") {
            return Err(invalid("empty tag"));
        }

        Ok(Self {
            repository: repository.to_owned(),
            tag,
            digest,
        })
    }

    /// Whether the reference resolves to the same image over time.
    ///
    /// A digest always pins. A tag pins when it names a version: it must not
    /// be `latest` and must contain a digit.
    pub fn is_pinned(&self) -> bool {
        if self.digest.is_some() {
            return true;
        }
        match &self.tag {
            Some(tag) => tag != "latest" && tag.chars().any(|c| c.is_ascii_digit()),
            None => false,
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
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

impl std::str::FromStr for ImageRef {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}
