//! Package version parsing and normalization
//!
//! Versions carry up to four numeric components plus optional release
//! labels and build metadata: `1.0.0.0-ALPHA+git`. The normalized string
//! drops a zero revision and the metadata.

use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$",
    )
    .unwrap()
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("'{0}' is not a valid version string")]
    Invalid(String),

    #[error("Version component '{0}' is out of range")]
    ComponentOutOfRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NuGetVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub release: Option<String>,
    pub metadata: Option<String>,
}

impl NuGetVersion {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let caps = VERSION_PATTERN
            .captures(trimmed)
            .ok_or_else(|| VersionError::Invalid(input.to_string()))?;

        let component = |idx: usize| -> Result<u64, VersionError> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse::<u64>()
                    .map_err(|_| VersionError::ComponentOutOfRange(m.as_str().to_string())),
                None => Ok(0),
            }
        };

        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
            revision: component(4)?,
            release: caps.get(5).map(|m| m.as_str().to_string()),
            metadata: caps.get(6).map(|m| m.as_str().to_string()),
        })
    }
}

impl std::fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(release) = &self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for NuGetVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NuGetVersion::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_zero_revision_and_metadata() {
        let v = NuGetVersion::parse("1.0.0.0-ALPHA+git").unwrap();
        assert_eq!(v.to_string(), "1.0.0-ALPHA");
        assert_eq!(v.metadata.as_deref(), Some("git"));
    }

    #[test]
    fn test_keeps_non_zero_revision() {
        let v = NuGetVersion::parse("2.1.3.4").unwrap();
        assert_eq!(v.to_string(), "2.1.3.4");
        assert_eq!(v.release, None);
    }

    #[test]
    fn test_fills_missing_components() {
        assert_eq!(NuGetVersion::parse("1").unwrap().to_string(), "1.0.0");
        assert_eq!(NuGetVersion::parse("1.2").unwrap().to_string(), "1.2.0");
    }

    #[test]
    fn test_dotted_release_labels() {
        let v: NuGetVersion = "3.0.0-beta.2".parse().unwrap();
        assert_eq!(v.release.as_deref(), Some("beta.2"));
        assert_eq!(v.to_string(), "3.0.0-beta.2");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            NuGetVersion::parse("not-a-version"),
            Err(VersionError::Invalid(_))
        ));
        assert!(NuGetVersion::parse("1.0.0-").is_err());
        assert!(NuGetVersion::parse("1.0.0.0.0").is_err());
        assert!(matches!(
            NuGetVersion::parse("99999999999999999999999.0"),
            Err(VersionError::ComponentOutOfRange(_))
        ));
    }
}
