//! Package details URI templates
//!
//! Feeds advertise a template such as
//! `https://www.nuget.org/packages/{id}/{version}`; resolving it is plain
//! text substitution of the two placeholders.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::version::NuGetVersion;

pub const ID_PLACEHOLDER: &str = "{id}";
pub const VERSION_PLACEHOLDER: &str = "{version}";

static ABSOLUTE_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://[^\s/?#]+\S*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDetailsUriResolver {
    template: String,
}

impl PackageDetailsUriResolver {
    /// `None` for a blank template or one that is not an absolute URI
    pub fn create_or_none(template: &str) -> Option<Self> {
        let template = template.trim();
        if template.is_empty() || !ABSOLUTE_URI.is_match(template) {
            return None;
        }
        Some(Self {
            template: template.to_string(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitute `{id}` with `id` and `{version}` with the normalized version
    ///
    /// No percent-encoding is applied.
    pub fn resolve(&self, id: &str, version: &NuGetVersion) -> String {
        self.template
            .replace(ID_PLACEHOLDER, id)
            .replace(VERSION_PLACEHOLDER, &version.to_string())
    }
}
