//! Data models shared by the manifest accessor and the reference mutator
//!
//! These are plain values: nothing here touches the filesystem.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Exit code for an applied mutation
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for a failed mutation (including "nothing to remove")
pub const EXIT_FAILURE: i32 = 1;

static TARGET_FRAMEWORK_CONDITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*'\$\(TargetFramework\)'\s*==\s*'\s*([^']*?)\s*'\s*$").unwrap()
});

/// Package identifier with a case-insensitive comparison key
///
/// The display value keeps the casing the user (or the manifest) wrote;
/// equality and hashing only look at the lowercase key.
#[derive(Debug, Clone, Eq)]
pub struct PackageId {
    display: String,
    key: String,
}

impl PackageId {
    pub fn new(id: impl Into<String>) -> Self {
        let display = id.into().trim().to_string();
        let key = display.to_lowercase();
        Self { display, key }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Lowercase comparison key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Blank input trims down to an empty id, which no manifest entry can carry
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl std::hash::Hash for PackageId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display)
    }
}

/// Selector deciding which group a declaration belongs to
#[derive(Debug, Clone, Eq)]
pub enum FrameworkCondition {
    /// Applies to every target framework (no `Condition` attribute)
    Unconditioned,
    /// `'$(TargetFramework)' == '<moniker>'`
    Framework(String),
    /// Any other condition text found in a manifest
    Expression(String),
}

impl FrameworkCondition {
    /// Condition for a single framework moniker; blank input means unconditioned
    pub fn framework(moniker: &str) -> Self {
        let moniker = moniker.trim();
        if moniker.is_empty() {
            FrameworkCondition::Unconditioned
        } else {
            FrameworkCondition::Framework(moniker.to_string())
        }
    }

    /// Interpret the raw `Condition` attribute of a group
    pub fn from_attribute(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return FrameworkCondition::Unconditioned;
        };
        if raw.trim().is_empty() {
            return FrameworkCondition::Unconditioned;
        }
        match TARGET_FRAMEWORK_CONDITION.captures(raw) {
            Some(caps) => FrameworkCondition::framework(&caps[1]),
            None => FrameworkCondition::Expression(raw.to_string()),
        }
    }

    /// Attribute value to write for a newly created group
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            FrameworkCondition::Unconditioned => None,
            FrameworkCondition::Framework(moniker) => {
                Some(format!("'$(TargetFramework)' == '{}'", moniker))
            }
            FrameworkCondition::Expression(raw) => Some(raw.clone()),
        }
    }

    pub fn is_unconditioned(&self) -> bool {
        matches!(self, FrameworkCondition::Unconditioned)
    }

    /// Normalized form used for equality
    pub fn normalized_key(&self) -> String {
        match self {
            FrameworkCondition::Unconditioned => String::new(),
            FrameworkCondition::Framework(moniker) => {
                format!("'$(targetframework)'=='{}'", moniker.to_ascii_lowercase())
            }
            FrameworkCondition::Expression(raw) => {
                raw.chars().filter(|c| !c.is_whitespace()).collect()
            }
        }
    }
}

impl PartialEq for FrameworkCondition {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_key() == other.normalized_key()
    }
}

impl std::fmt::Display for FrameworkCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameworkCondition::Unconditioned => write!(f, "all frameworks"),
            FrameworkCondition::Framework(moniker) => write!(f, "{}", moniker),
            FrameworkCondition::Expression(raw) => write!(f, "{}", raw),
        }
    }
}

/// A single `(package id, version constraint)` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: PackageId,
    pub version: Option<String>,
}

/// What `add` does with an unconditioned declaration of the same package
/// when the new declaration targets a single framework
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeOverlapPolicy {
    /// Leave the unconditioned declaration in place
    #[default]
    Keep,
    /// Drop the unconditioned declaration so only the scoped one remains
    RemoveUnconditioned,
}

impl std::fmt::Display for ScopeOverlapPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeOverlapPolicy::Keep => write!(f, "keep"),
            ScopeOverlapPolicy::RemoveUnconditioned => write!(f, "remove-unconditioned"),
        }
    }
}

impl std::str::FromStr for ScopeOverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(ScopeOverlapPolicy::Keep),
            "remove-unconditioned" => Ok(ScopeOverlapPolicy::RemoveUnconditioned),
            _ => Err(format!(
                "Invalid scope overlap policy: {}. Use: keep, remove-unconditioned",
                s
            )),
        }
    }
}

/// One invocation's worth of arguments, already parsed by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub package: PackageId,
    pub version: Option<String>,
    pub project_path: PathBuf,
    pub condition: FrameworkCondition,
    pub scope_overlap: ScopeOverlapPolicy,
}

impl MutationRequest {
    pub fn new(package: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            package: PackageId::new(package),
            version: None,
            project_path: project_path.into(),
            condition: FrameworkCondition::Unconditioned,
            scope_overlap: ScopeOverlapPolicy::default(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_framework(mut self, framework: Option<&str>) -> Self {
        self.condition = match framework {
            Some(moniker) => FrameworkCondition::framework(moniker),
            None => FrameworkCondition::Unconditioned,
        };
        self
    }

    pub fn with_scope_overlap(mut self, policy: ScopeOverlapPolicy) -> Self {
        self.scope_overlap = policy;
        self
    }
}

/// Result of running the mutator against an in-memory manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// A new declaration was appended
    Added { created_group: bool },
    /// An existing declaration had its version replaced
    Updated { previous_version: Option<String> },
    /// Matching declarations were removed
    Removed { removed: usize, pruned_groups: usize },
    /// Remove target absent from the requested scope
    NotFound,
    /// The request named no package; nothing was touched
    MissingPackage,
}

impl MutationOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            MutationOutcome::NotFound | MutationOutcome::MissingPackage => EXIT_FAILURE,
            _ => EXIT_SUCCESS,
        }
    }

    /// Whether the manifest has to be written back
    pub fn requires_persist(&self) -> bool {
        !matches!(
            self,
            MutationOutcome::NotFound | MutationOutcome::MissingPackage
        )
    }
}

/// Where a declaration was found
#[derive(Debug, Clone, Serialize)]
pub struct DeclarationLocation {
    pub package: String,
    pub version: Option<String>,
    pub condition: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_id_is_case_insensitive() {
        let a = PackageId::new("Newtonsoft.Json");
        let b = PackageId::new("newtonsoft.json");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Newtonsoft.Json");
        assert_eq!(PackageId::new(" NEWTONSOFT.JSON ").key(), "newtonsoft.json");
        assert!(PackageId::new("  ").is_empty());
    }

    #[test]
    fn test_condition_parses_target_framework() {
        let cond = FrameworkCondition::from_attribute(Some(" '$(TargetFramework)'=='net46' "));
        assert_eq!(cond, FrameworkCondition::Framework("net46".to_string()));
        assert_eq!(cond, FrameworkCondition::framework("NET46"));
    }

    #[test]
    fn test_blank_condition_is_unconditioned() {
        assert!(FrameworkCondition::from_attribute(None).is_unconditioned());
        assert!(FrameworkCondition::from_attribute(Some("  ")).is_unconditioned());
        assert!(FrameworkCondition::framework("").is_unconditioned());
    }

    #[test]
    fn test_expression_conditions_ignore_whitespace() {
        let a = FrameworkCondition::from_attribute(Some("'$(Configuration)' == 'Debug'"));
        let b = FrameworkCondition::from_attribute(Some("'$(Configuration)'=='Debug'"));
        assert_eq!(a, b);
        assert_ne!(a, FrameworkCondition::Unconditioned);
    }

    #[test]
    fn test_condition_attribute_round_trip() {
        let cond = FrameworkCondition::framework("netcoreapp1.0");
        let attr = cond.to_attribute().unwrap();
        assert_eq!(attr, "'$(TargetFramework)' == 'netcoreapp1.0'");
        assert_eq!(FrameworkCondition::from_attribute(Some(&attr)), cond);
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(MutationOutcome::NotFound.exit_code(), EXIT_FAILURE);
        assert!(!MutationOutcome::NotFound.requires_persist());
        let removed = MutationOutcome::Removed {
            removed: 1,
            pruned_groups: 1,
        };
        assert_eq!(removed.exit_code(), EXIT_SUCCESS);
        assert!(removed.requires_persist());
        assert_eq!(MutationOutcome::MissingPackage.exit_code(), EXIT_FAILURE);
        assert!(!MutationOutcome::MissingPackage.requires_persist());
    }

    #[test]
    fn test_scope_overlap_parse() {
        assert_eq!("keep".parse::<ScopeOverlapPolicy>(), Ok(ScopeOverlapPolicy::Keep));
        assert_eq!(
            "Remove-Unconditioned".parse::<ScopeOverlapPolicy>(),
            Ok(ScopeOverlapPolicy::RemoveUnconditioned)
        );
        assert!("drop".parse::<ScopeOverlapPolicy>().is_err());
    }
}
