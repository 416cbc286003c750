//! Reference checks and manifest linting

use std::collections::HashSet;

use crate::manifest::{Group, Manifest};
use crate::models::PackageId;

/// Whether `group` declares `package` with exactly `version`
pub fn validate_reference(group: &Group<'_>, package: &PackageId, version: &str) -> bool {
    group
        .declaration(package)
        .map_or(false, |d| d.version.as_deref() == Some(version))
}

/// Whether no group anywhere in the manifest declares `package`
pub fn validate_no_reference(manifest: &Manifest, package: &PackageId) -> bool {
    manifest.groups().all(|g| !g.has_declaration(package))
}

/// Check for common manifest issues (lint-like checks)
pub fn lint_manifest(manifest: &Manifest) -> Vec<String> {
    let mut warnings = Vec::new();

    // Only groups holding declarations count; other item groups may repeat conditions
    let mut seen_conditions = HashSet::new();
    for group in manifest.groups().filter(|g| g.has_declarations()) {
        let condition = group.condition();
        if !seen_conditions.insert(condition.normalized_key()) {
            warnings.push(format!("More than one package group for {}", condition));
        }

        let mut seen_packages = HashSet::new();
        for declaration in group.declarations() {
            if !seen_packages.insert(declaration.id.key().to_string()) {
                warnings.push(format!(
                    "{}: Declared more than once for {}",
                    declaration.id, condition
                ));
            }
            match declaration.version.as_deref() {
                None => warnings.push(format!("{}: No version specified", declaration.id)),
                Some(v) if v.trim().is_empty() => {
                    warnings.push(format!("{}: Empty version", declaration.id))
                }
                _ => {}
            }
        }
    }

    let unconditioned: HashSet<String> = manifest
        .groups()
        .filter(|g| g.condition().is_unconditioned())
        .flat_map(|g| g.declarations().into_iter().map(|d| d.id.key().to_string()))
        .collect();
    for group in manifest.groups().filter(|g| !g.condition().is_unconditioned()) {
        for declaration in group.declarations() {
            if unconditioned.contains(declaration.id.key()) {
                warnings.push(format!(
                    "{}: Declared for all frameworks and again for {}",
                    declaration.id,
                    group.condition()
                ));
            }
        }
    }

    warnings
}
