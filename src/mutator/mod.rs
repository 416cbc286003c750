//! Reference mutator
//!
//! One invocation loads the manifest, locates the group(s) for the
//! request's framework condition, mutates them (or does nothing), and
//! writes the manifest back only when something changed.

use log::{debug, info, warn};

use crate::manifest::{GroupId, Manifest, ManifestError, Upsert};
use crate::models::{
    DeclarationLocation, FrameworkCondition, MutationOutcome, MutationRequest, PackageId,
    ScopeOverlapPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Add => write!(f, "add"),
            Operation::Remove => write!(f, "remove"),
        }
    }
}

/// Stateless: every call works on the manifest it is given
pub struct ReferenceMutator;

impl ReferenceMutator {
    /// Load, mutate, and persist in one unit of work
    ///
    /// Nothing is written when the outcome is `NotFound` or when loading fails.
    pub fn execute(
        operation: Operation,
        request: &MutationRequest,
        fallback_indent: &str,
    ) -> Result<MutationOutcome, ManifestError> {
        let mut manifest = Manifest::load_with_indent(&request.project_path, fallback_indent)?;
        debug!(
            "{} {} ({}) in {}",
            operation,
            request.package,
            request.condition,
            request.project_path.display()
        );

        let outcome = match operation {
            Operation::Add => Self::add(&mut manifest, request),
            Operation::Remove => Self::remove(&mut manifest, request),
        };

        if outcome.requires_persist() {
            manifest.save()?;
        } else {
            debug!("No changes to write for {}", request.project_path.display());
        }
        Ok(outcome)
    }

    /// Upsert a declaration into the group for the request's condition
    pub fn add(manifest: &mut Manifest, request: &MutationRequest) -> MutationOutcome {
        if request.package.is_empty() {
            warn!("Refusing to add a reference without a package id");
            return MutationOutcome::MissingPackage;
        }
        if !request.condition.is_unconditioned() {
            Self::resolve_scope_overlap(manifest, request);
        }

        let (group, created_group) = manifest.ensure_group(&request.condition);
        let upsert =
            manifest.upsert_declaration(group, &request.package, request.version.as_deref());

        match upsert {
            Some(Upsert::Replaced { previous }) => {
                info!(
                    "Updated {} from {} to {}",
                    request.package,
                    previous.as_deref().unwrap_or("(none)"),
                    request.version.as_deref().unwrap_or("(unchanged)")
                );
                MutationOutcome::Updated {
                    previous_version: previous,
                }
            }
            // ensure_group just handed us this id, so it always resolves
            Some(Upsert::Inserted) | None => {
                info!("Added {} for {}", request.package, request.condition);
                MutationOutcome::Added { created_group }
            }
        }
    }

    fn resolve_scope_overlap(manifest: &mut Manifest, request: &MutationRequest) {
        let unconditioned = manifest.groups_matching(&FrameworkCondition::Unconditioned);
        let overlapping: Vec<GroupId> = unconditioned
            .into_iter()
            .filter(|&id| {
                manifest
                    .group(id)
                    .map_or(false, |g| g.has_declaration(&request.package))
            })
            .collect();
        if overlapping.is_empty() {
            return;
        }

        match request.scope_overlap {
            ScopeOverlapPolicy::Keep => {
                warn!(
                    "{} is also declared for all frameworks; the {} declaration adds to it",
                    request.package, request.condition
                );
            }
            ScopeOverlapPolicy::RemoveUnconditioned => {
                let mut touched = Vec::new();
                for id in overlapping {
                    if manifest.remove_declarations(id, &request.package) > 0 {
                        touched.push(id);
                    }
                }
                let pruned = Self::prune_touched(manifest, touched);
                info!(
                    "Removed unconditioned {} in favor of {} ({} group(s) pruned)",
                    request.package, request.condition, pruned
                );
            }
        }
    }

    /// Remove the package from every group in scope
    ///
    /// Without a framework condition every group is searched; with one,
    /// only groups carrying that condition are.
    pub fn remove(manifest: &mut Manifest, request: &MutationRequest) -> MutationOutcome {
        if request.package.is_empty() {
            warn!("Refusing to remove a reference without a package id");
            return MutationOutcome::MissingPackage;
        }
        let targets: Vec<GroupId> = if request.condition.is_unconditioned() {
            manifest.groups().map(|g| g.id()).collect()
        } else {
            manifest.groups_matching(&request.condition)
        };

        let mut removed = 0;
        let mut touched = Vec::new();
        for id in targets {
            let count = manifest.remove_declarations(id, &request.package);
            if count > 0 {
                removed += count;
                touched.push(id);
            }
        }

        if removed == 0 {
            info!(
                "{} is not referenced for {} in {}",
                request.package,
                request.condition,
                manifest.path().display()
            );
            return MutationOutcome::NotFound;
        }

        let pruned_groups = Self::prune_touched(manifest, touched);
        info!(
            "Removed {} declaration(s) of {} ({} group(s) pruned)",
            removed, request.package, pruned_groups
        );
        MutationOutcome::Removed {
            removed,
            pruned_groups,
        }
    }

    /// Prune touched groups from the back so earlier ids stay valid
    fn prune_touched(manifest: &mut Manifest, mut touched: Vec<GroupId>) -> usize {
        touched.sort_unstable_by(|a, b| b.cmp(a));
        touched.dedup();
        touched
            .into_iter()
            .filter(|&id| manifest.prune_if_empty(id))
            .count()
    }

    /// Every declaration of `package`, optionally restricted to one condition
    pub fn query(
        manifest: &Manifest,
        package: &PackageId,
        condition: Option<&FrameworkCondition>,
    ) -> Vec<DeclarationLocation> {
        manifest
            .groups()
            .filter(|g| condition.map_or(true, |c| &g.condition() == c))
            .flat_map(|g| {
                let attr = g.condition().to_attribute();
                g.declarations()
                    .into_iter()
                    .filter(move |d| &d.id == package)
                    .map(move |d| DeclarationLocation {
                        package: d.id.to_string(),
                        version: d.version,
                        condition: attr.clone(),
                    })
            })
            .collect()
    }

    pub fn contains(
        manifest: &Manifest,
        package: &PackageId,
        condition: Option<&FrameworkCondition>,
    ) -> bool {
        !Self::query(manifest, package, condition).is_empty()
    }
}
