//! CLI commands for pkgref

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::config::{save_config, Config, PkgrefPaths};
use crate::details_uri::PackageDetailsUriResolver;
use crate::manifest::Manifest;
use crate::models::{MutationOutcome, MutationRequest, EXIT_FAILURE, EXIT_SUCCESS};
use crate::mutator::{Operation, ReferenceMutator};
use crate::validation::lint_manifest;
use crate::version::NuGetVersion;

/// Runs one package reference mutation and returns the process exit code
pub trait PackageReferenceCommandRunner {
    fn execute_command(&self, request: &MutationRequest) -> Result<i32>;
}

/// Adds (or updates) a package reference
pub struct AddPackageReferenceCommandRunner {
    fallback_indent: String,
}

impl AddPackageReferenceCommandRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            fallback_indent: config.formatting.indent.clone(),
        }
    }
}

impl Default for AddPackageReferenceCommandRunner {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl PackageReferenceCommandRunner for AddPackageReferenceCommandRunner {
    fn execute_command(&self, request: &MutationRequest) -> Result<i32> {
        let outcome = ReferenceMutator::execute(Operation::Add, request, &self.fallback_indent)?;
        let project = request.project_path.display();
        match &outcome {
            MutationOutcome::Added { created_group } => {
                println!(
                    "✓ Added {} {} to {} ({})",
                    request.package,
                    request.version.as_deref().unwrap_or(""),
                    project,
                    request.condition
                );
                if *created_group {
                    println!("  Created a new group for {}", request.condition);
                }
            }
            MutationOutcome::Updated { previous_version } => {
                println!(
                    "✓ Updated {} in {}: {} → {}",
                    request.package,
                    project,
                    previous_version.as_deref().unwrap_or("(none)"),
                    request.version.as_deref().unwrap_or("(unchanged)")
                );
            }
            MutationOutcome::MissingPackage => {
                eprintln!("✗ No package id given for {}", project);
            }
            _ => {}
        }
        Ok(outcome.exit_code())
    }
}

/// Removes a package reference
pub struct RemovePackageReferenceCommandRunner {
    fallback_indent: String,
}

impl RemovePackageReferenceCommandRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            fallback_indent: config.formatting.indent.clone(),
        }
    }
}

impl Default for RemovePackageReferenceCommandRunner {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl PackageReferenceCommandRunner for RemovePackageReferenceCommandRunner {
    fn execute_command(&self, request: &MutationRequest) -> Result<i32> {
        let outcome = ReferenceMutator::execute(Operation::Remove, request, &self.fallback_indent)?;
        let project = request.project_path.display();
        match &outcome {
            MutationOutcome::Removed {
                removed,
                pruned_groups,
            } => {
                println!(
                    "✓ Removed {} from {} ({} declaration(s))",
                    request.package, project, removed
                );
                if *pruned_groups > 0 {
                    println!("  Pruned {} empty group(s)", pruned_groups);
                }
            }
            MutationOutcome::NotFound => {
                eprintln!(
                    "✗ {} is not referenced for {} in {}",
                    request.package, request.condition, project
                );
            }
            MutationOutcome::MissingPackage => {
                eprintln!("✗ No package id given for {}", project);
            }
            _ => {}
        }
        Ok(outcome.exit_code())
    }
}

fn ensure_package_named(package: &str) -> Result<()> {
    if package.trim().is_empty() {
        bail!("A package id is required");
    }
    Ok(())
}

fn ensure_project_exists(project: &Path) -> Result<()> {
    if !project.is_file() {
        bail!("Project file not found: {}", project.display());
    }
    Ok(())
}

/// Add a package reference
pub fn add(
    package: &str,
    version: &str,
    project: &Path,
    framework: Option<&str>,
    config: &Config,
    runner: &dyn PackageReferenceCommandRunner,
) -> Result<i32> {
    ensure_package_named(package)?;
    ensure_project_exists(project)?;
    if version.trim().is_empty() {
        bail!("A version is required to add {}", package);
    }
    let request = MutationRequest::new(package, project)
        .with_version(version.trim())
        .with_framework(framework)
        .with_scope_overlap(config.add.scope_overlap);
    runner.execute_command(&request)
}

/// Remove a package reference
pub fn remove(
    package: &str,
    project: &Path,
    framework: Option<&str>,
    runner: &dyn PackageReferenceCommandRunner,
) -> Result<i32> {
    ensure_package_named(package)?;
    ensure_project_exists(project)?;
    let request = MutationRequest::new(package, project).with_framework(framework);
    runner.execute_command(&request)
}

#[derive(Debug, Serialize)]
struct DeclarationListing {
    package: String,
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct GroupListing {
    condition: Option<String>,
    framework: String,
    declarations: Vec<DeclarationListing>,
}

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Summary,
}

/// List package references grouped by framework condition
pub fn list(project: &Path, format: OutputFormat, config: &Config) -> Result<i32> {
    let manifest = Manifest::load_with_indent(project, &config.formatting.indent)?;

    let groups: Vec<GroupListing> = manifest
        .groups()
        .filter(|g| g.has_declarations())
        .map(|g| GroupListing {
            condition: g.condition().to_attribute(),
            framework: g.condition().to_string(),
            declarations: g
                .declarations()
                .into_iter()
                .map(|d| DeclarationListing {
                    package: d.id.to_string(),
                    version: d.version,
                })
                .collect(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&groups)?;
            println!("{}", json);
        }
        OutputFormat::Summary => {
            if groups.is_empty() {
                println!("No package references in {}", project.display());
                return Ok(EXIT_SUCCESS);
            }
            println!("{:<40} {:<20} {:<20}", "PACKAGE", "VERSION", "FRAMEWORK");
            println!("{}", "-".repeat(80));
            for group in &groups {
                for d in &group.declarations {
                    println!(
                        "{:<40} {:<20} {:<20}",
                        truncate(&d.package, 38),
                        d.version.as_deref().unwrap_or("-"),
                        group.framework
                    );
                }
            }

            let warnings = lint_manifest(&manifest);
            if !warnings.is_empty() {
                println!();
                for warning in &warnings {
                    println!("⚠ {}", warning);
                }
            }
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Resolve a package details URI from a template
pub fn details_uri(
    id: &str,
    version: &str,
    template: Option<&str>,
    config: &Config,
) -> Result<i32> {
    let template = template
        .or(config.feed.package_details_uri.as_deref())
        .context("No package details URI template given and none configured in config.toml")?;

    let Some(resolver) = PackageDetailsUriResolver::create_or_none(template) else {
        eprintln!("✗ Not a usable URI template: {}", template);
        return Ok(EXIT_FAILURE);
    };
    let version = NuGetVersion::parse(version)
        .with_context(|| format!("Invalid version for {}", id))?;

    println!("{}", resolver.resolve(id, &version));
    Ok(EXIT_SUCCESS)
}

/// Write a default config file (first-time setup)
pub fn init(paths: &PkgrefPaths) -> Result<i32> {
    if paths.is_initialized() {
        println!("pkgref is already initialized at {}", paths.root.display());
        return Ok(EXIT_SUCCESS);
    }

    paths.ensure_dirs()?;
    save_config(&Config::default(), &paths.config)?;
    println!("✓ Created {}", paths.config.display());
    Ok(EXIT_SUCCESS)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 3).collect();
        format!("{}...", kept)
    }
}
