// Shared fixtures: SDK-style project files written into a temp directory

#![allow(dead_code)]

use anyhow::Result;
use pkgref::manifest::{Group, Manifest};
use pkgref::models::FrameworkCondition;
use std::fs;
use std::path::{Path, PathBuf};

pub struct TestPackage<'a> {
    pub id: &'a str,
    pub version: &'a str,
}

pub fn package_x() -> TestPackage<'static> {
    TestPackage {
        id: "packageX",
        version: "1.0.0",
    }
}

/// Write `<name>.csproj` targeting `frameworks` ("net46" or "net46; netcoreapp1.0")
///
/// With a package, its reference goes in the unconditioned group, or in the
/// group for `package_framework` when one is given.
pub fn create_project(
    dir: &Path,
    name: &str,
    frameworks: &str,
    package: Option<&TestPackage<'_>>,
    package_framework: Option<&str>,
) -> Result<PathBuf> {
    let monikers: Vec<&str> = frameworks
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let framework_property = if monikers.len() == 1 {
        format!("<TargetFramework>{}</TargetFramework>", monikers[0])
    } else {
        format!("<TargetFrameworks>{}</TargetFrameworks>", monikers.join(";"))
    };

    let mut project = String::new();
    project.push_str("<Project Sdk=\"Microsoft.NET.Sdk\">\n");
    project.push_str("  <PropertyGroup>\n");
    project.push_str(&format!("    {}\n", framework_property));
    project.push_str("  </PropertyGroup>\n");
    if let Some(package) = package {
        match package_framework {
            Some(framework) => project.push_str(&format!(
                "  <ItemGroup Condition=\"'$(TargetFramework)' == '{}'\">\n",
                framework
            )),
            None => project.push_str("  <ItemGroup>\n"),
        }
        project.push_str(&format!(
            "    <PackageReference Include=\"{}\" Version=\"{}\" />\n",
            package.id, package.version
        ));
        project.push_str("  </ItemGroup>\n");
    }
    project.push_str("</Project>\n");

    let path = dir.join(format!("{}.csproj", name));
    fs::write(&path, project)?;
    Ok(path)
}

pub fn load(path: &Path) -> Result<Manifest> {
    Ok(Manifest::load(path)?)
}

pub fn item_group_for_all_frameworks(manifest: &Manifest) -> Option<Group<'_>> {
    manifest
        .find_group(&FrameworkCondition::Unconditioned)
        .and_then(|id| manifest.group(id))
}

pub fn item_group_for_framework<'a>(manifest: &'a Manifest, framework: &str) -> Option<Group<'a>> {
    manifest
        .find_group(&FrameworkCondition::framework(framework))
        .and_then(|id| manifest.group(id))
}
