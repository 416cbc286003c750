//! Manifest accessor
//!
//! Loads a project file into an XML tree, exposes its `ItemGroup`
//! children as framework-conditioned groups of package references, and
//! writes the tree back atomically.

pub mod xml;

use log::debug;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::{Declaration, FrameworkCondition, PackageId};
use xml::{Document, Element};

pub const PROJECT_ELEMENT: &str = "Project";
pub const GROUP_ELEMENT: &str = "ItemGroup";
pub const REFERENCE_ELEMENT: &str = "PackageReference";

const CONDITION_ATTRIBUTE: &str = "Condition";
const INCLUDE_ATTRIBUTE: &str = "Include";
const VERSION_ATTRIBUTE: &str = "Version";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Project file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read project file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Project file {} is malformed: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to serialize project file {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: xml::XmlError,
    },

    #[error("Failed to write project file {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Position of a group among the root element's children
///
/// Ids stay valid until a group before them is removed; prune in
/// descending order when several groups are touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(usize);

/// Result of inserting or replacing a declaration in one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced { previous: Option<String> },
}

/// Read-only view of one group
#[derive(Debug, Clone, Copy)]
pub struct Group<'a> {
    id: GroupId,
    element: &'a Element,
}

impl<'a> Group<'a> {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn condition(&self) -> FrameworkCondition {
        FrameworkCondition::from_attribute(self.element.attribute(CONDITION_ATTRIBUTE).as_deref())
    }

    pub fn declarations(&self) -> Vec<Declaration> {
        self.element
            .child_elements()
            .filter_map(read_declaration)
            .collect()
    }

    pub fn declaration(&self, package: &PackageId) -> Option<Declaration> {
        self.declarations().into_iter().find(|d| &d.id == package)
    }

    pub fn has_declaration(&self, package: &PackageId) -> bool {
        self.declaration(package).is_some()
    }

    pub fn has_declarations(&self) -> bool {
        self.element
            .child_elements()
            .any(|el| read_declaration(el).is_some())
    }

    /// No child elements at all: neither declarations nor other items
    pub fn is_empty(&self) -> bool {
        !self.element.has_child_elements()
    }
}

fn read_declaration(el: &Element) -> Option<Declaration> {
    if !el.is_named(REFERENCE_ELEMENT) {
        return None;
    }
    let include = el.attribute(INCLUDE_ATTRIBUTE)?;
    if include.trim().is_empty() {
        return None;
    }
    let version = el.attribute(VERSION_ATTRIBUTE).or_else(|| {
        el.child_elements()
            .find(|child| child.is_named(VERSION_ATTRIBUTE))
            .map(|child| child.text().trim().to_string())
    });
    Some(Declaration {
        id: PackageId::new(include),
        version,
    })
}

fn declares(el: &Element, package: &PackageId) -> bool {
    read_declaration(el).map_or(false, |d| &d.id == package)
}

/// An in-memory project manifest, exclusively owned for one invocation
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    document: Document,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        Self::load_with_indent(path, "  ")
    }

    /// Load, indenting new elements with `fallback_indent` when the file gives no hint
    pub fn load_with_indent(
        path: impl AsRef<Path>,
        fallback_indent: &str,
    ) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ManifestError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ManifestError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let source = String::from_utf8(bytes).map_err(|e| ManifestError::Malformed {
            path: path.to_path_buf(),
            reason: format!("not valid UTF-8: {}", e.utf8_error()),
        })?;
        debug!("Loaded {} ({} bytes)", path.display(), source.len());
        Self::parse_with_indent(&source, path, fallback_indent)
    }

    pub fn parse(source: &str, path: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        Self::parse_with_indent(source, path, "  ")
    }

    pub fn parse_with_indent(
        source: &str,
        path: impl Into<PathBuf>,
        fallback_indent: &str,
    ) -> Result<Self, ManifestError> {
        let path = path.into();
        let document = Document::parse_with_indent(source, fallback_indent).map_err(|e| {
            ManifestError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        if !document.root().is_named(PROJECT_ELEMENT) {
            return Err(ManifestError::Malformed {
                path,
                reason: format!(
                    "root element is <{}>, expected <{}>",
                    document.root().name,
                    PROJECT_ELEMENT
                ),
            });
        }

        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn groups(&self) -> impl Iterator<Item = Group<'_>> {
        let root = self.document.root();
        root.element_positions().filter_map(move |pos| {
            root.child(pos)
                .filter(|el| el.is_named(GROUP_ELEMENT))
                .map(|element| Group {
                    id: GroupId(pos),
                    element,
                })
        })
    }

    pub fn group(&self, id: GroupId) -> Option<Group<'_>> {
        self.document
            .root()
            .child(id.0)
            .filter(|el| el.is_named(GROUP_ELEMENT))
            .map(|element| Group { id, element })
    }

    /// Every group whose normalized condition equals `condition`, in document order
    pub fn groups_matching(&self, condition: &FrameworkCondition) -> Vec<GroupId> {
        self.groups()
            .filter(|g| &g.condition() == condition)
            .map(|g| g.id())
            .collect()
    }

    /// The group for `condition`, preferring one that already holds declarations
    pub fn find_group(&self, condition: &FrameworkCondition) -> Option<GroupId> {
        let matching: Vec<Group<'_>> = self
            .groups()
            .filter(|g| &g.condition() == condition)
            .collect();
        matching
            .iter()
            .find(|g| g.has_declarations())
            .or_else(|| matching.first())
            .map(|g| g.id())
    }

    /// The group for `condition`, creating an empty one when none exists
    ///
    /// A new group goes right after the last existing group, or at the end
    /// of the project when there is none, so no existing group id moves.
    /// Returns the id and whether the group was created.
    pub fn ensure_group(&mut self, condition: &FrameworkCondition) -> (GroupId, bool) {
        if let Some(id) = self.find_group(condition) {
            return (id, false);
        }

        let mut group = Element::new(GROUP_ELEMENT);
        if let Some(attr) = condition.to_attribute() {
            group.set_attribute(CONDITION_ATTRIBUTE, &attr);
        }

        let last_group = self.groups().last().map(|g| g.id().0);
        let layout = self.document.layout().clone();
        let root = self.document.root_mut();
        let pos = match last_group {
            Some(pos) => root.insert_element_after(pos, group, &layout),
            None => root.append_element(group, "", &layout),
        };
        debug!("Created group for {}", condition);
        (GroupId(pos), true)
    }

    /// Replace the version of an existing declaration or append a new one
    ///
    /// Returns `None` when `group` does not name a group.
    pub fn upsert_declaration(
        &mut self,
        group: GroupId,
        package: &PackageId,
        version: Option<&str>,
    ) -> Option<Upsert> {
        self.group(group)?;
        let layout = self.document.layout().clone();
        let own_indent = self.document.root().indent_of(group.0).unwrap_or_default();
        let element = self.document.root_mut().child_mut(group.0)?;

        let existing = element
            .element_positions()
            .find(|&pos| element.child(pos).map_or(false, |el| declares(el, package)));

        if let Some(pos) = existing {
            let reference = element.child_mut(pos)?;
            let previous = read_declaration(reference).and_then(|d| d.version);
            if let Some(version) = version {
                set_version(reference, version);
            }
            return Some(Upsert::Replaced { previous });
        }

        let mut reference =
            Element::new(REFERENCE_ELEMENT).with_attribute(INCLUDE_ATTRIBUTE, package.as_str());
        if let Some(version) = version {
            reference.set_attribute(VERSION_ATTRIBUTE, version);
        }
        element.append_element(reference, &own_indent, &layout);
        Some(Upsert::Inserted)
    }

    /// Remove every declaration of `package` from `group`; returns how many went
    pub fn remove_declarations(&mut self, group: GroupId, package: &PackageId) -> usize {
        if self.group(group).is_none() {
            return 0;
        }
        let Some(element) = self.document.root_mut().child_mut(group.0) else {
            return 0;
        };

        let mut positions: Vec<usize> = element
            .element_positions()
            .filter(|&pos| element.child(pos).map_or(false, |el| declares(el, package)))
            .collect();
        positions.reverse();

        let mut removed = 0;
        for pos in positions {
            if element.remove_element(pos).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Drop `group` when nothing is left in it; returns whether it was removed
    pub fn prune_if_empty(&mut self, group: GroupId) -> bool {
        match self.group(group) {
            Some(g) if g.is_empty() => {
                let condition = g.condition();
                let pruned = self.document.root_mut().remove_element(group.0).is_some();
                if pruned {
                    debug!("Pruned empty group for {}", condition);
                }
                pruned
            }
            _ => false,
        }
    }

    pub fn to_xml(&self) -> Result<String, ManifestError> {
        self.document
            .serialize()
            .map_err(|source| ManifestError::Serialize {
                path: self.path.clone(),
                source,
            })
    }

    /// Write the manifest back to the path it was loaded from
    pub fn save(&self) -> Result<(), ManifestError> {
        self.persist(&self.path)
    }

    /// Serialize to a temporary file next to `path`, then rename it over `path`
    ///
    /// A symlinked `path` is resolved first so the link survives and its
    /// target receives the new content.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let requested = path.as_ref();
        let resolved = fs::canonicalize(requested).unwrap_or_else(|_| requested.to_path_buf());
        let path = resolved.as_path();
        let text = self.to_xml()?;
        let persist_err = |source: io::Error| ManifestError::Persist {
            path: requested.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(text.as_bytes()).map_err(persist_err)?;
        if let Ok(meta) = fs::metadata(path) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(persist_err)?;
        }
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(path).map_err(|e| persist_err(e.error))?;

        debug!("Wrote {} ({} bytes)", path.display(), text.len());
        Ok(())
    }
}

fn set_version(reference: &mut Element, version: &str) {
    let has_attribute = reference.attribute(VERSION_ATTRIBUTE).is_some();
    let child = reference
        .element_positions()
        .find(|&pos| {
            reference
                .child(pos)
                .map_or(false, |el| el.is_named(VERSION_ATTRIBUTE))
        });

    match child {
        Some(pos) if !has_attribute => {
            if let Some(el) = reference.child_mut(pos) {
                el.set_text(version);
            }
        }
        _ => reference.set_attribute(VERSION_ATTRIBUTE, version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFrameworks>net46;netcoreapp1.0</TargetFrameworks>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="X" Version="1.0.0" />
  </ItemGroup>
  <ItemGroup Condition="'$(TargetFramework)' == 'net46'">
    <PackageReference Include="Y">
      <Version>2.0.0</Version>
    </PackageReference>
  </ItemGroup>
  <Target Name="Noop" />
</Project>
"#;

    fn manifest() -> Manifest {
        Manifest::parse(PROJECT, "test.csproj").unwrap()
    }

    #[test]
    fn test_groups_and_declarations() {
        let m = manifest();
        let groups: Vec<_> = m.groups().collect();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].condition().is_unconditioned());
        assert_eq!(groups[1].condition(), FrameworkCondition::framework("net46"));

        let y = groups[1].declaration(&PackageId::new("y")).unwrap();
        assert_eq!(y.version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_find_group_by_condition() {
        let m = manifest();
        assert!(m.find_group(&FrameworkCondition::Unconditioned).is_some());
        assert!(m.find_group(&FrameworkCondition::framework("NET46")).is_some());
        assert!(m.find_group(&FrameworkCondition::framework("netcoreapp1.0")).is_none());
    }

    #[test]
    fn test_ensure_group_appends_after_last_group() {
        let mut m = manifest();
        let condition = FrameworkCondition::framework("netcoreapp1.0");
        let (id, created) = m.ensure_group(&condition);
        assert!(created);
        assert_eq!(m.ensure_group(&condition), (id, false));

        let upsert = m.upsert_declaration(id, &PackageId::new("Z"), Some("3.0.0"));
        assert_eq!(upsert, Some(Upsert::Inserted));

        let xml = m.to_xml().unwrap();
        assert!(xml.contains(
            "  </ItemGroup>\n  <ItemGroup Condition=\"'$(TargetFramework)' == 'netcoreapp1.0'\">\n    <PackageReference Include=\"Z\" Version=\"3.0.0\" />\n  </ItemGroup>\n  <Target Name=\"Noop\" />"
        ));
    }

    #[test]
    fn test_upsert_replaces_version_in_place() {
        let mut m = manifest();
        let id = m.find_group(&FrameworkCondition::Unconditioned).unwrap();
        let upsert = m.upsert_declaration(id, &PackageId::new("x"), Some("1.1.0"));
        assert_eq!(
            upsert,
            Some(Upsert::Replaced {
                previous: Some("1.0.0".to_string())
            })
        );
        assert_eq!(m.group(id).unwrap().declarations().len(), 1);
        let xml = m.to_xml().unwrap();
        assert!(xml.contains(r#"<PackageReference Include="X" Version="1.1.0" />"#));
    }

    #[test]
    fn test_upsert_updates_version_child_element() {
        let mut m = manifest();
        let id = m.find_group(&FrameworkCondition::framework("net46")).unwrap();
        m.upsert_declaration(id, &PackageId::new("Y"), Some("2.5.0"));
        assert!(m.to_xml().unwrap().contains("<Version>2.5.0</Version>"));
    }

    #[test]
    fn test_remove_and_prune() {
        let mut m = manifest();
        let id = m.find_group(&FrameworkCondition::framework("net46")).unwrap();
        assert_eq!(m.remove_declarations(id, &PackageId::new("y")), 1);
        assert!(m.prune_if_empty(id));
        assert_eq!(m.groups().count(), 1);
        assert!(!m.to_xml().unwrap().contains("net46'"));
    }

    #[test]
    fn test_prune_keeps_group_with_other_items() {
        let mut m = Manifest::parse(
            "<Project>\n  <ItemGroup>\n    <PackageReference Include=\"X\" Version=\"1.0.0\" />\n    <Compile Include=\"a.cs\" />\n  </ItemGroup>\n</Project>",
            "test.csproj",
        )
        .unwrap();
        let id = m.find_group(&FrameworkCondition::Unconditioned).unwrap();
        assert_eq!(m.remove_declarations(id, &PackageId::new("X")), 1);
        assert!(!m.prune_if_empty(id));
        assert_eq!(m.groups().count(), 1);
    }

    #[test]
    fn test_rejects_non_project_root() {
        let err = Manifest::parse("<Other />", "test.csproj").unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
        assert!(err.to_string().contains("expected <Project>"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Manifest::load("/definitely/not/here.csproj").unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("bad.csproj");
        fs::write(&path, b"<Project>\xff\xfe</Project>").unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_failed_persist_leaves_source_untouched() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("a.csproj");
        fs::write(&path, PROJECT).unwrap();

        let mut m = Manifest::load(&path).unwrap();
        let id = m.find_group(&FrameworkCondition::Unconditioned).unwrap();
        m.upsert_declaration(id, &PackageId::new("X"), Some("9.9.9"));

        let err = m.persist(temp.path().join("missing/b.csproj")).unwrap_err();
        assert!(matches!(err, ManifestError::Persist { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), PROJECT);
        assert!(!temp.path().join("missing").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_persist_writes_through_symlink() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("real.csproj");
        let link = temp.path().join("link.csproj");
        fs::write(&target, PROJECT).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut m = Manifest::load(&link).unwrap();
        let id = m.find_group(&FrameworkCondition::Unconditioned).unwrap();
        m.upsert_declaration(id, &PackageId::new("X"), Some("2.0.0"));
        m.save().unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(fs::read_to_string(&target).unwrap().contains(r#"Version="2.0.0""#));
    }

    #[test]
    fn test_rewritten_reference_with_quoted_attribute_reparses() {
        let source = r#"<Project>
  <ItemGroup>
    <PackageReference Include="X" Version="1.0.0" Label='say "hi"' />
  </ItemGroup>
</Project>"#;
        let mut m = Manifest::parse(source, "test.csproj").unwrap();
        let id = m.find_group(&FrameworkCondition::Unconditioned).unwrap();
        m.upsert_declaration(id, &PackageId::new("X"), Some("2.0.0"));

        let out = m.to_xml().unwrap();
        let reparsed = Manifest::parse(&out, "test.csproj").unwrap();
        let id = reparsed.find_group(&FrameworkCondition::Unconditioned).unwrap();
        let decl = reparsed.group(id).unwrap().declaration(&PackageId::new("x")).unwrap();
        assert_eq!(decl.version.as_deref(), Some("2.0.0"));
    }
}
