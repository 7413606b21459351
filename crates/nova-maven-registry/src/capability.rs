//! Typed facts a descriptor exports (capabilities) and patterns it needs
//! satisfied by other descriptors (requirements).

use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::model::ArtifactKey;
use crate::version::VersionSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Namespace {
    #[serde(rename = "maven-artifact")]
    MavenArtifact,
    #[serde(rename = "maven-parent")]
    MavenParent,
    #[serde(rename = "maven-artifact-import")]
    MavenArtifactImport,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::MavenArtifact => "maven-artifact",
            Namespace::MavenParent => "maven-parent",
            Namespace::MavenArtifactImport => "maven-artifact-import",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(namespace, "groupId:artifactId")`: the part of a capability that ignores version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionlessKey {
    pub namespace: Namespace,
    pub id: String,
}

impl VersionlessKey {
    pub fn new(namespace: Namespace, key: &ArtifactKey) -> Self {
        Self {
            namespace,
            id: key.versionless_id(),
        }
    }
}

impl fmt::Display for VersionlessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

/// A capability exported by a descriptor. Equality is by the full tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub key: VersionlessKey,
    pub version: String,
}

impl Capability {
    fn new(namespace: Namespace, key: &ArtifactKey) -> Self {
        Self {
            key: VersionlessKey::new(namespace, key),
            version: key.version.clone(),
        }
    }

    pub fn maven_artifact(key: &ArtifactKey) -> Self {
        Self::new(Namespace::MavenArtifact, key)
    }

    pub fn maven_parent(key: &ArtifactKey) -> Self {
        Self::new(Namespace::MavenParent, key)
    }

    pub fn maven_artifact_import(key: &ArtifactKey) -> Self {
        Self::new(Namespace::MavenArtifactImport, key)
    }

    pub fn namespace(&self) -> Namespace {
        self.key.namespace
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.key, self.version)
    }
}

/// A capability pattern a descriptor depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredCapability {
    pub key: VersionlessKey,
    /// Plain version or Maven version range.
    pub version_spec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl RequiredCapability {
    pub fn maven_artifact(key: &ArtifactKey, scope: Option<&str>, optional: bool) -> Self {
        Self {
            key: VersionlessKey::new(Namespace::MavenArtifact, key),
            version_spec: key.version.clone(),
            scope: scope.map(str::to_string),
            optional,
        }
    }

    /// Parents always pin the exact version.
    pub fn maven_parent(key: &ArtifactKey) -> Self {
        Self {
            key: VersionlessKey::new(Namespace::MavenParent, key),
            version_spec: format!("[{}]", key.version),
            scope: None,
            optional: false,
        }
    }

    pub fn maven_artifact_import(key: &ArtifactKey) -> Self {
        Self {
            key: VersionlessKey::new(Namespace::MavenArtifactImport, key),
            version_spec: format!("[{}]", key.version),
            scope: Some("import".to_string()),
            optional: false,
        }
    }

    /// Whether `capability` could satisfy this requirement.
    ///
    /// With `version_match == false` only the versionless keys are compared.
    /// With `version_match == true` the capability's version must also fall
    /// within the requirement's version spec. Unparseable specs never match
    /// versioned lookups.
    pub fn is_potential_match(&self, capability: &Capability, version_match: bool) -> bool {
        if self.key != capability.key {
            return false;
        }
        if !version_match {
            return true;
        }
        VersionSpec::parse(&self.version_spec)
            .is_some_and(|spec| spec.contains(&capability.version))
    }
}

impl fmt::Display for RequiredCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.key, self.version_spec)?;
        if let Some(scope) = &self.scope {
            write!(f, " ({scope})")?;
        }
        Ok(())
    }
}

/// Insertion-ordered capability set; ordering only matters for deterministic logs.
pub type CapabilitySet = IndexSet<Capability>;
pub type RequirementSet = IndexSet<RequiredCapability>;

/// Symmetric difference of two optional sets (elements present in exactly one side).
pub(crate) fn diff<T: Clone + Eq + Hash>(
    a: Option<&IndexSet<T>>,
    b: Option<&IndexSet<T>>,
) -> IndexSet<T> {
    let empty = IndexSet::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    a.symmetric_difference(b).cloned().collect()
}

/// Whether two optional sets differ, comparing element order as well.
///
/// A missing set and an empty set are equivalent.
pub(crate) fn has_diff<T: Eq + Hash>(a: Option<&IndexSet<T>>, b: Option<&IndexSet<T>>) -> bool {
    let a_len = a.map_or(0, IndexSet::len);
    let b_len = b.map_or(0, IndexSet::len);
    if a_len != b_len {
        return true;
    }
    match (a, b) {
        (Some(a), Some(b)) => a.iter().zip(b.iter()).any(|(x, y)| x != y),
        _ => false,
    }
}
