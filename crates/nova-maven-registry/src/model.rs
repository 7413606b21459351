use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Workspace identity of a single project descriptor (`pom.xml`).
///
/// This is the normalized descriptor path. It is used as the key in every
/// registry map, so it is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorId(Arc<str>);

impl DescriptorId {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(normalize(path.as_ref())))
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Descriptor of the module `name` declared by this descriptor.
    ///
    /// Module names are directories relative to the declaring descriptor's
    /// directory; the module descriptor is the `pom.xml` inside it.
    pub fn module(&self, name: &str) -> Self {
        let dir = match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        };
        let name = name.trim_end_matches('/');
        if dir.is_empty() {
            Self::new(format!("{name}/pom.xml"))
        } else {
            Self::new(format!("{dir}/{name}/pom.xml"))
        }
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DescriptorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Maven coordinates of a resolvable unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
}

impl ArtifactKey {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// `groupId:artifactId`, the identity shared by every version of this artifact.
    pub fn versionless_id(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    pub fn matches(&self, group_id: &str, artifact_id: &str, version: &str) -> bool {
        self.group_id == group_id && self.artifact_id == artifact_id && self.version == version
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

/// A dependency declared by a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    /// Version or version range as written (after interpolation).
    pub version: String,
    pub scope: Option<String>,
    pub optional: bool,
}

impl Dependency {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            scope: None,
            optional: false,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Identity of one mojo execution bound to the build lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MojoExecutionKey {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub goal: String,
    pub execution_id: String,
    pub lifecycle_phase: Option<String>,
}

impl fmt::Display for MojoExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{} ({})",
            self.group_id, self.artifact_id, self.version, self.goal, self.execution_id
        )
    }
}

/// What the lifecycle mapping decided for one mojo execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginExecutionAction {
    Ignore,
    Execute { run_on_incremental: bool },
    Configurator { id: String },
    Error { message: String },
}

pub type MojoExecutionMapping = BTreeMap<MojoExecutionKey, Vec<PluginExecutionAction>>;

/// Per-descriptor options that affect how the descriptor is read.
///
/// Descriptors with equal configurations are parsed together in one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolverConfiguration {
    #[serde(default)]
    pub active_profiles: Vec<String>,
    #[serde(default)]
    pub inactive_profiles: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub resolve_workspace_projects: bool,
    #[serde(default)]
    pub lifecycle_mapping_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ResolverConfiguration {
    pub fn new() -> Self {
        Self {
            resolve_workspace_projects: true,
            ..Self::default()
        }
    }
}

/// The fully-read build model of a project, as produced by the descriptor parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenProject {
    pub artifact_key: ArtifactKey,
    pub packaging: String,
    pub parent: Option<ArtifactKey>,
    pub modules: Vec<String>,
    pub dependencies: Vec<Dependency>,
    /// `dependencyManagement` entries with `<scope>import</scope>`.
    pub imports: Vec<ArtifactKey>,
    pub mojo_executions: Vec<MojoExecutionKey>,
    /// Resolved dependency closure (empty until dependencies were resolved).
    pub artifacts: Vec<ArtifactKey>,
}

impl MavenProject {
    pub fn new(artifact_key: ArtifactKey) -> Self {
        Self {
            artifact_key,
            packaging: "jar".to_string(),
            parent: None,
            modules: Vec::new(),
            dependencies: Vec::new(),
            imports: Vec::new(),
            mojo_executions: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
}

/// A descriptor-scoped diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    pub line: Option<u32>,
}

impl Problem {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            line: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            line: None,
        }
    }
}

/// Marker categories. Adding markers of one category replaces prior markers of
/// the same category on that descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    PomLoading,
    LifecycleMapping,
    DependencyResolution,
}

/// Content digest of a descriptor file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorFingerprint {
    pub digest: String,
}

impl DescriptorFingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            digest: hex::encode(hasher.finalize()),
        }
    }
}
