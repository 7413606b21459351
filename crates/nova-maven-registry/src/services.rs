//! Collaborators the registry consumes.
//!
//! The registry never parses descriptors, downloads artifacts or talks to the
//! editor itself. Everything it needs from the outside world goes through the
//! traits in this module, bundled into [`RegistryServices`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::capability::{CapabilitySet, RequirementSet};
use crate::error::{ContainerError, ResolutionError};
use crate::facade::ProjectFacade;
use crate::model::{
    ArtifactKey, DescriptorFingerprint, DescriptorId, MarkerKind, MavenProject, MojoExecutionKey,
    MojoExecutionMapping, Problem, ResolverConfiguration,
};
use crate::monitor::RefreshMonitor;
use crate::persist::StateStore;
use crate::registry::{ProjectChangedEvent, RegistryView};
use crate::resolver::DefaultDependencyResolver;

/// The workspace that owns descriptor files.
pub trait DescriptorWorkspace: Send + Sync {
    /// Whether the descriptor exists, is accessible and is managed as a Maven project.
    fn is_enabled(&self, id: &DescriptorId) -> bool;

    fn resolver_configuration(&self, id: &DescriptorId) -> ResolverConfiguration;

    /// Fingerprint of the descriptor's current contents, `None` if unreadable.
    fn fingerprint(&self, id: &DescriptorId) -> Option<DescriptorFingerprint>;
}

/// Opaque handle of the build container a descriptor is read with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait ContainerManager: Send + Sync {
    fn acquire(&self, id: &DescriptorId) -> Result<ContainerId, ContainerError>;
}

/// Reads every descriptor with one shared container.
#[derive(Debug, Default)]
pub struct SingleContainer;

impl ContainerManager for SingleContainer {
    fn acquire(&self, _id: &DescriptorId) -> Result<ContainerId, ContainerError> {
        Ok(ContainerId("default".to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// `None` when the descriptor could not be turned into a project.
    pub project: Option<Arc<MavenProject>>,
    pub problems: Vec<Problem>,
}

impl ParseResult {
    pub fn project(project: MavenProject) -> Self {
        Self {
            project: Some(Arc::new(project)),
            problems: Vec::new(),
        }
    }

    pub fn failed(problems: Vec<Problem>) -> Self {
        Self {
            project: None,
            problems,
        }
    }
}

pub trait DescriptorParser: Send + Sync {
    /// Structural (dependency-free) read of a batch sharing one container and
    /// one resolver configuration.
    ///
    /// `registry` is the in-flight registry, so parents already read in this
    /// refresh resolve from the workspace.
    fn read_projects(
        &self,
        container: &ContainerId,
        descriptors: &[DescriptorId],
        configuration: &ResolverConfiguration,
        registry: &dyn RegistryView,
    ) -> HashMap<DescriptorId, ParseResult>;

    /// Full read of one descriptor including its dependency closure.
    fn read_project_with_dependencies(
        &self,
        descriptor: &DescriptorId,
        configuration: &ResolverConfiguration,
        registry: &dyn RegistryView,
        monitor: &RefreshMonitor,
    ) -> ParseResult;

    /// Parent coordinates from the raw model, without inheritance or interpolation.
    ///
    /// Only consulted for descriptors that failed to parse.
    fn read_parent(&self, _descriptor: &DescriptorId) -> Option<ArtifactKey> {
        None
    }
}

/// An artifact written to the local repository while a refresh was running.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstalledArtifact {
    /// The artifact the installed file belongs to (e.g. the main jar for a
    /// classified attachment).
    pub base: ArtifactKey,
    pub artifact: ArtifactKey,
}

/// Output sets a dependency resolver fills in.
#[derive(Debug, Clone, Default)]
pub struct ResolutionOutput {
    pub capabilities: CapabilitySet,
    pub requirements: RequirementSet,
    /// Resolved dependency closure; becomes the facade's artifact list.
    pub artifacts: Vec<ArtifactKey>,
    pub installed: Vec<InstalledArtifact>,
}

pub trait DependencyResolver: Send + Sync {
    /// Add `facade`'s dependency requirements, its resolved artifacts and any
    /// extra capabilities to `output`.
    ///
    /// `project` is the structural read; dependencies are resolved against
    /// `registry`, the in-flight registry, which changes between calls for the
    /// same descriptor. On error, whatever was added before the failure is kept.
    fn resolve_project_dependencies(
        &self,
        facade: &ProjectFacade,
        project: &MavenProject,
        registry: &dyn RegistryView,
        output: &mut ResolutionOutput,
        monitor: &RefreshMonitor,
    ) -> Result<(), ResolutionError>;
}

/// A lifecycle mapping selected for a project.
pub trait LifecycleMapping: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Mapping-specific dependency resolver; the default resolver is used when `None`.
    fn dependency_resolver(&self) -> Option<Arc<dyn DependencyResolver>> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleMappingResult {
    pub lifecycle_mapping_id: Option<String>,
    pub mapping: Option<Arc<dyn LifecycleMapping>>,
    pub mojo_execution_mapping: MojoExecutionMapping,
    pub configurators: Vec<String>,
    pub problems: Vec<Problem>,
}

pub trait LifecycleMappingResolver: Send + Sync {
    fn calculate(
        &self,
        project: &MavenProject,
        mojo_executions: &[MojoExecutionKey],
        requested_id: Option<&str>,
    ) -> LifecycleMappingResult;
}

/// Echoes the requested mapping id and maps nothing.
#[derive(Debug, Default)]
pub struct NoLifecycleMappings;

impl LifecycleMappingResolver for NoLifecycleMappings {
    fn calculate(
        &self,
        _project: &MavenProject,
        _mojo_executions: &[MojoExecutionKey],
        requested_id: Option<&str>,
    ) -> LifecycleMappingResult {
        LifecycleMappingResult {
            lifecycle_mapping_id: requested_id.map(str::to_string),
            ..LifecycleMappingResult::default()
        }
    }
}

/// Descriptor-scoped diagnostics.
pub trait MarkerSink: Send + Sync {
    fn delete_markers(&self, id: &DescriptorId, kind: MarkerKind);

    fn add_markers(&self, id: &DescriptorId, kind: MarkerKind, problems: &[Problem]);
}

#[derive(Debug, Default)]
pub struct NoopMarkerSink;

impl MarkerSink for NoopMarkerSink {
    fn delete_markers(&self, _id: &DescriptorId, _kind: MarkerKind) {}

    fn add_markers(&self, _id: &DescriptorId, _kind: MarkerKind, _problems: &[Problem]) {}
}

/// Build-tool caches keyed by project identity.
pub trait BuildCaches: Send + Sync {
    /// Drop everything cached for `descriptor`/`key` and return the
    /// descriptors whose cached state was affected by the flush.
    fn flush(
        &self,
        descriptor: &DescriptorId,
        key: &ArtifactKey,
        force_dependency_update: bool,
    ) -> HashSet<DescriptorId>;
}

#[derive(Debug, Default)]
pub struct NoBuildCaches;

impl BuildCaches for NoBuildCaches {
    fn flush(
        &self,
        _descriptor: &DescriptorId,
        _key: &ArtifactKey,
        _force_dependency_update: bool,
    ) -> HashSet<DescriptorId> {
        HashSet::new()
    }
}

/// Receives committed changes, synchronously on the committing thread.
pub trait ChangeListener: Send + Sync {
    fn project_changed(&self, events: &[ProjectChangedEvent], monitor: &RefreshMonitor);
}

/// All collaborators of a [`crate::ProjectRegistryManager`].
#[derive(Clone)]
pub struct RegistryServices {
    pub workspace: Arc<dyn DescriptorWorkspace>,
    pub parser: Arc<dyn DescriptorParser>,
    pub containers: Arc<dyn ContainerManager>,
    pub lifecycle_mappings: Arc<dyn LifecycleMappingResolver>,
    pub default_resolver: Arc<dyn DependencyResolver>,
    pub markers: Arc<dyn MarkerSink>,
    pub build_caches: Arc<dyn BuildCaches>,
    pub state_store: Option<Arc<dyn StateStore>>,
}

impl fmt::Debug for RegistryServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryServices")
            .field("state_store", &self.state_store.is_some())
            .finish_non_exhaustive()
    }
}

impl RegistryServices {
    pub fn new(workspace: Arc<dyn DescriptorWorkspace>, parser: Arc<dyn DescriptorParser>) -> Self {
        Self {
            workspace,
            parser,
            containers: Arc::new(SingleContainer),
            lifecycle_mappings: Arc::new(NoLifecycleMappings),
            default_resolver: Arc::new(DefaultDependencyResolver),
            markers: Arc::new(NoopMarkerSink),
            build_caches: Arc::new(NoBuildCaches),
            state_store: None,
        }
    }

    pub fn with_containers(mut self, containers: Arc<dyn ContainerManager>) -> Self {
        self.containers = containers;
        self
    }

    pub fn with_lifecycle_mappings(mut self, resolver: Arc<dyn LifecycleMappingResolver>) -> Self {
        self.lifecycle_mappings = resolver;
        self
    }

    pub fn with_default_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.default_resolver = resolver;
        self
    }

    pub fn with_markers(mut self, markers: Arc<dyn MarkerSink>) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_build_caches(mut self, caches: Arc<dyn BuildCaches>) -> Self {
        self.build_caches = caches;
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }
}
