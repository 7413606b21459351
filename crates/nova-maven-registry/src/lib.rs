//! In-memory Maven project registry with incremental dependency refresh.
//!
//! The registry keeps, for every `pom.xml` in the workspace, a published
//! [`ProjectFacade`] plus the capability/requirement graph linking projects to
//! each other. When descriptors change, [`ProjectRegistryManager::refresh`]
//! re-reads them and everything depending on what changed, then commits the
//! result atomically:
//!
//! - phase 1 reads descriptors structurally and seeds identity capabilities
//!   and parent/import requirements
//! - phase 2 resolves dependencies and requeues dependents of changed
//!   capabilities until a fixpoint is reached
//!
//! Writes happen on a copy-on-write [`MutableProjectRegistry`] that turns
//! stale as soon as another transaction is committed over its base. Readers
//! take [`ProjectRegistry`] snapshots and never block.
//!
//! Parsing, dependency resolution, lifecycle mapping and diagnostics are
//! provided by the embedder through the traits in [`services`].

mod cache;
mod capability;
mod config;
mod context;
mod error;
mod facade;
mod graph;
mod manager;
mod model;
mod monitor;
mod mutable;
mod persist;
mod refresh;
mod registry;
mod resolver;
pub mod services;
mod version;

pub use cache::{ExecutionContext, ProjectCache};
pub use capability::{
    Capability, CapabilitySet, Namespace, RequiredCapability, RequirementSet, VersionlessKey,
};
pub use config::{ConfigError, RegistryConfig, PROJECT_CACHE_SIZE_ENV_VAR};
pub use context::{ProcessingTracker, ResolutionContext};
pub use error::{ContainerError, RegistryError, ResolutionError, Result};
pub use facade::ProjectFacade;
pub use graph::CapabilityGraph;
pub use manager::ProjectRegistryManager;
pub use model::{
    ArtifactKey, Dependency, DescriptorFingerprint, DescriptorId, MarkerKind, MavenProject,
    MojoExecutionKey, MojoExecutionMapping, PluginExecutionAction, Problem, ResolverConfiguration,
    Severity,
};
pub use monitor::{RefreshMonitor, RefreshPhase, RefreshProgress, RefreshProgressReceiver};
pub use mutable::MutableProjectRegistry;
pub use persist::{JsonStateStore, StateStore};
pub use registry::{
    ApplyOutcome, ChangeKind, ProjectChangedEvent, ProjectRegistry, RegistryView, SharedRegistry,
};
pub use resolver::{structure_requirements, DefaultDependencyResolver};
pub use version::{compare_versions, VersionSpec};
