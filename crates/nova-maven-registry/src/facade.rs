use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{
    ArtifactKey, DescriptorFingerprint, DescriptorId, MavenProject, MojoExecutionKey,
    MojoExecutionMapping, ResolverConfiguration,
};
use crate::services::DescriptorWorkspace;

/// Published snapshot of a descriptor's resolved metadata.
///
/// Facades are shared as `Arc<ProjectFacade>` and never mutated once they are
/// put into a registry. A descriptor whose metadata changes gets a *new*
/// instance; listeners compare instances with [`ProjectFacade::same_instance`]
/// to detect change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFacade {
    descriptor: DescriptorId,
    artifact_key: ArtifactKey,
    packaging: String,
    parent: Option<ArtifactKey>,
    modules: Vec<String>,
    resolver_configuration: ResolverConfiguration,
    fingerprint: Option<DescriptorFingerprint>,
    lifecycle_mapping_id: Option<String>,
    #[serde(default)]
    mojo_executions: Vec<MojoExecutionKey>,
    #[serde(default)]
    mojo_execution_mapping: MojoExecutionMapping,
    #[serde(default)]
    configurators: Vec<String>,
    #[serde(default)]
    artifacts: Vec<ArtifactKey>,
}

impl ProjectFacade {
    pub fn new(
        descriptor: DescriptorId,
        project: &MavenProject,
        resolver_configuration: ResolverConfiguration,
        fingerprint: Option<DescriptorFingerprint>,
    ) -> Self {
        Self {
            descriptor,
            artifact_key: project.artifact_key.clone(),
            packaging: project.packaging.clone(),
            parent: project.parent.clone(),
            modules: project.modules.clone(),
            resolver_configuration,
            fingerprint,
            lifecycle_mapping_id: None,
            mojo_executions: project.mojo_executions.clone(),
            mojo_execution_mapping: MojoExecutionMapping::new(),
            configurators: Vec::new(),
            artifacts: project.artifacts.clone(),
        }
    }

    pub fn descriptor(&self) -> &DescriptorId {
        &self.descriptor
    }

    pub fn artifact_key(&self) -> &ArtifactKey {
        &self.artifact_key
    }

    pub fn packaging(&self) -> &str {
        &self.packaging
    }

    pub fn parent(&self) -> Option<&ArtifactKey> {
        self.parent.as_ref()
    }

    /// Module names as declared in the descriptor.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Descriptor ids of the declared modules.
    pub fn module_descriptors(&self) -> impl Iterator<Item = DescriptorId> + '_ {
        self.modules.iter().map(|name| self.descriptor.module(name))
    }

    pub fn resolver_configuration(&self) -> &ResolverConfiguration {
        &self.resolver_configuration
    }

    pub fn fingerprint(&self) -> Option<&DescriptorFingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn lifecycle_mapping_id(&self) -> Option<&str> {
        self.lifecycle_mapping_id.as_deref()
    }

    pub fn mojo_executions(&self) -> &[MojoExecutionKey] {
        &self.mojo_executions
    }

    pub fn mojo_execution_mapping(&self) -> &MojoExecutionMapping {
        &self.mojo_execution_mapping
    }

    /// Ids of project configurators that apply to this project.
    pub fn configurators(&self) -> &[String] {
        &self.configurators
    }

    /// Resolved dependency closure.
    pub fn artifacts(&self) -> &[ArtifactKey] {
        &self.artifacts
    }

    /// True when the descriptor on disk no longer matches what this facade was read from.
    pub fn is_stale(&self, workspace: &dyn DescriptorWorkspace) -> bool {
        match (&self.fingerprint, workspace.fingerprint(&self.descriptor)) {
            (Some(ours), Some(current)) => *ours != current,
            (None, None) => false,
            _ => true,
        }
    }

    pub fn same_instance(a: &Arc<ProjectFacade>, b: &Arc<ProjectFacade>) -> bool {
        Arc::ptr_eq(a, b)
    }

    pub(crate) fn set_lifecycle_mapping(
        &mut self,
        lifecycle_mapping_id: Option<String>,
        mapping: MojoExecutionMapping,
        configurators: Vec<String>,
    ) {
        self.lifecycle_mapping_id = lifecycle_mapping_id;
        self.mojo_execution_mapping = mapping;
        self.configurators = configurators;
    }

    pub(crate) fn set_artifacts(&mut self, artifacts: Vec<ArtifactKey>) {
        self.artifacts = artifacts;
    }
}
