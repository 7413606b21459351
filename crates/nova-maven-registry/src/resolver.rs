use std::collections::HashMap;

use crate::capability::{RequiredCapability, RequirementSet};
use crate::error::ResolutionError;
use crate::facade::ProjectFacade;
use crate::model::{ArtifactKey, MavenProject};
use crate::monitor::RefreshMonitor;
use crate::registry::RegistryView;
use crate::services::{DependencyResolver, ResolutionOutput};
use crate::version::{compare_versions, VersionSpec};

/// Requirements every project has regardless of its dependencies: its parent
/// and the descriptors it imports dependency management from.
pub fn structure_requirements(project: &MavenProject) -> RequirementSet {
    let mut requirements = RequirementSet::new();
    if let Some(parent) = &project.parent {
        requirements.insert(RequiredCapability::maven_parent(parent));
    }
    for import in &project.imports {
        requirements.insert(RequiredCapability::maven_artifact_import(import));
    }
    requirements
}

/// Resolver used when a project's lifecycle mapping doesn't bring its own.
///
/// Each declared dependency resolves to the highest matching workspace
/// project when there is one, otherwise to its declared version. The resolved
/// key becomes both a `maven-artifact` requirement and an entry of the
/// artifact closure. A range nothing in the workspace satisfies stays a range
/// requirement, so the project is requeued once a matching project appears.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDependencyResolver;

impl DependencyResolver for DefaultDependencyResolver {
    fn resolve_project_dependencies(
        &self,
        facade: &ProjectFacade,
        project: &MavenProject,
        registry: &dyn RegistryView,
        output: &mut ResolutionOutput,
        _monitor: &RefreshMonitor,
    ) -> Result<(), ResolutionError> {
        let resolve_workspace = facade.resolver_configuration().resolve_workspace_projects;
        let mut workspace: HashMap<String, Vec<ArtifactKey>> = HashMap::new();
        if resolve_workspace {
            for other in registry.projects() {
                let key = other.artifact_key();
                workspace
                    .entry(key.versionless_id())
                    .or_default()
                    .push(key.clone());
            }
        }

        let mut unversioned = Vec::new();
        for dependency in &project.dependencies {
            if dependency.version.trim().is_empty() {
                unversioned.push(format!(
                    "{}:{}",
                    dependency.group_id, dependency.artifact_id
                ));
                continue;
            }
            let declared = ArtifactKey::new(
                dependency.group_id.clone(),
                dependency.artifact_id.clone(),
                dependency.version.clone(),
            );

            let from_workspace = VersionSpec::parse(&dependency.version).and_then(|spec| {
                workspace
                    .get(&declared.versionless_id())?
                    .iter()
                    .filter(|candidate| spec.contains(&candidate.version))
                    .max_by(|a, b| compare_versions(&a.version, &b.version))
                    .cloned()
            });
            let is_range = dependency.version.trim_start().starts_with(['[', '(']);
            let resolved = match from_workspace {
                Some(key) => Some(key),
                None if is_range => None,
                None => Some(declared.clone()),
            };

            match resolved {
                Some(key) => {
                    output.requirements.insert(RequiredCapability::maven_artifact(
                        &key,
                        dependency.scope.as_deref(),
                        dependency.optional,
                    ));
                    if !output.artifacts.contains(&key) {
                        output.artifacts.push(key);
                    }
                }
                None => {
                    tracing::debug!(
                        target = "nova.maven.registry",
                        project = %facade.artifact_key(),
                        dependency = %declared,
                        "no workspace project satisfies version range"
                    );
                    output.requirements.insert(RequiredCapability::maven_artifact(
                        &declared,
                        dependency.scope.as_deref(),
                        dependency.optional,
                    ));
                }
            }
        }

        if unversioned.is_empty() {
            Ok(())
        } else {
            Err(ResolutionError {
                project: facade.artifact_key().to_string(),
                message: format!("missing version for {}", unversioned.join(", ")),
            })
        }
    }
}
