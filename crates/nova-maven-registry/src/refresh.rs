//! The two-phase incremental refresh.
//!
//! Phase 1 reads every queued descriptor structurally and seeds the graph with
//! identity capabilities and structure requirements (parent, imports). Phase 2
//! resolves full dependencies and pushes dependents of whatever changed back
//! into the queue until the [`ProcessingTracker`] reports convergence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;

use crate::cache::ExecutionContext;
use crate::capability::{
    self, Capability, CapabilitySet, Namespace, RequiredCapability, RequirementSet,
};
use crate::context::{ProcessingTracker, ResolutionContext};
use crate::error::{RegistryError, Result};
use crate::facade::ProjectFacade;
use crate::manager::ProjectRegistryManager;
use crate::model::{ArtifactKey, DescriptorId, MarkerKind, MavenProject, Problem};
use crate::monitor::{RefreshMonitor, RefreshPhase, RefreshProgress};
use crate::mutable::MutableProjectRegistry;
use crate::registry::RegistryView;
use crate::resolver::structure_requirements;
use crate::services::{InstalledArtifact, ResolutionOutput};

pub(crate) struct RefreshEngine<'a> {
    manager: &'a ProjectRegistryManager,
    state: &'a mut MutableProjectRegistry,
    execution: &'a ExecutionContext,
    monitor: &'a RefreshMonitor,
    context: ResolutionContext,
    all_processed: IndexSet<DescriptorId>,
    all_new_facades: HashSet<DescriptorId>,
    /// First capability/requirement sets replaced per descriptor, i.e. the
    /// committed ones. Diffs are always taken against these.
    original_capabilities: HashMap<DescriptorId, Option<CapabilitySet>>,
    original_requirements: HashMap<DescriptorId, Option<RequirementSet>>,
    /// Artifacts whose installation already forced their dependents.
    installed: HashSet<ArtifactKey>,
    /// Descriptors forced because something they depend on changed; they are
    /// reported as changed even if their own facade comes out equal.
    upstream_changed: HashSet<DescriptorId>,
}

impl<'a> RefreshEngine<'a> {
    pub(crate) fn new(
        manager: &'a ProjectRegistryManager,
        state: &'a mut MutableProjectRegistry,
        execution: &'a ExecutionContext,
        monitor: &'a RefreshMonitor,
        ids: impl IntoIterator<Item = DescriptorId>,
    ) -> Self {
        Self {
            manager,
            state,
            execution,
            monitor,
            context: ResolutionContext::new(ids),
            all_processed: IndexSet::new(),
            all_new_facades: HashSet::new(),
            original_capabilities: HashMap::new(),
            original_requirements: HashMap::new(),
            installed: HashSet::new(),
            upstream_changed: HashSet::new(),
        }
    }

    pub(crate) fn run(mut self) -> Result<()> {
        self.discover()?;
        self.resolve()
    }

    fn checkpoint(&self) -> Result<()> {
        self.monitor.check_cancelled()?;
        if self.state.is_stale() || !self.manager.is_sync_refresh_thread() {
            return Err(RegistryError::Stale);
        }
        Ok(())
    }

    fn force_versioned_dependents(&mut self, capability: &Capability) {
        let dependents = self.state.versioned_dependents(capability);
        self.context.force(dependents);
    }

    fn force_changed_dependents(&mut self, dependents: IndexSet<DescriptorId>) {
        self.upstream_changed.extend(dependents.iter().cloned());
        self.context.force(dependents);
    }

    fn discover(&mut self) -> Result<()> {
        let workspace = Arc::clone(&self.manager.services.workspace);

        while !self.context.is_empty() {
            let mut to_read = Vec::new();
            while !self.context.is_empty() {
                self.checkpoint()?;
                let Some(id) = self.context.pop() else {
                    break;
                };
                if self.all_new_facades.contains(&id) {
                    continue;
                }
                self.all_processed.insert(id.clone());
                self.monitor.report(RefreshProgress::Descriptor {
                    phase: RefreshPhase::Discovery,
                    descriptor: id.clone(),
                });

                let old = self.state.facade(&id);
                let affected = self
                    .manager
                    .flush_caches(old.as_ref(), self.execution.force_dependency_update());
                self.context.force(affected);
                if let Some(old) = &old {
                    self.execution.put(old, None);
                }

                if workspace.is_enabled(&id) {
                    to_read.push(id);
                    if let Some(old) = &old {
                        // old child modules and importers of old dependency management
                        self.force_versioned_dependents(&Capability::maven_parent(old.artifact_key()));
                        self.force_versioned_dependents(&Capability::maven_artifact_import(
                            old.artifact_key(),
                        ));
                    }
                } else {
                    self.state.set_project(&id, None)?;
                    if let Some(old) = &old {
                        let children = self
                            .state
                            .dependents(&Capability::maven_parent(old.artifact_key()), true);
                        self.context.force(children);
                        self.force_versioned_dependents(&Capability::maven_artifact_import(
                            old.artifact_key(),
                        ));
                    }
                }
            }

            let new_facades =
                self.manager
                    .read_facades(&to_read, &*self.state, self.execution, self.monitor)?;

            for (id, facade) in &new_facades {
                self.state.set_project(id, Some(Arc::clone(facade)))?;

                let key = facade.artifact_key();
                let parent = Capability::maven_parent(key);
                self.force_versioned_dependents(&parent);
                self.force_versioned_dependents(&Capability::maven_artifact_import(key));

                let capabilities: CapabilitySet =
                    [parent, Capability::maven_artifact(key)].into_iter().collect();
                let old = self.state.set_capabilities(id, Some(capabilities))?;
                self.original_capabilities.entry(id.clone()).or_insert(old);

                let requirements = self
                    .manager
                    .cached_project(facade, self.execution)
                    .map(|project| structure_requirements(&project))
                    .unwrap_or_default();
                let old = self.state.set_requirements(id, Some(requirements))?;
                self.original_requirements.entry(id.clone()).or_insert(old);
            }
            self.all_new_facades.extend(new_facades.keys().cloned());

            let erroneous: Vec<DescriptorId> = to_read
                .into_iter()
                .filter(|id| !new_facades.contains_key(id))
                .collect();
            for id in &erroneous {
                self.state.set_project(id, None)?;
            }
            // A child read in the same batch as its parent may only resolve
            // once the parent is known, so retry while progress is made.
            if !new_facades.is_empty() {
                self.context.force(erroneous);
            }
        }

        self.context.force(self.all_processed.iter().cloned());
        Ok(())
    }

    fn resolve(&mut self) -> Result<()> {
        let workspace = Arc::clone(&self.manager.services.workspace);
        let mut tracker = ProcessingTracker::new(self.manager.config.max_resolution_passes);

        loop {
            while !self.context.is_empty() {
                self.checkpoint()?;
                let Some(id) = self.context.pop() else {
                    break;
                };
                if !tracker.should_process(&id) {
                    continue;
                }
                self.monitor.report(RefreshProgress::Descriptor {
                    phase: RefreshPhase::Resolution,
                    descriptor: id.clone(),
                });

                let mut current = None;
                if workspace.is_enabled(&id) {
                    current = self.state.facade(&id);
                }
                if current.is_some() && !self.all_processed.contains(&id) {
                    // committed facade this refresh has not read yet
                    current = self
                        .manager
                        .read_facades(
                            std::slice::from_ref(&id),
                            &*self.state,
                            self.execution,
                            self.monitor,
                        )?
                        .shift_remove(&id);
                }

                self.resolve_descriptor(&id, current)?;
            }

            if !tracker.needs_improvement(&mut self.context) {
                break;
            }
            tracing::debug!(
                target = "nova.maven.registry",
                pass = tracker.pass(),
                pending = self.context.len(),
                "starting another dependency resolution pass"
            );
        }
        Ok(())
    }

    fn resolve_descriptor(
        &mut self,
        id: &DescriptorId,
        current: Option<Arc<ProjectFacade>>,
    ) -> Result<()> {
        let resolved = match current {
            Some(facade) => {
                let project =
                    self.manager
                        .maven_project(&facade, &*self.state, self.execution, self.monitor);
                match project {
                    Some(project) => Some(self.resolve_facade(id, &facade, project)?),
                    None => {
                        tracing::warn!(
                            target = "nova.maven.registry",
                            pom = %id,
                            "no project available for facade, dropping it"
                        );
                        self.state.set_project(id, None)?;
                        None
                    }
                }
            }
            None => {
                if self.state.facade(id).is_some() {
                    self.state.set_project(id, None)?;
                }
                None
            }
        };

        let (capabilities, requirements) = match resolved {
            Some((capabilities, requirements)) => (Some(capabilities), Some(requirements)),
            None => (None, self.unparsed_requirements(id)),
        };

        let replaced = self.state.set_capabilities(id, capabilities.clone())?;
        let old_capabilities = match self.original_capabilities.get(id) {
            Some(original) => original.clone(),
            None => replaced,
        };
        let changed = capability::diff(old_capabilities.as_ref(), capabilities.as_ref());
        let versioned_only = changed
            .iter()
            .all(|capability| capability.namespace() != Namespace::MavenArtifact);
        for capability in &changed {
            let dependents = if versioned_only {
                self.state.versioned_dependents(capability)
            } else {
                self.state.dependents(capability, true)
            };
            self.force_changed_dependents(dependents);
        }

        let replaced = self.state.set_requirements(id, requirements.clone())?;
        let old_requirements = match self.original_requirements.get(id) {
            Some(original) => original.clone(),
            None => replaced,
        };
        // A changed requirement set changes the resolved graph of everything
        // depending on this descriptor, even when its exports stay the same.
        let requirements_changed =
            capability::has_diff(old_requirements.as_ref(), requirements.as_ref());
        if requirements_changed {
            if let Some(old_capabilities) = &old_capabilities {
                for capability in old_capabilities {
                    let dependents = self.state.versioned_dependents(capability);
                    self.force_changed_dependents(dependents);
                }
            }
        }

        if (requirements_changed || self.upstream_changed.contains(id))
            && self.state.facade(id).is_some()
        {
            self.state.mark_changed(id)?;
        }
        Ok(())
    }

    /// Lifecycle mapping plus dependency resolution for one parsed descriptor.
    ///
    /// Always publishes a new facade instance.
    fn resolve_facade(
        &mut self,
        id: &DescriptorId,
        facade: &Arc<ProjectFacade>,
        project: Arc<MavenProject>,
    ) -> Result<(CapabilitySet, RequirementSet)> {
        let manager = self.manager;
        let services = &manager.services;

        let mapping = services.lifecycle_mappings.calculate(
            &project,
            facade.mojo_executions(),
            facade.resolver_configuration().lifecycle_mapping_id.as_deref(),
        );
        services.markers.delete_markers(id, MarkerKind::LifecycleMapping);
        if !mapping.problems.is_empty() {
            services
                .markers
                .add_markers(id, MarkerKind::LifecycleMapping, &mapping.problems);
        }

        let mut next = ProjectFacade::clone(facade);
        next.set_lifecycle_mapping(
            mapping.lifecycle_mapping_id.clone(),
            mapping.mojo_execution_mapping.clone(),
            mapping.configurators.clone(),
        );

        let key = next.artifact_key().clone();
        let mut output = ResolutionOutput::default();
        output.capabilities.insert(Capability::maven_artifact(&key));
        output.capabilities.insert(Capability::maven_parent(&key));
        output.requirements = structure_requirements(&project);

        let resolver = mapping
            .mapping
            .as_ref()
            .and_then(|mapping| mapping.dependency_resolver())
            .unwrap_or_else(|| Arc::clone(&services.default_resolver));

        services
            .markers
            .delete_markers(id, MarkerKind::DependencyResolution);
        if let Err(err) = resolver.resolve_project_dependencies(
            &next,
            &project,
            &*self.state,
            &mut output,
            self.monitor,
        ) {
            tracing::warn!(
                target = "nova.maven.registry",
                pom = %id,
                error = %err,
                "dependency resolution failed"
            );
            services.markers.add_markers(
                id,
                MarkerKind::DependencyResolution,
                &[Problem::error(err.to_string())],
            );
        }

        let ResolutionOutput {
            capabilities,
            requirements,
            artifacts,
            installed,
        } = output;
        next.set_artifacts(artifacts);
        let next = Arc::new(next);
        self.execution.put(facade, None);
        manager.put_project(&next, project, self.execution);
        self.state.set_project(id, Some(next))?;

        for artifact in &installed {
            self.on_artifact_installed(artifact);
        }
        Ok((capabilities, requirements))
    }

    /// Requirements of an enabled descriptor that could not be parsed: its
    /// raw parent reference, so it is retried once the parent shows up.
    fn unparsed_requirements(&self, id: &DescriptorId) -> Option<RequirementSet> {
        if !self.manager.services.workspace.is_enabled(id) {
            return None;
        }
        let parent = self.manager.services.parser.read_parent(id)?;
        Some([RequiredCapability::maven_parent(&parent)].into_iter().collect())
    }

    fn on_artifact_installed(&mut self, installed: &InstalledArtifact) {
        let mut refresh = IndexSet::new();
        for key in [&installed.artifact, &installed.base] {
            if !self.installed.insert(key.clone()) {
                continue;
            }
            for capability in [
                Capability::maven_parent(key),
                Capability::maven_artifact(key),
                Capability::maven_artifact_import(key),
            ] {
                refresh.extend(self.state.versioned_dependents(&capability));
            }
        }
        if !refresh.is_empty() {
            tracing::debug!(
                target = "nova.maven.registry",
                artifact = %installed.artifact,
                projects = refresh.len(),
                "installed artifact forces dependents"
            );
            self.context.force(refresh);
        }
    }
}
