use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::cache::{ExecutionContext, ProjectCache};
use crate::capability::Capability;
use crate::config::RegistryConfig;
use crate::error::Result;
use crate::facade::ProjectFacade;
use crate::model::{ArtifactKey, DescriptorId, MarkerKind, MavenProject, ResolverConfiguration};
use crate::monitor::{RefreshMonitor, RefreshPhase, RefreshProgress};
use crate::mutable::MutableProjectRegistry;
use crate::persist::{JsonStateStore, StateStore};
use crate::refresh::RefreshEngine;
use crate::registry::{ProjectChangedEvent, ProjectRegistry, RegistryView, SharedRegistry};
use crate::services::{ChangeListener, ContainerId, RegistryServices};

/// Owns the process-wide [`ProjectRegistry`] and keeps it up to date.
///
/// Refreshes are serialized by a workspace-wide lock and run on the calling
/// thread. Readers never block: every query works on the snapshot that was
/// current when it started.
pub struct ProjectRegistryManager {
    shared: Arc<SharedRegistry>,
    pub(crate) services: RegistryServices,
    pub(crate) config: RegistryConfig,
    state_store: Option<Arc<dyn StateStore>>,
    cache: Mutex<ProjectCache>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    workspace_lock: ReentrantMutex<()>,
    sync_refresh_thread: Mutex<Option<ThreadId>>,
}

impl std::fmt::Debug for ProjectRegistryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectRegistryManager")
            .field("version", &self.shared.version())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Marks the current thread as the one running a synchronous refresh.
struct SyncRefreshGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
    previous: Option<ThreadId>,
}

impl<'a> SyncRefreshGuard<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        let previous = slot.lock().replace(thread::current().id());
        Self { slot, previous }
    }
}

impl Drop for SyncRefreshGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = self.previous;
    }
}

impl ProjectRegistryManager {
    /// Create a manager, starting from the persisted snapshot when there is a
    /// valid one and `update_projects_on_startup` is off.
    pub fn new(services: RegistryServices, config: RegistryConfig) -> Self {
        let state_store = services.state_store.clone().or_else(|| {
            config
                .state_file
                .clone()
                .map(|path| Arc::new(JsonStateStore::new(path)) as Arc<dyn StateStore>)
        });

        let initial = if config.update_projects_on_startup {
            None
        } else {
            state_store.as_ref().and_then(|store| match store.load() {
                Ok(registry) => registry,
                Err(err) => {
                    tracing::warn!(
                        target = "nova.maven.registry",
                        error = %err,
                        "failed to load persisted registry state"
                    );
                    None
                }
            })
        };
        let initial = match initial {
            Some(registry) if registry.is_valid() => {
                tracing::debug!(
                    target = "nova.maven.registry",
                    projects = registry.len(),
                    "loaded persisted registry state"
                );
                registry
            }
            Some(_) => {
                tracing::warn!(
                    target = "nova.maven.registry",
                    "discarding inconsistent persisted registry state"
                );
                ProjectRegistry::new()
            }
            None => ProjectRegistry::new(),
        };

        let cache = ProjectCache::new(
            config.project_cache_size,
            Arc::clone(&services.build_caches),
        );

        Self {
            shared: Arc::new(SharedRegistry::new(initial)),
            services,
            config,
            state_store,
            cache: Mutex::new(cache),
            listeners: RwLock::new(Vec::new()),
            workspace_lock: ReentrantMutex::new(()),
            sync_refresh_thread: Mutex::new(None),
        }
    }

    /// Create a manager configured from a TOML file plus environment overrides.
    pub fn from_config_file(services: RegistryServices, path: impl AsRef<Path>) -> Result<Self> {
        let config = RegistryConfig::load_from_path(path)?.with_env_overrides();
        Ok(Self::new(services, config))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The currently committed registry.
    pub fn registry(&self) -> Arc<ProjectRegistry> {
        self.shared.snapshot()
    }

    pub fn get_facade(&self, id: &DescriptorId) -> Option<Arc<ProjectFacade>> {
        self.shared.snapshot().facade(id)
    }

    pub fn get_facade_by_key(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Option<Arc<ProjectFacade>> {
        self.shared
            .snapshot()
            .facade_by_key(&ArtifactKey::new(group_id, artifact_id, version))
    }

    pub fn projects(&self) -> Vec<Arc<ProjectFacade>> {
        self.shared.snapshot().projects()
    }

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.listeners
            .write()
            .retain(|existing| !same_listener(existing, listener));
    }

    pub fn create_execution_context(&self, force_dependency_update: bool) -> ExecutionContext {
        ExecutionContext::new(force_dependency_update)
    }

    /// Refresh `ids` and everything affected by their changes, then commit.
    ///
    /// Returns the committed change events, which have already been delivered
    /// to the listeners. Fails with [`crate::RegistryError::Cancelled`] or
    /// [`crate::RegistryError::Stale`] without touching the committed registry.
    pub fn refresh(
        &self,
        ids: impl IntoIterator<Item = DescriptorId>,
        monitor: &RefreshMonitor,
    ) -> Result<Vec<ProjectChangedEvent>> {
        let execution = self.create_execution_context(false);
        self.refresh_in_context(ids, &execution, monitor)
    }

    pub fn refresh_in_context(
        &self,
        ids: impl IntoIterator<Item = DescriptorId>,
        execution: &ExecutionContext,
        monitor: &RefreshMonitor,
    ) -> Result<Vec<ProjectChangedEvent>> {
        let ids: Vec<DescriptorId> = ids.into_iter().collect();

        let _workspace = self.workspace_lock.lock();
        let _sync = SyncRefreshGuard::enter(&self.sync_refresh_thread);

        tracing::debug!(
            target = "nova.maven.registry",
            requested = ids.len(),
            "refreshing projects"
        );
        monitor.report(RefreshProgress::Begin {
            requested: ids.len(),
        });

        let mut state = self.new_mutable_registry();
        self.refresh_registry(&mut state, ids, execution, monitor)?;
        monitor.check_cancelled()?;
        let events = self.apply_mutable_registry(state, monitor)?;

        monitor.report(RefreshProgress::End {
            changed: events.len(),
        });
        tracing::debug!(
            target = "nova.maven.registry",
            changed = events.len(),
            "refreshed projects"
        );
        Ok(events)
    }

    /// Run both refresh phases over `state` without committing it.
    pub fn refresh_registry(
        &self,
        state: &mut MutableProjectRegistry,
        ids: impl IntoIterator<Item = DescriptorId>,
        execution: &ExecutionContext,
        monitor: &RefreshMonitor,
    ) -> Result<()> {
        RefreshEngine::new(self, state, execution, monitor, ids).run()
    }

    pub fn new_mutable_registry(&self) -> MutableProjectRegistry {
        self.shared.new_mutable()
    }

    /// Commit `state` and notify listeners of the resulting events.
    pub fn apply_mutable_registry(
        &self,
        state: MutableProjectRegistry,
        monitor: &RefreshMonitor,
    ) -> Result<Vec<ProjectChangedEvent>> {
        let outcome = self.shared.apply(state)?;
        {
            let mut cache = self.cache.lock();
            for (discarded, kept) in &outcome.retained {
                cache.rekey(discarded, kept);
            }
        }
        for event in &outcome.events {
            monitor.report(RefreshProgress::Descriptor {
                phase: RefreshPhase::Commit,
                descriptor: event.descriptor.clone(),
            });
        }
        self.notify_listeners(&outcome.events, monitor);
        Ok(outcome.events)
    }

    fn notify_listeners(&self, events: &[ProjectChangedEvent], monitor: &RefreshMonitor) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.project_changed(events, monitor);
        }
    }

    /// Remove every id in `ids` that is forced, has no facade, or whose facade
    /// is stale. Returns the descriptors affected by the removals.
    pub fn remove(
        &self,
        state: &mut MutableProjectRegistry,
        ids: impl IntoIterator<Item = DescriptorId>,
        force: bool,
    ) -> Result<IndexSet<DescriptorId>> {
        let workspace = Arc::clone(&self.services.workspace);
        let mut affected = IndexSet::new();
        for id in ids {
            let eligible = force
                || state
                    .facade(&id)
                    .map_or(true, |facade| facade.is_stale(workspace.as_ref()));
            if eligible {
                affected.extend(self.remove_descriptor(state, &id)?);
            }
        }
        Ok(affected)
    }

    /// Remove one descriptor and its edges.
    ///
    /// Dependents of its artifact and parent capabilities, plus any stripped
    /// workspace modules, are returned for the caller to refresh; they are not
    /// recomputed here.
    pub fn remove_descriptor(
        &self,
        state: &mut MutableProjectRegistry,
        id: &DescriptorId,
    ) -> Result<IndexSet<DescriptorId>> {
        let facade = state.facade(id);
        self.flush_caches(facade.as_ref(), false);

        let Some(facade) = facade else {
            state.remove_project(id)?;
            return Ok(IndexSet::new());
        };
        let key = facade.artifact_key().clone();

        let mut affected = state.dependents(&Capability::maven_artifact(&key), true);
        affected.extend(state.dependents(&Capability::maven_parent(&key), true));
        state.remove_project(id)?;
        affected.extend(state.remove_workspace_modules(&key)?);
        affected.extend(facade.module_descriptors().filter(|module| state.facade(module).is_some()));
        affected.shift_remove(id);

        tracing::debug!(
            target = "nova.maven.registry",
            pom = %id,
            affected = affected.len(),
            "removed project"
        );
        Ok(affected)
    }

    /// The committed facade of `id`, or with `load`, a facade read on the fly
    /// that is not added to the registry.
    pub fn create(
        &self,
        id: &DescriptorId,
        load: bool,
        monitor: &RefreshMonitor,
    ) -> Option<Arc<ProjectFacade>> {
        let snapshot = self.shared.snapshot();
        if let Some(facade) = snapshot.facade(id) {
            return Some(facade);
        }
        if !load {
            return None;
        }

        let configuration = self.services.workspace.resolver_configuration(id);
        let result = self.services.parser.read_project_with_dependencies(
            id,
            &configuration,
            &*snapshot,
            monitor,
        );
        match result.project {
            Some(project) => Some(Arc::new(ProjectFacade::new(
                id.clone(),
                &project,
                configuration,
                self.services.workspace.fingerprint(id),
            ))),
            None => {
                for problem in &result.problems {
                    tracing::error!(
                        target = "nova.maven.registry",
                        pom = %id,
                        problem = %problem.message,
                        "failed to read maven project"
                    );
                }
                None
            }
        }
    }

    /// Persist the committed registry through the configured state store.
    pub fn write_workspace_state(&self) -> Result<()> {
        let Some(store) = &self.state_store else {
            return Ok(());
        };
        store.save(&self.shared.snapshot())
    }

    /// The project model behind `facade`.
    ///
    /// Looks in `execution` first, then the shared cache, and finally reads the
    /// descriptor with its dependencies against `registry`.
    pub fn maven_project(
        &self,
        facade: &Arc<ProjectFacade>,
        registry: &dyn RegistryView,
        execution: &ExecutionContext,
        monitor: &RefreshMonitor,
    ) -> Option<Arc<MavenProject>> {
        if let Some(project) = self.cached_project(facade, execution) {
            return Some(project);
        }

        let result = self.services.parser.read_project_with_dependencies(
            facade.descriptor(),
            facade.resolver_configuration(),
            registry,
            monitor,
        );
        match result.project {
            Some(project) => {
                self.put_project(facade, Arc::clone(&project), execution);
                Some(project)
            }
            None => {
                tracing::warn!(
                    target = "nova.maven.registry",
                    pom = %facade.descriptor(),
                    problems = result.problems.len(),
                    "failed to read project with dependencies"
                );
                None
            }
        }
    }

    pub(crate) fn is_sync_refresh_thread(&self) -> bool {
        self.sync_refresh_thread
            .lock()
            .map_or(true, |owner| owner == thread::current().id())
    }

    pub(crate) fn cached_project(
        &self,
        facade: &Arc<ProjectFacade>,
        execution: &ExecutionContext,
    ) -> Option<Arc<MavenProject>> {
        if let Some(project) = execution.get(facade) {
            return Some(project);
        }
        let project = self.cache.lock().get(facade)?;
        execution.put(facade, Some(Arc::clone(&project)));
        Some(project)
    }

    pub(crate) fn put_project(
        &self,
        facade: &Arc<ProjectFacade>,
        project: Arc<MavenProject>,
        execution: &ExecutionContext,
    ) {
        execution.put(facade, Some(Arc::clone(&project)));
        self.cache.lock().insert(facade, project, Some(execution));
    }

    /// Flush cached state for `facade`, returning committed descriptors whose
    /// cached state was affected.
    pub(crate) fn flush_caches(
        &self,
        facade: Option<&Arc<ProjectFacade>>,
        force_dependency_update: bool,
    ) -> HashSet<DescriptorId> {
        let Some(facade) = facade else {
            return HashSet::new();
        };
        self.cache.lock().invalidate(facade);
        let committed = self.shared.snapshot();
        self.services
            .build_caches
            .flush(facade.descriptor(), facade.artifact_key(), force_dependency_update)
            .into_iter()
            .filter(|id| committed.facade(id).is_some())
            .collect()
    }

    /// Structural read of `ids`, batched per resolver configuration and
    /// container. Returns the descriptors that produced a facade.
    pub(crate) fn read_facades(
        &self,
        ids: &[DescriptorId],
        registry: &dyn RegistryView,
        execution: &ExecutionContext,
        monitor: &RefreshMonitor,
    ) -> Result<IndexMap<DescriptorId, Arc<ProjectFacade>>> {
        let services = &self.services;
        for id in ids {
            services.markers.delete_markers(id, MarkerKind::PomLoading);
        }

        let mut groups: IndexMap<ResolverConfiguration, Vec<DescriptorId>> = IndexMap::new();
        for id in ids {
            monitor.check_cancelled()?;
            groups
                .entry(services.workspace.resolver_configuration(id))
                .or_default()
                .push(id.clone());
        }

        let mut out = IndexMap::new();
        for (configuration, group) in groups {
            let mut containers: IndexMap<ContainerId, Vec<DescriptorId>> = IndexMap::new();
            for id in group {
                match services.containers.acquire(&id) {
                    Ok(container) => containers.entry(container).or_default().push(id),
                    Err(err) => tracing::error!(
                        target = "nova.maven.registry",
                        pom = %id,
                        error = %err,
                        "can't acquire container, skipping"
                    ),
                }
            }

            for (container, batch) in containers {
                monitor.check_cancelled()?;
                let mut results =
                    services
                        .parser
                        .read_projects(&container, &batch, &configuration, registry);
                for id in &batch {
                    if !services.workspace.is_enabled(id) {
                        continue;
                    }
                    let Some(result) = results.remove(id) else {
                        continue;
                    };
                    if !result.problems.is_empty() {
                        services
                            .markers
                            .add_markers(id, MarkerKind::PomLoading, &result.problems);
                    }
                    let Some(project) = result.project else {
                        tracing::warn!(
                            target = "nova.maven.registry",
                            pom = %id,
                            problems = result.problems.len(),
                            "failed to read project"
                        );
                        continue;
                    };
                    let facade = Arc::new(ProjectFacade::new(
                        id.clone(),
                        &project,
                        configuration.clone(),
                        services.workspace.fingerprint(id),
                    ));
                    self.put_project(&facade, project, execution);
                    out.insert(id.clone(), facade);
                }
            }
        }
        Ok(out)
    }
}

fn same_listener(a: &Arc<dyn ChangeListener>, b: &Arc<dyn ChangeListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
