//! The committed, immutable project registry and the cell that publishes it.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::capability::{Capability, CapabilitySet, RequirementSet};
use crate::error::{RegistryError, Result};
use crate::facade::ProjectFacade;
use crate::graph::CapabilityGraph;
use crate::model::{ArtifactKey, DescriptorId};
use crate::mutable::MutableProjectRegistry;

/// Read queries shared by committed snapshots and in-flight mutable registries.
pub trait RegistryView {
    fn facade(&self, id: &DescriptorId) -> Option<Arc<ProjectFacade>>;

    /// The workspace facade exporting exactly `key`, if any.
    fn facade_by_key(&self, key: &ArtifactKey) -> Option<Arc<ProjectFacade>>;

    fn projects(&self) -> Vec<Arc<ProjectFacade>>;

    fn capabilities(&self, id: &DescriptorId) -> Option<&CapabilitySet>;

    fn requirements(&self, id: &DescriptorId) -> Option<&RequirementSet>;

    /// Descriptors that require `capability`; see [`CapabilityGraph::dependents`].
    fn dependents(
        &self,
        capability: &Capability,
        include_versionless: bool,
    ) -> IndexSet<DescriptorId>;

    fn versioned_dependents(&self, capability: &Capability) -> IndexSet<DescriptorId> {
        self.dependents(capability, false)
    }
}

/// Point-in-time view of every known descriptor.
///
/// Instances are never mutated after publication; a refresh produces a new
/// one through [`SharedRegistry::apply`].
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    version: u64,
    facades: HashMap<DescriptorId, Arc<ProjectFacade>>,
    artifacts: HashMap<ArtifactKey, IndexSet<DescriptorId>>,
    graph: CapabilityGraph,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from its parts (used when loading persisted state).
    pub(crate) fn from_parts(
        facades: impl IntoIterator<Item = ProjectFacade>,
        graph: CapabilityGraph,
    ) -> Self {
        let mut registry = Self {
            graph,
            ..Self::default()
        };
        for facade in facades {
            let facade = Arc::new(facade);
            registry.index_artifact(&facade);
            registry
                .facades
                .insert(facade.descriptor().clone(), facade);
        }
        registry
    }

    /// Monotonic commit counter; bumped by every successful apply.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.facades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facades.is_empty()
    }

    pub fn graph(&self) -> &CapabilityGraph {
        &self.graph
    }

    pub(crate) fn facade_ref(&self, id: &DescriptorId) -> Option<&Arc<ProjectFacade>> {
        self.facades.get(id)
    }

    pub(crate) fn artifact_owners(&self, key: &ArtifactKey) -> Option<&IndexSet<DescriptorId>> {
        self.artifacts.get(key)
    }

    /// Checks the "no dangling edges" invariant.
    pub fn is_valid(&self) -> bool {
        let artifacts_ok = self.artifacts.iter().all(|(key, ids)| {
            ids.iter().all(|id| {
                self.facades
                    .get(id)
                    .is_some_and(|facade| facade.artifact_key() == key)
            })
        });
        let facades_ok = self.facades.iter().all(|(id, facade)| {
            facade.descriptor() == id
                && self
                    .artifacts
                    .get(facade.artifact_key())
                    .is_some_and(|ids| ids.contains(id))
        });
        artifacts_ok && facades_ok && self.graph.is_consistent()
    }

    fn index_artifact(&mut self, facade: &ProjectFacade) {
        self.artifacts
            .entry(facade.artifact_key().clone())
            .or_default()
            .insert(facade.descriptor().clone());
    }

    fn unindex_artifact(&mut self, facade: &ProjectFacade) {
        if let Some(ids) = self.artifacts.get_mut(facade.artifact_key()) {
            ids.shift_remove(facade.descriptor());
            if ids.is_empty() {
                self.artifacts.remove(facade.artifact_key());
            }
        }
    }
}

impl RegistryView for ProjectRegistry {
    fn facade(&self, id: &DescriptorId) -> Option<Arc<ProjectFacade>> {
        self.facades.get(id).cloned()
    }

    fn facade_by_key(&self, key: &ArtifactKey) -> Option<Arc<ProjectFacade>> {
        self.artifacts
            .get(key)?
            .iter()
            .find_map(|id| self.facades.get(id).cloned())
    }

    fn projects(&self) -> Vec<Arc<ProjectFacade>> {
        let mut projects: Vec<_> = self.facades.values().cloned().collect();
        projects.sort_by(|a, b| a.descriptor().cmp(b.descriptor()));
        projects
    }

    fn capabilities(&self, id: &DescriptorId) -> Option<&CapabilitySet> {
        self.graph.capabilities(id)
    }

    fn requirements(&self, id: &DescriptorId) -> Option<&RequirementSet> {
        self.graph.requirements(id)
    }

    fn dependents(
        &self,
        capability: &Capability,
        include_versionless: bool,
    ) -> IndexSet<DescriptorId> {
        self.graph.dependents(capability, include_versionless)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One committed change to a descriptor's facade.
#[derive(Debug, Clone)]
pub struct ProjectChangedEvent {
    pub descriptor: DescriptorId,
    pub kind: ChangeKind,
    pub old: Option<Arc<ProjectFacade>>,
    pub new: Option<Arc<ProjectFacade>>,
}

/// Result of publishing a mutable registry.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub registry: Arc<ProjectRegistry>,
    pub events: Vec<ProjectChangedEvent>,
    /// `(discarded, kept)` pairs: facades rebuilt during the refresh whose
    /// content equals the committed instance, which is kept instead.
    pub retained: Vec<(Arc<ProjectFacade>, Arc<ProjectFacade>)>,
}

/// Process-wide holder of the current [`ProjectRegistry`].
///
/// Readers take a consistent snapshot with [`SharedRegistry::snapshot`] and
/// never block. Writers go through [`SharedRegistry::apply`], which swaps the
/// snapshot pointer atomically.
#[derive(Debug)]
pub struct SharedRegistry {
    current: ArcSwap<ProjectRegistry>,
    writer: Mutex<()>,
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(ProjectRegistry::new())
    }
}

impl SharedRegistry {
    pub fn new(registry: ProjectRegistry) -> Self {
        Self {
            current: ArcSwap::from_pointee(registry),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<ProjectRegistry> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Whether `snapshot` is still the published registry.
    pub fn is_current(&self, snapshot: &Arc<ProjectRegistry>) -> bool {
        Arc::ptr_eq(&self.current.load(), snapshot)
    }

    /// Start a write transaction based on the current snapshot.
    pub fn new_mutable(self: &Arc<Self>) -> MutableProjectRegistry {
        MutableProjectRegistry::new(Arc::clone(self), self.snapshot())
    }

    /// Publish `state`, returning one event per descriptor whose facade changed.
    ///
    /// Fails with [`RegistryError::Stale`] if another transaction was committed
    /// after `state`'s base snapshot was taken.
    pub fn apply(&self, state: MutableProjectRegistry) -> Result<ApplyOutcome> {
        let _writer = self.writer.lock();

        let current = self.current.load_full();
        if !Arc::ptr_eq(&current, state.base()) {
            tracing::debug!(
                target = "nova.maven.registry",
                base = state.base().version,
                current = current.version,
                "rejecting stale mutable registry"
            );
            return Err(RegistryError::Stale);
        }

        let mut next = ProjectRegistry::clone(&current);
        next.version = current.version + 1;

        let mut events = Vec::new();
        let mut retained = Vec::new();
        let (facades, graph, marked) = state.into_overlay();

        for (id, new) in facades {
            let old = current.facades.get(&id).cloned();
            let kind = match (&old, &new) {
                (None, None) => continue,
                (Some(old), Some(new)) if Arc::ptr_eq(old, new) => continue,
                (Some(old), Some(new)) if **old == **new && !marked.contains(&id) => {
                    retained.push((Arc::clone(new), Arc::clone(old)));
                    continue;
                }
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Removed,
                (Some(_), Some(_)) => ChangeKind::Changed,
            };

            if let Some(old) = &old {
                next.unindex_artifact(old);
                next.facades.remove(&id);
            }
            if let Some(new) = &new {
                next.index_artifact(new);
                next.facades.insert(id.clone(), Arc::clone(new));
            }
            events.push(ProjectChangedEvent {
                descriptor: id,
                kind,
                old,
                new,
            });
        }

        for (id, capabilities) in graph.capability_entries() {
            let value = (!capabilities.is_empty()).then(|| capabilities.clone());
            next.graph.set_capabilities(id, value);
        }
        for (id, requirements) in graph.requirement_entries() {
            let value = (!requirements.is_empty()).then(|| requirements.clone());
            next.graph.set_requirements(id, value);
        }

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));

        tracing::debug!(
            target = "nova.maven.registry",
            version = next.version,
            changed = events.len(),
            "applied project registry"
        );

        Ok(ApplyOutcome {
            registry: next,
            events,
            retained,
        })
    }
}
