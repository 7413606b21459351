//! Copy-on-write write transaction over a committed [`ProjectRegistry`].

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use indexmap::{IndexMap, IndexSet};

use crate::capability::{Capability, CapabilitySet, Namespace, RequirementSet};
use crate::error::{RegistryError, Result};
use crate::facade::ProjectFacade;
use crate::graph::CapabilityGraph;
use crate::model::{ArtifactKey, DescriptorId};
use crate::registry::{ProjectRegistry, RegistryView, SharedRegistry};

/// A writable overlay on one base snapshot.
///
/// Reads consult the overlay first and fall through to the base. Writes only
/// touch the overlay. Once another transaction is committed the registry
/// becomes stale and every write fails with [`RegistryError::Stale`].
/// Dropping an uncommitted registry discards it.
///
/// The registry is single-writer: it remembers the thread that created it and
/// rejects writes from any other thread as stale.
#[derive(Debug)]
pub struct MutableProjectRegistry {
    shared: Arc<SharedRegistry>,
    base: Arc<ProjectRegistry>,
    owner: ThreadId,
    /// `None` marks a removed facade.
    facades: IndexMap<DescriptorId, Option<Arc<ProjectFacade>>>,
    /// Overlay entries; an empty set shadows (clears) the base entry.
    graph: CapabilityGraph,
    /// Descriptors reported as changed on commit even if their facade is
    /// equal to the committed one.
    changed: IndexSet<DescriptorId>,
}

impl MutableProjectRegistry {
    pub(crate) fn new(shared: Arc<SharedRegistry>, base: Arc<ProjectRegistry>) -> Self {
        Self {
            shared,
            base,
            owner: thread::current().id(),
            facades: IndexMap::new(),
            graph: CapabilityGraph::new(),
            changed: IndexSet::new(),
        }
    }

    pub(crate) fn base(&self) -> &Arc<ProjectRegistry> {
        &self.base
    }

    pub(crate) fn into_overlay(
        self,
    ) -> (
        IndexMap<DescriptorId, Option<Arc<ProjectFacade>>>,
        CapabilityGraph,
        IndexSet<DescriptorId>,
    ) {
        (self.facades, self.graph, self.changed)
    }

    /// True once a newer registry has been committed over this one's base.
    pub fn is_stale(&self) -> bool {
        !self.shared.is_current(&self.base)
    }

    pub(crate) fn assert_not_stale(&self) -> Result<()> {
        if self.is_stale() || thread::current().id() != self.owner {
            return Err(RegistryError::Stale);
        }
        Ok(())
    }

    /// Descriptors written by this transaction, in write order.
    pub fn touched(&self) -> impl Iterator<Item = &DescriptorId> + '_ {
        self.facades.keys()
    }

    pub fn set_project(
        &mut self,
        id: &DescriptorId,
        facade: Option<Arc<ProjectFacade>>,
    ) -> Result<()> {
        self.assert_not_stale()?;
        self.facades.insert(id.clone(), facade);
        Ok(())
    }

    /// Report `id` as changed on commit when it still has a facade, even one
    /// equal to the committed facade.
    pub fn mark_changed(&mut self, id: &DescriptorId) -> Result<()> {
        self.assert_not_stale()?;
        self.changed.insert(id.clone());
        Ok(())
    }

    /// Drop `id`'s facade and every capability/requirement edge it owns.
    pub fn remove_project(&mut self, id: &DescriptorId) -> Result<()> {
        self.assert_not_stale()?;
        self.facades.insert(id.clone(), None);
        self.graph
            .set_capabilities(id, Some(CapabilitySet::new()));
        self.graph
            .set_requirements(id, Some(RequirementSet::new()));
        Ok(())
    }

    /// Replace `id`'s exported capabilities; returns the previously visible set.
    pub fn set_capabilities(
        &mut self,
        id: &DescriptorId,
        capabilities: Option<CapabilitySet>,
    ) -> Result<Option<CapabilitySet>> {
        self.assert_not_stale()?;
        let previous = self.capabilities(id).cloned();
        self.graph
            .set_capabilities(id, Some(capabilities.unwrap_or_default()));
        Ok(previous)
    }

    /// Replace `id`'s required capabilities; returns the previously visible set.
    pub fn set_requirements(
        &mut self,
        id: &DescriptorId,
        requirements: Option<RequirementSet>,
    ) -> Result<Option<RequirementSet>> {
        self.assert_not_stale()?;
        let previous = self.requirements(id).cloned();
        self.graph
            .set_requirements(id, Some(requirements.unwrap_or_default()));
        Ok(previous)
    }

    /// Strip module relationships rooted at the removed artifact `key`.
    ///
    /// Every descriptor declaring `key` as its parent loses that requirement
    /// edge and is returned so the caller can refresh it. Children that have
    /// no facade of their own are orphaned along with the parent, so their own
    /// children are stripped too.
    pub fn remove_workspace_modules(&mut self, key: &ArtifactKey) -> Result<IndexSet<DescriptorId>> {
        self.assert_not_stale()?;

        let mut affected = IndexSet::new();
        let mut visited = HashSet::new();
        let mut pending = vec![key.clone()];

        while let Some(key) = pending.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let parent = Capability::maven_parent(&key);
            for child in self.dependents(&parent, true) {
                if let Some(requirements) = self.requirements(&child) {
                    let stripped: RequirementSet = requirements
                        .iter()
                        .filter(|req| !req.is_potential_match(&parent, false))
                        .cloned()
                        .collect();
                    self.graph.set_requirements(&child, Some(stripped));
                }

                if self.facade(&child).is_none() {
                    let orphan_keys: Vec<ArtifactKey> = self
                        .capabilities(&child)
                        .into_iter()
                        .flatten()
                        .filter(|cap| cap.key.namespace == Namespace::MavenParent)
                        .filter_map(|cap| {
                            let (group_id, artifact_id) = cap.key.id.split_once(':')?;
                            Some(ArtifactKey::new(group_id, artifact_id, cap.version.clone()))
                        })
                        .collect();
                    pending.extend(orphan_keys);
                }
                affected.insert(child);
            }
        }

        Ok(affected)
    }
}

impl RegistryView for MutableProjectRegistry {
    fn facade(&self, id: &DescriptorId) -> Option<Arc<ProjectFacade>> {
        match self.facades.get(id) {
            Some(overlay) => overlay.clone(),
            None => self.base.facade(id),
        }
    }

    fn facade_by_key(&self, key: &ArtifactKey) -> Option<Arc<ProjectFacade>> {
        let overlay = self
            .facades
            .values()
            .flatten()
            .find(|facade| facade.artifact_key() == key);
        if let Some(facade) = overlay {
            return Some(Arc::clone(facade));
        }
        self.base
            .artifact_owners(key)?
            .iter()
            .filter(|id| !self.facades.contains_key(*id))
            .find_map(|id| self.base.facade_ref(id).cloned())
    }

    fn projects(&self) -> Vec<Arc<ProjectFacade>> {
        let mut projects: Vec<_> = self
            .base
            .projects()
            .into_iter()
            .filter(|facade| !self.facades.contains_key(facade.descriptor()))
            .collect();
        projects.extend(self.facades.values().flatten().cloned());
        projects.sort_by(|a, b| a.descriptor().cmp(b.descriptor()));
        projects
    }

    fn capabilities(&self, id: &DescriptorId) -> Option<&CapabilitySet> {
        if self.graph.has_capabilities_entry(id) {
            return self.graph.capabilities(id).filter(|set| !set.is_empty());
        }
        self.base.graph().capabilities(id)
    }

    fn requirements(&self, id: &DescriptorId) -> Option<&RequirementSet> {
        if self.graph.has_requirements_entry(id) {
            return self.graph.requirements(id).filter(|set| !set.is_empty());
        }
        self.base.graph().requirements(id)
    }

    fn dependents(
        &self,
        capability: &Capability,
        include_versionless: bool,
    ) -> IndexSet<DescriptorId> {
        let mut out = self.base.graph().dependents_filtered(
            capability,
            include_versionless,
            |id| !self.graph.has_requirements_entry(id),
        );
        out.extend(self.graph.dependents(capability, include_versionless));
        out
    }
}
