//! Bidirectional capability index.
//!
//! For every descriptor the graph stores the exported capability set and the
//! required capability set, plus reverse indexes keyed by versionless key so
//! "who exports X" and "who depends on X" never scan the whole workspace.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::capability::{Capability, CapabilitySet, RequirementSet, VersionlessKey};
use crate::model::DescriptorId;

#[derive(Debug, Clone, Default)]
pub struct CapabilityGraph {
    capabilities: HashMap<DescriptorId, CapabilitySet>,
    requirements: HashMap<DescriptorId, RequirementSet>,
    exporters: HashMap<VersionlessKey, IndexSet<DescriptorId>>,
    requirers: HashMap<VersionlessKey, IndexSet<DescriptorId>>,
}

impl CapabilityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capabilities(&self, id: &DescriptorId) -> Option<&CapabilitySet> {
        self.capabilities.get(id)
    }

    pub fn requirements(&self, id: &DescriptorId) -> Option<&RequirementSet> {
        self.requirements.get(id)
    }

    /// Whether this graph holds an entry (possibly empty) for `id`'s capabilities.
    pub fn has_capabilities_entry(&self, id: &DescriptorId) -> bool {
        self.capabilities.contains_key(id)
    }

    pub fn has_requirements_entry(&self, id: &DescriptorId) -> bool {
        self.requirements.contains_key(id)
    }

    /// Replace `id`'s exported capabilities, returning the previous set.
    ///
    /// `None` drops the entry entirely. `Some(empty)` keeps an explicit empty
    /// entry, which overlays use to shadow a base entry.
    pub fn set_capabilities(
        &mut self,
        id: &DescriptorId,
        capabilities: Option<CapabilitySet>,
    ) -> Option<CapabilitySet> {
        let old = match capabilities {
            Some(new) => {
                for capability in &new {
                    self.exporters
                        .entry(capability.key.clone())
                        .or_default()
                        .insert(id.clone());
                }
                self.capabilities.insert(id.clone(), new)
            }
            None => self.capabilities.remove(id),
        };
        if let Some(old) = &old {
            let current = self.capabilities.get(id);
            for capability in old {
                let still_exported = current
                    .is_some_and(|set| set.iter().any(|c| c.key == capability.key));
                if !still_exported {
                    unindex(&mut self.exporters, &capability.key, id);
                }
            }
        }
        old
    }

    /// Replace `id`'s required capabilities, returning the previous set.
    pub fn set_requirements(
        &mut self,
        id: &DescriptorId,
        requirements: Option<RequirementSet>,
    ) -> Option<RequirementSet> {
        let old = match requirements {
            Some(new) => {
                for requirement in &new {
                    self.requirers
                        .entry(requirement.key.clone())
                        .or_default()
                        .insert(id.clone());
                }
                self.requirements.insert(id.clone(), new)
            }
            None => self.requirements.remove(id),
        };
        if let Some(old) = &old {
            let current = self.requirements.get(id);
            for requirement in old {
                let still_required = current
                    .is_some_and(|set| set.iter().any(|r| r.key == requirement.key));
                if !still_required {
                    unindex(&mut self.requirers, &requirement.key, id);
                }
            }
        }
        old
    }

    pub fn remove(&mut self, id: &DescriptorId) {
        self.set_capabilities(id, None);
        self.set_requirements(id, None);
    }

    /// Descriptors whose requirements match `capability`.
    ///
    /// `include_versionless == false` keeps only requirements whose version spec
    /// admits the capability's version.
    pub fn dependents(
        &self,
        capability: &Capability,
        include_versionless: bool,
    ) -> IndexSet<DescriptorId> {
        self.dependents_filtered(capability, include_versionless, |_| true)
    }

    /// Like [`CapabilityGraph::dependents`], restricted to ids accepted by `filter`.
    pub(crate) fn dependents_filtered(
        &self,
        capability: &Capability,
        include_versionless: bool,
        filter: impl Fn(&DescriptorId) -> bool,
    ) -> IndexSet<DescriptorId> {
        let mut out = IndexSet::new();
        let Some(ids) = self.requirers.get(&capability.key) else {
            return out;
        };
        for id in ids {
            if !filter(id) {
                continue;
            }
            let matches = self.requirements.get(id).is_some_and(|reqs| {
                reqs.iter()
                    .any(|req| req.is_potential_match(capability, !include_versionless))
            });
            if matches {
                out.insert(id.clone());
            }
        }
        out
    }

    /// Descriptors exporting a capability with the same versionless key.
    pub fn exporters(&self, key: &VersionlessKey) -> impl Iterator<Item = &DescriptorId> + '_ {
        self.exporters.get(key).into_iter().flatten()
    }

    pub fn descriptor_ids(&self) -> impl Iterator<Item = &DescriptorId> + '_ {
        self.capabilities
            .keys()
            .chain(self.requirements.keys().filter(|id| !self.capabilities.contains_key(*id)))
    }

    pub(crate) fn requirement_entries(
        &self,
    ) -> impl Iterator<Item = (&DescriptorId, &RequirementSet)> + '_ {
        self.requirements.iter()
    }

    pub(crate) fn capability_entries(
        &self,
    ) -> impl Iterator<Item = (&DescriptorId, &CapabilitySet)> + '_ {
        self.capabilities.iter()
    }

    /// Checks that the reverse indexes agree with the forward maps.
    pub fn is_consistent(&self) -> bool {
        let exporters_ok = self.exporters.iter().all(|(key, ids)| {
            !ids.is_empty()
                && ids.iter().all(|id| {
                    self.capabilities
                        .get(id)
                        .is_some_and(|set| set.iter().any(|c| &c.key == key))
                })
        });
        let requirers_ok = self.requirers.iter().all(|(key, ids)| {
            !ids.is_empty()
                && ids.iter().all(|id| {
                    self.requirements
                        .get(id)
                        .is_some_and(|set| set.iter().any(|r| &r.key == key))
                })
        });
        let forward_ok = self.capabilities.iter().all(|(id, set)| {
            set.iter().all(|c| {
                self.exporters
                    .get(&c.key)
                    .is_some_and(|ids| ids.contains(id))
            })
        }) && self.requirements.iter().all(|(id, set)| {
            set.iter().all(|r| {
                self.requirers
                    .get(&r.key)
                    .is_some_and(|ids| ids.contains(id))
            })
        });
        exporters_ok && requirers_ok && forward_ok
    }
}

fn unindex(
    index: &mut HashMap<VersionlessKey, IndexSet<DescriptorId>>,
    key: &VersionlessKey,
    id: &DescriptorId,
) {
    if let Some(ids) = index.get_mut(key) {
        ids.shift_remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
