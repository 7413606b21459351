//! Per-refresh work queue and the phase-2 convergence tracker.

use std::collections::HashSet;

use indexmap::IndexSet;

use crate::model::DescriptorId;

/// Ordered, de-duplicating queue of descriptors waiting to be (re)processed.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pending: IndexSet<DescriptorId>,
}

impl ResolutionContext {
    pub fn new(ids: impl IntoIterator<Item = DescriptorId>) -> Self {
        Self {
            pending: ids.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, id: &DescriptorId) -> bool {
        self.pending.contains(id)
    }

    /// Remove and return the oldest pending descriptor.
    pub fn pop(&mut self) -> Option<DescriptorId> {
        self.pending.shift_remove_index(0)
    }

    /// Queue `ids` again, whether or not they were processed already.
    ///
    /// An id that is still pending keeps its position.
    pub fn force(&mut self, ids: impl IntoIterator<Item = DescriptorId>) {
        self.pending.extend(ids);
    }
}

/// Decides whether phase 2 may process a descriptor and when its outer loop
/// has converged.
///
/// Within one pass every descriptor is processed at most once. A descriptor
/// forced back after it was processed is deferred to the next pass. Passes
/// are bounded by `min(max_passes, distinct descriptors seen + 1)`.
#[derive(Debug)]
pub struct ProcessingTracker {
    processed: HashSet<DescriptorId>,
    deferred: IndexSet<DescriptorId>,
    seen: HashSet<DescriptorId>,
    pass: usize,
    max_passes: usize,
}

impl ProcessingTracker {
    pub fn new(max_passes: usize) -> Self {
        Self {
            processed: HashSet::new(),
            deferred: IndexSet::new(),
            seen: HashSet::new(),
            pass: 1,
            max_passes: max_passes.max(1),
        }
    }

    /// 1-based number of the current pass.
    pub fn pass(&self) -> usize {
        self.pass
    }

    pub fn pass_limit(&self) -> usize {
        self.max_passes.min(self.seen.len() + 1)
    }

    pub fn should_process(&mut self, id: &DescriptorId) -> bool {
        self.seen.insert(id.clone());
        if self.processed.insert(id.clone()) {
            true
        } else {
            self.deferred.insert(id.clone());
            false
        }
    }

    /// Start another pass if anything was deferred in this one.
    ///
    /// Deferred descriptors are pushed back into `context`. Returns `false`
    /// once nothing is deferred or the pass limit is reached.
    pub fn needs_improvement(&mut self, context: &mut ResolutionContext) -> bool {
        if self.deferred.is_empty() {
            return false;
        }

        let limit = self.pass_limit();
        if self.pass >= limit {
            tracing::warn!(
                target = "nova.maven.registry",
                passes = self.pass,
                limit,
                pending = self.deferred.len(),
                "dependency resolution did not converge"
            );
            self.deferred.clear();
            return false;
        }

        self.pass += 1;
        self.processed.clear();
        context.force(self.deferred.drain(..));
        true
    }
}
