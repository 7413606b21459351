//! Facade → fully-resolved project caches.
//!
//! Two maps associate a facade with its [`MavenProject`]:
//! - [`ExecutionContext`]: one per logical build operation. Repeated lookups
//!   within the context always return the same project instance.
//! - [`ProjectCache`]: small shared LRU that avoids re-reading projects during
//!   incremental work. Entries are dropped and re-read as needed.
//!
//! Both are keyed by facade *identity*. Two facades with equal content are
//! still distinct keys.

use std::collections::HashMap;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::facade::ProjectFacade;
use crate::model::MavenProject;
use crate::services::BuildCaches;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FacadeIdentity(usize);

impl FacadeIdentity {
    fn of(facade: &Arc<ProjectFacade>) -> Self {
        Self(Arc::as_ptr(facade) as usize)
    }
}

type Entry = (Arc<ProjectFacade>, Arc<MavenProject>);

/// Project map scoped to one logical build operation.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    force_dependency_update: bool,
    projects: Mutex<HashMap<FacadeIdentity, Entry>>,
}

impl ExecutionContext {
    pub fn new(force_dependency_update: bool) -> Self {
        Self {
            force_dependency_update,
            projects: Mutex::new(HashMap::new()),
        }
    }

    /// Whether caches flushed inside this context should also drop resolved
    /// dependencies.
    pub fn force_dependency_update(&self) -> bool {
        self.force_dependency_update
    }

    pub fn get(&self, facade: &Arc<ProjectFacade>) -> Option<Arc<MavenProject>> {
        self.projects
            .lock()
            .get(&FacadeIdentity::of(facade))
            .map(|(_, project)| Arc::clone(project))
    }

    pub fn contains(&self, facade: &Arc<ProjectFacade>) -> bool {
        self.projects.lock().contains_key(&FacadeIdentity::of(facade))
    }

    /// Associate `facade` with `project`, or forget it when `project` is `None`.
    pub fn put(&self, facade: &Arc<ProjectFacade>, project: Option<Arc<MavenProject>>) {
        let mut projects = self.projects.lock();
        match project {
            Some(project) => {
                projects.insert(FacadeIdentity::of(facade), (Arc::clone(facade), project));
            }
            None => {
                projects.remove(&FacadeIdentity::of(facade));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.projects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.lock().is_empty()
    }
}

/// Bounded, shared facade → project cache.
///
/// Evicting an entry flushes the build caches of its descriptor unless the
/// facade is still in use by the execution context passed to
/// [`ProjectCache::insert`].
pub struct ProjectCache {
    capacity: usize,
    lru: LruCache<FacadeIdentity, Entry>,
    build_caches: Arc<dyn BuildCaches>,
}

impl std::fmt::Debug for ProjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectCache")
            .field("capacity", &self.capacity)
            .field("len", &self.lru.len())
            .finish()
    }
}

impl ProjectCache {
    pub fn new(capacity: usize, build_caches: Arc<dyn BuildCaches>) -> Self {
        Self {
            capacity: capacity.max(1),
            lru: LruCache::unbounded(),
            build_caches,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn get(&mut self, facade: &Arc<ProjectFacade>) -> Option<Arc<MavenProject>> {
        self.lru
            .get(&FacadeIdentity::of(facade))
            .map(|(_, project)| Arc::clone(project))
    }

    pub fn contains(&self, facade: &Arc<ProjectFacade>) -> bool {
        self.lru.contains(&FacadeIdentity::of(facade))
    }

    pub fn insert(
        &mut self,
        facade: &Arc<ProjectFacade>,
        project: Arc<MavenProject>,
        context: Option<&ExecutionContext>,
    ) {
        self.lru
            .put(FacadeIdentity::of(facade), (Arc::clone(facade), project));

        while self.lru.len() > self.capacity {
            let Some((_, (evicted, _))) = self.lru.pop_lru() else {
                break;
            };
            if context.is_some_and(|context| context.contains(&evicted)) {
                continue;
            }
            tracing::trace!(
                target = "nova.maven.registry",
                pom = %evicted.descriptor(),
                "evicted cached project"
            );
            self.build_caches
                .flush(evicted.descriptor(), evicted.artifact_key(), false);
        }
    }

    /// Forget `facade` without flushing anything.
    pub fn invalidate(&mut self, facade: &Arc<ProjectFacade>) -> Option<Arc<MavenProject>> {
        self.lru
            .pop(&FacadeIdentity::of(facade))
            .map(|(_, project)| project)
    }

    /// Move the entry of `discarded` over to `kept`.
    ///
    /// Used when a commit keeps a previously published facade in place of an
    /// equal one built during the refresh.
    pub fn rekey(&mut self, discarded: &Arc<ProjectFacade>, kept: &Arc<ProjectFacade>) {
        if let Some(project) = self.invalidate(discarded) {
            if !self.contains(kept) {
                self.lru
                    .put(FacadeIdentity::of(kept), (Arc::clone(kept), project));
            }
        }
    }
}
