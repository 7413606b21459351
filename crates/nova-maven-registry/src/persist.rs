//! Persisted registry snapshots for fast startup.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilitySet, RequirementSet};
use crate::error::{RegistryError, Result};
use crate::facade::ProjectFacade;
use crate::graph::CapabilityGraph;
use crate::model::DescriptorId;
use crate::registry::{ProjectRegistry, RegistryView};

/// Load/save of a whole committed registry.
///
/// `load` returns `Ok(None)` when there is nothing usable to load; the
/// manager then starts from an empty registry.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<ProjectRegistry>>;

    fn save(&self, registry: &ProjectRegistry) -> Result<()>;
}

const FORMAT_VERSION: u32 = 1;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRegistry {
    format: u32,
    facades: Vec<ProjectFacade>,
    capabilities: Vec<(DescriptorId, CapabilitySet)>,
    requirements: Vec<(DescriptorId, RequirementSet)>,
}

impl PersistedRegistry {
    fn capture(registry: &ProjectRegistry) -> Self {
        let facades = registry
            .projects()
            .into_iter()
            .map(|facade| ProjectFacade::clone(&facade))
            .collect();

        let mut capabilities: Vec<_> = registry
            .graph()
            .capability_entries()
            .map(|(id, set)| (id.clone(), set.clone()))
            .collect();
        capabilities.sort_by(|a, b| a.0.cmp(&b.0));

        let mut requirements: Vec<_> = registry
            .graph()
            .requirement_entries()
            .map(|(id, set)| (id.clone(), set.clone()))
            .collect();
        requirements.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            format: FORMAT_VERSION,
            facades,
            capabilities,
            requirements,
        }
    }

    fn restore(self) -> ProjectRegistry {
        let mut graph = CapabilityGraph::new();
        for (id, set) in self.capabilities {
            graph.set_capabilities(&id, Some(set));
        }
        for (id, set) in self.requirements {
            graph.set_requirements(&id, Some(set));
        }
        ProjectRegistry::from_parts(self.facades, graph)
    }
}

/// JSON file store. Writes go to a temporary sibling file that is renamed
/// over the destination.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Option<ProjectRegistry>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let persisted: PersistedRegistry = match serde_json::from_slice(&bytes) {
            Ok(persisted) => persisted,
            Err(err) => {
                tracing::warn!(
                    target = "nova.maven.registry",
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unreadable registry state"
                );
                return Ok(None);
            }
        };
        if persisted.format != FORMAT_VERSION {
            tracing::warn!(
                target = "nova.maven.registry",
                path = %self.path.display(),
                format = persisted.format,
                "ignoring registry state with unsupported format"
            );
            return Ok(None);
        }

        Ok(Some(persisted.restore()))
    }

    fn save(&self, registry: &ProjectRegistry) -> Result<()> {
        let io_err = |path: &Path, source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;

        let bytes = serde_json::to_vec_pretty(&PersistedRegistry::capture(registry)).map_err(
            |source| RegistryError::Json {
                path: self.path.clone(),
                source,
            },
        )?;

        let (tmp_path, mut file) =
            open_unique_tmp_file(&self.path, parent).map_err(|source| io_err(&self.path, source))?;
        if let Err(source) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(&tmp_path, source));
        }
        drop(file);

        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(&self.path, source));
        }

        tracing::debug!(
            target = "nova.maven.registry",
            path = %self.path.display(),
            projects = registry.len(),
            "wrote registry state"
        );
        Ok(())
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::Other, "destination path has no file name")
    })?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
