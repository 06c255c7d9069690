use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Technology manifest shipped at the root of the source bundle. Maps
/// technology names to architecture buckets of file entries.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub technologies: HashMap<String, ArchEntries>,
}

pub type ArchEntries = HashMap<String, Vec<FileEntry>>;

#[derive(Debug, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub version: String,
    /// Declared by the installer; not verified at this layer.
    #[serde(default)]
    pub md5: String,
}

/// Loads `manifest.json` from the root of the source bundle.
pub fn load(source_base: &Path) -> Result<Manifest> {
    let path = source_base.join(MANIFEST_FILE);
    let raw =
        fs::read(&path).with_context(|| format!("failed to open {}", path.display()))?;

    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

impl Manifest {
    /// Resolves a comma-separated list of technology names to the relative
    /// file paths belonging to them, across all architecture buckets.
    /// Unknown technology names are logged and skipped.
    pub fn filter_paths(&self, technologies: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        for tech in technologies.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let Some(arches) = self.technologies.get(tech) else {
                log::warn!("technology {tech} not found in the manifest, skipping");
                continue;
            };

            log::debug!("resolving files for technology {tech}");

            for entries in arches.values() {
                for entry in entries {
                    paths.push(PathBuf::from(&entry.path));
                }
            }
        }

        paths
    }
}
