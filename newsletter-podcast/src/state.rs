use crate::dedup::DedupStore;
use crate::types::{PodcastFeedState, PublisherError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const STATE_VERSION: u32 = 1;

fn default_version() -> u32 {
    STATE_VERSION
}

/// Everything that must survive between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, rename = "dedup_records")]
    pub dedup: DedupStore,
    #[serde(default)]
    pub feed: PodcastFeedState,
}

impl PersistedState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            ..Default::default()
        }
    }
}

/// Loads and atomically commits [`PersistedState`] as a JSON document.
#[derive(Debug, Clone)]
pub struct StateManager {
    path: PathBuf,
}

impl StateManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a first run and yields empty state.
    pub fn load(&self) -> Result<PersistedState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state at {}, starting fresh", self.path.display());
                return Ok(PersistedState::new());
            }
            Err(e) => return Err(PublisherError::persistence(&self.path, e)),
        };

        let state: PersistedState = serde_json::from_str(&raw)
            .map_err(|e| PublisherError::persistence(&self.path, format!("malformed state: {}", e)))?;
        if state.version > STATE_VERSION {
            return Err(PublisherError::persistence(
                &self.path,
                format!("unsupported state version {}", state.version),
            ));
        }
        debug!(
            "Loaded state: {} dedup records, {} episodes",
            state.dedup.len(),
            state.feed.episodes.len()
        );
        Ok(state)
    }

    /// Replaces the state file in one step. On failure the previous file is intact.
    pub fn commit(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &json)?;
        info!(
            "Committed state to {} ({} dedup records, {} episodes)",
            self.path.display(),
            state.dedup.len(),
            state.feed.episodes.len()
        );
        Ok(())
    }
}

/// Writes `bytes` to a temp file beside `path`, syncs it, then renames it
/// over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| PublisherError::persistence(path, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| PublisherError::persistence(path, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PublisherError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| PublisherError::persistence(path, e.error))?;

    // Make the rename itself durable where the platform allows opening directories
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}
