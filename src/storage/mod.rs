//! Trace persistence
//!
//! The loop does not persist traces itself; callers hand finished
//! traces to a `TraceStore`. The file backend writes one indented JSON
//! file per trace named `trace_<YYYYMMDD_HHMMSS>_<sanitized-goal>.json`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::agent::Trace;
use crate::config::{StorageBackendType, StorageConfig};
use crate::error::{Error, Result};

/// Longest sanitized goal fragment, in characters
const MAX_GOAL_RUNES: usize = 50;

/// Filesystem-reserved characters replaced during sanitization
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\n', '\r'];

/// Make a goal string safe for use in a filename.
///
/// Letters and digits (including non-ASCII letters) are kept;
/// whitespace and reserved characters become underscores; runs of
/// underscores collapse; leading/trailing underscores are stripped; the
/// result is capped at 50 characters and never empty.
pub fn sanitize_filename(goal: &str) -> String {
    let replaced: String = goal
        .chars()
        .map(|c| {
            if c.is_whitespace() || RESERVED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Collapse runs of underscores.
    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_underscore = false;
    for c in replaced.chars() {
        if c == '_' {
            if !last_was_underscore {
                collapsed.push('_');
            }
            last_was_underscore = true;
        } else {
            collapsed.push(c);
            last_was_underscore = false;
        }
    }

    let capped: String = collapsed
        .trim_matches('_')
        .chars()
        .take(MAX_GOAL_RUNES)
        .collect();
    let trimmed = capped.trim_matches('_');

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Storage key for a trace: timestamp plus sanitized goal
fn trace_key(trace: &Trace) -> String {
    format!(
        "trace_{}_{}.json",
        trace.created_at.format("%Y%m%d_%H%M%S"),
        sanitize_filename(&trace.goal)
    )
}

/// Abstract interface for trace persistence backends
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Persist a trace, returning its storage key
    async fn save(&self, trace: &Trace) -> Result<String>;

    /// Load a trace by key
    async fn load(&self, key: &str) -> Result<Trace>;

    /// List stored trace keys
    async fn list(&self) -> Result<Vec<String>>;

    /// Delete a trace by key
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Build the configured store
pub fn store_from_config(config: &StorageConfig) -> Arc<dyn TraceStore> {
    match config.backend {
        StorageBackendType::File => Arc::new(FileTraceStore::new(config.base_path.clone())),
        StorageBackendType::Memory => Arc::new(MemoryTraceStore::new()),
    }
}

/// One JSON file per trace under a base directory
pub struct FileTraceStore {
    base_path: PathBuf,
}

impl FileTraceStore {
    /// Create a store rooted at the given directory
    pub fn new(base_path: PathBuf) -> Self {
        FileTraceStore { base_path }
    }
}

#[async_trait]
impl TraceStore for FileTraceStore {
    async fn save(&self, trace: &Trace) -> Result<String> {
        std::fs::create_dir_all(&self.base_path)?;

        let key = trace_key(trace);
        let path = self.base_path.join(&key);
        let json = serde_json::to_string_pretty(trace)?;
        std::fs::write(&path, json)?;

        debug!(path = %path.display(), "trace saved");
        Ok(key)
    }

    async fn load(&self, key: &str) -> Result<Trace> {
        let path = self.base_path.join(key);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("failed to read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn list(&self) -> Result<Vec<String>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.base_path)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name.starts_with("trace_") && name.ends_with(".json") {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.base_path.join(key);
        std::fs::remove_file(&path)
            .map_err(|e| Error::Storage(format!("failed to delete {}: {}", path.display(), e)))
    }
}

/// In-process store, lost on exit; useful for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryTraceStore {
    traces: RwLock<HashMap<String, Trace>>,
}

impl MemoryTraceStore {
    /// Create an empty store
    pub fn new() -> Self {
        MemoryTraceStore::default()
    }
}

#[async_trait]
impl TraceStore for MemoryTraceStore {
    async fn save(&self, trace: &Trace) -> Result<String> {
        let key = trace_key(trace);
        self.traces
            .write()
            .expect("store lock poisoned")
            .insert(key.clone(), trace.clone());
        Ok(key)
    }

    async fn load(&self, key: &str) -> Result<Trace> {
        self.traces
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("trace '{}'", key)))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .traces
            .read()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self
            .traces
            .write()
            .expect("store lock poisoned")
            .remove(key)
        {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("trace '{}'", key))),
        }
    }
}
