use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::provider::{Import, Symbol};

/// Cache entry for a single file's extraction results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFileResult {
    pub hash: String,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
}

/// Content-hash parse cache. Run-scoped: constructed (or loaded) per
/// discovery run and passed into each phase, so batch jobs and tests never
/// leak state between repositories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseCache {
    pub files: HashMap<String, CachedFileResult>,
}

const CACHE_FILE: &str = "cache.json";

impl ParseCache {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    /// Load cache from `cache.json` in the output directory.
    pub fn load(out_dir: &Path) -> Result<Self> {
        let cache_path = out_dir.join(CACHE_FILE);
        if !cache_path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(&cache_path).context("failed to read parse cache")?;
        let cache: Self = serde_json::from_str(&content).context("failed to parse parse cache")?;
        Ok(cache)
    }

    /// Save cache to `cache.json` in the output directory.
    pub fn save(&self, out_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(out_dir).context("failed to create output directory")?;
        let cache_path = out_dir.join(CACHE_FILE);
        let content = serde_json::to_string(self).context("failed to serialize parse cache")?;
        std::fs::write(&cache_path, content).context("failed to write parse cache")?;
        Ok(())
    }

    /// Get cached result for a file if it exists and its content is unchanged.
    pub fn get(&self, rel_path: &str, content: &str) -> Option<&CachedFileResult> {
        let cached = self.files.get(rel_path)?;
        if cached.hash == compute_hash(content) {
            Some(cached)
        } else {
            None
        }
    }

    /// Insert or update a file's cache entry.
    pub fn insert(&mut self, rel_path: String, content: &str, symbols: Vec<Symbol>, imports: Vec<Import>) {
        self.files.insert(
            rel_path,
            CachedFileResult {
                hash: compute_hash(content),
                symbols,
                imports,
            },
        );
    }

    /// Remove entries for files that no longer exist.
    pub fn prune(&mut self, existing_files: &[String]) {
        let existing: std::collections::HashSet<&str> =
            existing_files.iter().map(|s| s.as_str()).collect();
        self.files.retain(|path, _| existing.contains(path.as_str()));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Compute SHA-256 hash of file content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
