use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

use crate::config::ManualZoneConfig;
use crate::error::DiscoveryError;
use crate::log::{DiscoveryLog, Phase};
use crate::provider::ProviderRegistry;
use crate::types::{DetectionOrigin, Zone};

/// Directories never scanned for markers or sources.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "vendor",
    "bin",
    "obj",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    ".strata",
];

/// Marker tiers, scanned in fixed priority order: solution-level manifests
/// first, then per-project manifests of the same ecosystem, then the other
/// ecosystems. The order resolves polyglot directories deterministically.
const MARKER_TIERS: &[MarkerSpec] = &[
    MarkerSpec {
        matcher: MarkerMatch::Extension("sln"),
        language: "csharp",
    },
    MarkerSpec {
        matcher: MarkerMatch::Extension("csproj"),
        language: "csharp",
    },
    MarkerSpec {
        matcher: MarkerMatch::FileName("Cargo.toml"),
        language: "rust",
    },
    MarkerSpec {
        matcher: MarkerMatch::FileName("go.mod"),
        language: "go",
    },
    MarkerSpec {
        matcher: MarkerMatch::FileName("pyproject.toml"),
        language: "python",
    },
    MarkerSpec {
        matcher: MarkerMatch::FileName("package.json"),
        language: "typescript",
    },
];

enum MarkerMatch {
    FileName(&'static str),
    Extension(&'static str),
}

struct MarkerSpec {
    matcher: MarkerMatch,
    language: &'static str,
}

impl MarkerSpec {
    fn matches(&self, file_name: &str) -> bool {
        match self.matcher {
            MarkerMatch::FileName(name) => file_name == name,
            MarkerMatch::Extension(ext) => Path::new(file_name)
                .extension()
                .is_some_and(|e| e == ext),
        }
    }
}

/// A marker hit before containment filtering.
struct ZoneCandidate {
    dir: PathBuf,
    marker: String,
    language: &'static str,
    tier: usize,
    depth: usize,
}

/// Scans the repository tree for project markers and proposes
/// non-overlapping zones. Read-only; deterministic for a given file tree.
pub struct ZoneDetector<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> ZoneDetector<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Detect zones under `root`. Candidates whose directory already falls
    /// inside an accepted zone are dropped; candidates whose marker fails to
    /// parse are skipped with a log entry.
    pub fn detect(&self, root: &Path, log: &mut DiscoveryLog) -> Result<Vec<Zone>> {
        if !root.is_dir() {
            return Err(DiscoveryError::UnreadableRoot(root.to_path_buf()).into());
        }

        let mut candidates = self.collect_candidates(root);
        candidates.sort_by(|a, b| {
            (a.tier, a.depth, a.dir.clone()).cmp(&(b.tier, b.depth, b.dir.clone()))
        });

        let mut zones: Vec<Zone> = Vec::new();
        for candidate in candidates {
            if let Some(owner) = zones.iter().find(|z| candidate.dir.starts_with(&z.path)) {
                // Same directory, different ecosystem: a polyglot directory.
                // Surface it so an operator can add a manual override.
                if owner.path == candidate.dir && owner.language != candidate.language {
                    log.record(
                        Phase::Zones,
                        &candidate.dir.join(&candidate.marker),
                        format!(
                            "ambiguous marker: directory already assigned to {} zone '{}'",
                            owner.language, owner.name
                        ),
                    );
                }
                continue;
            }

            let mut purpose = None;
            if let Some(provider) = self.registry.for_language(candidate.language) {
                match provider.detect_project(&root.join(&candidate.dir)) {
                    Ok(metadata) => purpose = metadata.name,
                    Err(e) => {
                        log.record(
                            Phase::Zones,
                            &candidate.dir.join(&candidate.marker),
                            format!("marker parse error: {e:#}"),
                        );
                        continue;
                    }
                }
            }

            zones.push(Zone {
                name: zone_name(&candidate.dir),
                path: candidate.dir,
                language: candidate.language.to_string(),
                marker: candidate.marker,
                detection: DetectionOrigin::Auto,
                purpose,
                contracts: vec![],
            });
        }

        Ok(zones)
    }

    fn collect_candidates(&self, root: &Path) -> Vec<ZoneCandidate> {
        let mut candidates = Vec::new();
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .follow_links(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !SKIP_DIRS.contains(&name.as_ref())
            })
            .build();

        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some((tier, spec)) = MARKER_TIERS
                .iter()
                .enumerate()
                .find(|(_, spec)| spec.matches(&file_name))
            else {
                continue;
            };

            let dir = entry
                .path()
                .parent()
                .unwrap_or(root)
                .strip_prefix(root)
                .unwrap_or(Path::new(""))
                .to_path_buf();
            let depth = dir.components().count();
            candidates.push(ZoneCandidate {
                dir,
                marker: file_name,
                language: spec.language,
                tier,
                depth,
            });
        }
        candidates
    }
}

/// Zone name: the root-relative path with `/` separators; the repository
/// root itself is always `root` so profiles merge across checkouts.
pub fn zone_name(dir: &Path) -> String {
    if dir.as_os_str().is_empty() {
        "root".to_string()
    } else {
        dir.to_string_lossy().replace('\\', "/")
    }
}

/// Combine detected zones with the manual configuration document.
/// Pure function: idempotent and order-independent with respect to names.
pub fn merge(auto: &[Zone], manual: &BTreeMap<String, ManualZoneConfig>) -> Vec<Zone> {
    let mut merged: Vec<Zone> = Vec::new();

    for zone in auto {
        match manual.get(&zone.name) {
            Some(entry) if entry.exclude => continue,
            Some(entry) => {
                let mut zone = zone.clone();
                if let Some(path) = &entry.path {
                    zone.path = PathBuf::from(path);
                }
                if let Some(language) = &entry.language {
                    zone.language = language.clone();
                }
                if entry.purpose.is_some() {
                    zone.purpose = entry.purpose.clone();
                }
                if !entry.contracts.is_empty() {
                    zone.contracts = entry.contracts.clone();
                }
                zone.detection = DetectionOrigin::Hybrid;
                merged.push(zone);
            }
            None => merged.push(zone.clone()),
        }
    }

    for (name, entry) in manual {
        if entry.exclude || auto.iter().any(|z| &z.name == name) {
            continue;
        }
        merged.push(Zone {
            name: name.clone(),
            path: PathBuf::from(entry.path.as_deref().unwrap_or(name)),
            language: entry.language.clone().unwrap_or_else(|| "unknown".to_string()),
            marker: String::new(),
            detection: DetectionOrigin::Manual,
            purpose: entry.purpose.clone(),
            contracts: entry.contracts.clone(),
        });
    }

    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}
