use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::archmap::ArchitectureMapper;
use crate::cache::{CachedFileResult, ParseCache};
use crate::config::Config;
use crate::conventions::ConventionInferrer;
use crate::interactions::InteractionDetector;
use crate::layer::LayerClassifier;
use crate::log::{DiscoveryLog, Phase};
use crate::patterns::PatternExtractor;
use crate::profile::{
    CodebaseProfile, DiscoveryMetadata, LanguageSummary, ZoneProfile, LOG_FILE, SCHEMA_VERSION,
};
use crate::provider::{FileAnalysis, ProviderRegistry};
use crate::structure::StructureAnalyzer;
use crate::testgap::TestGapAnalyzer;
use crate::types::{DetectionOrigin, Zone};
use crate::zones::{self, ZoneDetector, SKIP_DIRS};

/// Files are parsed in bounded batches so whole-repository ASTs are never
/// materialized at once and cancellation stays responsive.
const FILE_BATCH: usize = 64;

/// Cooperative cancellation flag, checked at zone and file-batch granularity.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one discovery run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Analyze only the named zone.
    pub zone_filter: Option<String>,
    /// Run only one analysis phase (zone detection always runs first).
    pub phase_filter: Option<Phase>,
    /// Reuse the on-disk parse cache for unchanged files.
    pub incremental: bool,
    /// Skip all writes.
    pub dry_run: bool,
    /// Write a partial profile even when the run was cancelled.
    pub allow_partial: bool,
}

/// Result of a discovery run.
pub struct RunOutcome {
    pub profile: CodebaseProfile,
    pub log: DiscoveryLog,
    pub cancelled: bool,
    pub written: bool,
}

/// Per-zone analysis output collected before profile generation.
struct ZoneAnalysis {
    zone: Zone,
    profile: ZoneProfile,
    import_paths: BTreeSet<String>,
    log: DiscoveryLog,
    cache_updates: Vec<(String, CachedFileResult)>,
}

/// Orchestrates the discovery pipeline in dependency order and owns run
/// metadata. All filesystem access is read-only except the output location.
pub struct DiscoveryManager {
    registry: ProviderRegistry,
    config: Config,
}

impl DiscoveryManager {
    pub fn new(registry: ProviderRegistry, config: Config) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Zone detection and merge only, no analysis.
    pub fn list_zones(&self, root: &Path) -> Result<(Vec<Zone>, DiscoveryLog)> {
        let mut log = DiscoveryLog::new();
        let detector = ZoneDetector::new(&self.registry);
        let auto = detector.detect(root, &mut log)?;
        let merged = zones::merge(&auto, &self.config.zones);
        Ok((merged, log))
    }

    /// Full discovery run.
    pub fn run(
        &self,
        root: &Path,
        out_dir: &Path,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        let mut log = DiscoveryLog::new();

        let detector = ZoneDetector::new(&self.registry);
        let auto = detector.detect(root, &mut log)?;
        let mut zones = zones::merge(&auto, &self.config.zones);

        if let Some(filter) = &options.zone_filter {
            zones.retain(|z| &z.name == filter);
            if zones.is_empty() {
                anyhow::bail!("no zone named '{filter}' was detected or configured");
            }
        }

        let cache = if options.incremental {
            ParseCache::load(out_dir).unwrap_or_default()
        } else {
            ParseCache::new()
        };

        let classifier = LayerClassifier::new(&self.config.layers);

        // Per-zone analysis has no shared mutable state: one task per zone.
        let mut analyses: Vec<ZoneAnalysis> = zones
            .par_iter()
            .filter_map(|zone| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.analyze_zone(root, zone, &classifier, &cache, options, cancel))
            })
            .collect();
        analyses.sort_by(|a, b| a.zone.name.cmp(&b.zone.name));

        let cancelled = cancel.is_cancelled();

        let mut new_cache = ParseCache::new();
        let mut zone_imports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut zone_profiles: BTreeMap<String, ZoneProfile> = BTreeMap::new();
        let mut current_files: Vec<String> = Vec::new();
        for analysis in analyses {
            log.merge(analysis.log);
            zone_imports.insert(analysis.zone.name.clone(), analysis.import_paths);
            zone_profiles.insert(analysis.zone.name.clone(), analysis.profile);
            for (path, entry) in analysis.cache_updates {
                current_files.push(path.clone());
                new_cache.files.insert(path, entry);
            }
        }
        new_cache.prune(&current_files);

        let run_interactions = !cancelled
            && options
                .phase_filter
                .is_none_or(|p| p == Phase::Interactions);
        let interactions = if run_interactions {
            let detector = InteractionDetector::new(&self.config.interactions);
            detector.detect(root, &zones, &zone_imports, &mut log)
        } else {
            vec![]
        };

        let mut profile = CodebaseProfile {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            discovery: DiscoveryMetadata {
                duration_ms: started.elapsed().as_millis() as u64,
                phases_completed: completed_phases(options, cancelled),
                zones_discovered: zone_profiles.len(),
                detection_mode: detection_mode(&zones),
            },
            languages: language_summary(&zone_profiles),
            zones: zone_profiles,
            interactions,
            conformance_summary: BTreeMap::new(),
        };

        // Prior curations always survive a re-run, whatever the options.
        if let Some(prior) = CodebaseProfile::load(out_dir)? {
            // A zone-filtered run refreshes one zone; the others carry over.
            if options.zone_filter.is_some() {
                for (name, zone) in &prior.zones {
                    profile
                        .zones
                        .entry(name.clone())
                        .or_insert_with(|| zone.clone());
                }
            }
            profile.merge_prior(&prior);
        }

        log.normalize();

        let write_allowed = !options.dry_run && (!cancelled || options.allow_partial);
        let mut written = false;
        if write_allowed {
            profile.write(out_dir)?;
            write_log(&log, out_dir)?;
            if options.incremental {
                if let Err(e) = new_cache.save(out_dir) {
                    tracing::warn!("failed to save parse cache: {e:#}");
                }
            }
            written = true;
        } else {
            // Still surface schema problems on dry runs.
            profile.validate()?;
        }

        Ok(RunOutcome {
            profile,
            log,
            cancelled,
            written,
        })
    }

    fn analyze_zone(
        &self,
        root: &Path,
        zone: &Zone,
        classifier: &LayerClassifier,
        cache: &ParseCache,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> ZoneAnalysis {
        let mut log = DiscoveryLog::new();
        let mut files: Vec<FileAnalysis> = Vec::new();
        let mut cache_updates: Vec<(String, CachedFileResult)> = Vec::new();
        let mut dependencies = Vec::new();

        let zone_abs = root.join(&zone.path);

        if let Some(provider) = self.registry.for_language(&zone.language) {
            let source_files = list_source_files(&zone_abs, provider.file_extensions());

            for batch in source_files.chunks(FILE_BATCH) {
                if cancel.is_cancelled() {
                    break;
                }
                let results: Vec<_> = batch
                    .par_iter()
                    .map(|file_path| {
                        let rel = file_path
                            .strip_prefix(&zone_abs)
                            .unwrap_or(file_path)
                            .to_path_buf();
                        let rel_key =
                            format!("{}/{}", zone.name, rel.to_string_lossy().replace('\\', "/"));

                        let content = match std::fs::read_to_string(file_path) {
                            Ok(c) => c,
                            Err(e) => return Err((rel, format!("unreadable: {e}"))),
                        };

                        if let Some(hit) = cache.get(&rel_key, &content) {
                            let cached = hit.clone();
                            return Ok((rel, rel_key, content, cached.symbols, cached.imports));
                        }

                        let parsed = match provider.parse_file(file_path, &content) {
                            Ok(p) => p,
                            Err(e) => return Err((rel, format!("parse error: {e:#}"))),
                        };
                        let symbols = provider.extract_symbols(&parsed);
                        let imports = provider.imports(&parsed);
                        Ok((rel, rel_key, content, symbols, imports))
                    })
                    .collect();

                for result in results {
                    match result {
                        Ok((rel, rel_key, content, symbols, imports)) => {
                            cache_updates.push((
                                rel_key,
                                CachedFileResult {
                                    hash: crate::cache::compute_hash(&content),
                                    symbols: symbols.clone(),
                                    imports: imports.clone(),
                                },
                            ));
                            files.push(FileAnalysis {
                                path: rel,
                                symbols,
                                imports,
                            });
                        }
                        Err((rel, reason)) => {
                            log.record(Phase::Patterns, &zone.path.join(rel), reason);
                        }
                    }
                }
            }

            match provider.dependencies(&zone_abs) {
                Ok(deps) => dependencies = deps,
                Err(e) => log.record(
                    Phase::Structure,
                    &zone.path,
                    format!("dependency manifest error: {e:#}"),
                ),
            }
        } else if !zone.language.is_empty() {
            log.record(
                Phase::Zones,
                &zone.path,
                format!("no language provider for '{}'", zone.language),
            );
        }

        // Deterministic ordering regardless of parallel completion order.
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let phase_on = |phase: Phase| options.phase_filter.is_none_or(|p| p == phase);

        let structure = if phase_on(Phase::Structure) {
            let paths: Vec<&Path> = files.iter().map(|f| f.path.as_path()).collect();
            StructureAnalyzer::new(classifier).analyze(&paths)
        } else {
            Default::default()
        };

        let patterns = if phase_on(Phase::Patterns) {
            PatternExtractor::new(&self.config.patterns).extract(&files)
        } else {
            BTreeMap::new()
        };

        let architecture = if phase_on(Phase::Architecture) {
            ArchitectureMapper::new(classifier, &self.config.architecture).map(&files)
        } else {
            Default::default()
        };

        let conventions = if phase_on(Phase::Conventions) {
            ConventionInferrer::new(&self.config.conventions).infer(&files)
        } else {
            BTreeMap::new()
        };

        let tests = if phase_on(Phase::Tests) {
            TestGapAnalyzer::new(&self.config.tests).analyze(&files)
        } else {
            Default::default()
        };

        let import_paths: BTreeSet<String> =
            files.iter().flat_map(|f| f.imports.iter().map(|i| i.path.clone())).collect();

        let frameworks = known_frameworks(&dependencies);

        ZoneAnalysis {
            zone: zone.clone(),
            profile: ZoneProfile {
                language: zone.language.clone(),
                path: zone.path.to_string_lossy().replace('\\', "/"),
                marker: zone.marker.clone(),
                detection: zone.detection,
                purpose: zone.purpose.clone(),
                contracts: zone.contracts.clone(),
                structure,
                patterns,
                conventions,
                frameworks,
                dependencies,
                architecture,
                tests,
            },
            import_paths,
            log,
            cache_updates,
        }
    }
}

/// Enumerate a zone's source files for the provider's extensions,
/// excluding well-known generated/dependency directories.
fn list_source_files(zone_abs: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(zone_abs)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !SKIP_DIRS.contains(&name.as_ref())
        })
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| extensions.iter().any(|x| ext == *x))
                && !e.path().to_string_lossy().ends_with(".d.ts")
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Frameworks inferred from declared dependencies.
fn known_frameworks(dependencies: &[crate::provider::DependencyDecl]) -> Vec<String> {
    const FRAMEWORKS: &[(&str, &str)] = &[
        ("axum", "axum"),
        ("actix-web", "actix"),
        ("rocket", "rocket"),
        ("django", "django"),
        ("flask", "flask"),
        ("fastapi", "fastapi"),
        ("express", "express"),
        ("react", "react"),
        ("next", "nextjs"),
        ("@nestjs/core", "nestjs"),
        ("gin-gonic/gin", "gin"),
        ("labstack/echo", "echo"),
        ("gofiber/fiber", "fiber"),
        ("Microsoft.AspNetCore.App", "aspnetcore"),
    ];

    let mut found: Vec<String> = dependencies
        .iter()
        .filter_map(|dep| {
            FRAMEWORKS.iter().find_map(|(needle, framework)| {
                if dep.name == *needle || dep.name.ends_with(&format!("/{needle}")) {
                    Some(framework.to_string())
                } else {
                    None
                }
            })
        })
        .collect();
    found.sort();
    found.dedup();
    found
}

fn detection_mode(zones: &[Zone]) -> String {
    let auto = zones.iter().filter(|z| z.detection == DetectionOrigin::Auto).count();
    let manual = zones
        .iter()
        .filter(|z| z.detection == DetectionOrigin::Manual)
        .count();
    if zones.is_empty() || auto == zones.len() {
        "auto".to_string()
    } else if manual == zones.len() {
        "manual".to_string()
    } else {
        "hybrid".to_string()
    }
}

fn completed_phases(options: &RunOptions, cancelled: bool) -> Vec<String> {
    if cancelled {
        return vec![Phase::Zones.name().to_string()];
    }
    match options.phase_filter {
        Some(phase) => vec![
            Phase::Zones.name().to_string(),
            phase.name().to_string(),
            Phase::Profile.name().to_string(),
        ],
        None => Phase::ALL.iter().map(|p| p.name().to_string()).collect(),
    }
}

fn language_summary(zones: &BTreeMap<String, ZoneProfile>) -> Vec<LanguageSummary> {
    let total: usize = zones.values().map(|z| z.structure.source_files).sum();
    let mut by_language: BTreeMap<&str, (usize, Vec<String>)> = BTreeMap::new();
    for (name, zone) in zones {
        let entry = by_language.entry(zone.language.as_str()).or_default();
        entry.0 += zone.structure.source_files;
        entry.1.push(name.clone());
    }

    by_language
        .into_iter()
        .map(|(language, (count, zone_names))| LanguageSummary {
            name: language.to_string(),
            percentage: if total == 0 {
                0.0
            } else {
                (count as f64 / total as f64) * 100.0
            },
            zones: zone_names,
        })
        .collect()
}

fn write_log(log: &DiscoveryLog, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create '{}'", out_dir.display()))?;
    let content = serde_json::to_string_pretty(log).context("failed to serialize discovery log")?;
    std::fs::write(out_dir.join(LOG_FILE), content).context("failed to write discovery log")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DiscoveryManager {
        DiscoveryManager::new(ProviderRegistry::new(), Config::default())
    }

    fn touch(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_list_zones_applies_manual_config() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

        let mut config = Config::default();
        config.zones.insert(
            "edge".to_string(),
            crate::config::ManualZoneConfig {
                path: None,
                language: None,
                purpose: Some("ingestion".to_string()),
                contracts: vec![],
                exclude: false,
            },
        );
        let manager = DiscoveryManager::new(ProviderRegistry::new(), config);
        let (zones, _) = manager.list_zones(tmp.path()).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].detection, DetectionOrigin::Hybrid);
        assert_eq!(zones[0].purpose.as_deref(), Some("ingestion"));
    }

    #[test]
    fn test_run_writes_profile_and_log() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

        let outcome = manager()
            .run(tmp.path(), out.path(), &RunOptions::default(), &CancelToken::new())
            .unwrap();
        assert!(outcome.written);
        assert!(out.path().join("profile.json").exists());
        assert!(out.path().join("discovery-log.json").exists());
        assert_eq!(outcome.profile.discovery.zones_discovered, 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let outcome = manager()
            .run(tmp.path(), out.path(), &options, &CancelToken::new())
            .unwrap();
        assert!(!outcome.written);
        assert!(!out.path().join("profile.json").exists());
    }

    #[test]
    fn test_zone_filter_unknown_zone_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

        let options = RunOptions {
            zone_filter: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(manager()
            .run(tmp.path(), out.path(), &options, &CancelToken::new())
            .is_err());
    }

    #[test]
    fn test_cancelled_run_skips_write() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = manager()
            .run(tmp.path(), out.path(), &RunOptions::default(), &cancel)
            .unwrap();
        assert!(outcome.cancelled);
        assert!(!outcome.written);
        assert!(!out.path().join("profile.json").exists());
    }

    #[test]
    fn test_cancelled_run_with_allow_partial_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");

        let cancel = CancelToken::new();
        cancel.cancel();
        let options = RunOptions {
            allow_partial: true,
            ..Default::default()
        };
        let outcome = manager().run(tmp.path(), out.path(), &options, &cancel).unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.written);
    }

    #[test]
    fn test_rerun_is_deterministic_up_to_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
        touch(&tmp.path().join("svc/go.mod"), "module example.com/svc\n");

        let m = manager();
        let first = m
            .run(tmp.path(), out.path(), &RunOptions::default(), &CancelToken::new())
            .unwrap();
        let second = m
            .run(tmp.path(), out.path(), &RunOptions::default(), &CancelToken::new())
            .unwrap();
        assert!(first.profile.content_eq(&second.profile));
    }

    #[test]
    fn test_zone_filtered_run_keeps_other_zones_from_prior() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("edge/pyproject.toml"), "[project]\nname = \"edge\"\n");
        touch(&tmp.path().join("svc/go.mod"), "module example.com/svc\n");

        let m = manager();
        m.run(tmp.path(), out.path(), &RunOptions::default(), &CancelToken::new())
            .unwrap();

        let options = RunOptions {
            zone_filter: Some("edge".to_string()),
            ..Default::default()
        };
        let outcome = m.run(tmp.path(), out.path(), &options, &CancelToken::new()).unwrap();
        assert!(outcome.profile.zones.contains_key("edge"));
        assert!(outcome.profile.zones.contains_key("svc"));
    }

    #[test]
    fn test_detection_mode() {
        use crate::types::Zone;
        let auto = Zone {
            name: "a".to_string(),
            path: PathBuf::from("a"),
            language: "go".to_string(),
            marker: "go.mod".to_string(),
            detection: DetectionOrigin::Auto,
            purpose: None,
            contracts: vec![],
        };
        let mut manual = auto.clone();
        manual.detection = DetectionOrigin::Manual;

        assert_eq!(detection_mode(&[auto.clone()]), "auto");
        assert_eq!(detection_mode(&[manual.clone()]), "manual");
        assert_eq!(detection_mode(&[auto, manual]), "hybrid");
        assert_eq!(detection_mode(&[]), "auto");
    }

    #[test]
    fn test_known_frameworks() {
        use crate::provider::DependencyDecl;
        let deps = vec![
            DependencyDecl {
                name: "axum".to_string(),
                version: "0.7".to_string(),
                manifest: PathBuf::from("Cargo.toml"),
            },
            DependencyDecl {
                name: "serde".to_string(),
                version: "1".to_string(),
                manifest: PathBuf::from("Cargo.toml"),
            },
            DependencyDecl {
                name: "github.com/gin-gonic/gin".to_string(),
                version: "v1.9".to_string(),
                manifest: PathBuf::from("go.mod"),
            },
        ];
        assert_eq!(known_frameworks(&deps), vec!["axum", "gin"]);
    }
}
