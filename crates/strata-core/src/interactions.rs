use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::config::InteractionsConfig;
use crate::log::{DiscoveryLog, Phase};
use crate::types::{Interaction, InteractionKind, Zone};
use crate::zones::SKIP_DIRS;

const COMPOSE_FILE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Deserialize)]
struct ComposeService {
    #[serde(default)]
    build: Option<BuildSpec>,
    #[serde(default)]
    depends_on: Option<DependsOn>,
}

/// `build:` takes either a bare context string or a mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BuildSpec {
    Context(String),
    Detailed {
        #[serde(default)]
        context: Option<String>,
    },
}

impl BuildSpec {
    fn context(&self) -> Option<&str> {
        match self {
            BuildSpec::Context(c) => Some(c),
            BuildSpec::Detailed { context } => context.as_deref(),
        }
    }
}

/// `depends_on:` takes either a list or a map with per-service conditions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, serde_yaml::Value>),
}

impl DependsOn {
    fn names(&self) -> Vec<&str> {
        match self {
            DependsOn::List(names) => names.iter().map(|s| s.as_str()).collect(),
            DependsOn::Map(map) => map.keys().map(|s| s.as_str()).collect(),
        }
    }
}

/// Finds container-orchestration and shared-schema relationships between
/// zones. Advisory only; a failure on one source never aborts the others.
pub struct InteractionDetector<'a> {
    config: &'a InteractionsConfig,
}

impl<'a> InteractionDetector<'a> {
    pub fn new(config: &'a InteractionsConfig) -> Self {
        Self { config }
    }

    /// `zone_imports` maps zone name -> every import/reference path collected
    /// during that zone's analysis.
    pub fn detect(
        &self,
        root: &Path,
        zones: &[Zone],
        zone_imports: &BTreeMap<String, BTreeSet<String>>,
        log: &mut DiscoveryLog,
    ) -> Vec<Interaction> {
        let mut interactions = Vec::new();
        interactions.extend(self.detect_compose(root, zones, log));
        interactions.extend(self.detect_shared_schemas(root, zones, zone_imports));
        interactions.sort_by(|a, b| a.id.cmp(&b.id));
        interactions.dedup_by(|a, b| a.id == b.id);
        interactions
    }

    fn detect_compose(
        &self,
        root: &Path,
        zones: &[Zone],
        log: &mut DiscoveryLog,
    ) -> Vec<Interaction> {
        let mut interactions = Vec::new();

        for compose_path in find_compose_files(root) {
            let rel_compose = compose_path
                .strip_prefix(root)
                .unwrap_or(&compose_path)
                .to_path_buf();

            let content = match std::fs::read_to_string(&compose_path) {
                Ok(c) => c,
                Err(e) => {
                    log.record(Phase::Interactions, &rel_compose, format!("unreadable: {e}"));
                    continue;
                }
            };
            let compose: ComposeFile = match serde_yaml::from_str(&content) {
                Ok(c) => c,
                Err(e) => {
                    log.record(Phase::Interactions, &rel_compose, format!("parse error: {e}"));
                    continue;
                }
            };

            let compose_dir = rel_compose.parent().unwrap_or(Path::new(""));

            // Resolve each service's build context to a zone by containment.
            let mut service_zones: BTreeMap<&str, &Zone> = BTreeMap::new();
            for (name, service) in &compose.services {
                let Some(context) = service.build.as_ref().and_then(|b| b.context()) else {
                    continue;
                };
                let context_path = normalize_rel(compose_dir, context);
                if let Some(zone) = zones.iter().find(|z| z.contains(&context_path)) {
                    service_zones.insert(name.as_str(), zone);
                }
            }

            for (name, service) in &compose.services {
                let Some(&from_zone) = service_zones.get(name.as_str()) else {
                    continue;
                };
                let Some(depends_on) = &service.depends_on else {
                    continue;
                };
                for dep in depends_on.names() {
                    let Some(&to_zone) = service_zones.get(dep) else {
                        continue;
                    };
                    if from_zone.name == to_zone.name {
                        continue;
                    }
                    let mut details = BTreeMap::new();
                    details.insert(
                        "compose_file".to_string(),
                        rel_compose.to_string_lossy().replace('\\', "/"),
                    );
                    details.insert("service".to_string(), name.clone());
                    details.insert("depends_on".to_string(), dep.to_string());
                    interactions.push(Interaction {
                        id: format!(
                            "docker_compose:{}->{}:{}",
                            from_zone.name, to_zone.name, name
                        ),
                        kind: InteractionKind::DockerCompose,
                        from_zone: Some(from_zone.name.clone()),
                        to_zone: Some(to_zone.name.clone()),
                        zones: vec![],
                        details,
                    });
                }
            }
        }

        interactions
    }

    /// Well-known repo-root schema directories referenced by more than one
    /// zone's source become a shared_schema interaction.
    fn detect_shared_schemas(
        &self,
        root: &Path,
        zones: &[Zone],
        zone_imports: &BTreeMap<String, BTreeSet<String>>,
    ) -> Vec<Interaction> {
        let mut interactions = Vec::new();

        for dir in &self.config.shared_schema_dirs {
            if !root.join(dir).is_dir() {
                continue;
            }
            let mut referencing: Vec<String> = zones
                .iter()
                .filter(|zone| {
                    zone_imports
                        .get(&zone.name)
                        .is_some_and(|imports| imports.iter().any(|i| references_dir(i, dir)))
                })
                .map(|zone| zone.name.clone())
                .collect();
            referencing.sort();

            if referencing.len() > 1 {
                let mut details = BTreeMap::new();
                details.insert("directory".to_string(), dir.clone());
                interactions.push(Interaction {
                    id: format!("shared_schema:{}:{}", referencing.join(","), dir),
                    kind: InteractionKind::SharedSchema,
                    from_zone: None,
                    to_zone: None,
                    zones: referencing,
                    details,
                });
            }
        }

        interactions
    }
}

fn find_compose_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !SKIP_DIRS.contains(&name.as_ref())
        })
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && COMPOSE_FILE_NAMES.contains(&e.file_name().to_string_lossy().as_ref())
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Resolve a compose build context against the compose file's directory
/// into a repo-relative path.
fn normalize_rel(base: &Path, context: &str) -> PathBuf {
    let joined = base.join(context);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// True if the import/reference string mentions the directory as a path
/// segment, across ecosystem separators.
fn references_dir(reference: &str, dir: &str) -> bool {
    reference
        .replace("::", "/")
        .replace('.', "/")
        .replace('\\', "/")
        .split('/')
        .any(|segment| segment == dir)
}
