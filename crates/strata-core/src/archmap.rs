use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ArchitectureConfig;
use crate::graph::{ModuleEdge, ModuleGraph};
use crate::layer::LayerClassifier;
use crate::provider::FileAnalysis;
use crate::types::{ArchLayer, LayerViolation, ViolationSeverity};

/// Architecture summary for one zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureReport {
    /// module path -> assigned layer (absent = unclassified)
    pub modules: BTreeMap<String, Option<ArchLayer>>,
    pub violations: Vec<LayerViolation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Vec<String>>,
    pub dependency_count: usize,
}

/// Builds the zone's module dependency graph from extracted imports and
/// evaluates the allowed-reference table over every edge.
pub struct ArchitectureMapper<'a> {
    classifier: &'a LayerClassifier,
    config: &'a ArchitectureConfig,
}

impl<'a> ArchitectureMapper<'a> {
    pub fn new(classifier: &'a LayerClassifier, config: &'a ArchitectureConfig) -> Self {
        Self { classifier, config }
    }

    pub fn map(&self, files: &[FileAnalysis]) -> ArchitectureReport {
        let mut graph = ModuleGraph::new();

        // One module per source directory within the zone.
        let mut modules: Vec<String> = files
            .iter()
            .map(|f| module_of(f))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        // Longest first so suffix resolution prefers the most specific module.
        modules.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

        for module in &modules {
            graph.ensure_node(module, self.layer_of(module));
        }

        for file in files {
            let from_module = module_of(file);
            let from_idx = graph.ensure_node(&from_module, self.layer_of(&from_module));
            for import in &file.imports {
                let Some(to_module) = resolve_import(&import.path, &modules) else {
                    continue;
                };
                if to_module == from_module {
                    continue;
                }
                let to_idx = graph.ensure_node(&to_module, self.layer_of(&to_module));
                graph.add_edge(
                    from_idx,
                    to_idx,
                    ModuleEdge {
                        location: import.location.clone(),
                        import_path: import.path.clone(),
                    },
                );
            }
        }

        let violations = self.detect_violations(&graph);
        let module_layers = graph
            .nodes()
            .iter()
            .map(|n| (n.name.clone(), n.layer))
            .collect();

        ArchitectureReport {
            modules: module_layers,
            violations,
            cycles: graph.find_cycles(),
            dependency_count: graph.edge_count(),
        }
    }

    fn layer_of(&self, module: &str) -> Option<ArchLayer> {
        if module == "." {
            return None;
        }
        self.classifier.classify(&format!("{module}/_"))
    }

    /// Flags exactly the edges forbidden by the allowed-reference table,
    /// aggregated per module pair with every contributing import location.
    fn detect_violations(&self, graph: &ModuleGraph) -> Vec<LayerViolation> {
        let mut grouped: BTreeMap<(String, String), LayerViolation> = BTreeMap::new();

        for (src, tgt, edge) in graph.edges_with_nodes() {
            let (Some(from_layer), Some(to_layer)) = (src.layer, tgt.layer) else {
                continue;
            };
            if self.config.allows(from_layer, to_layer) {
                continue;
            }

            let severity = severity_of(from_layer, to_layer);
            grouped
                .entry((src.name.clone(), tgt.name.clone()))
                .and_modify(|v| v.locations.push(edge.location.clone()))
                .or_insert_with(|| LayerViolation {
                    from_layer,
                    to_layer,
                    from_module: src.name.clone(),
                    to_module: tgt.name.clone(),
                    severity,
                    locations: vec![edge.location.clone()],
                });
        }

        let mut violations: Vec<LayerViolation> = grouped.into_values().collect();
        for violation in &mut violations {
            violation.locations.sort();
            violation.locations.dedup();
        }
        violations
    }
}

/// Severity policy: an edge spanning innermost to outermost is major;
/// any other disallowed edge is minor.
fn severity_of(from: ArchLayer, to: ArchLayer) -> ViolationSeverity {
    let span = from.depth().abs_diff(to.depth());
    if span == ArchLayer::max_depth() {
        ViolationSeverity::Major
    } else {
        ViolationSeverity::Minor
    }
}

/// Module identity: the file's directory relative to the zone root.
fn module_of(file: &FileAnalysis) -> String {
    file.path
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string())
}

/// Resolve an import path to a zone module by segment matching. Import
/// separators vary per ecosystem (`::`, `.`, `/`); modules are tried most
/// specific first, matching either the full module path or its final segment.
fn resolve_import(import_path: &str, modules: &[String]) -> Option<String> {
    let normalized = import_path.replace("::", "/").replace('.', "/");
    let segments: Vec<&str> = normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != "crate" && *s != "super")
        .collect();

    for module in modules {
        if module == "." {
            continue;
        }
        if normalized.contains(module.as_str()) {
            return Some(module.clone());
        }
        let last_segment = module.rsplit('/').next().unwrap_or(module);
        if segments.iter().any(|s| *s == last_segment) {
            return Some(module.clone());
        }
    }
    None
}
