use std::collections::{BTreeMap, BTreeSet};

use crate::config::PatternsConfig;
use crate::provider::{FileAnalysis, Symbol, SymbolKind};
use crate::types::{
    clamp_unit, DetectionSource, PatternDetection, SignalEvidence, SignalKind, SourceLocation,
};

/// Patterns evaluated against every zone.
pub const PATTERN_NAMES: &[&str] = &[
    "error_handling",
    "cqrs",
    "repository",
    "dependency_injection",
    "domain_model",
];

/// One evaluated signal: raw counts plus whether the signal's match
/// criterion was satisfied.
struct SignalOutcome {
    kind: SignalKind,
    matched: usize,
    considered: usize,
    satisfied: bool,
    examples: Vec<SourceLocation>,
}

/// Pre-indexed zone observations shared by all pattern evaluators.
struct Observations<'a> {
    types: Vec<&'a Symbol>,
    callables: Vec<&'a Symbol>,
    dirs: BTreeSet<String>,
    import_paths: Vec<String>,
}

impl<'a> Observations<'a> {
    fn collect(files: &'a [FileAnalysis]) -> Self {
        let mut types = Vec::new();
        let mut callables = Vec::new();
        let mut dirs = BTreeSet::new();
        let mut import_paths = Vec::new();

        for file in files {
            for segment in file
                .path
                .parent()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default()
                .split('/')
            {
                if !segment.is_empty() {
                    dirs.insert(segment.to_lowercase());
                }
            }
            for symbol in &file.symbols {
                match symbol.kind {
                    SymbolKind::Struct
                    | SymbolKind::Class
                    | SymbolKind::Interface
                    | SymbolKind::Trait
                    | SymbolKind::Enum => types.push(symbol),
                    SymbolKind::Function | SymbolKind::Method => callables.push(symbol),
                    _ => {}
                }
            }
            for import in &file.imports {
                import_paths.push(import.path.to_lowercase());
            }
        }

        Self {
            types,
            callables,
            dirs,
            import_paths,
        }
    }

    fn has_dir(&self, names: &[&str]) -> usize {
        names.iter().filter(|n| self.dirs.contains(**n)).count()
    }

    fn types_with_suffix(&self, suffixes: &[&str]) -> Vec<&Symbol> {
        self.types
            .iter()
            .copied()
            .filter(|s| suffixes.iter().any(|suffix| s.name.ends_with(suffix)))
            .collect()
    }

    fn types_implementing(&self, fragments: &[&str]) -> Vec<&Symbol> {
        self.types
            .iter()
            .copied()
            .filter(|s| {
                s.implements.iter().any(|base| {
                    let base = base.to_lowercase();
                    fragments.iter().any(|f| base.contains(f))
                })
            })
            .collect()
    }

    fn symbols_with_attribute(&self, fragments: &[&str]) -> Vec<&Symbol> {
        self.types
            .iter()
            .chain(self.callables.iter())
            .copied()
            .filter(|s| {
                s.attributes.iter().any(|attr| {
                    let attr = attr.to_lowercase();
                    fragments.iter().any(|f| attr.contains(f))
                })
            })
            .collect()
    }

    fn imports_containing(&self, fragments: &[&str]) -> usize {
        self.import_paths
            .iter()
            .filter(|path| fragments.iter().any(|f| path.contains(f)))
            .count()
    }
}

fn weight_of(config: &PatternsConfig, kind: SignalKind) -> f64 {
    match kind {
        SignalKind::ExplicitMarker => config.explicit_marker_weight,
        SignalKind::AstShape => config.ast_shape_weight,
        SignalKind::Structural => config.structural_weight,
        SignalKind::Naming => config.naming_weight,
        SignalKind::StatisticalMajority => config.statistical_weight,
    }
}

fn locations(symbols: &[&Symbol], cap: usize) -> Vec<SourceLocation> {
    let mut locs: Vec<SourceLocation> = symbols.iter().map(|s| s.location.clone()).collect();
    locs.sort();
    locs.truncate(cap);
    locs
}

/// Multi-signal pattern detection with confidence scoring.
pub struct PatternExtractor<'a> {
    config: &'a PatternsConfig,
}

impl<'a> PatternExtractor<'a> {
    pub fn new(config: &'a PatternsConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, files: &[FileAnalysis]) -> BTreeMap<String, PatternDetection> {
        let obs = Observations::collect(files);
        let mut detections = BTreeMap::new();
        for (name, detection) in [
            ("error_handling", self.error_handling(&obs)),
            ("cqrs", self.cqrs(&obs)),
            ("repository", self.repository(&obs)),
            ("dependency_injection", self.dependency_injection(&obs)),
            ("domain_model", self.domain_model(&obs)),
        ] {
            detections.insert(name.to_string(), detection);
        }
        detections
    }

    /// Fold signal outcomes into a scored detection. Signals that were not
    /// applicable (considered == 0) stay out of the denominator.
    fn build(
        &self,
        pattern: &str,
        variant: Option<String>,
        outcomes: Vec<SignalOutcome>,
    ) -> PatternDetection {
        let mut matched_weight = 0.0;
        let mut considered_weight = 0.0;
        let mut signals = Vec::new();
        let mut examples: Vec<SourceLocation> = Vec::new();

        for outcome in outcomes {
            if outcome.considered == 0 {
                continue;
            }
            let weight = weight_of(self.config, outcome.kind);
            considered_weight += weight;
            if outcome.satisfied {
                matched_weight += weight;
                examples.extend(outcome.examples.iter().cloned());
            }
            signals.push(SignalEvidence {
                kind: outcome.kind,
                matched: outcome.matched,
                considered: outcome.considered,
                weight,
            });
        }

        let confidence = if considered_weight > 0.0 {
            clamp_unit(matched_weight / considered_weight)
        } else {
            0.0
        };
        let detected = confidence > self.config.detect_threshold;
        examples.sort();
        examples.dedup();
        examples.truncate(self.config.max_examples);

        PatternDetection {
            pattern: pattern.to_string(),
            detected,
            variant: if detected { variant } else { None },
            confidence,
            needs_review: detected && confidence <= self.config.apply_threshold,
            signals,
            examples,
            source: DetectionSource::AutoDetected,
        }
    }

    fn error_handling(&self, obs: &Observations) -> PatternDetection {
        let error_types = obs.types_with_suffix(&["Error", "Exception"]);
        let error_dirs = obs.has_dir(&["errors", "exceptions"]);

        let typed_returns: Vec<&&Symbol> = obs
            .callables
            .iter()
            .filter(|s| s.return_type.is_some())
            .collect();
        let result_returns: Vec<&Symbol> = typed_returns
            .iter()
            .filter(|s| {
                let rt = s.return_type.as_deref().unwrap_or_default();
                rt.contains("Result") || rt.contains("error") || rt.contains("Either")
            })
            .map(|s| **s)
            .collect();
        let result_ratio = if typed_returns.is_empty() {
            0.0
        } else {
            result_returns.len() as f64 / typed_returns.len() as f64
        };
        // Majority voting needs a minimal sample to mean anything.
        let statistical_applicable = typed_returns.len() >= 5;

        let variant = if statistical_applicable && result_ratio > self.config.statistical_majority {
            Some("result-types".to_string())
        } else if !error_types.is_empty() {
            Some("exception-types".to_string())
        } else {
            None
        };

        self.build(
            "error_handling",
            variant,
            vec![
                SignalOutcome {
                    kind: SignalKind::Naming,
                    matched: error_types.len(),
                    considered: obs.types.len(),
                    satisfied: error_types.len() >= 2,
                    examples: locations(&error_types, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::Structural,
                    matched: error_dirs,
                    considered: 1,
                    satisfied: error_dirs > 0,
                    examples: vec![],
                },
                SignalOutcome {
                    kind: SignalKind::StatisticalMajority,
                    matched: result_returns.len(),
                    considered: if statistical_applicable {
                        typed_returns.len()
                    } else {
                        0
                    },
                    satisfied: statistical_applicable
                        && result_ratio > self.config.statistical_majority,
                    examples: locations(&result_returns, self.config.max_examples),
                },
            ],
        )
    }

    fn cqrs(&self, obs: &Observations) -> PatternDetection {
        let commands = obs.types_with_suffix(&["Command", "CommandHandler"]);
        let queries = obs.types_with_suffix(&["Query", "QueryHandler"]);
        let mut named: Vec<&Symbol> = commands.clone();
        named.extend(queries.iter().copied());
        let command_dirs = obs.has_dir(&["commands", "queries"]);
        let handler_impls = obs.types_implementing(&["irequest", "icommandhandler", "iqueryhandler"]);
        let markers = obs.symbols_with_attribute(&["command", "query"]);

        self.build(
            "cqrs",
            Some("command-query-split".to_string()),
            vec![
                SignalOutcome {
                    kind: SignalKind::ExplicitMarker,
                    matched: markers.len(),
                    considered: obs.types.len() + obs.callables.len(),
                    satisfied: !markers.is_empty(),
                    examples: locations(&markers, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::AstShape,
                    matched: handler_impls.len(),
                    considered: obs.types.len(),
                    satisfied: !handler_impls.is_empty(),
                    examples: locations(&handler_impls, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::Structural,
                    matched: command_dirs,
                    considered: 1,
                    satisfied: command_dirs == 2,
                    examples: vec![],
                },
                SignalOutcome {
                    kind: SignalKind::Naming,
                    matched: named.len(),
                    considered: obs.types.len(),
                    // Both sides of the split must appear, not just commands.
                    satisfied: !commands.is_empty() && !queries.is_empty(),
                    examples: locations(&named, self.config.max_examples),
                },
            ],
        )
    }

    fn repository(&self, obs: &Observations) -> PatternDetection {
        let named = obs.types_with_suffix(&["Repository", "Repo"]);
        let impls = obs.types_implementing(&["repository"]);
        let markers = obs.symbols_with_attribute(&["repository"]);
        let repo_dirs = obs.has_dir(&["repositories", "repository"]);

        let interface_backed = named
            .iter()
            .any(|s| matches!(s.kind, SymbolKind::Interface | SymbolKind::Trait))
            || !impls.is_empty();
        let variant = if interface_backed {
            "interface-backed"
        } else {
            "concrete"
        };

        self.build(
            "repository",
            Some(variant.to_string()),
            vec![
                SignalOutcome {
                    kind: SignalKind::ExplicitMarker,
                    matched: markers.len(),
                    considered: obs.types.len() + obs.callables.len(),
                    satisfied: !markers.is_empty(),
                    examples: locations(&markers, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::AstShape,
                    matched: impls.len(),
                    considered: obs.types.len(),
                    satisfied: !impls.is_empty(),
                    examples: locations(&impls, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::Structural,
                    matched: repo_dirs,
                    considered: 1,
                    satisfied: repo_dirs > 0,
                    examples: vec![],
                },
                SignalOutcome {
                    kind: SignalKind::Naming,
                    matched: named.len(),
                    considered: obs.types.len(),
                    satisfied: named.len() >= 2,
                    examples: locations(&named, self.config.max_examples),
                },
            ],
        )
    }

    fn dependency_injection(&self, obs: &Observations) -> PatternDetection {
        let markers = obs.symbols_with_attribute(&["inject", "autowired", "provide", "depends"]);
        let container_imports = obs.imports_containing(&[
            "dependencyinjection",
            "dependency_injector",
            "tsyringe",
            "inversify",
            "google/wire",
            "uber-go/fx",
            "uber-go/dig",
        ]);
        let di_dirs = obs.has_dir(&["di", "ioc", "container", "providers"]);
        let named = obs.types_with_suffix(&["Container", "Provider", "Module"]);

        let variant = if !markers.is_empty() {
            "decorator-based"
        } else {
            "container-based"
        };

        self.build(
            "dependency_injection",
            Some(variant.to_string()),
            vec![
                SignalOutcome {
                    kind: SignalKind::ExplicitMarker,
                    matched: markers.len() + container_imports,
                    considered: obs.types.len() + obs.callables.len() + obs.import_paths.len(),
                    satisfied: !markers.is_empty() || container_imports > 0,
                    examples: locations(&markers, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::Structural,
                    matched: di_dirs,
                    considered: 1,
                    satisfied: di_dirs > 0,
                    examples: vec![],
                },
                SignalOutcome {
                    kind: SignalKind::Naming,
                    matched: named.len(),
                    considered: obs.types.len(),
                    satisfied: named.len() >= 2,
                    examples: locations(&named, self.config.max_examples),
                },
            ],
        )
    }

    fn domain_model(&self, obs: &Observations) -> PatternDetection {
        let named = obs.types_with_suffix(&["Entity", "Aggregate", "ValueObject", "Event"]);
        let impls = obs.types_implementing(&["aggregateroot", "entity", "valueobject"]);
        let markers = obs.symbols_with_attribute(&["entity", "aggregate", "dataclass"]);
        let ddd_dirs = obs.has_dir(&["domain", "entities", "aggregates", "valueobjects"]);

        self.build(
            "domain_model",
            Some("entities-and-value-objects".to_string()),
            vec![
                SignalOutcome {
                    kind: SignalKind::ExplicitMarker,
                    matched: markers.len(),
                    considered: obs.types.len() + obs.callables.len(),
                    satisfied: !markers.is_empty(),
                    examples: locations(&markers, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::AstShape,
                    matched: impls.len(),
                    considered: obs.types.len(),
                    satisfied: !impls.is_empty(),
                    examples: locations(&impls, self.config.max_examples),
                },
                SignalOutcome {
                    kind: SignalKind::Structural,
                    matched: ddd_dirs,
                    considered: 1,
                    satisfied: ddd_dirs > 0,
                    examples: vec![],
                },
                SignalOutcome {
                    kind: SignalKind::Naming,
                    matched: named.len(),
                    considered: obs.types.len(),
                    satisfied: named.len() >= 2,
                    examples: locations(&named, self.config.max_examples),
                },
            ],
        )
    }
}
