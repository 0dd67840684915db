use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TestsConfig;
use crate::provider::{FileAnalysis, SymbolKind, Visibility};
use crate::structure::is_test_path;
use crate::types::clamp_unit;

/// Inventory counts for one detected test framework.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameworkStats {
    pub test_files: usize,
    pub test_cases: usize,
}

/// Static test inventory and coverage approximation for one zone.
/// Never a runtime coverage measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestInventory {
    pub frameworks: BTreeMap<String, FrameworkStats>,
    pub coverage_estimate: f64,
    pub tested_files: usize,
    pub analyzable_files: usize,
    /// Source files with no discoverable matching test.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<String>,
    /// Public declarations in files with zero mapped tests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub untested_public_symbols: Vec<String>,
}

/// Inventories tests per framework and maps them to source files with a
/// naming-convention heuristic.
pub struct TestGapAnalyzer<'a> {
    config: &'a TestsConfig,
}

impl<'a> TestGapAnalyzer<'a> {
    pub fn new(config: &'a TestsConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, files: &[FileAnalysis]) -> TestInventory {
        let mut frameworks: BTreeMap<String, FrameworkStats> = BTreeMap::new();
        let mut tested_stems: BTreeSet<String> = BTreeSet::new();

        for file in files {
            if !is_test_path(&file.path) {
                continue;
            }
            let framework = framework_of(file);
            let stats = frameworks.entry(framework.to_string()).or_default();
            stats.test_files += 1;
            stats.test_cases += count_test_cases(file, framework);

            if let Some(stem) = file.path.file_stem() {
                tested_stems.insert(normalize_test_stem(&stem.to_string_lossy()));
            }
        }

        let source_files: Vec<&FileAnalysis> = files
            .iter()
            .filter(|f| !is_test_path(&f.path))
            .collect();

        let mut tested_files = 0usize;
        let mut gaps: Vec<String> = Vec::new();
        let mut untested_public_symbols: Vec<String> = Vec::new();

        for file in &source_files {
            let stem = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if tested_stems.contains(&stem) {
                tested_files += 1;
            } else {
                let path = file.path.to_string_lossy().replace('\\', "/");
                for symbol in &file.symbols {
                    if symbol.visibility == Visibility::Public
                        && matches!(
                            symbol.kind,
                            SymbolKind::Function
                                | SymbolKind::Method
                                | SymbolKind::Struct
                                | SymbolKind::Class
                                | SymbolKind::Interface
                                | SymbolKind::Trait
                        )
                    {
                        untested_public_symbols.push(format!("{path}::{}", symbol.name));
                    }
                }
                gaps.push(path);
            }
        }

        gaps.sort();
        untested_public_symbols.sort();
        untested_public_symbols.truncate(self.config.max_untested_listed);

        let analyzable_files = source_files.len();
        let coverage_estimate = if analyzable_files == 0 {
            0.0
        } else {
            clamp_unit(tested_files as f64 / analyzable_files as f64)
        };

        TestInventory {
            frameworks,
            coverage_estimate,
            tested_files,
            analyzable_files,
            gaps,
            untested_public_symbols,
        }
    }
}

/// Best-effort framework identification from the test file's extension and
/// naming convention.
fn framework_of(file: &FileAnalysis) -> &'static str {
    let name = file
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match Path::new(&name).extension().and_then(|e| e.to_str()) {
        Some("rs") => "rust-test",
        Some("go") => "go-test",
        Some("py") => "pytest",
        Some("ts") | Some("tsx") | Some("js") | Some("jsx") => "jest",
        Some("cs") => "xunit",
        _ => "unknown",
    }
}

/// Count test cases by the framework's declaration convention. A static
/// approximation over extracted symbols.
fn count_test_cases(file: &FileAnalysis, framework: &str) -> usize {
    file.symbols
        .iter()
        .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Method))
        .filter(|s| match framework {
            "rust-test" => s.attributes.iter().any(|a| a.contains("test")),
            "go-test" => s.name.starts_with("Test") || s.name.starts_with("Benchmark"),
            "pytest" => s.name.starts_with("test"),
            "xunit" => s
                .attributes
                .iter()
                .any(|a| a.contains("Fact") || a.contains("Theory") || a.contains("Test")),
            // Jest cases are closures inside it()/test() calls; count every
            // function declared in the test file instead.
            _ => true,
        })
        .count()
}

/// Reduce a test file stem to the source stem it exercises:
/// `user_service_test`, `test_user_service`, `UserService.test` and
/// `UserServiceTests` all map to `user_service`/`userservice`.
fn normalize_test_stem(stem: &str) -> String {
    let mut s = stem.to_lowercase();
    // Double extensions like `.test`/`.spec` survive in the stem
    for suffix in [".test", ".spec"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
        }
    }
    for suffix in ["_tests", "_test", "tests", "test"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
            break;
        }
    }
    if let Some(stripped) = s.strip_prefix("test_") {
        s = stripped.to_string();
    }
    s.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Symbol;
    use crate::types::SourceLocation;
    use std::path::PathBuf;

    fn symbol(name: &str, kind: SymbolKind, visibility: Visibility, attrs: &[&str]) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind,
            visibility,
            attributes: attrs.iter().map(|a| a.to_string()).collect(),
            implements: vec![],
            return_type: None,
            location: SourceLocation {
                file: PathBuf::from("x"),
                line: 1,
                column: 1,
            },
        }
    }

    fn file(path: &str, symbols: Vec<Symbol>) -> FileAnalysis {
        FileAnalysis {
            path: PathBuf::from(path),
            symbols,
            imports: vec![],
        }
    }

    fn analyze(files: &[FileAnalysis]) -> TestInventory {
        let config = TestsConfig::default();
        TestGapAnalyzer::new(&config).analyze(files)
    }

    #[test]
    fn test_normalize_test_stem() {
        assert_eq!(normalize_test_stem("user_service_test"), "user_service");
        assert_eq!(normalize_test_stem("test_user_service"), "user_service");
        assert_eq!(normalize_test_stem("UserServiceTests"), "userservice");
        assert_eq!(normalize_test_stem("api.test"), "api");
        assert_eq!(normalize_test_stem("api.spec"), "api");
    }

    #[test]
    fn test_coverage_estimate() {
        let files = vec![
            file("pkg/store/store.go", vec![]),
            file(
                "pkg/store/store_test.go",
                vec![symbol("TestPut", SymbolKind::Function, Visibility::Public, &[])],
            ),
            file("pkg/api/api.go", vec![]),
        ];

        let inventory = analyze(&files);
        assert_eq!(inventory.analyzable_files, 2);
        assert_eq!(inventory.tested_files, 1);
        assert!((inventory.coverage_estimate - 0.5).abs() < 1e-9);
        assert_eq!(inventory.gaps, vec!["pkg/api/api.go"]);
    }

    #[test]
    fn test_framework_inventory() {
        let files = vec![
            file(
                "tests/api_test.rs",
                vec![
                    symbol("test_create", SymbolKind::Function, Visibility::Private, &["test"]),
                    symbol("test_delete", SymbolKind::Function, Visibility::Private, &["test"]),
                    symbol("helper", SymbolKind::Function, Visibility::Private, &[]),
                ],
            ),
            file(
                "app/test_models.py",
                vec![symbol("test_user", SymbolKind::Function, Visibility::Public, &[])],
            ),
        ];

        let inventory = analyze(&files);
        assert_eq!(inventory.frameworks["rust-test"].test_files, 1);
        assert_eq!(inventory.frameworks["rust-test"].test_cases, 2);
        assert_eq!(inventory.frameworks["pytest"].test_cases, 1);
    }

    #[test]
    fn test_untested_public_surface_reported() {
        let files = vec![file(
            "src/billing.rs",
            vec![
                symbol("charge", SymbolKind::Function, Visibility::Public, &[]),
                symbol("internal_total", SymbolKind::Function, Visibility::Private, &[]),
            ],
        )];

        let inventory = analyze(&files);
        assert_eq!(
            inventory.untested_public_symbols,
            vec!["src/billing.rs::charge"]
        );
    }

    #[test]
    fn test_no_source_files_zero_coverage() {
        let inventory = analyze(&[]);
        assert_eq!(inventory.coverage_estimate, 0.0);
        assert!(inventory.gaps.is_empty());
    }

    #[test]
    fn test_jest_file_maps_to_source() {
        let files = vec![
            file("src/api.ts", vec![]),
            file("src/api.test.ts", vec![]),
        ];
        let inventory = analyze(&files);
        assert_eq!(inventory.tested_files, 1);
        assert!(inventory.gaps.is_empty());
        assert_eq!(inventory.frameworks["jest"].test_files, 1);
    }
}
