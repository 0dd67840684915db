use std::collections::BTreeMap;

use crate::config::ConventionsConfig;
use crate::provider::{FileAnalysis, SymbolKind, Visibility};
use crate::structure::is_test_path;
use crate::types::{AlternativePattern, ConventionDetection, DetectionSource};

/// Normalized identifier shapes.
fn shape_of(name: &str) -> &'static str {
    let has_upper = name.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = name.chars().any(|c| c.is_ascii_lowercase());
    let first_upper = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());

    if name.contains('-') && !has_upper {
        "kebab-case"
    } else if name.contains('_') && has_upper && !has_lower {
        "SCREAMING_SNAKE_CASE"
    } else if name.contains('_') {
        "snake_case"
    } else if first_upper && has_lower {
        "PascalCase"
    } else if !first_upper && has_upper {
        "camelCase"
    } else if !has_upper {
        // single lowercase token: degenerate snake_case
        "snake_case"
    } else {
        "mixed"
    }
}

/// Interface names get one extra shape: the `I` prefix.
fn interface_shape_of(name: &str) -> &'static str {
    let mut chars = name.chars();
    if chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase()) {
        "I-prefixed"
    } else {
        shape_of(name)
    }
}

/// Private fields get one extra shape: the underscore prefix.
fn field_shape_of(name: &str) -> &'static str {
    if let Some(rest) = name.strip_prefix('_') {
        if !rest.is_empty() {
            return "underscore-prefixed";
        }
    }
    shape_of(name)
}

/// Learns naming conventions per category by grouping every sampled
/// identifier by its normalized shape.
pub struct ConventionInferrer<'a> {
    config: &'a ConventionsConfig,
}

impl<'a> ConventionInferrer<'a> {
    pub fn new(config: &'a ConventionsConfig) -> Self {
        Self { config }
    }

    pub fn infer(&self, files: &[FileAnalysis]) -> BTreeMap<String, ConventionDetection> {
        let mut file_names: Vec<String> = Vec::new();
        let mut type_names: Vec<String> = Vec::new();
        let mut interface_names: Vec<String> = Vec::new();
        let mut private_field_names: Vec<String> = Vec::new();
        let mut test_names: Vec<String> = Vec::new();

        for file in files {
            if let Some(stem) = file.path.file_stem() {
                file_names.push(stem.to_string_lossy().to_string());
            }
            let in_test_file = is_test_path(&file.path);
            for symbol in &file.symbols {
                match symbol.kind {
                    SymbolKind::Struct | SymbolKind::Class | SymbolKind::Enum | SymbolKind::TypeAlias => {
                        type_names.push(symbol.name.clone());
                    }
                    SymbolKind::Interface | SymbolKind::Trait => {
                        interface_names.push(symbol.name.clone());
                    }
                    SymbolKind::Field => {
                        if symbol.visibility == Visibility::Private {
                            private_field_names.push(symbol.name.clone());
                        }
                    }
                    SymbolKind::Function | SymbolKind::Method => {
                        let lower = symbol.name.to_lowercase();
                        if in_test_file && (lower.starts_with("test") || lower.ends_with("test")) {
                            test_names.push(symbol.name.clone());
                        }
                    }
                }
            }
        }

        let mut detections = BTreeMap::new();
        for (category, samples, classify) in [
            ("file_names", &file_names, shape_of as fn(&str) -> &'static str),
            ("type_names", &type_names, shape_of),
            ("interface_names", &interface_names, interface_shape_of),
            ("private_field_names", &private_field_names, field_shape_of),
            ("test_names", &test_names, shape_of),
        ] {
            if let Some(detection) = self.infer_category(category, samples, classify) {
                detections.insert(category.to_string(), detection);
            }
        }
        detections
    }

    fn infer_category(
        &self,
        category: &str,
        samples: &[String],
        classify: fn(&str) -> &'static str,
    ) -> Option<ConventionDetection> {
        if samples.is_empty() {
            return None;
        }

        let mut by_shape: BTreeMap<&'static str, usize> = BTreeMap::new();
        for sample in samples {
            *by_shape.entry(classify(sample)).or_insert(0) += 1;
        }

        let total = samples.len();
        let (&dominant, &dominant_count) = by_shape
            .iter()
            .max_by_key(|&(shape, count)| (*count, std::cmp::Reverse(*shape)))?;

        let mut alternatives: Vec<AlternativePattern> = by_shape
            .iter()
            .filter(|(shape, _)| **shape != dominant)
            .map(|(shape, count)| AlternativePattern {
                shape: shape.to_string(),
                frequency: *count as f64 / total as f64,
            })
            .filter(|alt| alt.frequency >= self.config.min_alternative_frequency)
            .collect();
        alternatives.sort_by(|a, b| {
            b.frequency
                .partial_cmp(&a.frequency)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.shape.cmp(&b.shape))
        });

        let mut exceptions: Vec<String> = samples
            .iter()
            .filter(|s| classify(s) != dominant)
            .cloned()
            .collect();
        exceptions.sort();
        exceptions.dedup();
        exceptions.truncate(self.config.max_exceptions);

        Some(ConventionDetection {
            category: category.to_string(),
            dominant: dominant.to_string(),
            consistency: dominant_count as f64 / total as f64,
            total_samples: total,
            exceptions,
            alternatives,
            source: DetectionSource::AutoDetected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Symbol;
    use crate::types::SourceLocation;
    use std::path::PathBuf;

    fn symbol(name: &str, kind: SymbolKind, visibility: Visibility) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind,
            visibility,
            attributes: vec![],
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

    fn infer(files: &[FileAnalysis]) -> BTreeMap<String, ConventionDetection> {
        let config = ConventionsConfig::default();
        ConventionInferrer::new(&config).infer(files)
    }

    #[test]
    fn test_shape_classification() {
        assert_eq!(shape_of("UserService"), "PascalCase");
        assert_eq!(shape_of("userService"), "camelCase");
        assert_eq!(shape_of("user_service"), "snake_case");
        assert_eq!(shape_of("user-service"), "kebab-case");
        assert_eq!(shape_of("MAX_RETRIES"), "SCREAMING_SNAKE_CASE");
        assert_eq!(shape_of("user"), "snake_case");
        assert_eq!(interface_shape_of("IUserRepository"), "I-prefixed");
        assert_eq!(interface_shape_of("UserRepository"), "PascalCase");
        assert_eq!(interface_shape_of("Item"), "PascalCase");
        assert_eq!(field_shape_of("_count"), "underscore-prefixed");
        assert_eq!(field_shape_of("count"), "snake_case");
    }

    #[test]
    fn test_interface_prefix_ratio() {
        // 8 of 10 interface files use the I prefix: consistency 0.8 with
        // the remaining 2 listed as exceptions.
        let mut symbols: Vec<Symbol> = (0..8)
            .map(|i| {
                symbol(
                    &format!("IService{i}"),
                    SymbolKind::Interface,
                    Visibility::Public,
                )
            })
            .collect();
        symbols.push(symbol("Startup", SymbolKind::Interface, Visibility::Public));
        symbols.push(symbol("Runner", SymbolKind::Interface, Visibility::Public));

        let detections = infer(&[file("Api/Contracts.cs", symbols)]);
        let conv = &detections["interface_names"];
        assert_eq!(conv.dominant, "I-prefixed");
        assert!((conv.consistency - 0.8).abs() < 1e-9);
        assert_eq!(conv.total_samples, 10);
        assert_eq!(conv.exceptions, vec!["Runner", "Startup"]);
        assert_eq!(conv.alternatives.len(), 1);
        assert_eq!(conv.alternatives[0].shape, "PascalCase");
        assert!((conv.alternatives[0].frequency - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_low_frequency_alternatives_hidden() {
        let mut symbols: Vec<Symbol> = (0..19)
            .map(|i| symbol(&format!("Type{i}"), SymbolKind::Class, Visibility::Public))
            .collect();
        symbols.push(symbol("odd_one", SymbolKind::Class, Visibility::Public));

        let detections = infer(&[file("src/models.py", symbols)]);
        let conv = &detections["type_names"];
        assert_eq!(conv.dominant, "PascalCase");
        // 5% alternative stays out of the alternatives list but shows as exception
        assert!(conv.alternatives.is_empty());
        assert_eq!(conv.exceptions, vec!["odd_one"]);
    }

    #[test]
    fn test_consistency_in_unit_interval() {
        let detections = infer(&[file(
            "src/a.rs",
            vec![symbol("User", SymbolKind::Struct, Visibility::Public)],
        )]);
        for conv in detections.values() {
            assert!(conv.consistency >= 0.0 && conv.consistency <= 1.0);
        }
    }

    #[test]
    fn test_empty_categories_absent() {
        let detections = infer(&[file("src/a.rs", vec![])]);
        assert!(detections.contains_key("file_names"));
        assert!(!detections.contains_key("interface_names"));
        assert!(!detections.contains_key("test_names"));
    }

    #[test]
    fn test_test_names_sampled_from_test_files_only() {
        let files = vec![
            file(
                "tests/api_test.rs",
                vec![symbol("test_create_user", SymbolKind::Function, Visibility::Private)],
            ),
            file(
                "src/api.rs",
                vec![symbol("create_user", SymbolKind::Function, Visibility::Public)],
            ),
        ];
        let detections = infer(&files);
        let conv = &detections["test_names"];
        assert_eq!(conv.total_samples, 1);
        assert_eq!(conv.dominant, "snake_case");
    }

    #[test]
    fn test_private_field_shapes() {
        let files = vec![file(
            "app/models.py",
            vec![
                symbol("_cache", SymbolKind::Field, Visibility::Private),
                symbol("_index", SymbolKind::Field, Visibility::Private),
                symbol("name", SymbolKind::Field, Visibility::Public),
            ],
        )];
        let detections = infer(&files);
        let conv = &detections["private_field_names"];
        assert_eq!(conv.total_samples, 2);
        assert_eq!(conv.dominant, "underscore-prefixed");
        assert!((conv.consistency - 1.0).abs() < 1e-9);
    }
}
