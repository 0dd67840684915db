use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::layer::LayerClassifier;

/// File names treated as executable entry points.
const ENTRY_POINT_NAMES: &[&str] = &[
    "main.rs",
    "main.go",
    "Program.cs",
    "__main__.py",
    "main.py",
    "main.ts",
    "index.ts",
    "index.js",
];

/// Directory names that anchor a test tree.
const TEST_DIR_NAMES: &[&str] = &["tests", "test", "__tests__", "spec", "testdata"];

/// Structural summary of a zone: layer-classified directories, entry points,
/// and test roots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneStructure {
    /// layer name -> directories assigned to it
    pub layers: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unclassified_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_roots: Vec<String>,
    pub source_files: usize,
}

/// True if the path lives under a test directory or follows a test-file
/// naming convention for any supported ecosystem.
pub fn is_test_path(path: &Path) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/");
    if normalized
        .split('/')
        .any(|segment| TEST_DIR_NAMES.contains(&segment))
    {
        return true;
    }
    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_lowercase(),
        None => return false,
    };
    file_name.starts_with("test_")
        || file_name.contains("_test.")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
        || file_name.ends_with("tests.cs")
        || file_name.ends_with("test.cs")
}

/// Maps a zone's directories to architectural layers and locates entry
/// points and test roots. Pure over the supplied file list.
pub struct StructureAnalyzer<'a> {
    classifier: &'a LayerClassifier,
}

impl<'a> StructureAnalyzer<'a> {
    pub fn new(classifier: &'a LayerClassifier) -> Self {
        Self { classifier }
    }

    /// `files` are source paths relative to the zone root.
    pub fn analyze(&self, files: &[&Path]) -> ZoneStructure {
        let mut dirs: BTreeSet<String> = BTreeSet::new();
        let mut entry_points: Vec<String> = Vec::new();
        let mut test_roots: BTreeSet<String> = BTreeSet::new();

        for file in files {
            if let Some(parent) = file.parent() {
                let dir = parent.to_string_lossy().replace('\\', "/");
                if !dir.is_empty() {
                    dirs.insert(dir.clone());
                }
                if is_test_path(file) {
                    test_roots.insert(if dir.is_empty() { ".".to_string() } else { dir });
                }
            }
            if let Some(name) = file.file_name() {
                let name = name.to_string_lossy();
                if ENTRY_POINT_NAMES.contains(&name.as_ref()) {
                    entry_points.push(file.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        let mut layers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut unclassified_dirs: Vec<String> = Vec::new();
        for dir in &dirs {
            match self.classifier.classify(&format!("{dir}/_")) {
                Some(layer) => layers.entry(layer.to_string()).or_default().push(dir.clone()),
                None => unclassified_dirs.push(dir.clone()),
            }
        }

        entry_points.sort();
        ZoneStructure {
            layers,
            unclassified_dirs,
            entry_points,
            test_roots: test_roots.into_iter().collect(),
            source_files: files.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayersConfig;
    use std::path::PathBuf;

    fn analyze(paths: &[&str]) -> ZoneStructure {
        let classifier = LayerClassifier::new(&LayersConfig::default());
        let analyzer = StructureAnalyzer::new(&classifier);
        let owned: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        let refs: Vec<&Path> = owned.iter().map(|p| p.as_path()).collect();
        analyzer.analyze(&refs)
    }

    #[test]
    fn test_layer_mapping_and_unclassified() {
        let structure = analyze(&[
            "src/domain/user.rs",
            "src/handlers/http.rs",
            "src/util/strings.rs",
        ]);

        assert_eq!(structure.layers["domain"], vec!["src/domain"]);
        assert_eq!(structure.layers["presentation"], vec!["src/handlers"]);
        assert_eq!(structure.unclassified_dirs, vec!["src/util"]);
        assert_eq!(structure.source_files, 3);
    }

    #[test]
    fn test_entry_points_found() {
        let structure = analyze(&["src/main.rs", "src/domain/user.rs"]);
        assert_eq!(structure.entry_points, vec!["src/main.rs"]);
    }

    #[test]
    fn test_test_roots() {
        let structure = analyze(&[
            "tests/api_test.rs",
            "pkg/store/store.go",
            "pkg/store/store_test.go",
        ]);
        assert_eq!(structure.test_roots, vec!["pkg/store", "tests"]);
    }

    #[test]
    fn test_is_test_path_conventions() {
        assert!(is_test_path(Path::new("tests/api.rs")));
        assert!(is_test_path(Path::new("pkg/store_test.go")));
        assert!(is_test_path(Path::new("src/api.test.ts")));
        assert!(is_test_path(Path::new("src/api.spec.ts")));
        assert!(is_test_path(Path::new("app/test_models.py")));
        assert!(is_test_path(Path::new("Api/UserTests.cs")));
        assert!(!is_test_path(Path::new("src/api.ts")));
        assert!(!is_test_path(Path::new("src/contest.py")));
    }
}
