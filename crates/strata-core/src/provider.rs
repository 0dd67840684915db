use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tree_sitter::Tree;

use crate::types::SourceLocation;

/// A parsed source file with its tree-sitter AST and original content.
pub struct ParsedSource {
    pub path: PathBuf,
    pub tree: Tree,
    pub content: String,
}

/// Kind of a named declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Struct,
    Class,
    Interface,
    Trait,
    Enum,
    Function,
    Method,
    Field,
    TypeAlias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

/// A named, typed declaration with its location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    /// Attributes/decorators/annotations attached to the declaration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    /// Interfaces/base types this declaration implements or inherits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub location: SourceLocation,
}

/// Extraction results for one source file, as consumed by the per-zone
/// analysis phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Path relative to the zone root.
    pub path: PathBuf,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
}

/// An import/using/reference statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub location: SourceLocation,
}

/// A declared dependency from a project manifest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyDecl {
    pub name: String,
    pub version: String,
    pub manifest: PathBuf,
}

/// Metadata read from a project marker file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub language: String,
    pub manifest: PathBuf,
}

/// Per-language capability set. One implementation per supported language,
/// selected through [`ProviderRegistry`].
pub trait LanguageProvider: Send + Sync {
    /// Language name (e.g., "go", "rust")
    fn language(&self) -> &'static str;

    /// File extensions this provider handles (e.g., &["go"])
    fn file_extensions(&self) -> &[&str];

    /// Read project metadata from the marker manifest in `dir`.
    /// A malformed manifest is an error; the caller skips the zone candidate.
    fn detect_project(&self, dir: &Path) -> Result<ProjectMetadata>;

    /// Parse a source file. A failure here is recorded and the file skipped;
    /// it never aborts the zone's analysis.
    fn parse_file(&self, path: &Path, content: &str) -> Result<ParsedSource>;

    /// Extract named, typed declarations with locations.
    fn extract_symbols(&self, parsed: &ParsedSource) -> Vec<Symbol>;

    /// Extract import/using/reference statements.
    fn imports(&self, parsed: &ParsedSource) -> Vec<Import>;

    /// List declared dependencies (name, version, source manifest).
    fn dependencies(&self, project_dir: &Path) -> Result<Vec<DependencyDecl>>;
}

/// Registry of language providers keyed by language name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn LanguageProvider>>,
    by_language: HashMap<&'static str, usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Box<dyn LanguageProvider>) {
        let language = provider.language();
        self.by_language.insert(language, self.providers.len());
        self.providers.push(provider);
    }

    pub fn for_language(&self, language: &str) -> Option<&dyn LanguageProvider> {
        self.by_language
            .get(language)
            .map(|&idx| self.providers[idx].as_ref())
    }

    pub fn languages(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.by_language.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider(&'static str);

    impl LanguageProvider for StubProvider {
        fn language(&self) -> &'static str {
            self.0
        }
        fn file_extensions(&self) -> &[&str] {
            &["stub"]
        }
        fn detect_project(&self, dir: &Path) -> Result<ProjectMetadata> {
            Ok(ProjectMetadata {
                name: None,
                language: self.0.to_string(),
                manifest: dir.join("stub.toml"),
            })
        }
        fn parse_file(&self, _path: &Path, _content: &str) -> Result<ParsedSource> {
            anyhow::bail!("stub cannot parse")
        }
        fn extract_symbols(&self, _parsed: &ParsedSource) -> Vec<Symbol> {
            vec![]
        }
        fn imports(&self, _parsed: &ParsedSource) -> Vec<Import> {
            vec![]
        }
        fn dependencies(&self, _project_dir: &Path) -> Result<Vec<DependencyDecl>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_registry_lookup_by_language() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(StubProvider("go")));
        registry.register(Box::new(StubProvider("rust")));

        assert!(registry.for_language("go").is_some());
        assert!(registry.for_language("rust").is_some());
        assert!(registry.for_language("cobol").is_none());
        assert_eq!(registry.languages(), vec!["go", "rust"]);
    }

    #[test]
    fn test_registry_latest_registration_wins() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(StubProvider("go")));
        registry.register(Box::new(StubProvider("go")));
        assert_eq!(registry.languages(), vec!["go"]);
    }
}
