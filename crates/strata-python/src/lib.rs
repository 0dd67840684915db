use std::path::Path;

use anyhow::{Context, Result};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};

use strata_core::provider::{
    DependencyDecl, Import, LanguageProvider, ParsedSource, ProjectMetadata, Symbol, SymbolKind,
    Visibility,
};
use strata_core::types::SourceLocation;

/// Python language provider using tree-sitter.
pub struct PythonProvider {
    language: Language,
    class_query: Query,
    func_query: Query,
    field_query: Query,
    import_query: Query,
}

impl PythonProvider {
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_python::LANGUAGE.into();

        let class_query = Query::new(
            &language,
            r#"
            (class_definition
              name: (identifier) @name
              superclasses: (argument_list)? @bases) @item
            "#,
        )
        .context("failed to compile class query")?;

        let func_query = Query::new(
            &language,
            r#"
            (function_definition
              name: (identifier) @name
              return_type: (_)? @ret) @item
            "#,
        )
        .context("failed to compile function query")?;

        let field_query = Query::new(
            &language,
            r#"
            (class_definition
              body: (block
                (expression_statement
                  (assignment
                    left: (identifier) @field) @item)))
            "#,
        )
        .context("failed to compile field query")?;

        let import_query = Query::new(
            &language,
            r#"
            [
              (import_statement
                name: (dotted_name) @path)
              (import_statement
                name: (aliased_import
                  name: (dotted_name) @path))
              (import_from_statement
                module_name: (dotted_name) @path)
              (import_from_statement
                module_name: (relative_import) @path)
            ]
            "#,
        )
        .context("failed to compile import query")?;

        Ok(Self {
            language,
            class_query,
            func_query,
            field_query,
            import_query,
        })
    }
}

impl LanguageProvider for PythonProvider {
    fn language(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &[&str] {
        &["py"]
    }

    fn detect_project(&self, dir: &Path) -> Result<ProjectMetadata> {
        let manifest = dir.join("pyproject.toml");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;
        let name = value
            .get("project")
            .and_then(|p| p.get("name"))
            .or_else(|| {
                value
                    .get("tool")
                    .and_then(|t| t.get("poetry"))
                    .and_then(|p| p.get("name"))
            })
            .and_then(|n| n.as_str())
            .map(|s| s.to_string());
        Ok(ProjectMetadata {
            name,
            language: "python".to_string(),
            manifest,
        })
    }

    fn parse_file(&self, path: &Path, content: &str) -> Result<ParsedSource> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to set Python language")?;
        let tree = parser
            .parse(content, None)
            .context("failed to parse Python file")?;
        Ok(ParsedSource {
            path: path.to_path_buf(),
            tree,
            content: content.to_string(),
        })
    }

    fn extract_symbols(&self, parsed: &ParsedSource) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        self.extract_classes(parsed, &mut symbols);
        self.extract_functions(parsed, &mut symbols);
        self.extract_fields(parsed, &mut symbols);
        symbols
    }

    fn imports(&self, parsed: &ParsedSource) -> Vec<Import> {
        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let path_idx = capture_index(&self.import_query, "path");

        let mut matches = cursor.matches(
            &self.import_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if capture.index as usize != path_idx {
                    continue;
                }
                imports.push(Import {
                    path: node_text(capture.node, &parsed.content),
                    location: location_of(capture.node, &parsed.path),
                });
            }
        }
        imports
    }

    fn dependencies(&self, project_dir: &Path) -> Result<Vec<DependencyDecl>> {
        let manifest = project_dir.join("pyproject.toml");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;

        let mut deps = Vec::new();

        // PEP 621 requirement strings
        if let Some(list) = value
            .get("project")
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_array())
        {
            for requirement in list.iter().filter_map(|r| r.as_str()) {
                let (name, version) = split_requirement(requirement);
                deps.push(DependencyDecl {
                    name,
                    version,
                    manifest: manifest.clone(),
                });
            }
        }

        // Poetry table form
        if let Some(table) = value
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_table())
        {
            for (name, spec) in table {
                if name == "python" {
                    continue;
                }
                let version = match spec {
                    toml::Value::String(v) => v.clone(),
                    toml::Value::Table(t) => t
                        .get("version")
                        .and_then(|v| v.as_str())
                        .unwrap_or("*")
                        .to_string(),
                    _ => "*".to_string(),
                };
                deps.push(DependencyDecl {
                    name: name.clone(),
                    version,
                    manifest: manifest.clone(),
                });
            }
        }

        deps.sort();
        deps.dedup();
        Ok(deps)
    }
}

impl PythonProvider {
    fn extract_classes(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.class_query, "name");
        let item_idx = capture_index(&self.class_query, "item");
        let bases_idx = capture_index(&self.class_query, "bases");

        let mut matches = cursor.matches(
            &self.class_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut item: Option<Node> = None;
            let mut implements = Vec::new();
            for capture in m.captures {
                let idx = capture.index as usize;
                if idx == name_idx {
                    name = node_text(capture.node, &parsed.content);
                } else if idx == item_idx {
                    item = Some(capture.node);
                } else if idx == bases_idx {
                    implements = base_names(capture.node, &parsed.content);
                }
            }
            let Some(item) = item else { continue };
            if name.is_empty() {
                continue;
            }
            symbols.push(Symbol {
                visibility: underscore_visibility(&name),
                attributes: decorators_of(item, &parsed.content),
                name,
                kind: SymbolKind::Class,
                implements,
                return_type: None,
                location: location_of(item, &parsed.path),
            });
        }
    }

    fn extract_functions(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.func_query, "name");
        let item_idx = capture_index(&self.func_query, "item");
        let ret_idx = capture_index(&self.func_query, "ret");

        let mut matches = cursor.matches(
            &self.func_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut item: Option<Node> = None;
            let mut return_type = None;
            for capture in m.captures {
                let idx = capture.index as usize;
                if idx == name_idx {
                    name = node_text(capture.node, &parsed.content);
                } else if idx == item_idx {
                    item = Some(capture.node);
                } else if idx == ret_idx {
                    return_type = Some(node_text(capture.node, &parsed.content));
                }
            }
            let Some(item) = item else { continue };
            if name.is_empty() {
                continue;
            }
            let kind = if in_class(item) {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            symbols.push(Symbol {
                visibility: underscore_visibility(&name),
                attributes: decorators_of(item, &parsed.content),
                name,
                kind,
                implements: vec![],
                return_type,
                location: location_of(item, &parsed.path),
            });
        }
    }

    fn extract_fields(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let field_idx = capture_index(&self.field_query, "field");
        let item_idx = capture_index(&self.field_query, "item");

        let mut matches = cursor.matches(
            &self.field_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut item: Option<Node> = None;
            for capture in m.captures {
                let idx = capture.index as usize;
                if idx == field_idx {
                    name = node_text(capture.node, &parsed.content);
                } else if idx == item_idx {
                    item = Some(capture.node);
                }
            }
            let Some(item) = item else { continue };
            if name.is_empty() {
                continue;
            }
            symbols.push(Symbol {
                visibility: underscore_visibility(&name),
                name,
                kind: SymbolKind::Field,
                attributes: vec![],
                implements: vec![],
                return_type: None,
                location: location_of(item, &parsed.path),
            });
        }
    }
}

/// Python visibility is the underscore convention.
fn underscore_visibility(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

/// Base class names from a superclasses argument list.
fn base_names(node: Node, content: &str) -> Vec<String> {
    let mut bases = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.is_named() {
            bases.push(node_text(child, content));
        }
    }
    bases
}

/// Decorators live on a wrapping `decorated_definition` node.
fn decorators_of(node: Node, content: &str) -> Vec<String> {
    let Some(parent) = node.parent() else {
        return vec![];
    };
    if parent.kind() != "decorated_definition" {
        return vec![];
    }
    let mut attrs = Vec::new();
    let mut cursor = parent.walk();
    for child in parent.children(&mut cursor) {
        if child.kind() == "decorator" {
            attrs.push(
                node_text(child, content)
                    .trim_start_matches('@')
                    .trim()
                    .to_string(),
            );
        }
    }
    attrs
}

fn in_class(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "class_definition" {
            return true;
        }
        current = n.parent();
    }
    false
}

/// Split a PEP 508 requirement string into name and version constraint.
fn split_requirement(requirement: &str) -> (String, String) {
    let split_at = requirement
        .find(|c: char| "<>=!~[; ".contains(c))
        .unwrap_or(requirement.len());
    let (name, rest) = requirement.split_at(split_at);
    let version = rest.trim().trim_start_matches(|c: char| "[;".contains(c));
    (
        name.trim().to_string(),
        if version.is_empty() {
            "*".to_string()
        } else {
            version.to_string()
        },
    )
}

fn capture_index(query: &Query, name: &str) -> usize {
    query
        .capture_names()
        .iter()
        .position(|n| *n == name)
        .unwrap_or(usize::MAX)
}

fn location_of(node: Node, path: &Path) -> SourceLocation {
    SourceLocation {
        file: path.to_path_buf(),
        line: node.start_position().row + 1,
        column: node.start_position().column + 1,
    }
}

fn node_text(node: Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(content: &str) -> ParsedSource {
        let provider = PythonProvider::new().unwrap();
        provider
            .parse_file(&PathBuf::from("app.py"), content)
            .unwrap()
    }

    #[test]
    fn test_extract_class_function_and_method() {
        let provider = PythonProvider::new().unwrap();
        let parsed = parse(
            r#"
class UserRepository(BaseRepository):
    _table = "users"

    def get(self, user_id) -> User:
        return None

def make_app() -> Flask:
    return Flask(__name__)

def _helper():
    pass
"#,
        );

        let symbols = provider.extract_symbols(&parsed);

        let class = symbols.iter().find(|s| s.name == "UserRepository").unwrap();
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.implements, vec!["BaseRepository"]);

        let method = symbols.iter().find(|s| s.name == "get").unwrap();
        assert_eq!(method.kind, SymbolKind::Method);
        assert_eq!(method.return_type.as_deref(), Some("User"));

        let func = symbols.iter().find(|s| s.name == "make_app").unwrap();
        assert_eq!(func.kind, SymbolKind::Function);
        assert_eq!(func.visibility, Visibility::Public);

        let helper = symbols.iter().find(|s| s.name == "_helper").unwrap();
        assert_eq!(helper.visibility, Visibility::Private);

        let field = symbols.iter().find(|s| s.name == "_table").unwrap();
        assert_eq!(field.kind, SymbolKind::Field);
        assert_eq!(field.visibility, Visibility::Private);
    }

    #[test]
    fn test_decorators_captured() {
        let provider = PythonProvider::new().unwrap();
        let parsed = parse(
            r#"
@dataclass(frozen=True)
class Money:
    amount: int
"#,
        );
        let symbols = provider.extract_symbols(&parsed);
        let money = symbols.iter().find(|s| s.name == "Money").unwrap();
        assert!(
            money.attributes.iter().any(|a| a.contains("dataclass")),
            "{:?}",
            money.attributes
        );
    }

    #[test]
    fn test_imports() {
        let provider = PythonProvider::new().unwrap();
        let parsed = parse(
            r#"
import os
import schemas.user as user_schema
from app.domain import models
from ..shared import util
"#,
        );
        let imports = provider.imports(&parsed);
        let paths: Vec<&str> = imports.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"os"));
        assert!(paths.contains(&"schemas.user"));
        assert!(paths.contains(&"app.domain"));
        assert!(paths.iter().any(|p| p.contains("shared")));
    }

    #[test]
    fn test_dependencies_pep621() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pyproject.toml"),
            r#"
[project]
name = "edge"
dependencies = ["fastapi>=0.100", "pydantic==2.5.0", "httpx"]
"#,
        )
        .unwrap();

        let provider = PythonProvider::new().unwrap();
        let deps = provider.dependencies(dir.path()).unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fastapi", "httpx", "pydantic"]);
        let fastapi = deps.iter().find(|d| d.name == "fastapi").unwrap();
        assert_eq!(fastapi.version, ">=0.100");
        let httpx = deps.iter().find(|d| d.name == "httpx").unwrap();
        assert_eq!(httpx.version, "*");
    }

    #[test]
    fn test_dependencies_poetry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pyproject.toml"),
            r#"
[tool.poetry]
name = "edge"

[tool.poetry.dependencies]
python = "^3.11"
flask = "^3.0"
"#,
        )
        .unwrap();

        let provider = PythonProvider::new().unwrap();
        let deps = provider.dependencies(dir.path()).unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["flask"]);

        let metadata = provider.detect_project(dir.path()).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("edge"));
    }

    #[test]
    fn test_malformed_pyproject_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pyproject.toml"), "[project\nname=").unwrap();
        let provider = PythonProvider::new().unwrap();
        assert!(provider.detect_project(dir.path()).is_err());
    }
}
