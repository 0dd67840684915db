use std::path::Path;

use anyhow::{Context, Result};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};

use strata_core::provider::{
    DependencyDecl, Import, LanguageProvider, ParsedSource, ProjectMetadata, Symbol, SymbolKind,
    Visibility,
};
use strata_core::types::SourceLocation;

/// Holds queries compiled for a specific TypeScript dialect.
struct QuerySet {
    interface_query: Query,
    class_query: Query,
    alias_query: Query,
    func_query: Query,
    field_query: Query,
    import_query: Query,
}

const INTERFACE_QUERY_SRC: &str = r#"
(interface_declaration
  name: (type_identifier) @name) @item
"#;

const CLASS_QUERY_SRC: &str = r#"
(class_declaration
  name: (type_identifier) @name
  (class_heritage
    (implements_clause
      (type_identifier) @implements))?) @item
"#;

const ALIAS_QUERY_SRC: &str = r#"
(type_alias_declaration
  name: (type_identifier) @name) @item
"#;

const FUNC_QUERY_SRC: &str = r#"
[
  (function_declaration
    name: (identifier) @name
    return_type: (_)? @ret) @item
  (method_definition
    name: (property_identifier) @name
    return_type: (_)? @ret) @item
]
"#;

const FIELD_QUERY_SRC: &str = r#"
(public_field_definition
  name: (_) @name) @item
"#;

const IMPORT_QUERY_SRC: &str = r#"
(import_statement
  source: (string) @path)
"#;

fn compile_queries(language: &Language) -> Result<QuerySet> {
    Ok(QuerySet {
        interface_query: Query::new(language, INTERFACE_QUERY_SRC)
            .context("failed to compile interface query")?,
        class_query: Query::new(language, CLASS_QUERY_SRC)
            .context("failed to compile class query")?,
        alias_query: Query::new(language, ALIAS_QUERY_SRC)
            .context("failed to compile type alias query")?,
        func_query: Query::new(language, FUNC_QUERY_SRC)
            .context("failed to compile function query")?,
        field_query: Query::new(language, FIELD_QUERY_SRC)
            .context("failed to compile field query")?,
        import_query: Query::new(language, IMPORT_QUERY_SRC)
            .context("failed to compile import query")?,
    })
}

/// TypeScript/TSX language provider using tree-sitter.
pub struct TypeScriptProvider {
    ts_language: Language,
    tsx_language: Language,
    ts_queries: QuerySet,
    tsx_queries: QuerySet,
}

impl TypeScriptProvider {
    pub fn new() -> Result<Self> {
        let ts_language: Language = tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into();
        let tsx_language: Language = tree_sitter_typescript::LANGUAGE_TSX.into();

        let ts_queries = compile_queries(&ts_language)?;
        let tsx_queries = compile_queries(&tsx_language)?;

        Ok(Self {
            ts_language,
            tsx_language,
            ts_queries,
            tsx_queries,
        })
    }

    fn language_for_file(&self, path: &Path) -> &Language {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsx") => &self.tsx_language,
            _ => &self.ts_language,
        }
    }

    fn queries_for_file(&self, path: &Path) -> &QuerySet {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsx") => &self.tsx_queries,
            _ => &self.ts_queries,
        }
    }
}

impl LanguageProvider for TypeScriptProvider {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &[&str] {
        &["ts", "tsx", "js", "jsx"]
    }

    fn detect_project(&self, dir: &Path) -> Result<ProjectMetadata> {
        let manifest = dir.join("package.json");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;
        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .map(|s| s.to_string());
        Ok(ProjectMetadata {
            name,
            language: "typescript".to_string(),
            manifest,
        })
    }

    fn parse_file(&self, path: &Path, content: &str) -> Result<ParsedSource> {
        let mut parser = Parser::new();
        parser
            .set_language(self.language_for_file(path))
            .context("failed to set TypeScript language")?;
        let tree = parser
            .parse(content, None)
            .context("failed to parse TypeScript file")?;
        Ok(ParsedSource {
            path: path.to_path_buf(),
            tree,
            content: content.to_string(),
        })
    }

    fn extract_symbols(&self, parsed: &ParsedSource) -> Vec<Symbol> {
        let queries = self.queries_for_file(&parsed.path);
        let mut symbols = Vec::new();

        extract_named(
            &queries.interface_query,
            parsed,
            SymbolKind::Interface,
            &mut symbols,
        );
        extract_named(&queries.alias_query, parsed, SymbolKind::TypeAlias, &mut symbols);
        extract_classes(&queries.class_query, parsed, &mut symbols);
        extract_callables(&queries.func_query, parsed, &mut symbols);
        extract_fields(&queries.field_query, parsed, &mut symbols);

        symbols
    }

    fn imports(&self, parsed: &ParsedSource) -> Vec<Import> {
        let queries = self.queries_for_file(&parsed.path);
        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let path_idx = capture_index(&queries.import_query, "path");

        let mut matches = cursor.matches(
            &queries.import_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if capture.index as usize != path_idx {
                    continue;
                }
                let path = node_text(capture.node, &parsed.content)
                    .trim_matches(|c| c == '"' || c == '\'')
                    .to_string();
                imports.push(Import {
                    path,
                    location: location_of(capture.node, &parsed.path),
                });
            }
        }
        imports
    }

    fn dependencies(&self, project_dir: &Path) -> Result<Vec<DependencyDecl>> {
        let manifest = project_dir.join("package.json");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;

        let mut deps = Vec::new();
        for table in ["dependencies", "devDependencies"] {
            let Some(map) = value.get(table).and_then(|d| d.as_object()) else {
                continue;
            };
            for (name, version) in map {
                deps.push(DependencyDecl {
                    name: name.clone(),
                    version: version.as_str().unwrap_or("*").to_string(),
                    manifest: manifest.clone(),
                });
            }
        }
        deps.sort();
        Ok(deps)
    }
}

fn extract_named(query: &Query, parsed: &ParsedSource, kind: SymbolKind, symbols: &mut Vec<Symbol>) {
    let mut cursor = QueryCursor::new();
    let name_idx = capture_index(query, "name");
    let item_idx = capture_index(query, "item");

    let mut matches = cursor.matches(query, parsed.tree.root_node(), parsed.content.as_bytes());
    while let Some(m) = matches.next() {
        let mut name = String::new();
        let mut item: Option<Node> = None;
        for capture in m.captures {
            let idx = capture.index as usize;
            if idx == name_idx {
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
            name,
            kind,
            visibility: export_visibility(item),
            attributes: decorators_of(item, &parsed.content),
            implements: vec![],
            return_type: None,
            location: location_of(item, &parsed.path),
        });
    }
}

fn extract_classes(query: &Query, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
    let mut cursor = QueryCursor::new();
    let name_idx = capture_index(query, "name");
    let item_idx = capture_index(query, "item");
    let implements_idx = capture_index(query, "implements");

    let mut matches = cursor.matches(query, parsed.tree.root_node(), parsed.content.as_bytes());
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
            } else if idx == implements_idx {
                implements.push(node_text(capture.node, &parsed.content));
            }
        }
        let Some(item) = item else { continue };
        if name.is_empty() {
            continue;
        }
        symbols.push(Symbol {
            name,
            kind: SymbolKind::Class,
            visibility: export_visibility(item),
            attributes: decorators_of(item, &parsed.content),
            implements,
            return_type: None,
            location: location_of(item, &parsed.path),
        });
    }
}

fn extract_callables(query: &Query, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
    let mut cursor = QueryCursor::new();
    let name_idx = capture_index(query, "name");
    let item_idx = capture_index(query, "item");
    let ret_idx = capture_index(query, "ret");

    let mut matches = cursor.matches(query, parsed.tree.root_node(), parsed.content.as_bytes());
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
                return_type = Some(
                    node_text(capture.node, &parsed.content)
                        .trim_start_matches(':')
                        .trim()
                        .to_string(),
                );
            }
        }
        let Some(item) = item else { continue };
        if name.is_empty() {
            continue;
        }
        let kind = if item.kind() == "method_definition" {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        symbols.push(Symbol {
            name,
            kind,
            visibility: member_visibility(item, &parsed.content),
            attributes: decorators_of(item, &parsed.content),
            implements: vec![],
            return_type,
            location: location_of(item, &parsed.path),
        });
    }
}

fn extract_fields(query: &Query, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
    let mut cursor = QueryCursor::new();
    let name_idx = capture_index(query, "name");
    let item_idx = capture_index(query, "item");

    let mut matches = cursor.matches(query, parsed.tree.root_node(), parsed.content.as_bytes());
    while let Some(m) = matches.next() {
        let mut name = String::new();
        let mut item: Option<Node> = None;
        for capture in m.captures {
            let idx = capture.index as usize;
            if idx == name_idx {
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
            visibility: member_visibility(item, &parsed.content),
            name,
            kind: SymbolKind::Field,
            attributes: vec![],
            implements: vec![],
            return_type: None,
            location: location_of(item, &parsed.path),
        });
    }
}

/// Top-level declarations are public when wrapped in an export statement.
fn export_visibility(node: Node) -> Visibility {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "export_statement" {
            return Visibility::Public;
        }
        current = n.parent();
    }
    Visibility::Private
}

/// Class members are private with an explicit accessibility modifier or a
/// `#`/`_` name prefix, public otherwise.
fn member_visibility(node: Node, content: &str) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "accessibility_modifier" {
            let text = node_text(child, content);
            if text == "private" || text == "protected" {
                return Visibility::Private;
            }
        }
    }
    if let Some(name_node) = node.child_by_field_name("name") {
        if name_node.kind() == "private_property_identifier" {
            return Visibility::Private;
        }
    }
    Visibility::Public
}

/// Decorator children become attributes: `@Injectable()` -> `Injectable()`.
fn decorators_of(node: Node, content: &str) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "decorator" {
            attrs.push(
                node_text(child, content)
                    .trim_start_matches('@')
                    .to_string(),
            );
        }
    }
    // Decorators may also precede the declaration inside an export statement.
    let mut sibling = node.prev_sibling();
    while let Some(s) = sibling {
        if s.kind() != "decorator" {
            break;
        }
        attrs.push(node_text(s, content).trim_start_matches('@').to_string());
        sibling = s.prev_sibling();
    }
    attrs
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
        let provider = TypeScriptProvider::new().unwrap();
        provider
            .parse_file(&PathBuf::from("api.ts"), content)
            .unwrap()
    }

    #[test]
    fn test_extract_interface_class_and_function() {
        let provider = TypeScriptProvider::new().unwrap();
        let parsed = parse(
            r#"
export interface UserRepository {
  get(id: string): Promise<User>;
}

export class PostgresUserRepository implements UserRepository {
  private pool: Pool;
  async get(id: string): Promise<User> { return null; }
}

export function createServer(): Server { return null; }
"#,
        );

        let symbols = provider.extract_symbols(&parsed);

        let iface = symbols.iter().find(|s| s.name == "UserRepository").unwrap();
        assert_eq!(iface.kind, SymbolKind::Interface);
        assert_eq!(iface.visibility, Visibility::Public);

        let class = symbols
            .iter()
            .find(|s| s.name == "PostgresUserRepository")
            .unwrap();
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.implements, vec!["UserRepository"]);

        let func = symbols.iter().find(|s| s.name == "createServer").unwrap();
        assert_eq!(func.kind, SymbolKind::Function);
        assert_eq!(func.return_type.as_deref(), Some("Server"));

        let field = symbols.iter().find(|s| s.name == "pool").unwrap();
        assert_eq!(field.kind, SymbolKind::Field);
        assert_eq!(field.visibility, Visibility::Private);
    }

    #[test]
    fn test_unexported_declaration_is_private() {
        let provider = TypeScriptProvider::new().unwrap();
        let parsed = parse("class Helper {}\n");
        let symbols = provider.extract_symbols(&parsed);
        assert_eq!(symbols[0].visibility, Visibility::Private);
    }

    #[test]
    fn test_decorators_captured() {
        let provider = TypeScriptProvider::new().unwrap();
        let parsed = parse(
            r#"
@Injectable()
export class UserService {}
"#,
        );
        let symbols = provider.extract_symbols(&parsed);
        let class = symbols.iter().find(|s| s.name == "UserService").unwrap();
        assert!(
            class.attributes.iter().any(|a| a.contains("Injectable")),
            "{:?}",
            class.attributes
        );
    }

    #[test]
    fn test_imports() {
        let provider = TypeScriptProvider::new().unwrap();
        let parsed = parse(
            r#"
import { User } from "../domain/user";
import express from 'express';
"#,
        );
        let imports = provider.imports(&parsed);
        let paths: Vec<&str> = imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["../domain/user", "express"]);
    }

    #[test]
    fn test_tsx_dialect_parses() {
        let provider = TypeScriptProvider::new().unwrap();
        let parsed = provider
            .parse_file(
                &PathBuf::from("App.tsx"),
                "export function App() { return <div>hi</div>; }\n",
            )
            .unwrap();
        let symbols = provider.extract_symbols(&parsed);
        assert!(symbols.iter().any(|s| s.name == "App"));
    }

    #[test]
    fn test_dependencies_from_package_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{
  "name": "edge-ui",
  "dependencies": { "express": "^4.19.0", "react": "^18.0.0" },
  "devDependencies": { "jest": "^29.0.0" }
}"#,
        )
        .unwrap();

        let provider = TypeScriptProvider::new().unwrap();
        let deps = provider.dependencies(dir.path()).unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["express", "jest", "react"]);

        let metadata = provider.detect_project(dir.path()).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("edge-ui"));
    }

    #[test]
    fn test_malformed_package_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{not json").unwrap();
        let provider = TypeScriptProvider::new().unwrap();
        assert!(provider.detect_project(dir.path()).is_err());
    }
}
