use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};

use strata_core::provider::{
    DependencyDecl, Import, LanguageProvider, ParsedSource, ProjectMetadata, Symbol, SymbolKind,
    Visibility,
};
use strata_core::types::SourceLocation;

/// Rust language provider using tree-sitter.
pub struct RustProvider {
    language: Language,
    item_query: Query,
    field_query: Query,
    impl_query: Query,
    use_query: Query,
}

impl RustProvider {
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_rust::LANGUAGE.into();

        let item_query = Query::new(
            &language,
            r#"
            [
              (struct_item name: (type_identifier) @name) @item
              (trait_item name: (type_identifier) @name) @item
              (enum_item name: (type_identifier) @name) @item
              (type_item name: (type_identifier) @name) @item
              (function_item name: (identifier) @name return_type: (_)? @ret) @item
            ]
            "#,
        )
        .context("failed to compile item query")?;

        let field_query = Query::new(
            &language,
            r#"
            (field_declaration
              name: (field_identifier) @name) @item
            "#,
        )
        .context("failed to compile field query")?;

        let impl_query = Query::new(
            &language,
            r#"
            (impl_item
              trait: (type_identifier) @trait_name
              type: (type_identifier) @type_name)
            "#,
        )
        .context("failed to compile impl query")?;

        let use_query = Query::new(
            &language,
            r#"
            (use_declaration
              argument: (_) @path)
            "#,
        )
        .context("failed to compile use query")?;

        Ok(Self {
            language,
            item_query,
            field_query,
            impl_query,
            use_query,
        })
    }
}

impl LanguageProvider for RustProvider {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn file_extensions(&self) -> &[&str] {
        &["rs"]
    }

    fn detect_project(&self, dir: &Path) -> Result<ProjectMetadata> {
        let manifest = dir.join("Cargo.toml");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;
        let name = value
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .map(|s| s.to_string());
        Ok(ProjectMetadata {
            name,
            language: "rust".to_string(),
            manifest,
        })
    }

    fn parse_file(&self, path: &Path, content: &str) -> Result<ParsedSource> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to set Rust language")?;
        let tree = parser
            .parse(content, None)
            .context("failed to parse Rust file")?;
        Ok(ParsedSource {
            path: path.to_path_buf(),
            tree,
            content: content.to_string(),
        })
    }

    fn extract_symbols(&self, parsed: &ParsedSource) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        let implements = self.collect_impls(parsed);

        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.item_query, "name");
        let item_idx = capture_index(&self.item_query, "item");
        let ret_idx = capture_index(&self.item_query, "ret");

        let mut matches = cursor.matches(
            &self.item_query,
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

            let kind = match item.kind() {
                "struct_item" => SymbolKind::Struct,
                "trait_item" => SymbolKind::Trait,
                "enum_item" => SymbolKind::Enum,
                "type_item" => SymbolKind::TypeAlias,
                "function_item" => {
                    if is_associated(item) {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    }
                }
                _ => continue,
            };

            symbols.push(Symbol {
                implements: implements.get(&name).cloned().unwrap_or_default(),
                name,
                kind,
                visibility: visibility_of(item),
                attributes: item_attributes(item, &parsed.content),
                return_type,
                location: location_of(item, &parsed.path),
            });
        }

        self.extract_fields(parsed, &mut symbols);
        symbols
    }

    fn imports(&self, parsed: &ParsedSource) -> Vec<Import> {
        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let path_idx = capture_index(&self.use_query, "path");

        let mut matches = cursor.matches(
            &self.use_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if capture.index as usize != path_idx {
                    continue;
                }
                let use_path = node_text(capture.node, &parsed.content);
                // Skip std library imports
                if use_path.starts_with("std::") || use_path.starts_with("core::") {
                    continue;
                }
                imports.push(Import {
                    path: use_path,
                    location: location_of(capture.node, &parsed.path),
                });
            }
        }
        imports
    }

    fn dependencies(&self, project_dir: &Path) -> Result<Vec<DependencyDecl>> {
        let manifest = project_dir.join("Cargo.toml");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;

        let mut deps = Vec::new();
        for table_name in ["dependencies", "dev-dependencies", "build-dependencies"] {
            let Some(table) = value.get(table_name).and_then(|t| t.as_table()) else {
                continue;
            };
            for (name, spec) in table {
                let version = match spec {
                    toml::Value::String(v) => v.clone(),
                    toml::Value::Table(t) => t
                        .get("version")
                        .and_then(|v| v.as_str())
                        .unwrap_or("workspace")
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
        Ok(deps)
    }
}

impl RustProvider {
    /// type name -> traits it implements in this file.
    fn collect_impls(&self, parsed: &ParsedSource) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        let mut cursor = QueryCursor::new();
        let trait_idx = capture_index(&self.impl_query, "trait_name");
        let type_idx = capture_index(&self.impl_query, "type_name");

        let mut matches = cursor.matches(
            &self.impl_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            let mut trait_name = String::new();
            let mut type_name = String::new();
            for capture in m.captures {
                let idx = capture.index as usize;
                if idx == trait_idx {
                    trait_name = node_text(capture.node, &parsed.content);
                } else if idx == type_idx {
                    type_name = node_text(capture.node, &parsed.content);
                }
            }
            if !trait_name.is_empty() && !type_name.is_empty() {
                map.entry(type_name).or_default().push(trait_name);
            }
        }
        map
    }

    fn extract_fields(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.field_query, "name");
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
                kind: SymbolKind::Field,
                visibility: visibility_of(item),
                attributes: vec![],
                implements: vec![],
                return_type: None,
                location: location_of(item, &parsed.path),
            });
        }
    }
}

/// A function item nested in an impl or trait body is a method.
fn is_associated(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "impl_item" | "trait_item" => return true,
            "source_file" => return false,
            _ => current = n.parent(),
        }
    }
    false
}

fn visibility_of(node: Node) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            return Visibility::Public;
        }
    }
    Visibility::Private
}

/// Attributes are preceding `attribute_item` siblings: `#[test]` -> `test`.
fn item_attributes(node: Node, content: &str) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut sibling = node.prev_sibling();
    while let Some(s) = sibling {
        if s.kind() != "attribute_item" {
            break;
        }
        let text = node_text(s, content);
        attrs.push(
            text.trim_start_matches("#[")
                .trim_end_matches(']')
                .to_string(),
        );
        sibling = s.prev_sibling();
    }
    attrs.reverse();
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
