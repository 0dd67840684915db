use std::path::Path;

use anyhow::{Context, Result};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};

use strata_core::provider::{
    DependencyDecl, Import, LanguageProvider, ParsedSource, ProjectMetadata, Symbol, SymbolKind,
    Visibility,
};
use strata_core::types::SourceLocation;

/// Go language provider using tree-sitter.
pub struct GoProvider {
    language: Language,
    type_query: Query,
    func_query: Query,
    field_query: Query,
    import_query: Query,
}

impl GoProvider {
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_go::LANGUAGE.into();

        let type_query = Query::new(
            &language,
            r#"
            (type_declaration
              (type_spec
                name: (type_identifier) @name
                type: (_) @type_node))
            "#,
        )
        .context("failed to compile type query")?;

        let func_query = Query::new(
            &language,
            r#"
            [
              (function_declaration
                name: (identifier) @name
                result: (_)? @ret) @item
              (method_declaration
                name: (field_identifier) @name
                result: (_)? @ret) @item
            ]
            "#,
        )
        .context("failed to compile function query")?;

        let field_query = Query::new(
            &language,
            r#"
            (field_declaration
              name: (field_identifier) @name) @item
            "#,
        )
        .context("failed to compile field query")?;

        let import_query = Query::new(
            &language,
            r#"
            (import_spec
              path: (interpreted_string_literal) @path)
            "#,
        )
        .context("failed to compile import query")?;

        Ok(Self {
            language,
            type_query,
            func_query,
            field_query,
            import_query,
        })
    }
}

impl LanguageProvider for GoProvider {
    fn language(&self) -> &'static str {
        "go"
    }

    fn file_extensions(&self) -> &[&str] {
        &["go"]
    }

    fn detect_project(&self, dir: &Path) -> Result<ProjectMetadata> {
        let manifest = dir.join("go.mod");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let name = content
            .lines()
            .find_map(|line| line.trim().strip_prefix("module "))
            .map(|m| m.trim().to_string());
        if name.is_none() {
            anyhow::bail!("{} has no module directive", manifest.display());
        }
        Ok(ProjectMetadata {
            name,
            language: "go".to_string(),
            manifest,
        })
    }

    fn parse_file(&self, path: &Path, content: &str) -> Result<ParsedSource> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to set Go language")?;
        let tree = parser
            .parse(content, None)
            .context("failed to parse Go file")?;
        Ok(ParsedSource {
            path: path.to_path_buf(),
            tree,
            content: content.to_string(),
        })
    }

    fn extract_symbols(&self, parsed: &ParsedSource) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        self.extract_types(parsed, &mut symbols);
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
                let path = node_text(capture.node, &parsed.content)
                    .trim_matches('"')
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
        let manifest = project_dir.join("go.mod");
        let content = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        Ok(parse_go_mod(&content, &manifest))
    }
}

impl GoProvider {
    fn extract_types(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.type_query, "name");
        let type_idx = capture_index(&self.type_query, "type_node");

        let mut matches = cursor.matches(
            &self.type_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut name_node: Option<Node> = None;
            let mut type_kind = "";
            for capture in m.captures {
                let idx = capture.index as usize;
                if idx == name_idx {
                    name = node_text(capture.node, &parsed.content);
                    name_node = Some(capture.node);
                } else if idx == type_idx {
                    type_kind = capture.node.kind();
                }
            }
            let Some(node) = name_node else { continue };
            if name.is_empty() {
                continue;
            }
            let kind = match type_kind {
                "interface_type" => SymbolKind::Interface,
                "struct_type" => SymbolKind::Struct,
                _ => SymbolKind::TypeAlias,
            };
            symbols.push(Symbol {
                visibility: exported(&name),
                name,
                kind,
                attributes: vec![],
                implements: vec![],
                return_type: None,
                location: location_of(node, &parsed.path),
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
            let kind = if item.kind() == "method_declaration" {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            symbols.push(Symbol {
                visibility: exported(&name),
                name,
                kind,
                attributes: vec![],
                implements: vec![],
                return_type,
                location: location_of(item, &parsed.path),
            });
        }
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
            // Interface method elements also surface as field_identifier
            // nodes; only struct fields are wanted here.
            if item.kind() != "field_declaration" || name.is_empty() {
                continue;
            }
            symbols.push(Symbol {
                visibility: exported(&name),
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

/// Go visibility is capitalization.
fn exported(name: &str) -> Visibility {
    if name.chars().next().is_some_and(|c| c.is_uppercase()) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

/// Minimal go.mod reader: `require` lines, block or single form.
fn parse_go_mod(content: &str, manifest: &Path) -> Vec<DependencyDecl> {
    let mut deps = Vec::new();
    let mut in_require_block = false;

    for line in content.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("require (") {
            in_require_block = true;
            continue;
        }
        if in_require_block {
            if line == ")" {
                in_require_block = false;
                continue;
            }
            push_requirement(line, manifest, &mut deps);
        } else if let Some(rest) = line.strip_prefix("require ") {
            push_requirement(rest.trim(), manifest, &mut deps);
        }
    }

    deps.sort();
    deps
}

fn push_requirement(line: &str, manifest: &Path, deps: &mut Vec<DependencyDecl>) {
    let mut parts = line.split_whitespace();
    if let (Some(name), Some(version)) = (parts.next(), parts.next()) {
        deps.push(DependencyDecl {
            name: name.to_string(),
            version: version.to_string(),
            manifest: manifest.to_path_buf(),
        });
    }
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
