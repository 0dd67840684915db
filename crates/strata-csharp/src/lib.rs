use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};
use walkdir::WalkDir;

use strata_core::provider::{
    DependencyDecl, Import, LanguageProvider, ParsedSource, ProjectMetadata, Symbol, SymbolKind,
    Visibility,
};
use strata_core::types::SourceLocation;

/// C# language provider using tree-sitter. Project manifests (`.sln`,
/// `.csproj`) are plain text/XML and parsed without the grammar.
pub struct CSharpProvider {
    language: Language,
    type_query: Query,
    method_query: Query,
    member_query: Query,
    using_query: Query,
    package_ref: Regex,
    project_ref: Regex,
}

impl CSharpProvider {
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_c_sharp::LANGUAGE.into();

        let type_query = Query::new(
            &language,
            r#"
            [
              (class_declaration name: (identifier) @name) @item
              (interface_declaration name: (identifier) @name) @item
              (struct_declaration name: (identifier) @name) @item
              (enum_declaration name: (identifier) @name) @item
            ]
            "#,
        )
        .context("failed to compile type query")?;

        let method_query = Query::new(
            &language,
            r#"
            (method_declaration
              name: (identifier) @name) @item
            "#,
        )
        .context("failed to compile method query")?;

        let member_query = Query::new(
            &language,
            r#"
            [
              (property_declaration
                name: (identifier) @name) @item
              (field_declaration
                (variable_declaration
                  (variable_declarator
                    (identifier) @name))) @item
            ]
            "#,
        )
        .context("failed to compile member query")?;

        let using_query = Query::new(
            &language,
            r#"
            [
              (using_directive (qualified_name) @path)
              (using_directive (identifier) @path)
            ]
            "#,
        )
        .context("failed to compile using query")?;

        let package_ref =
            Regex::new(r#"<PackageReference\s+Include="([^"]+)"(?:\s+Version="([^"]+)")?"#)
                .context("failed to compile PackageReference regex")?;
        let project_ref = Regex::new(r#"<ProjectReference\s+Include="([^"]+)""#)
            .context("failed to compile ProjectReference regex")?;

        Ok(Self {
            language,
            type_query,
            method_query,
            member_query,
            using_query,
            package_ref,
            project_ref,
        })
    }
}

impl LanguageProvider for CSharpProvider {
    fn language(&self) -> &'static str {
        "csharp"
    }

    fn file_extensions(&self) -> &[&str] {
        &["cs"]
    }

    fn detect_project(&self, dir: &Path) -> Result<ProjectMetadata> {
        let manifest = find_manifest(dir)
            .with_context(|| format!("no .sln or .csproj found in {}", dir.display()))?;
        // Surface unreadable manifests as marker parse errors.
        std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let name = manifest
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());
        Ok(ProjectMetadata {
            name,
            language: "csharp".to_string(),
            manifest,
        })
    }

    fn parse_file(&self, path: &Path, content: &str) -> Result<ParsedSource> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to set C# language")?;
        let tree = parser
            .parse(content, None)
            .context("failed to parse C# file")?;
        Ok(ParsedSource {
            path: path.to_path_buf(),
            tree,
            content: content.to_string(),
        })
    }

    fn extract_symbols(&self, parsed: &ParsedSource) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        self.extract_types(parsed, &mut symbols);
        self.extract_methods(parsed, &mut symbols);
        self.extract_members(parsed, &mut symbols);
        symbols
    }

    fn imports(&self, parsed: &ParsedSource) -> Vec<Import> {
        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let path_idx = capture_index(&self.using_query, "path");

        let mut matches = cursor.matches(
            &self.using_query,
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
        let mut deps = Vec::new();

        for entry in WalkDir::new(project_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path().extension().is_some_and(|ext| ext == "csproj")
            })
        {
            let manifest = entry.path().to_path_buf();
            let content = std::fs::read_to_string(&manifest)
                .with_context(|| format!("failed to read {}", manifest.display()))?;

            for capture in self.package_ref.captures_iter(&content) {
                deps.push(DependencyDecl {
                    name: capture[1].to_string(),
                    version: capture
                        .get(2)
                        .map(|v| v.as_str().to_string())
                        .unwrap_or_else(|| "*".to_string()),
                    manifest: manifest.clone(),
                });
            }
            for capture in self.project_ref.captures_iter(&content) {
                let name = Path::new(&capture[1].replace('\\', "/"))
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| capture[1].to_string());
                deps.push(DependencyDecl {
                    name,
                    version: "project".to_string(),
                    manifest: manifest.clone(),
                });
            }
        }

        deps.sort();
        deps.dedup();
        Ok(deps)
    }
}

impl CSharpProvider {
    fn extract_types(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.type_query, "name");
        let item_idx = capture_index(&self.type_query, "item");

        let mut matches = cursor.matches(
            &self.type_query,
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
            let kind = match item.kind() {
                "interface_declaration" => SymbolKind::Interface,
                "struct_declaration" => SymbolKind::Struct,
                "enum_declaration" => SymbolKind::Enum,
                _ => SymbolKind::Class,
            };
            symbols.push(Symbol {
                name,
                kind,
                visibility: modifier_visibility(item, &parsed.content),
                attributes: attributes_of(item, &parsed.content),
                implements: base_names(item, &parsed.content),
                return_type: None,
                location: location_of(item, &parsed.path),
            });
        }
    }

    fn extract_methods(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.method_query, "name");
        let item_idx = capture_index(&self.method_query, "item");

        let mut matches = cursor.matches(
            &self.method_query,
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
            let return_type = item
                .child_by_field_name("returns")
                .or_else(|| item.child_by_field_name("type"))
                .map(|n| node_text(n, &parsed.content));
            symbols.push(Symbol {
                name,
                kind: SymbolKind::Method,
                visibility: modifier_visibility(item, &parsed.content),
                attributes: attributes_of(item, &parsed.content),
                implements: vec![],
                return_type,
                location: location_of(item, &parsed.path),
            });
        }
    }

    fn extract_members(&self, parsed: &ParsedSource, symbols: &mut Vec<Symbol>) {
        let mut cursor = QueryCursor::new();
        let name_idx = capture_index(&self.member_query, "name");
        let item_idx = capture_index(&self.member_query, "item");

        let mut matches = cursor.matches(
            &self.member_query,
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
                visibility: modifier_visibility(item, &parsed.content),
                attributes: attributes_of(item, &parsed.content),
                implements: vec![],
                return_type: None,
                location: location_of(item, &parsed.path),
            });
        }
    }
}

/// C# members default to private/internal; only an explicit `public`
/// modifier makes the declaration public here.
fn modifier_visibility(node: Node, content: &str) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifier" && node_text(child, content) == "public" {
            return Visibility::Public;
        }
    }
    Visibility::Private
}

/// `[Fact]` / `[ApiController]` attribute lists attached to the declaration.
fn attributes_of(node: Node, content: &str) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "attribute_list" {
            attrs.push(
                node_text(child, content)
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .to_string(),
            );
        }
    }
    attrs
}

/// Interface/base names from the declaration's base list.
fn base_names(node: Node, content: &str) -> Vec<String> {
    let mut bases = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "base_list" {
            let mut inner = child.walk();
            for base in child.children(&mut inner) {
                if base.is_named() {
                    bases.push(node_text(base, content));
                }
            }
        }
    }
    bases
}

/// Prefer a solution manifest over a project manifest, alphabetically first
/// within each kind so detection stays deterministic.
fn find_manifest(dir: &Path) -> Option<PathBuf> {
    let mut slns: Vec<PathBuf> = Vec::new();
    let mut csprojs: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir).ok()?.filter_map(|e| e.ok()) {
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("sln") => slns.push(path),
            Some("csproj") => csprojs.push(path),
            _ => {}
        }
    }
    slns.sort();
    csprojs.sort();
    slns.into_iter().next().or_else(|| csprojs.into_iter().next())
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
        let provider = CSharpProvider::new().unwrap();
        provider
            .parse_file(&PathBuf::from("Api.cs"), content)
            .unwrap()
    }

    #[test]
    fn test_extract_interface_class_and_method() {
        let provider = CSharpProvider::new().unwrap();
        let parsed = parse(
            r#"
using System;
using Core.Domain;

namespace Core.Api
{
    public interface IUserRepository
    {
        User Get(Guid id);
    }

    public class SqlUserRepository : IUserRepository
    {
        private readonly string _connection;

        public User Get(Guid id) { return null; }
    }
}
"#,
        );

        let symbols = provider.extract_symbols(&parsed);

        let iface = symbols.iter().find(|s| s.name == "IUserRepository").unwrap();
        assert_eq!(iface.kind, SymbolKind::Interface);
        assert_eq!(iface.visibility, Visibility::Public);

        let class = symbols.iter().find(|s| s.name == "SqlUserRepository").unwrap();
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.implements, vec!["IUserRepository"]);

        let method = symbols
            .iter()
            .find(|s| s.name == "Get" && s.kind == SymbolKind::Method)
            .unwrap();
        assert_eq!(method.visibility, Visibility::Public);

        let field = symbols.iter().find(|s| s.name == "_connection").unwrap();
        assert_eq!(field.kind, SymbolKind::Field);
        assert_eq!(field.visibility, Visibility::Private);

        let imports = provider.imports(&parsed);
        let paths: Vec<&str> = imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["System", "Core.Domain"]);
    }

    #[test]
    fn test_attributes_captured() {
        let provider = CSharpProvider::new().unwrap();
        let parsed = parse(
            r#"
public class UserTests
{
    [Fact]
    public void Creates_User() { }
}
"#,
        );

        let symbols = provider.extract_symbols(&parsed);
        let test = symbols.iter().find(|s| s.name == "Creates_User").unwrap();
        assert_eq!(test.attributes, vec!["Fact"]);
    }

    #[test]
    fn test_dependencies_from_csproj() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Api")).unwrap();
        std::fs::write(
            dir.path().join("Api/Api.csproj"),
            r#"<Project Sdk="Microsoft.NET.Sdk.Web">
  <ItemGroup>
    <PackageReference Include="Serilog" Version="3.1.1" />
    <PackageReference Include="Dapper" Version="2.1.0" />
    <ProjectReference Include="..\Core\Core.csproj" />
  </ItemGroup>
</Project>
"#,
        )
        .unwrap();

        let provider = CSharpProvider::new().unwrap();
        let deps = provider.dependencies(dir.path()).unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Core", "Dapper", "Serilog"]);
        let core = deps.iter().find(|d| d.name == "Core").unwrap();
        assert_eq!(core.version, "project");
    }

    #[test]
    fn test_detect_project_prefers_solution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Core.sln"), "Microsoft Visual Studio Solution File").unwrap();
        std::fs::write(dir.path().join("Api.csproj"), "<Project />").unwrap();

        let provider = CSharpProvider::new().unwrap();
        let metadata = provider.detect_project(dir.path()).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("Core"));
    }

    #[test]
    fn test_detect_project_without_manifest_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CSharpProvider::new().unwrap();
        assert!(provider.detect_project(dir.path()).is_err());
    }
}
