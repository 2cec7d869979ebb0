use crate::indexer::extract::{ExtractionStrategy, is_exported, normalize_whitespace};
use crate::indexer::project::ProjectInfo;
use crate::model::{DefinitionInput, DefinitionKind, ExtractedFile, ModuleInput, Parent, Span};
use crate::symbol::{self, Symbol};
use crate::util;
use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use tree_sitter::{Node, Parser};

/// Package-level declaration kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Function,
    Method,
    Type,
    Value,
}

impl DeclKind {
    fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "function_declaration" => Some(DeclKind::Function),
            "method_declaration" => Some(DeclKind::Method),
            "type_declaration" => Some(DeclKind::Type),
            "var_declaration" | "const_declaration" => Some(DeclKind::Value),
            _ => None,
        }
    }
}

type Handler = fn(Node<'_>, &mut FileContext<'_>);

const DISPATCH: [(DeclKind, Handler); 4] = [
    (DeclKind::Function, handle_function as Handler),
    (DeclKind::Method, handle_method as Handler),
    (DeclKind::Type, handle_type_declaration as Handler),
    (DeclKind::Value, handle_value_declaration as Handler),
];

fn handler_for(kind: DeclKind) -> Option<Handler> {
    DISPATCH
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map(|(_, handler)| *handler)
}

/// Native strategy: Go source parsed with tree-sitter.
pub struct GoExtractor {
    parser: Parser,
}

impl GoExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_go::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }

    pub fn extract_source(
        &mut self,
        project: &ProjectInfo,
        rel_path: &str,
        source: &str,
    ) -> Result<ExtractedFile> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("parser returned no tree"))?;
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            bail!("syntax error near line {line}");
        }
        let package = package_name(root, source).ok_or_else(|| anyhow!("missing package clause"))?;

        let mut ctx = FileContext {
            source,
            project,
            namespace: project.namespace_for(rel_path),
            definitions: Vec::new(),
            keys: HashMap::new(),
            types: HashMap::new(),
        };
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let Some(kind) = DeclKind::from_node_kind(child.kind()) else {
                continue;
            };
            if let Some(handler) = handler_for(kind) {
                handler(child, &mut ctx);
            }
        }

        Ok(ExtractedFile {
            language: "go".to_string(),
            line_count: util::line_count(source),
            module: ModuleInput {
                name: project.module_for(rel_path),
                package,
            },
            definitions: ctx.definitions,
            references: Vec::new(),
        })
    }
}

impl ExtractionStrategy for GoExtractor {
    fn name(&self) -> &'static str {
        "native"
    }

    fn extract(
        &mut self,
        project: &ProjectInfo,
        rel_path: &str,
        source: &str,
    ) -> Result<ExtractedFile> {
        self.extract_source(project, rel_path, source)
    }
}

struct FileContext<'a> {
    source: &'a str,
    project: &'a ProjectInfo,
    namespace: String,
    definitions: Vec<DefinitionInput>,
    /// Merge key -> index; a key repeated in one file keeps its first entry.
    keys: HashMap<String, usize>,
    /// Type name -> index of its definition, for receiver linkage.
    types: HashMap<String, usize>,
}

struct Entry<'n> {
    kind: DefinitionKind,
    name: String,
    signature: String,
    descriptor: String,
    node: Node<'n>,
    doc_node: Node<'n>,
    exported: bool,
    parent: Parent,
}

impl FileContext<'_> {
    fn push(&mut self, entry: Entry<'_>) -> Option<usize> {
        if self.keys.contains_key(&entry.signature) {
            tracing::debug!(signature = %entry.signature, "duplicate declaration, keeping first");
            return None;
        }
        let index = self.definitions.len();
        self.keys.insert(entry.signature.clone(), index);
        self.definitions.push(DefinitionInput {
            kind: entry.kind,
            name: entry.name,
            key: entry.signature.clone(),
            signature: entry.signature,
            symbol: self.project.symbol(entry.descriptor),
            span: span(entry.node),
            exported: entry.exported,
            documentation: doc_comment(entry.doc_node, self.source),
            parent: entry.parent,
        });
        Some(index)
    }

    fn text(&self, node: Node<'_>) -> String {
        node_text(node, self.source)
    }
}

fn handle_function(node: Node<'_>, ctx: &mut FileContext<'_>) {
    let Some(name) = node.child_by_field_name("name").map(|n| ctx.text(n)) else {
        return;
    };
    if name.is_empty() {
        return;
    }
    let descriptor = symbol::method_descriptor(&ctx.namespace, &name);
    let signature = format!("func {name}{}", callable_tail(node, ctx.source));
    let Some(index) = ctx.push(Entry {
        kind: DefinitionKind::Function,
        exported: is_exported(&name),
        name: name.clone(),
        signature,
        descriptor: descriptor.clone(),
        node,
        doc_node: node,
        parent: Parent::Module,
    }) else {
        return;
    };
    push_parameters(node, ctx, index, &name, &descriptor);
}

fn handle_method(node: Node<'_>, ctx: &mut FileContext<'_>) {
    let Some(name) = node.child_by_field_name("name").map(|n| ctx.text(n)) else {
        return;
    };
    if name.is_empty() {
        return;
    }
    let Some((receiver_text, receiver_type)) = receiver(node, ctx.source) else {
        return;
    };
    let owner = symbol::type_descriptor(&ctx.namespace, &receiver_type);
    let descriptor = symbol::method_descriptor(&owner, &name);
    // Only types declared earlier in this file are known here.
    let parent = match ctx.types.get(&receiver_type) {
        Some(index) => Parent::Definition(*index),
        None => Parent::Module,
    };
    let signature = format!(
        "func ({receiver_text}) {name}{}",
        callable_tail(node, ctx.source)
    );
    let Some(index) = ctx.push(Entry {
        kind: DefinitionKind::Method,
        exported: is_exported(&name),
        name: name.clone(),
        signature,
        descriptor: descriptor.clone(),
        node,
        doc_node: node,
        parent,
    }) else {
        return;
    };
    let owner_name = format!("{receiver_type}.{name}");
    push_parameters(node, ctx, index, &owner_name, &descriptor);
}

fn handle_type_declaration(node: Node<'_>, ctx: &mut FileContext<'_>) {
    let specs = named_children(node);
    let single = specs.len() == 1;
    for spec in specs {
        if !matches!(spec.kind(), "type_spec" | "type_alias") {
            continue;
        }
        let Some(name) = spec.child_by_field_name("name").map(|n| ctx.text(n)) else {
            continue;
        };
        let Some(type_node) = spec.child_by_field_name("type") else {
            continue;
        };
        let (kind, shape) = match type_node.kind() {
            "struct_type" => (DefinitionKind::Class, "struct".to_string()),
            "interface_type" => (DefinitionKind::Interface, "interface".to_string()),
            _ => (
                DefinitionKind::Class,
                normalize_whitespace(&ctx.text(type_node)),
            ),
        };
        let signature = if spec.kind() == "type_alias" {
            format!("type {name} = {shape}")
        } else {
            format!("type {name} {shape}")
        };
        let descriptor = symbol::type_descriptor(&ctx.namespace, &name);
        let Some(index) = ctx.push(Entry {
            kind,
            exported: is_exported(&name),
            name: name.clone(),
            signature,
            descriptor: descriptor.clone(),
            node: spec,
            doc_node: if single { node } else { spec },
            parent: Parent::Module,
        }) else {
            continue;
        };
        ctx.types.insert(name.clone(), index);

        match type_node.kind() {
            "struct_type" => push_fields(type_node, ctx, index, &name, &descriptor),
            "interface_type" => push_interface_methods(type_node, ctx, index, &name, &descriptor),
            _ => {}
        }
    }
}

fn handle_value_declaration(node: Node<'_>, ctx: &mut FileContext<'_>) {
    let keyword = if node.kind() == "const_declaration" {
        "const"
    } else {
        "var"
    };
    let mut specs = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "var_spec" | "const_spec" => specs.push(child),
            "var_spec_list" => specs.extend(
                named_children(child)
                    .into_iter()
                    .filter(|spec| spec.kind() == "var_spec"),
            ),
            _ => {}
        }
    }
    let single = specs.len() == 1;
    for spec in specs {
        let value_type = spec
            .child_by_field_name("type")
            .map(|n| normalize_whitespace(&ctx.text(n)));
        let mut cursor = spec.walk();
        let names: Vec<Node<'_>> = spec.children_by_field_name("name", &mut cursor).collect();
        for name_node in names {
            let name = ctx.text(name_node);
            if name.is_empty() || name == "_" {
                continue;
            }
            let signature = match &value_type {
                Some(value_type) => format!("{keyword} {name} {value_type}"),
                None => format!("{keyword} {name}"),
            };
            ctx.push(Entry {
                kind: DefinitionKind::Variable,
                exported: is_exported(&name),
                descriptor: symbol::term_descriptor(&ctx.namespace, &name),
                name,
                signature,
                node: spec,
                doc_node: if single { node } else { spec },
                parent: Parent::Module,
            });
        }
    }
}

fn push_fields(
    struct_node: Node<'_>,
    ctx: &mut FileContext<'_>,
    owner: usize,
    owner_name: &str,
    owner_descriptor: &str,
) {
    let Some(list) = named_children(struct_node)
        .into_iter()
        .find(|child| child.kind() == "field_declaration_list")
    else {
        return;
    };
    for field in named_children(list) {
        if field.kind() != "field_declaration" {
            continue;
        }
        let Some(type_node) = field.child_by_field_name("type") else {
            continue;
        };
        let field_type = normalize_whitespace(&ctx.text(type_node));
        let mut cursor = field.walk();
        let mut names: Vec<String> = field
            .children_by_field_name("name", &mut cursor)
            .map(|n| node_text(n, ctx.source))
            .collect();
        if names.is_empty() {
            // Embedded field: named after its type.
            names.push(embedded_field_name(&field_type));
        }
        for name in names {
            if name.is_empty() || name == "_" {
                continue;
            }
            ctx.push(Entry {
                kind: DefinitionKind::Variable,
                exported: is_exported(&name),
                signature: format!("field {owner_name}.{name} {field_type}"),
                descriptor: symbol::term_descriptor(owner_descriptor, &name),
                name,
                node: field,
                doc_node: field,
                parent: Parent::Definition(owner),
            });
        }
    }
}

fn push_interface_methods(
    interface_node: Node<'_>,
    ctx: &mut FileContext<'_>,
    owner: usize,
    owner_name: &str,
    owner_descriptor: &str,
) {
    for elem in named_children(interface_node) {
        if !matches!(elem.kind(), "method_elem" | "method_spec") {
            continue;
        }
        let Some(name) = elem.child_by_field_name("name").map(|n| ctx.text(n)) else {
            continue;
        };
        ctx.push(Entry {
            kind: DefinitionKind::Method,
            exported: is_exported(&name),
            signature: format!("func ({owner_name}) {name}{}", callable_tail(elem, ctx.source)),
            descriptor: symbol::method_descriptor(owner_descriptor, &name),
            name,
            node: elem,
            doc_node: elem,
            parent: Parent::Definition(owner),
        });
    }
}

fn push_parameters(
    callable: Node<'_>,
    ctx: &mut FileContext<'_>,
    owner: usize,
    owner_name: &str,
    owner_descriptor: &str,
) {
    let Some(list) = callable.child_by_field_name("parameters") else {
        return;
    };
    for param in named_children(list) {
        if !matches!(
            param.kind(),
            "parameter_declaration" | "variadic_parameter_declaration"
        ) {
            continue;
        }
        let param_type = parameter_type(param, ctx.source);
        let mut cursor = param.walk();
        let names: Vec<Node<'_>> = param.children_by_field_name("name", &mut cursor).collect();
        for name_node in names {
            let name = ctx.text(name_node);
            if name.is_empty() || name == "_" {
                continue;
            }
            ctx.push(Entry {
                kind: DefinitionKind::Parameter,
                exported: false,
                signature: format!("param {owner_name}.{name} {param_type}"),
                descriptor: symbol::parameter_descriptor(owner_descriptor, &name),
                name,
                node: name_node,
                doc_node: name_node,
                parent: Parent::Definition(owner),
            });
        }
    }
}

/// `(T1, T2) R` part of a signature: parameter types in order, then results.
fn callable_tail(node: Node<'_>, source: &str) -> String {
    let params = node
        .child_by_field_name("parameters")
        .map(|list| parameter_types(list, source))
        .unwrap_or_default();
    let mut tail = format!("({})", params.join(", "));
    if let Some(result) = node.child_by_field_name("result") {
        if result.kind() == "parameter_list" {
            let results = parameter_types(result, source);
            match results.len() {
                0 => {}
                1 => tail.push_str(&format!(" {}", results[0])),
                _ => tail.push_str(&format!(" ({})", results.join(", "))),
            }
        } else {
            tail.push(' ');
            tail.push_str(&normalize_whitespace(&node_text(result, source)));
        }
    }
    tail
}

/// One entry per declared name, so `a, b int` yields `int, int`.
fn parameter_types(list: Node<'_>, source: &str) -> Vec<String> {
    let mut types = Vec::new();
    for param in named_children(list) {
        if !matches!(
            param.kind(),
            "parameter_declaration" | "variadic_parameter_declaration"
        ) {
            continue;
        }
        let param_type = parameter_type(param, source);
        let mut cursor = param.walk();
        let count = param.children_by_field_name("name", &mut cursor).count().max(1);
        for _ in 0..count {
            types.push(param_type.clone());
        }
    }
    types
}

fn parameter_type(param: Node<'_>, source: &str) -> String {
    let text = param
        .child_by_field_name("type")
        .map(|n| normalize_whitespace(&node_text(n, source)))
        .unwrap_or_default();
    if param.kind() == "variadic_parameter_declaration" {
        format!("...{text}")
    } else {
        text
    }
}

/// Receiver as written (`*Server`) and the bare type name (`Server`).
fn receiver(node: Node<'_>, source: &str) -> Option<(String, String)> {
    let list = node.child_by_field_name("receiver")?;
    let param = named_children(list)
        .into_iter()
        .find(|child| child.kind() == "parameter_declaration")?;
    let type_node = param.child_by_field_name("type")?;
    let written = normalize_whitespace(&node_text(type_node, source));
    let bare = written
        .trim_start_matches('*')
        .split('[')
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    if bare.is_empty() {
        None
    } else {
        Some((written, bare))
    }
}

fn embedded_field_name(field_type: &str) -> String {
    let bare = field_type.trim_start_matches('*');
    let bare = bare.split('[').next().unwrap_or(bare);
    bare.rsplit('.').next().unwrap_or(bare).to_string()
}

fn package_name(root: Node<'_>, source: &str) -> Option<String> {
    let clause = named_children(root)
        .into_iter()
        .find(|child| child.kind() == "package_clause")?;
    named_children(clause)
        .into_iter()
        .find(|child| child.kind() == "package_identifier")
        .map(|ident| node_text(ident, source))
}

/// Contiguous `//` or `/* */` comments ending on the line above `node`.
fn doc_comment(node: Node<'_>, source: &str) -> String {
    let mut lines = Vec::new();
    let mut expected_end = node.start_position().row;
    let mut current = node.prev_sibling();
    while let Some(comment) = current {
        if comment.kind() != "comment" || comment.end_position().row + 1 != expected_end {
            break;
        }
        lines.push(strip_comment(&node_text(comment, source)));
        expected_end = comment.start_position().row;
        current = comment.prev_sibling();
    }
    lines.reverse();
    lines.join("\n").trim().to_string()
}

fn strip_comment(text: &str) -> String {
    if let Some(rest) = text.strip_prefix("//") {
        return rest.strip_prefix(' ').unwrap_or(rest).to_string();
    }
    let inner = text
        .strip_prefix("/*")
        .and_then(|rest| rest.strip_suffix("*/"))
        .unwrap_or(text);
    inner
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn first_error_line(node: Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn span(node: Node<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_line: start.row as i64 + 1,
        start_col: start.column as i64 + 1,
        end_line: end.row as i64 + 1,
        end_col: end.column as i64 + 1,
        start_byte: node.start_byte() as i64,
        end_byte: node.end_byte() as i64,
    }
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}

/// Symbol the native strategy assigns to a package-level function.
pub fn function_symbol(project: &ProjectInfo, rel_path: &str, name: &str) -> Symbol {
    project.symbol(symbol::method_descriptor(&project.namespace_for(rel_path), name))
}
