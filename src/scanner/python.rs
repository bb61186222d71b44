//! Extraction of cross-module imports and model declarations from Python
//! sources.

use once_cell::sync::OnceCell;
use serde_json::Value;
use tree_sitter::{Node, Query, StreamingIterator};

use crate::registry::{ImportEdge, ModelDeclaration};

use super::literal;
use super::parser::{ParsedFile, Parser};

/// Namespaces under which addons are importable.
const ADDON_NAMESPACES: &[&str] = &["odoo.addons.", "openerp.addons."];

static IMPORTS_QUERY: OnceCell<Query> = OnceCell::new();

const IMPORTS_QUERY_SOURCE: &str = r#"
(import_statement) @import
(import_from_statement) @from_import
"#;

/// Result of analysing one Python file.
#[derive(Debug, Default)]
pub struct PythonAnalysis {
    /// Fully dotted import paths in source order
    pub imports: Vec<String>,
    /// (model name, declaration) in source order
    pub models: Vec<(String, ModelDeclaration)>,
    /// (class name, declaration) of top-level classes that are not models
    pub classes: Vec<(String, ModelDeclaration)>,
    /// Line of the first syntax error, if the file did not parse cleanly
    pub error_line: Option<usize>,
}

impl PythonAnalysis {
    /// Imports that reach into another module's namespace.
    pub fn import_edges(&self, own_module: &str) -> Vec<ImportEdge> {
        self.imports
            .iter()
            .filter_map(|path| addon_import(path))
            .filter(|edge| edge.target != own_module)
            .collect()
    }
}

/// Splits `odoo.addons.<module>.<rest>` into an import edge.
pub fn addon_import(path: &str) -> Option<ImportEdge> {
    let rest = ADDON_NAMESPACES
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))?;
    let mut parts = rest.splitn(2, '.');
    let target = parts.next().filter(|t| !t.is_empty())?;
    let symbol = parts.next().unwrap_or("");
    Some(ImportEdge::new(target, symbol))
}

pub struct PythonAnalyzer {
    parser: Parser,
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    fn imports_query(&self) -> Option<&'static Query> {
        IMPORTS_QUERY
            .get_or_try_init(|| Query::new(self.parser.language(), IMPORTS_QUERY_SOURCE))
            .ok()
    }

    /// Analyses one source file. `module` and `file` are recorded on every
    /// model declaration.
    pub fn analyze(&self, source: &str, module: &str, file: &str) -> PythonAnalysis {
        let mut analysis = PythonAnalysis::default();
        let parsed = match self.parser.parse_source(source) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", file, e);
                analysis.error_line = Some(0);
                return analysis;
            }
        };

        analysis.error_line = parsed.first_error_line();
        self.extract_imports(&parsed, &mut analysis.imports);
        self.extract_classes(&parsed, module, file, &mut analysis);
        analysis
    }

    fn extract_imports(&self, parsed: &ParsedFile, imports: &mut Vec<String>) {
        let Some(query) = self.imports_query() else {
            tracing::warn!("Invalid imports query for python");
            return;
        };

        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, parsed.root_node(), parsed.source_bytes());

        while let Some(m) = matches.next() {
            // Only module-level imports count.
            for capture in m
                .captures
                .iter()
                .filter(|c| c.node.parent().is_some_and(|p| p.kind() == "module"))
            {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "import" => import_paths(parsed, capture.node, imports),
                    "from_import" => from_import_paths(parsed, capture.node, imports),
                    _ => {}
                }
            }
        }
    }

    fn extract_classes(
        &self,
        parsed: &ParsedFile,
        module: &str,
        file: &str,
        analysis: &mut PythonAnalysis,
    ) {
        let root = parsed.root_node();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let class = match child.kind() {
                "class_definition" => child,
                "decorated_definition" => match child.child_by_field_name("definition") {
                    Some(def) if def.kind() == "class_definition" => def,
                    _ => continue,
                },
                _ => continue,
            };

            let Some((model_name, declaration)) = class_declaration(parsed, class, module, file)
            else {
                continue;
            };
            match (model_name, declaration.class_name.clone()) {
                (Some(name), _) => analysis.models.push((name, declaration)),
                (None, Some(class_name)) => analysis.classes.push((class_name, declaration)),
                (None, None) => {}
            }
        }
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn imported_name<'a>(parsed: &'a ParsedFile, node: Node) -> Option<&'a str> {
    match node.kind() {
        "dotted_name" => Some(parsed.node_text(&node)),
        "aliased_import" => node
            .child_by_field_name("name")
            .map(|name| parsed.node_text(&name)),
        _ => None,
    }
}

/// `import a.b, c as d`
fn import_paths(parsed: &ParsedFile, node: Node, imports: &mut Vec<String>) {
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        if let Some(path) = imported_name(parsed, name) {
            imports.push(path.to_string());
        }
    }
}

/// `from a.b import c, d as e` / `from a import *`
fn from_import_paths(parsed: &ParsedFile, node: Node, imports: &mut Vec<String>) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    // Relative imports stay inside the importing module.
    if module_node.kind() != "dotted_name" {
        return;
    }
    let module = parsed.node_text(&module_node);

    let mut found = false;
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        if let Some(name) = imported_name(parsed, name) {
            imports.push(format!("{}.{}", module, name));
            found = true;
        }
    }

    if !found {
        imports.push(module.to_string());
    }
}

/// Parses a class body. The name is set when the class declares or
/// extends exactly one model.
fn class_declaration(
    parsed: &ParsedFile,
    class: Node,
    module: &str,
    file: &str,
) -> Option<(Option<String>, ModelDeclaration)> {
    let body = class.child_by_field_name("body")?;
    let mut declaration = ModelDeclaration::new(module).with_file(file);
    if let Some(name) = class.child_by_field_name("name") {
        declaration.class_name = Some(parsed.node_text(&name).to_string());
    }

    let mut model_name: Option<String> = None;
    let mut cursor = body.walk();
    for statement in body.named_children(&mut cursor) {
        match statement.kind() {
            "expression_statement" => {
                let Some(assignment) = statement.named_child(0) else {
                    continue;
                };
                if assignment.kind() == "assignment" {
                    parse_assignment(parsed, assignment, &mut declaration, &mut model_name);
                }
            }
            "function_definition" => parse_method(parsed, statement, &mut declaration),
            "decorated_definition" => {
                if let Some(def) = statement.child_by_field_name("definition") {
                    if def.kind() == "function_definition" {
                        parse_method(parsed, def, &mut declaration);
                    }
                }
            }
            _ => {}
        }
    }

    let name = match model_name {
        Some(name) => Some(name),
        None if declaration.inherit.len() == 1 => declaration.inherit.iter().next().cloned(),
        None => None,
    };
    Some((name, declaration))
}

fn parse_assignment(
    parsed: &ParsedFile,
    assignment: Node,
    declaration: &mut ModelDeclaration,
    model_name: &mut Option<String>,
) {
    let (Some(left), Some(right)) = (
        assignment.child_by_field_name("left"),
        assignment.child_by_field_name("right"),
    ) else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }

    let target = parsed.node_text(&left);
    match target {
        "_name" => {
            if let Ok(Value::String(name)) = literal::eval(parsed, right) {
                *model_name = Some(name);
            }
        }
        "_inherit" => match literal::eval(parsed, right) {
            Ok(Value::String(name)) => {
                declaration.inherit.insert(name);
            }
            Ok(Value::Array(names)) => {
                declaration
                    .inherit
                    .extend(names.into_iter().filter_map(|n| n.as_str().map(str::to_string)));
            }
            _ => {}
        },
        "_inherits" => {
            if let Ok(Value::Object(map)) = literal::eval(parsed, right) {
                for (parent, field) in map {
                    if let Value::String(field) = field {
                        declaration.fields.insert(field.clone(), "fields.Many2one");
                        declaration.inherits.insert(parent, field);
                    }
                }
            }
        }
        _ => {
            if let Some(ttype) = field_type(parsed, right) {
                declaration.fields.insert(target, ttype);
            }
        }
    }
}

/// `fields.Char(...)` -> `fields.Char`
fn field_type(parsed: &ParsedFile, value: Node) -> Option<String> {
    if value.kind() != "call" {
        return None;
    }
    let function = value.child_by_field_name("function")?;
    if function.kind() != "attribute" {
        return None;
    }
    let object = function.child_by_field_name("object")?;
    let attribute = function.child_by_field_name("attribute")?;
    if object.kind() == "identifier" && parsed.node_text(&object) == "fields" {
        Some(format!("fields.{}", parsed.node_text(&attribute)))
    } else {
        None
    }
}

fn parse_method(parsed: &ParsedFile, function: Node, declaration: &mut ModelDeclaration) {
    let Some(name) = function.child_by_field_name("name") else {
        return;
    };
    let mut params = Vec::new();
    if let Some(parameters) = function.child_by_field_name("parameters") {
        let mut cursor = parameters.walk();
        for param in parameters.named_children(&mut cursor) {
            let ident = match param.kind() {
                "identifier" => Some(param),
                "default_parameter" | "typed_default_parameter" => param.child_by_field_name("name"),
                "typed_parameter" => param.named_child(0).filter(|n| n.kind() == "identifier"),
                _ => None,
            };
            if let Some(ident) = ident {
                params.push(parsed.node_text(&ident).to_string());
            }
        }
    }
    declaration
        .methods
        .insert(parsed.node_text(&name).to_string(), params);
}
