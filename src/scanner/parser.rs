use crate::error::{AnalyseError, Result};

/// Tree-sitter front end for Python sources and manifests.
pub struct Parser {
    language: tree_sitter::Language,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }

    pub fn language(&self) -> &tree_sitter::Language {
        &self.language
    }

    pub fn parse_source(&self, source: &str) -> Result<ParsedFile> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| AnalyseError::parse("", e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| AnalyseError::parse("", "Failed to parse source"))?;

        Ok(ParsedFile {
            tree,
            source: source.to_string(),
        })
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ParsedFile {
    pub tree: tree_sitter::Tree,
    pub source: String,
}

impl ParsedFile {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn node_text(&self, node: &tree_sitter::Node) -> &str {
        node.utf8_text(self.source_bytes()).unwrap_or("")
    }

    /// True when tree-sitter had to recover from a syntax error.
    pub fn has_errors(&self) -> bool {
        self.root_node().has_error()
    }

    /// Row (1-based) of the first error node, if any.
    pub fn first_error_line(&self) -> Option<usize> {
        fn find(node: tree_sitter::Node) -> Option<usize> {
            if node.is_error() || node.is_missing() {
                return Some(node.start_position().row + 1);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.has_error() {
                    if let Some(line) = find(child) {
                        return Some(line);
                    }
                }
            }
            None
        }
        if self.has_errors() {
            find(self.root_node())
        } else {
            None
        }
    }
}
