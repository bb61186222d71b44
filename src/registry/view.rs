use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A markup view or QWeb template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Fully qualified `<module>.<local-id>`
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Parent view id this view extends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit: Option<String>,
    /// Templates called through `t-call`
    #[serde(default)]
    pub calls: BTreeSet<String>,
    /// Nested elements plus attributes
    #[serde(default)]
    pub complexity: usize,
    #[serde(default)]
    pub lines: usize,
}

impl View {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: None,
            inherit: None,
            calls: BTreeSet::new(),
            complexity: 0,
            lines: 0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_inherit(mut self, inherit: impl Into<String>) -> Self {
        self.inherit = Some(inherit.into());
        self
    }

    pub fn with_call(mut self, call: impl Into<String>) -> Self {
        self.calls.insert(call.into());
        self
    }

    pub fn with_metrics(mut self, complexity: usize, lines: usize) -> Self {
        self.complexity = complexity;
        self.lines = lines;
        self
    }

    /// Owning module: the first segment of the dotted id.
    pub fn module(&self) -> &str {
        owning_module(&self.id)
    }

    pub fn merge(&mut self, other: &View) {
        if self.id == other.id {
            self.calls.extend(other.calls.iter().cloned());
            self.complexity += other.complexity;
            self.lines += other.lines;
        }
    }
}

/// Prefixes a local id with the module name unless it is already dotted.
pub fn qualify(id: &str, module: &str) -> String {
    if id.contains('.') {
        id.to_string()
    } else {
        format!("{}.{}", module, id)
    }
}

/// First segment of a dotted identifier.
pub fn owning_module(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}
