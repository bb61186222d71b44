use serde::{Deserialize, Serialize};

/// A data record (`<record>` that is not a view) declared in markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Fully qualified `<module>.<local-id>`
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Nested elements plus attributes
    #[serde(default)]
    pub complexity: usize,
    /// Source lines spanned by the element
    #[serde(default)]
    pub lines: usize,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: None,
            complexity: 0,
            lines: 0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_metrics(mut self, complexity: usize, lines: usize) -> Self {
        self.complexity = complexity;
        self.lines = lines;
        self
    }

    /// Records redefined under the same id accumulate their metrics.
    pub fn merge(&mut self, other: &Record) {
        if self.id == other.id {
            self.complexity += other.complexity;
            self.lines += other.lines;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_metrics() {
        let mut a = Record::new("sale.group_x").with_metrics(3, 4);
        a.merge(&Record::new("sale.group_x").with_metrics(2, 1));
        a.merge(&Record::new("sale.other").with_metrics(10, 10));

        assert_eq!((a.complexity, a.lines), (5, 5));
    }
}
