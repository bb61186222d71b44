//! Models and their name-addressed declarations.
//!
//! Any module may extend a model just by naming it, so a [`Model`] is not a
//! class hierarchy but an ordered log of [`ModelDeclaration`]s. The merged view
//! (fields, inherited names, methods) is recomputed from that log on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Field name -> field type, kept in declaration order.
///
/// Re-inserting an existing field overrides its type but keeps the position
/// of the first declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ttype: impl Into<String>) {
        let name = name.into();
        let ttype = ttype.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = ttype,
            None => self.entries.push((name, ttype)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Applies `other` on top of `self`, last writer wins per field.
    pub fn extend(&mut self, other: &FieldMap) {
        for (name, ttype) in other.iter() {
            self.insert(name, ttype);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (name, ttype) in iter {
            map.insert(name, ttype);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, ttype) in &self.entries {
            map.serialize_entry(name, ttype)?;
        }
        map.end()
    }
}

struct FieldMapVisitor;

impl<'de> Visitor<'de> for FieldMapVisitor {
    type Value = FieldMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a mapping of field names to field types")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
        let mut fields = FieldMap::new();
        while let Some((name, ttype)) = access.next_entry::<String, String>()? {
            fields.insert(name, ttype);
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// One class body that declares or extends a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDeclaration {
    /// Module the declaration was found in
    #[serde(default)]
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Module-relative source file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub inherit: BTreeSet<String>,
    /// Delegated parent model -> link field
    #[serde(default)]
    pub inherits: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: FieldMap,
    /// Method name -> parameter names
    #[serde(default)]
    pub methods: BTreeMap<String, Vec<String>>,
}

impl ModelDeclaration {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Default::default()
        }
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_inherit(mut self, name: impl Into<String>) -> Self {
        self.inherit.insert(name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, ttype: impl Into<String>) -> Self {
        self.fields.insert(name, ttype);
        self
    }
}

/// A named model with its ordered declaration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ModelRecord", from = "ModelRecord")]
pub struct Model {
    name: String,
    declarations: Vec<ModelDeclaration>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declarations: Vec::new(),
        }
    }

    pub fn with_declaration(mut self, declaration: ModelDeclaration) -> Self {
        self.declare(declaration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declarations(&self) -> &[ModelDeclaration] {
        &self.declarations
    }

    pub fn declare(&mut self, declaration: ModelDeclaration) {
        self.declarations.push(declaration);
    }

    /// Appends the declarations of a model with the same name.
    pub fn merge(&mut self, other: &Model) {
        if self.name == other.name {
            self.declarations.extend(other.declarations.iter().cloned());
        }
    }

    /// Sequential override-merge of all declared fields.
    pub fn fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        for declaration in &self.declarations {
            fields.extend(&declaration.fields);
        }
        fields
    }

    /// Names this model extends, excluding itself.
    pub fn inherit(&self) -> BTreeSet<String> {
        self.declarations
            .iter()
            .flat_map(|d| d.inherit.iter())
            .filter(|name| **name != self.name)
            .cloned()
            .collect()
    }

    pub fn inherits(&self) -> BTreeMap<String, String> {
        let mut inherits = BTreeMap::new();
        for declaration in &self.declarations {
            for (parent, field) in &declaration.inherits {
                inherits.insert(parent.clone(), field.clone());
            }
        }
        inherits
    }

    pub fn methods(&self) -> BTreeMap<String, Vec<String>> {
        let mut methods = BTreeMap::new();
        for declaration in &self.declarations {
            for (name, params) in &declaration.methods {
                methods.insert(name.clone(), params.clone());
            }
        }
        methods
    }

    /// True when no declaration extends another model.
    pub fn is_base(&self) -> bool {
        self.inherit().is_empty() && self.inherits().is_empty()
    }
}

/// Snapshot shape of a model: the merged fields and methods for readers,
/// the declarations for lossless reloading.
#[derive(Serialize, Deserialize)]
struct ModelRecord {
    name: String,
    #[serde(default)]
    fields: FieldMap,
    #[serde(default)]
    methods: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    declarations: Vec<ModelDeclaration>,
}

impl From<Model> for ModelRecord {
    fn from(model: Model) -> Self {
        ModelRecord {
            fields: model.fields(),
            methods: model.methods(),
            name: model.name,
            declarations: model.declarations,
        }
    }
}

impl From<ModelRecord> for Model {
    fn from(record: ModelRecord) -> Self {
        let mut model = Model::new(record.name);
        if record.declarations.is_empty()
            && !(record.fields.is_empty() && record.methods.is_empty())
        {
            model.declare(ModelDeclaration {
                fields: record.fields,
                methods: record.methods,
                ..Default::default()
            });
        } else {
            model.declarations = record.declarations;
        }
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_map_override_keeps_position() {
        let mut fields = FieldMap::new();
        fields.insert("name", "fields.Char");
        fields.insert("amount", "fields.Float");
        fields.insert("name", "fields.Text");

        assert_eq!(fields.names(), vec!["name", "amount"]);
        assert_eq!(fields.get("name"), Some("fields.Text"));
    }

    #[test]
    fn test_merged_fields_last_writer_wins() {
        let model = Model::new("sale.order")
            .with_declaration(
                ModelDeclaration::new("sale")
                    .with_field("name", "fields.Char")
                    .with_field("state", "fields.Selection"),
            )
            .with_declaration(
                ModelDeclaration::new("sale_x")
                    .with_inherit("sale.order")
                    .with_field("state", "fields.Char")
                    .with_field("note", "fields.Text"),
            );

        let fields = model.fields();
        assert_eq!(fields.names(), vec!["name", "state", "note"]);
        assert_eq!(fields.get("state"), Some("fields.Char"));
    }

    #[test]
    fn test_merge_depends_on_declaration_order() {
        let first = ModelDeclaration::new("a").with_field("x", "fields.Char");
        let second = ModelDeclaration::new("b").with_field("x", "fields.Integer");

        let forward = Model::new("m")
            .with_declaration(first.clone())
            .with_declaration(second.clone());
        let backward = Model::new("m").with_declaration(second).with_declaration(first);

        assert_eq!(forward.fields().get("x"), Some("fields.Integer"));
        assert_eq!(backward.fields().get("x"), Some("fields.Char"));
    }

    #[test]
    fn test_inherit_excludes_self() {
        let model = Model::new("res.partner").with_declaration(
            ModelDeclaration::new("crm")
                .with_inherit("res.partner")
                .with_inherit("mail.thread"),
        );
        let inherit: Vec<_> = model.inherit().into_iter().collect();
        assert_eq!(inherit, vec!["mail.thread".to_string()]);
        assert!(!model.is_base());
    }

    #[test]
    fn test_model_json_contains_merged_fields() {
        let model = Model::new("m").with_declaration(
            ModelDeclaration::new("a")
                .with_field("b", "fields.Char")
                .with_field("a", "fields.Char"),
        );
        let json = serde_json::to_value(&model).unwrap();
        let keys: Vec<_> = json["fields"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(json["methods"].as_object().unwrap().is_empty());

        let back: Model = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn test_model_json_contains_merged_methods() {
        let mut first = ModelDeclaration::new("sale");
        first.methods.insert("action_confirm".into(), vec!["self".into()]);
        let mut second = ModelDeclaration::new("sale_x");
        second
            .methods
            .insert("action_confirm".into(), vec!["self".into(), "force".into()]);

        let model = Model::new("sale.order")
            .with_declaration(first)
            .with_declaration(second);
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(
            json["methods"]["action_confirm"],
            serde_json::json!(["self", "force"])
        );
    }

    #[test]
    fn test_model_from_fields_only() {
        let json = serde_json::json!({"name": "m", "fields": {"x": "fields.Char"}});
        let model: Model = serde_json::from_value(json).unwrap();
        assert_eq!(model.declarations().len(), 1);
        assert_eq!(model.fields().get("x"), Some("fields.Char"));
    }
}
