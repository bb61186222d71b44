use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::{Model, ModelDeclaration};
use super::record::Record;
use super::view::View;

/// Parsed module manifest.
///
/// Typed keys are lifted into fields, every other key is kept verbatim and
/// in its original order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Human readable name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub depends: BTreeSet<String>,
    #[serde(default)]
    pub installable: bool,
    #[serde(default)]
    pub auto_install: bool,
    /// Data files in load order
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Builds a manifest from an evaluated manifest dictionary.
    pub fn from_literal(map: Map<String, Value>) -> Self {
        let mut manifest = Manifest::default();

        for (key, value) in map {
            match key.as_str() {
                "name" => manifest.name = string_value(&value).unwrap_or_default(),
                "version" => manifest.version = string_value(&value).unwrap_or_default(),
                "depends" => manifest.depends = string_list(&value).into_iter().collect(),
                "data" => manifest.data = string_list(&value),
                "installable" => manifest.installable = is_truthy(&value),
                "auto_install" => manifest.auto_install = is_truthy(&value),
                _ => {
                    manifest.extra.insert(key, value);
                }
            }
        }

        manifest
    }

    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Python import of another module's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ImportEdge {
    pub target: String,
    /// Dotted path below the target module, empty for a bare module import
    pub symbol: String,
}

impl ImportEdge {
    pub fn new(target: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            symbol: symbol.into(),
        }
    }
}

impl From<(String, String)> for ImportEdge {
    fn from((target, symbol): (String, String)) -> Self {
        Self { target, symbol }
    }
}

impl From<ImportEdge> for (String, String) {
    fn from(edge: ImportEdge) -> Self {
        (edge.target, edge.symbol)
    }
}

/// Markup reference to an artifact owned by another module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ReferenceEdge {
    pub target: String,
    /// Full dotted artifact id
    pub artifact: String,
}

impl ReferenceEdge {
    pub fn new(target: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            artifact: artifact.into(),
        }
    }
}

impl From<(String, String)> for ReferenceEdge {
    fn from((target, artifact): (String, String)) -> Self {
        Self { target, artifact }
    }
}

impl From<ReferenceEdge> for (String, String) {
    fn from(edge: ReferenceEdge) -> Self {
        (edge.target, edge.artifact)
    }
}

/// Anomalies noticed while loading a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleStatus {
    MultipleManifest,
    MissingFile,
    ParseError,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::MultipleManifest => "multiple-manifest",
            ModuleStatus::MissingFile => "missing-file",
            ModuleStatus::ParseError => "parse-error",
        }
    }
}

/// Line count of one language inside a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageStats {
    pub lines: u64,
    /// Share of all counted lines in the module
    pub fraction: f64,
}

/// A module found on disk or restored from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Technical name (directory name)
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub manifest: Manifest,
    #[serde(default)]
    pub models: BTreeMap<String, Model>,
    /// Python classes that are not models, by class name
    #[serde(default)]
    pub classes: BTreeMap<String, ModelDeclaration>,
    #[serde(default)]
    pub views: BTreeMap<String, View>,
    /// Markup records that are not views
    #[serde(default)]
    pub records: BTreeMap<String, Record>,
    #[serde(default)]
    pub imports: BTreeSet<ImportEdge>,
    #[serde(default)]
    pub refers: BTreeSet<ReferenceEdge>,
    /// Module-relative files that were parsed
    #[serde(default)]
    pub files: BTreeSet<String>,
    #[serde(default)]
    pub status: BTreeSet<ModuleStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub language: BTreeMap<String, LanguageStats>,
    #[serde(default)]
    pub hashsum: String,
}

/// Counts printed by `--info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub model_count: usize,
    pub class_count: usize,
    pub record_count: usize,
    pub view_count: usize,
    /// Distinct modules related through any edge kind
    pub related: usize,
}

impl Module {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            manifest: Manifest::default(),
            models: BTreeMap::new(),
            classes: BTreeMap::new(),
            views: BTreeMap::new(),
            records: BTreeMap::new(),
            imports: BTreeSet::new(),
            refers: BTreeSet::new(),
            files: BTreeSet::new(),
            status: BTreeSet::new(),
            language: BTreeMap::new(),
            hashsum: String::new(),
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn depends(&self) -> &BTreeSet<String> {
        &self.manifest.depends
    }

    pub fn import_targets(&self) -> BTreeSet<&str> {
        self.imports.iter().map(|e| e.target.as_str()).collect()
    }

    pub fn reference_targets(&self) -> BTreeSet<&str> {
        self.refers.iter().map(|e| e.target.as_str()).collect()
    }

    /// Appends a declaration to the model it names, creating the model on
    /// first sight.
    pub fn declare_model(&mut self, name: &str, declaration: ModelDeclaration) {
        self.models
            .entry(name.to_string())
            .or_insert_with(|| Model::new(name))
            .declare(declaration);
    }

    pub fn add_view(&mut self, view: View) {
        match self.views.get_mut(&view.id) {
            Some(existing) => existing.merge(&view),
            None => {
                self.views.insert(view.id.clone(), view);
            }
        }
    }

    pub fn add_record(&mut self, record: Record) {
        match self.records.get_mut(&record.id) {
            Some(existing) => existing.merge(&record),
            None => {
                self.records.insert(record.id.clone(), record);
            }
        }
    }

    /// Keeps the first class of a name; later ones are folded into it.
    pub fn add_class(&mut self, name: &str, declaration: ModelDeclaration) {
        match self.classes.get_mut(name) {
            Some(existing) => {
                existing.inherit.extend(declaration.inherit);
                existing.fields.extend(&declaration.fields);
                existing.methods.extend(declaration.methods);
            }
            None => {
                self.classes.insert(name.to_string(), declaration);
            }
        }
    }

    pub fn mark(&mut self, status: ModuleStatus) {
        self.status.insert(status);
    }

    /// Modules named `test_*` are test fixtures of the platform.
    pub fn is_test(&self) -> bool {
        self.name.starts_with("test_")
    }

    pub fn info(&self) -> ModuleInfo {
        let mut related: BTreeSet<&str> = self.depends().iter().map(String::as_str).collect();
        related.extend(self.import_targets());
        related.extend(self.reference_targets());

        ModuleInfo {
            name: self.name.clone(),
            model_count: self.models.len(),
            class_count: self.classes.len(),
            record_count: self.records.len(),
            view_count: self.views.len(),
            related: related.len(),
        }
    }
}
