//! Module registry: the owner of every module, model and view of a run.
//!
//! A registry is produced either by scanning addon directories
//! ([`Registry::load`]) or by restoring a snapshot
//! ([`Registry::from_snapshot`]). Modules keep the order in which they were
//! discovered.

pub mod model;
pub mod module;
pub mod record;
pub mod view;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use serde_json::Value;

use crate::error::{AnalyseError, Result};

pub use model::{FieldMap, Model, ModelDeclaration};
pub use module::{
    ImportEdge, LanguageStats, Manifest, Module, ModuleInfo, ModuleStatus, ReferenceEdge,
};
pub use record::Record;
pub use view::View;

/// Manifest file names, in order of precedence.
pub const MANIFEST_NAMES: &[&str] = &["__manifest__.py", "__openerp__.py", "__odoo__.py"];

/// Folders never descended into while looking for modules.
pub const DEFAULT_SKIP_FOLDERS: &[&str] = &[".git", "__pycache__", "node_modules"];

/// Options controlling a directory scan.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Maximum directory depth below each root (root = 0)
    pub max_depth: Option<usize>,
    pub skip_folders: Vec<String>,
    pub manifest_names: Vec<String>,
    pub skip_python: bool,
    pub skip_data: bool,
    /// Run the external line counter for every module
    pub language_metrics: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            skip_folders: DEFAULT_SKIP_FOLDERS.iter().map(|s| s.to_string()).collect(),
            manifest_names: MANIFEST_NAMES.iter().map(|s| s.to_string()).collect(),
            skip_python: false,
            skip_data: false,
            language_metrics: false,
        }
    }
}

impl LoadOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    modules: Vec<Module>,
    index: HashMap<String, usize>,
    parse_errors: Vec<AnalyseError>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans the given roots for modules.
    pub fn load(roots: &[PathBuf], options: &LoadOptions) -> Result<Self> {
        crate::scanner::load(roots, options)
    }

    /// Rebuilds a registry from a structured snapshot.
    pub fn from_snapshot(value: Value) -> Result<Self> {
        crate::snapshot::from_structured(value)
    }

    /// Adds a module. Returns false (and keeps the existing one) when the
    /// name is already taken.
    pub fn insert(&mut self, module: Module) -> bool {
        if self.index.contains_key(&module.name) {
            return false;
        }
        self.index.insert(module.name.clone(), self.modules.len());
        self.modules.push(module);
        true
    }

    /// Adds or replaces a module; a replaced module keeps its position.
    pub fn replace(&mut self, module: Module) {
        match self.index.get(&module.name) {
            Some(&idx) => self.modules[idx] = module,
            None => {
                self.insert(module);
            }
        }
    }

    /// Merges another registry into this one, later modules win.
    pub fn merge(&mut self, other: Registry) {
        for module in other.modules {
            self.replace(module);
        }
        self.parse_errors.extend(other.parse_errors);
    }

    pub fn record_parse_error(&mut self, error: AnalyseError) {
        self.parse_errors.push(error);
    }

    /// Per-module errors collected while loading.
    pub fn parse_errors(&self) -> &[AnalyseError] {
        &self.parse_errors
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.index.get(name).map(|&idx| &self.modules[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name.as_str())
    }

    /// Transitive closure of declared dependencies inside the registry.
    pub fn full_dependency(&self, name: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let Some(module) = self.get(name) else {
            return result;
        };

        let mut pending: Vec<&str> = module.depends().iter().map(String::as_str).collect();
        while let Some(current) = pending.pop() {
            if result.contains(current) {
                continue;
            }
            if let Some(dep) = self.get(current) {
                result.insert(current.to_string());
                pending.extend(dep.depends().iter().map(String::as_str));
            }
        }
        result
    }

    /// Registry-wide models, declarations merged in module order.
    pub fn models(&self) -> BTreeMap<String, Model> {
        let mut models: BTreeMap<String, Model> = BTreeMap::new();
        for module in &self.modules {
            for (name, model) in &module.models {
                match models.get_mut(name) {
                    Some(existing) => existing.merge(model),
                    None => {
                        models.insert(name.clone(), model.clone());
                    }
                }
            }
        }
        models
    }

    /// Registry-wide views, calls merged by id.
    pub fn views(&self) -> BTreeMap<String, View> {
        let mut views: BTreeMap<String, View> = BTreeMap::new();
        for module in &self.modules {
            for (id, view) in &module.views {
                match views.get_mut(id) {
                    Some(existing) => existing.merge(view),
                    None => {
                        views.insert(id.clone(), view.clone());
                    }
                }
            }
        }
        views
    }

    /// Model name -> module that declares it without extending anything.
    pub fn model_owners(&self) -> HashMap<String, String> {
        let mut owners = HashMap::new();
        for module in &self.modules {
            for (name, model) in &module.models {
                if model.is_base() {
                    owners
                        .entry(name.clone())
                        .or_insert_with(|| module.name.clone());
                }
            }
        }
        owners
    }
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.modules.len() == other.modules.len()
            && self
                .modules
                .iter()
                .all(|m| other.get(&m.name).is_some_and(|o| o == m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, depends: &[&str]) -> Module {
        Module::new(name, format!("/addons/{}", name))
            .with_manifest(Manifest::default().with_depends(depends.iter().copied()))
    }

    #[test]
    fn test_insert_keeps_first_duplicate() {
        let mut registry = Registry::new();
        assert!(registry.insert(module("sale", &["base"])));
        assert!(!registry.insert(module("sale", &[])));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("sale").unwrap().depends().contains("base"));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut registry = Registry::new();
        registry.insert(module("a", &[]));
        registry.insert(module("b", &[]));
        registry.replace(module("a", &["b"]));

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(registry.get("a").unwrap().depends().contains("b"));
    }

    #[test]
    fn test_full_dependency_skips_unknown_modules() {
        let mut registry = Registry::new();
        registry.insert(module("base", &[]));
        registry.insert(module("sale", &["base", "missing"]));
        registry.insert(module("sale_x", &["sale"]));

        let deps: Vec<_> = registry.full_dependency("sale_x").into_iter().collect();
        assert_eq!(deps, vec!["base", "sale"]);
        assert!(registry.full_dependency("nope").is_empty());
    }

    #[test]
    fn test_full_dependency_terminates_on_cycles() {
        let mut registry = Registry::new();
        registry.insert(module("a", &["b"]));
        registry.insert(module("b", &["a"]));

        let deps = registry.full_dependency("a");
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_registry_models_merge_in_module_order() {
        let mut registry = Registry::new();
        let mut sale = module("sale", &[]);
        sale.declare_model(
            "sale.order",
            ModelDeclaration::new("sale").with_field("state", "fields.Selection"),
        );
        let mut sale_x = module("sale_x", &["sale"]);
        sale_x.declare_model(
            "sale.order",
            ModelDeclaration::new("sale_x")
                .with_inherit("sale.order")
                .with_field("state", "fields.Char"),
        );
        registry.insert(sale);
        registry.insert(sale_x);

        let models = registry.models();
        let order = &models["sale.order"];
        assert_eq!(order.declarations().len(), 2);
        assert_eq!(order.fields().get("state"), Some("fields.Char"));

        let owners = registry.model_owners();
        assert_eq!(owners.get("sale.order").map(String::as_str), Some("sale"));
    }

    #[test]
    fn test_equality_ignores_order() {
        let mut left = Registry::new();
        left.insert(module("a", &[]));
        left.insert(module("b", &[]));
        let mut right = Registry::new();
        right.insert(module("b", &[]));
        right.insert(module("a", &[]));

        assert_eq!(left, right);
    }
}
