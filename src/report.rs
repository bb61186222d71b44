//! Per-module usage report with missing dependency detection.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AnalyseError, Result};
use crate::registry::Registry;

/// Module every other module implicitly depends on.
const IMPLICIT_DEPENDENCY: &str = "base";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    #[serde(skip)]
    pub name: String,
    pub data_count: usize,
    pub depends: BTreeSet<String>,
    pub fields: usize,
    pub imports: BTreeSet<String>,
    pub model_count: usize,
    /// Every module this one uses: imports, references and owners of
    /// extended models
    pub refers: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub missing_dependency: BTreeSet<String>,
}

/// Output format of the usage report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

const CSV_HEADER: [&str; 8] = [
    "name",
    "data_count",
    "depends",
    "fields",
    "imports",
    "model_count",
    "refers",
    "missing_dependency",
];

fn joined(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub modules: Vec<ModuleReport>,
}

impl Report {
    pub fn get(&self, name: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Modules that use something they do not depend on.
    pub fn with_missing_dependencies(&self) -> impl Iterator<Item = &ModuleReport> {
        self.modules
            .iter()
            .filter(|m| !m.missing_dependency.is_empty())
    }

    pub fn to_structured(&self) -> Result<Value> {
        let mut map = Map::new();
        for module in &self.modules {
            map.insert(module.name.clone(), serde_json::to_value(module)?);
        }
        Ok(Value::Object(map))
    }

    /// One row per module; set columns are comma joined.
    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(CSV_HEADER)?;
        for module in &self.modules {
            wtr.write_record([
                module.name.clone(),
                module.data_count.to_string(),
                joined(&module.depends),
                module.fields.to_string(),
                joined(&module.imports),
                module.model_count.to_string(),
                joined(&module.refers),
                joined(&module.missing_dependency),
            ])?;
        }
        wtr.flush()?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| AnalyseError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes the report to a file, or stdout for `-`.
    pub fn write(&self, target: &str, format: ReportFormat) -> Result<()> {
        let text = match format {
            ReportFormat::Json => {
                let mut text = serde_json::to_string_pretty(&self.to_structured()?)?;
                text.push('\n');
                text
            }
            ReportFormat::Csv => self.to_csv()?,
        };
        if target == crate::snapshot::STDIO {
            print!("{}", text);
        } else {
            std::fs::write(target, text)?;
        }
        Ok(())
    }
}

pub fn analyse(registry: &Registry) -> Report {
    let owners = registry.model_owners();
    let mut report = Report::default();

    for module in registry.iter() {
        let imports: BTreeSet<String> = module
            .import_targets()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut used = imports.clone();
        used.extend(module.reference_targets().into_iter().map(str::to_string));

        let mut fields = 0;
        for model in module.models.values() {
            for declaration in model.declarations() {
                fields += declaration.fields.len();
                let parents = declaration
                    .inherit
                    .iter()
                    .chain(declaration.inherits.keys());
                for parent in parents {
                    if let Some(owner) = owners.get(parent) {
                        used.insert(owner.clone());
                    }
                }
            }
        }

        let full = registry.full_dependency(&module.name);
        let missing: BTreeSet<String> = used
            .iter()
            .filter(|name| {
                !full.contains(*name)
                    && name.as_str() != IMPLICIT_DEPENDENCY
                    && **name != module.name
            })
            .cloned()
            .collect();
        used.remove(&module.name);

        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(String::as_str).collect();
            tracing::warn!("Missing dependency: {} -> {}", module.name, names.join(", "));
        }

        report.modules.push(ModuleReport {
            name: module.name.clone(),
            data_count: module.manifest.data.len(),
            depends: module.depends().clone(),
            fields,
            imports,
            model_count: module.models.len(),
            refers: used,
            missing_dependency: missing,
        });
    }

    report
}
