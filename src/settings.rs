//! User settings (TOML) and the platform server configuration reader.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AnalyseError, Result};
use crate::registry::{DEFAULT_SKIP_FOLDERS, MANIFEST_NAMES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub skip_folders: Vec<String>,
    pub manifest_names: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            skip_folders: DEFAULT_SKIP_FOLDERS.iter().map(|s| s.to_string()).collect(),
            manifest_names: MANIFEST_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Graphviz layout engine written into the output
    pub engine: String,
    pub skip_lonely_nodes: bool,
    pub loop_color: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            engine: "dot".to_string(),
            skip_lonely_nodes: true,
            loop_color: "red".to_string(),
        }
    }
}

/// Node colours of the migration view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleColors {
    pub done_color: String,
    pub todo_color: String,
    pub warning_color: String,
    /// Empty means no colour attribute
    pub default_color: String,
}

impl Default for ModuleColors {
    fn default() -> Self {
        Self {
            done_color: "green".to_string(),
            todo_color: "blue".to_string(),
            warning_color: "orange".to_string(),
            default_color: String::new(),
        }
    }
}

impl ModuleColors {
    /// Module colours with a different default, used for the model and
    /// view graphs.
    pub fn with_default(default_color: &str) -> Self {
        Self {
            default_color: default_color.to_string(),
            ..Self::default()
        }
    }
}

/// Node colours of the model and view graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeColors {
    /// Nodes that inherit from nothing else
    pub base_color: String,
    pub default_color: String,
}

impl Default for NodeColors {
    fn default() -> Self {
        Self {
            base_color: "blue".to_string(),
            default_color: String::new(),
        }
    }
}

/// Node shapes and colours of the structure graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSettings {
    pub module_shape: String,
    pub model_shape: String,
    pub view_shape: String,
    pub field_shape: String,
    pub module_color: String,
    pub model_color: String,
    pub view_color: String,
    pub field_color: String,
}

impl Default for StructureSettings {
    fn default() -> Self {
        Self {
            module_shape: "doubleoctagon".to_string(),
            model_shape: "box".to_string(),
            view_shape: "oval".to_string(),
            field_shape: "octagon".to_string(),
            module_color: String::new(),
            model_color: String::new(),
            view_color: String::new(),
            field_color: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanSettings,
    pub graph: GraphSettings,
    pub module: ModuleColors,
    pub model: NodeColors,
    pub view: NodeColors,
    pub structure: StructureSettings,
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&content)?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Settings from `path`, or the defaults when no file is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Extracts the `addons_path` entries of a platform server config file
/// (INI, section `[options]`).
pub fn read_addons_path(path: &Path) -> Result<Vec<PathBuf>> {
    let server_config = ::config::Config::builder()
        .add_source(
            ::config::File::from(path)
                .format(::config::FileFormat::Ini)
                .required(true),
        )
        .build()
        .map_err(|e| {
            AnalyseError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

    let addons_path = server_config
        .get_string("options.addons_path")
        .map_err(|e| {
            AnalyseError::Configuration(format!(
                "no options.addons_path in {}: {}",
                path.display(),
                e
            ))
        })?;

    Ok(addons_path
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect())
}
