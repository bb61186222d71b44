//! Installation lifecycle states of modules, looked up from the platform
//! database.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleState {
    #[serde(rename = "uninstalled")]
    Uninstalled,
    #[serde(rename = "installed")]
    Installed,
    #[serde(rename = "to upgrade")]
    ToUpgrade,
    #[serde(rename = "to remove")]
    ToRemove,
    #[serde(rename = "to install")]
    ToInstall,
    #[serde(rename = "uninstallable")]
    Uninstallable,
}

impl ModuleState {
    pub const ALL: [ModuleState; 6] = [
        ModuleState::Uninstalled,
        ModuleState::Installed,
        ModuleState::ToUpgrade,
        ModuleState::ToRemove,
        ModuleState::ToInstall,
        ModuleState::Uninstallable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::Installed => "installed",
            ModuleState::ToUpgrade => "to upgrade",
            ModuleState::ToRemove => "to remove",
            ModuleState::ToInstall => "to install",
            ModuleState::Uninstallable => "uninstallable",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleState {
    type Err = AnalyseError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        ModuleState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| AnalyseError::Configuration(format!("unknown module state: {}", s)))
    }
}

/// Parses a comma separated list of accepted states.
pub fn parse_accepted(states: &str) -> Result<BTreeSet<ModuleState>> {
    states
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ModuleState::from_str)
        .collect()
}

/// Where module states come from.
pub trait StateSource {
    fn states(&self) -> Result<HashMap<String, ModuleState>>;
}

/// Reads `ir_module_module` from a SQLite copy of the platform database.
pub struct SqliteStateSource {
    path: PathBuf,
}

impl SqliteStateSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StateSource for SqliteStateSource {
    fn states(&self) -> Result<HashMap<String, ModuleState>> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut stmt = conn.prepare("SELECT name, state FROM ir_module_module")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut states = HashMap::new();
        for (name, state) in rows {
            match state.parse::<ModuleState>() {
                Ok(state) => {
                    states.insert(name, state);
                }
                Err(_) => tracing::debug!("Ignoring unknown state '{}' of {}", state, name),
            }
        }
        Ok(states)
    }
}
