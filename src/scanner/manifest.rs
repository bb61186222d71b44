use std::path::{Path, PathBuf};

use crate::error::{AnalyseError, Result};
use crate::registry::Manifest;

use super::literal;
use super::parser::Parser;

/// Manifest files present in a directory, in precedence order.
pub fn manifest_files(dir: &Path, names: &[String]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// True when `dir` holds a manifest and an `__init__.py`.
pub fn is_module_dir(dir: &Path, names: &[String]) -> bool {
    dir.join("__init__.py").is_file() && names.iter().any(|name| dir.join(name).is_file())
}

/// Evaluates a manifest source.
pub fn parse_manifest(parser: &Parser, module: &str, source: &str) -> Result<Manifest> {
    literal::eval_dict_source(parser, source)
        .map(Manifest::from_literal)
        .map_err(|message| AnalyseError::parse(module, format!("manifest: {}", message)))
}

pub fn read_manifest(parser: &Parser, module: &str, path: &Path) -> Result<Manifest> {
    let source = std::fs::read_to_string(path)?;
    parse_manifest(parser, module, &source)
}
