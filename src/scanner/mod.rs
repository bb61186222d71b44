//! Directory scanning: turns addon trees into [`Module`] records.

pub mod literal;
pub mod manifest;
pub mod markup;
pub mod metrics;
pub mod parser;
pub mod python;
pub mod walker;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{AnalyseError, Result};
use crate::registry::{LoadOptions, Manifest, Module, ModuleStatus, Registry};

pub use python::PythonAnalyzer;
pub use walker::{FileWalker, ModuleWalker};

use walker::{has_extension, relative_path};

/// Scans every root and collects the modules found into a registry.
///
/// Roots that are not directories are skipped with a warning; if none is
/// left the load fails.
pub fn load(roots: &[PathBuf], options: &LoadOptions) -> Result<Registry> {
    let valid: Vec<&PathBuf> = roots
        .iter()
        .filter(|root| {
            let ok = root.is_dir();
            if !ok {
                tracing::warn!("Not a directory: {}", root.display());
            }
            ok
        })
        .collect();

    if valid.is_empty() {
        return Err(AnalyseError::Configuration(
            "no existing addon directory to scan".to_string(),
        ));
    }

    let scanner = ModuleScanner::new(options);
    let mut registry = Registry::new();

    for root in valid {
        for dir in ModuleWalker::new(options).walk(root) {
            let name = module_name(&dir);
            if let Some(existing) = registry.get(&name) {
                tracing::warn!(
                    "Duplicate module {} at {}, keeping {}",
                    name,
                    dir.display(),
                    existing.path.display()
                );
                continue;
            }

            let (module, errors) = scanner.scan_module(&dir);
            for error in errors {
                tracing::warn!("{}", error);
                registry.record_parse_error(error);
            }

            tracing::info!("Found module {}", module.name);
            if !module.status.is_empty() {
                let flags: Vec<_> = module.status.iter().map(|s| s.as_str()).collect();
                tracing::info!("Status {}: {}", module.name, flags.join(", "));
            }
            registry.insert(module);
        }
    }

    Ok(registry)
}

/// Directory name of a module; falls back to the canonical path for roots
/// such as `.`.
pub fn module_name(dir: &Path) -> String {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..");
    match name {
        Some(name) => name,
        None => dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_default(),
    }
}

/// Parses the content of a single module directory.
pub struct ModuleScanner<'a> {
    options: &'a LoadOptions,
    python: PythonAnalyzer,
    files: FileWalker,
}

impl<'a> ModuleScanner<'a> {
    pub fn new(options: &'a LoadOptions) -> Self {
        Self {
            options,
            python: PythonAnalyzer::new(),
            files: FileWalker::new(options.skip_folders.clone()),
        }
    }

    /// Builds the module record of `dir`. Per-file problems are returned
    /// next to the module instead of aborting the scan.
    pub fn scan_module(&self, dir: &Path) -> (Module, Vec<AnalyseError>) {
        let name = module_name(dir);
        let mut module = Module::new(&name, dir);
        let mut errors = Vec::new();
        let mut hashed: BTreeSet<PathBuf> = BTreeSet::new();

        let manifests = manifest::manifest_files(dir, &self.options.manifest_names);
        if manifests.len() > 1 {
            module.mark(ModuleStatus::MultipleManifest);
        }
        if let Some(path) = manifests.first() {
            hashed.insert(path.clone());
            match manifest::read_manifest(self.python.parser(), &name, path) {
                Ok(manifest) => module.manifest = manifest,
                Err(e) => {
                    module.mark(ModuleStatus::ParseError);
                    module.manifest = Manifest::default();
                    errors.push(as_parse_error(&name, e));
                }
            }
        }

        let files = self.files.walk(dir);
        hashed.extend(files.iter().filter(|f| f.parent() == Some(dir)).cloned());

        if !self.options.skip_python {
            for path in files.iter().filter(|f| has_extension(f, "py")) {
                self.scan_python(&mut module, path, &mut errors);
                hashed.insert(path.clone());
            }
        }

        if !self.options.skip_data {
            let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
            for data in module.manifest.data.clone() {
                let path = dir.join(&data);
                if !path.is_file() {
                    module.mark(ModuleStatus::MissingFile);
                    continue;
                }
                hashed.insert(path.clone());
                module.files.insert(relative_path(dir, &path));
                if has_extension(&path, "xml") && seen.insert(path.clone()) {
                    self.scan_markup(&mut module, &path, &mut errors);
                }
            }

            for path in files.iter().filter(|f| has_extension(f, "xml")) {
                if seen.insert(path.clone()) {
                    self.scan_markup(&mut module, path, &mut errors);
                    hashed.insert(path.clone());
                }
            }
        }

        if self.options.language_metrics {
            if let Some(language) = metrics::analyse_language(dir) {
                module.language = language;
            }
        }

        module.hashsum = hash_files(dir, &hashed);
        (module, errors)
    }

    fn scan_python(&self, module: &mut Module, path: &Path, errors: &mut Vec<AnalyseError>) {
        let relative = relative_path(&module.path, path);
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                module.mark(ModuleStatus::ParseError);
                errors.push(AnalyseError::parse(&module.name, format!("{}: {}", relative, e)));
                return;
            }
        };

        let analysis = self.python.analyze(&source, &module.name, &relative);
        if let Some(line) = analysis.error_line {
            module.mark(ModuleStatus::ParseError);
            errors.push(AnalyseError::parse(
                &module.name,
                format!("{}: syntax error at line {}", relative, line),
            ));
        }

        let own = module.name.clone();
        module.imports.extend(analysis.import_edges(&own));
        for (model, declaration) in analysis.models {
            module.declare_model(&model, declaration);
        }
        for (class, declaration) in analysis.classes {
            module.add_class(&class, declaration);
        }
        module.files.insert(relative);
    }

    fn scan_markup(&self, module: &mut Module, path: &Path, errors: &mut Vec<AnalyseError>) {
        let relative = relative_path(&module.path, path);
        let analysis = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|xml| markup::analyze(&xml, &module.name));

        match analysis {
            Ok(analysis) => {
                let own = module.name.clone();
                module.refers.extend(analysis.reference_edges(&own));
                for view in analysis.views {
                    module.add_view(view);
                }
                for record in analysis.records {
                    module.add_record(record);
                }
                module.files.insert(relative);
            }
            Err(message) => {
                module.mark(ModuleStatus::ParseError);
                errors.push(AnalyseError::parse(
                    &module.name,
                    format!("{}: {}", relative, message),
                ));
            }
        }
    }
}

fn as_parse_error(module: &str, error: AnalyseError) -> AnalyseError {
    match error {
        AnalyseError::Parse { .. } => error,
        other => AnalyseError::parse(module, other.to_string()),
    }
}

/// Digest over `"<file digest> <relative path>"` lines sorted by path.
pub fn hash_files(root: &Path, files: &BTreeSet<PathBuf>) -> String {
    let mut lines: Vec<String> = files
        .iter()
        .filter_map(|path| {
            let content = std::fs::read(path).ok()?;
            Some(format!("{:016x} {}", xxh3_64(&content), relative_path(root, path)))
        })
        .collect();
    lines.sort_by(|a, b| a.split_once(' ').map(|x| x.1).cmp(&b.split_once(' ').map(|x| x.1)));
    format!("{:016x}", xxh3_64(lines.join("\n").as_bytes()))
}
