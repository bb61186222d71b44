use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use walkdir::WalkDir;

use crate::registry::LoadOptions;

use super::manifest::is_module_dir;

/// Finds module directories below a root.
pub struct ModuleWalker<'a> {
    options: &'a LoadOptions,
}

impl<'a> ModuleWalker<'a> {
    pub fn new(options: &'a LoadOptions) -> Self {
        Self { options }
    }

    /// Module directories in sorted traversal order. Discovery never
    /// descends into a module or into a skipped folder.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut modules = Vec::new();

        let mut walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
        if let Some(depth) = self.options.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut entries = walker.into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            if entry.depth() > 0 && self.is_skipped(&entry.file_name().to_string_lossy()) {
                entries.skip_current_dir();
                continue;
            }

            if is_module_dir(entry.path(), &self.options.manifest_names) {
                modules.push(entry.path().to_path_buf());
                entries.skip_current_dir();
            }
        }

        modules
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.options.skip_folders.iter().any(|skip| skip == name)
    }
}

/// Lists the files of one module.
pub struct FileWalker {
    skip_folders: Vec<String>,
}

impl FileWalker {
    pub fn new(skip_folders: Vec<String>) -> Self {
        Self { skip_folders }
    }

    /// All files below `root`, sorted by path.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let skip = self.skip_folders.clone();
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .ignore(true)
            .parents(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir && skip.iter().any(|s| entry.file_name() == s.as_str()))
            })
            .build();

        let mut files: Vec<PathBuf> = walker
            .flatten()
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Path relative to `root` with forward slashes.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn create_module(dir: &Path, name: &str) {
        create_file(dir, &format!("{}/__manifest__.py", name), "{}");
        create_file(dir, &format!("{}/__init__.py", name), "");
    }

    #[test]
    fn test_walk_finds_modules_sorted() {
        let temp_dir = TempDir::new().unwrap();
        create_module(temp_dir.path(), "sale");
        create_module(temp_dir.path(), "base");
        create_module(temp_dir.path(), "nested/account");
        create_file(temp_dir.path(), "not_a_module/__manifest__.py", "{}");

        let options = LoadOptions::default();
        let modules = ModuleWalker::new(&options).walk(temp_dir.path());
        let names: Vec<_> = modules
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["base", "account", "sale"]);
    }

    #[test]
    fn test_walk_does_not_descend_into_modules() {
        let temp_dir = TempDir::new().unwrap();
        create_module(temp_dir.path(), "outer");
        create_module(temp_dir.path(), "outer/inner");

        let options = LoadOptions::default();
        let modules = ModuleWalker::new(&options).walk(temp_dir.path());
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn test_walk_respects_depth_and_skip_folders() {
        let temp_dir = TempDir::new().unwrap();
        create_module(temp_dir.path(), "a");
        create_module(temp_dir.path(), "deep/b");
        create_module(temp_dir.path(), "node_modules/c");

        let options = LoadOptions::default().with_max_depth(1);
        let modules = ModuleWalker::new(&options).walk(temp_dir.path());
        assert_eq!(modules.len(), 1);

        let options = LoadOptions::default();
        let modules = ModuleWalker::new(&options).walk(temp_dir.path());
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn test_root_can_be_a_module() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "__manifest__.py", "{}");
        create_file(temp_dir.path(), "__init__.py", "");

        let options = LoadOptions::default().with_max_depth(0);
        let modules = ModuleWalker::new(&options).walk(temp_dir.path());
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn test_file_walker_lists_sorted_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "models/b.py", "");
        create_file(temp_dir.path(), "models/a.py", "");
        create_file(temp_dir.path(), "views/a.xml", "");
        create_file(temp_dir.path(), "__pycache__/a.cpython.pyc", "");

        let walker = FileWalker::new(vec!["__pycache__".to_string()]);
        let files = walker.walk(temp_dir.path());
        let relative: Vec<_> = files
            .iter()
            .map(|f| relative_path(temp_dir.path(), f))
            .collect();
        assert_eq!(relative, vec!["models/a.py", "models/b.py", "views/a.xml"]);

        let python = files.iter().filter(|f| has_extension(f, "py")).count();
        assert_eq!(python, 2);
    }
}
