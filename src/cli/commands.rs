use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use addon_graph::error::{AnalyseError, Result};
use addon_graph::graph::dot::{self, BaseNodes, DotOptions, Migration};
use addon_graph::graph::filter::{self, FilteredGraph, GlobSet, Predicates};
use addon_graph::graph::structure::{self, StructureNode};
use addon_graph::graph::{EdgeKind, GraphBuilder};
use addon_graph::registry::{LoadOptions, Registry};
use addon_graph::report::{self, ReportFormat};
use addon_graph::settings::{self, GraphSettings, ModuleColors, Settings};
use addon_graph::snapshot::{self, STDIO};
use addon_graph::state::{self, SqliteStateSource, StateSource};

#[derive(Parser, Debug)]
#[command(name = "addon-graph")]
#[command(about = "Scan addon trees and draw dependency, import and reference graphs")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Scan a tree and save a snapshot
    addon-graph -p ./addons -s addons.json

    # Dependency graph of all sale modules from a snapshot
    addon-graph -l addons.json --modules 'sale*' --show-dependency

    # Same, including everything the sale modules depend on
    addon-graph -l addons.json --modules 'sale*' --show-dependency --full-graph

    # Report modules using other modules they do not depend on
    addon-graph -c /etc/odoo/odoo.conf --analyse -

    # Same report as CSV
    addon-graph -l addons.json --analyse report.csv --analyse-output csv

    # Model graph following only _inherits
    addon-graph -l addons.json --model-graph --no-model-inherit
"#)]
pub struct Cli {
    /// Directories to scan for modules (glob patterns allowed)
    #[arg(short = 'p', long = "path")]
    pub paths: Vec<String>,

    /// Server config file; its addons_path is scanned one level deep
    #[arg(short = 'c', long)]
    pub odoo_config: Option<PathBuf>,

    /// Snapshot files to load, `-` for stdin
    #[arg(short = 'l', long)]
    pub load: Vec<String>,

    /// Save the registry as a snapshot, `-` for stdout
    #[arg(short = 's', long)]
    pub save: Option<String>,

    /// Maximum directory depth while scanning
    #[arg(long)]
    pub depth: Option<usize>,

    /// TOML settings file
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Module name globs, comma separated
    #[arg(long)]
    pub modules: Option<String>,

    /// Only modules declaring or extending matching models
    #[arg(long)]
    pub models: Option<String>,

    /// Only modules owning matching views
    #[arg(long)]
    pub views: Option<String>,

    /// Only modules whose path matches
    #[arg(long)]
    pub path_filter: Option<String>,

    /// Include test_* modules
    #[arg(long)]
    pub test_filter: bool,

    /// Filter modules by installation state
    #[arg(long, requires = "state_db")]
    pub state_filter: bool,

    /// SQLite copy of the platform database
    #[arg(long)]
    pub state_db: Option<PathBuf>,

    /// Accepted states for --state-filter, comma separated
    #[arg(long, default_value = "installed")]
    pub states: String,

    /// Draw declared dependencies
    #[arg(long)]
    pub show_dependency: bool,

    /// Draw python imports
    #[arg(long)]
    pub show_import: bool,

    /// Draw markup references
    #[arg(long)]
    pub show_reference: bool,

    /// Draw the model inheritance graph
    #[arg(long)]
    pub model_graph: bool,

    /// Ignore _inherit in the model graph
    #[arg(long)]
    pub no_model_inherit: bool,

    /// Ignore _inherits in the model graph
    #[arg(long)]
    pub no_model_inherits: bool,

    /// Draw the view inheritance and call graph
    #[arg(long)]
    pub view_graph: bool,

    /// Ignore inherit_id in the view graph
    #[arg(long)]
    pub no_view_inherit: bool,

    /// Ignore t-call in the view graph
    #[arg(long)]
    pub no_view_call: bool,

    /// Draw modules with the models and views they declare
    #[arg(long)]
    pub structure_graph: bool,

    /// Leave fields out of the structure graph
    #[arg(long)]
    pub no_fields: bool,

    /// Add everything reachable from the filtered nodes
    #[arg(long)]
    pub full_graph: bool,

    /// Colour modules by migration state towards this version glob
    #[arg(long)]
    pub migration: Option<String>,

    /// Directory receiving the .gv files
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    /// Write the usage report, `-` for stdout
    #[arg(long)]
    pub analyse: Option<String>,

    /// Format of the usage report
    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    pub analyse_output: ReportFormat,

    /// Print per module counts
    #[arg(long)]
    pub info: bool,

    /// Do not parse python files
    #[arg(long)]
    pub skip_python: bool,

    /// Do not parse data files
    #[arg(long)]
    pub skip_data: bool,

    /// Do not run the line counter
    #[arg(long)]
    pub skip_language: bool,
}

impl Cli {
    fn edge_kinds(&self) -> Vec<EdgeKind> {
        let mut kinds = Vec::new();
        if self.show_dependency {
            kinds.push(EdgeKind::Dependency);
        }
        if self.show_import {
            kinds.push(EdgeKind::Import);
        }
        if self.show_reference {
            kinds.push(EdgeKind::Reference);
        }
        kinds
    }

    fn validate(&self) -> Result<()> {
        if let Some(save) = self.save.as_deref().filter(|s| *s != STDIO) {
            if self.load.iter().any(|l| l == save) {
                return Err(AnalyseError::Configuration(format!(
                    "cannot load from and save to the same file: {}",
                    save
                )));
            }
        }
        if self.paths.is_empty() && self.load.is_empty() && self.odoo_config.is_none() {
            return Err(AnalyseError::Configuration(
                "nothing to analyse: give --path, --load or --odoo-config".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn run(cli: &Cli) -> Result<()> {
    cli.validate()?;
    let settings = Settings::load_or_default(cli.settings.as_deref())?;

    let registry = load_registry(cli, &settings)?;
    tracing::info!(
        "Loaded {} modules ({} parse errors)",
        registry.len(),
        registry.parse_errors().len()
    );

    if let Some(target) = &cli.save {
        snapshot::write(&registry, target)?;
    }

    if cli.info {
        print_info(&registry);
    }

    if let Some(target) = &cli.analyse {
        let report = report::analyse(&registry);
        tracing::info!(
            "{} modules with missing dependencies",
            report.with_missing_dependencies().count()
        );
        report.write(target, cli.analyse_output)?;
    }

    draw_graphs(cli, &settings, &registry)
}

fn print_info(registry: &Registry) {
    for module in registry.iter() {
        let info = module.info();
        println!(
            "{}: {} models, {} classes, {} views, {} records, {} related modules",
            info.name,
            info.model_count,
            info.class_count,
            info.view_count,
            info.record_count,
            info.related
        );
    }
}

fn load_options(cli: &Cli, settings: &Settings) -> LoadOptions {
    LoadOptions {
        max_depth: cli.depth,
        skip_folders: settings.scan.skip_folders.clone(),
        manifest_names: settings.scan.manifest_names.clone(),
        skip_python: cli.skip_python,
        skip_data: cli.skip_data,
        language_metrics: !cli.skip_language,
    }
}

/// Expands glob patterns; a pattern without matches is kept as given.
fn expand_paths(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matched: Vec<PathBuf> = match glob::glob(pattern) {
            Ok(entries) => entries.flatten().collect(),
            Err(e) => {
                tracing::warn!("Invalid path pattern {}: {}", pattern, e);
                Vec::new()
            }
        };
        if matched.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matched);
        }
    }
    paths
}

pub fn load_registry(cli: &Cli, settings: &Settings) -> Result<Registry> {
    let mut registry = snapshot::read_many(&cli.load)?;
    let options = load_options(cli, settings);

    if let Some(config) = &cli.odoo_config {
        let roots = settings::read_addons_path(config)?;
        let options = LoadOptions {
            max_depth: Some(1),
            ..options.clone()
        };
        registry.merge(Registry::load(&roots, &options)?);
    }

    if !cli.paths.is_empty() {
        let roots = expand_paths(&cli.paths);
        registry.merge(Registry::load(&roots, &options)?);
    }

    Ok(registry)
}

fn module_predicates(cli: &Cli) -> Result<Predicates> {
    let mut predicates = Predicates::new();
    if let Some(globs) = &cli.modules {
        predicates = predicates.module_glob(globs)?;
    }
    if let Some(globs) = &cli.models {
        predicates = predicates.model_glob(globs)?;
    }
    if let Some(globs) = &cli.views {
        predicates = predicates.view_glob(globs)?;
    }
    if let Some(globs) = &cli.path_filter {
        predicates = predicates.path_glob(globs)?;
    }
    if !cli.test_filter {
        predicates = predicates.exclude_tests();
    }

    if cli.state_filter {
        let accepted = state::parse_accepted(&cli.states)?;
        let Some(db) = &cli.state_db else {
            return Err(AnalyseError::Configuration(
                "--state-filter needs --state-db".to_string(),
            ));
        };
        match SqliteStateSource::new(db).states() {
            Ok(states) => predicates = predicates.state(states, accepted)?,
            Err(e) => tracing::warn!("State filter disabled: {}", e),
        }
    }

    Ok(predicates)
}

fn write_graph(output: &Path, file: &str, filtered: &FilteredGraph, options: &DotOptions) -> Result<()> {
    if filtered.nodes.is_empty() {
        tracing::info!("Nothing to draw for {}", file);
        return Ok(());
    }
    fs::create_dir_all(output)?;
    let path = output.join(file);
    fs::write(&path, dot::render(filtered, options))?;
    tracing::info!(
        "Wrote {} ({} nodes, {} edges)",
        path.display(),
        filtered.nodes.len(),
        filtered.edges.len()
    );
    Ok(())
}

fn draw_graphs(cli: &Cli, settings: &Settings, registry: &Registry) -> Result<()> {
    let kinds = cli.edge_kinds();
    if !kinds.is_empty() {
        let graph = GraphBuilder::build_many(registry, &kinds);
        let predicates = module_predicates(cli)?;
        let filtered = filter::filter(registry, &graph, &predicates, cli.full_graph);

        let mut options = DotOptions::new("module", settings.graph.clone(), settings.module.clone());
        if let Some(version) = &cli.migration {
            options = options.with_migration(Migration::compute(registry, &GlobSet::parse(version)?));
        }
        write_graph(&cli.output, "module.gv", &filtered, &options)?;
    }

    let models = cli.models.as_deref().map(GlobSet::parse).transpose()?;
    let views = cli.views.as_deref().map(GlobSet::parse).transpose()?;

    if cli.model_graph {
        let graph =
            GraphBuilder::model_graph(registry, !cli.no_model_inherit, !cli.no_model_inherits);
        let filtered = filter::select(&graph, models.as_ref(), cli.full_graph);
        let colors = &settings.model;
        let options = DotOptions::new(
            "model",
            settings.graph.clone(),
            ModuleColors::with_default(&colors.default_color),
        )
        .with_base(BaseNodes::compute(&graph, colors.base_color.as_str()));
        write_graph(&cli.output, "model.gv", &filtered, &options)?;
    }

    if cli.view_graph {
        let graph = GraphBuilder::view_graph(registry, !cli.no_view_inherit, !cli.no_view_call);
        let filtered = filter::select(&graph, views.as_ref(), cli.full_graph);
        let colors = &settings.view;
        let options = DotOptions::new(
            "view",
            settings.graph.clone(),
            ModuleColors::with_default(&colors.default_color),
        )
        .with_base(BaseNodes::compute(&graph, colors.base_color.as_str()));
        write_graph(&cli.output, "view.gv", &filtered, &options)?;
    }

    if cli.structure_graph {
        let modules = cli.modules.as_deref().map(GlobSet::parse).transpose()?;
        let structure = GraphBuilder::structure_graph(
            registry,
            modules.as_ref(),
            models.as_ref(),
            views.as_ref(),
            !cli.no_fields,
        );
        let filtered = filter::select(&structure.graph, None, false);

        let style = &settings.structure;
        let graph_settings = GraphSettings {
            skip_lonely_nodes: false,
            ..settings.graph.clone()
        };
        let mut options = DotOptions::new("structure", graph_settings, ModuleColors::with_default(""));
        for (id, kind) in &structure.kinds {
            let (shape, color) = match kind {
                StructureNode::Module => (&style.module_shape, &style.module_color),
                StructureNode::Model => (&style.model_shape, &style.model_color),
                StructureNode::View => (&style.view_shape, &style.view_color),
                StructureNode::Field => (&style.field_shape, &style.field_color),
            };
            options = options
                .with_node_attr(id.as_str(), "label", structure::label(id))
                .with_node_attr(id.as_str(), "shape", shape.as_str());
            if !color.is_empty() {
                options = options.with_node_attr(id.as_str(), "color", color.as_str());
            }
        }
        write_graph(&cli.output, "structure.gv", &filtered, &options)?;
    }

    Ok(())
}
