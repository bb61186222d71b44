pub mod error;
pub mod graph;
pub mod registry;
pub mod report;
pub mod scanner;
pub mod settings;
pub mod snapshot;
pub mod state;

pub use error::{AnalyseError, Result};
pub use graph::{
    CycleBreaker, EdgeKind, FilteredEdge, FilteredGraph, GlobSet, Graph, GraphBuilder,
    GreedyCycleBreaker, ModulePredicate, Predicates, Structure, StructureNode,
};
pub use registry::{
    LoadOptions, Manifest, Model, ModelDeclaration, Module, ModuleStatus, Record, Registry, View,
};
pub use report::{ModuleReport, Report, ReportFormat};
pub use settings::Settings;
pub use state::{ModuleState, SqliteStateSource, StateSource};
