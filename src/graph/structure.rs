//! Containment graph: modules own models and views, models own fields.

use std::collections::BTreeMap;

use super::{GlobSet, Graph, GraphBuilder};
use crate::registry::Registry;

/// What a structure graph node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureNode {
    Module,
    Model,
    View,
    Field,
}

/// Structure graph plus the kind of every node. Node ids are `/`-joined
/// paths (`sale/sale.order/name`), so one model declared by two modules
/// yields two nodes.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    pub graph: Graph,
    pub kinds: BTreeMap<String, StructureNode>,
}

impl Structure {
    fn add(&mut self, parent: Option<&str>, id: String, kind: StructureNode) {
        self.graph.add_node(&id);
        if let Some(parent) = parent {
            self.graph.add_edge(parent, &id, 1);
        }
        self.kinds.insert(id, kind);
    }

    pub fn kind(&self, id: &str) -> Option<StructureNode> {
        self.kinds.get(id).copied()
    }
}

/// Last path segment of a structure node id.
pub fn label(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

fn selected(globs: Option<&GlobSet>, name: &str) -> bool {
    globs.map_or(true, |g| g.matches(name))
}

impl GraphBuilder {
    /// Containment graph of the modules, models and views selected by the
    /// globs (`None` selects everything). Fields are listed under their
    /// model when `fields` is set.
    pub fn structure_graph(
        registry: &Registry,
        modules: Option<&GlobSet>,
        models: Option<&GlobSet>,
        views: Option<&GlobSet>,
        fields: bool,
    ) -> Structure {
        let mut structure = Structure::default();

        for module in registry.iter().filter(|m| selected(modules, &m.name)) {
            structure.add(None, module.name.clone(), StructureNode::Module);

            for (name, model) in module.models.iter().filter(|(n, _)| selected(models, n)) {
                let model_id = format!("{}/{}", module.name, name);
                structure.add(Some(&module.name), model_id.clone(), StructureNode::Model);
                if !fields {
                    continue;
                }
                for declaration in model.declarations() {
                    for (field, _) in declaration.fields.iter() {
                        structure.add(
                            Some(&model_id),
                            format!("{}/{}", model_id, field),
                            StructureNode::Field,
                        );
                    }
                }
            }

            for id in module.views.keys().filter(|id| selected(views, id)) {
                structure.add(
                    Some(&module.name),
                    format!("{}/{}", module.name, id),
                    StructureNode::View,
                );
            }
        }

        structure
    }
}
