//! Integration tests for registry snapshots.

use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use addon_graph::registry::{LoadOptions, Registry};
use addon_graph::{snapshot, AnalyseError};

fn create_file(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn create_tree() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    create_file(root, "base/__manifest__.py", "{'name': 'Base'}");
    create_file(root, "base/__init__.py", "");
    create_file(
        root,
        "sale/__manifest__.py",
        "{'depends': ['base'], 'data': ['views/templates.xml']}",
    );
    create_file(root, "sale/__init__.py", "from . import models\n");
    create_file(
        root,
        "sale/models/order.py",
        "from odoo import fields, models\nfrom odoo.addons.base.models import res_partner\n\n\
         class SaleOrder(models.Model):\n    _name = 'sale.order'\n    _inherit = ['mail.thread']\n\
         \n    amount = fields.Float()\n\n    def action_confirm(self, force=False):\n        pass\n\n\
         class OrderLock:\n    timeout = 10\n",
    );
    create_file(
        root,
        "sale/views/templates.xml",
        r#"<odoo>
    <template id="report_order" inherit_id="web.external_layout">
        <t t-call="sale.report_line"/>
    </template>
    <template id="report_line"/>
    <record id="sequence_order" model="ir.sequence">
        <field name="code">sale.order</field>
    </record>
</odoo>"#,
    );
    temp_dir
}

fn load(root: &Path) -> Registry {
    Registry::load(&[root.to_path_buf()], &LoadOptions::default()).expect("Failed to load")
}

#[test]
fn test_loaded_registry_round_trips() {
    let tree = create_tree();
    let registry = load(tree.path());

    let text = snapshot::to_string(&registry).unwrap();
    let restored = snapshot::from_str(&text).unwrap();

    assert_eq!(restored, registry);
    assert_eq!(snapshot::to_string(&restored).unwrap(), text);
}

#[test]
fn test_records_and_classes_survive_round_trip() {
    let tree = create_tree();
    let registry = load(tree.path());

    let value = snapshot::to_structured(&registry).unwrap();
    assert_eq!(value["sale"]["records"]["sale.sequence_order"]["model"], "ir.sequence");
    assert_eq!(value["sale"]["records"]["sale.sequence_order"]["lines"], 3);
    assert!(value["sale"]["classes"]["OrderLock"].is_object());
    assert!(value["sale"]["views"]["sale.report_order"]["complexity"].as_u64().unwrap() > 0);

    let restored = snapshot::from_structured(value).unwrap();
    let sale = restored.get("sale").unwrap();
    assert_eq!(sale.records, registry.get("sale").unwrap().records);
    assert!(sale.classes.contains_key("OrderLock"));
    assert_eq!(
        sale.views["sale.report_order"].lines,
        registry.get("sale").unwrap().views["sale.report_order"].lines
    );
}

#[test]
fn test_loading_twice_is_deterministic() {
    let tree = create_tree();

    let first = snapshot::to_string(&load(tree.path())).unwrap();
    let second = snapshot::to_string(&load(tree.path())).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_snapshot_file_merges_with_scan() {
    let tree = create_tree();
    let snapshot_dir = TempDir::new().unwrap();
    let path = snapshot_dir.path().join("addons.json");
    let path = path.to_string_lossy().to_string();

    let mut stale = Registry::from_snapshot(json!({
        "sale": {"name": "sale", "path": "/old/sale"},
        "legacy": {"name": "legacy", "path": "/old/legacy"},
    }))
    .unwrap();
    snapshot::write(&stale, &path).unwrap();

    stale = snapshot::read(&path).unwrap();
    stale.merge(load(tree.path()));

    let names: Vec<_> = stale.names().collect();
    assert_eq!(names, vec!["sale", "legacy", "base"]);
    assert!(stale.get("sale").unwrap().depends().contains("base"));
}

#[test]
fn test_structured_form_is_keyed_by_name() {
    let tree = create_tree();
    let value = snapshot::to_structured(&load(tree.path())).unwrap();

    assert_eq!(value["sale"]["name"], "sale");
    assert_eq!(value["sale"]["manifest"]["depends"], json!(["base"]));
    assert_eq!(value["sale"]["imports"], json!([["base", "models.res_partner"]]));
}

#[test]
fn test_malformed_snapshot_is_rejected() {
    let err = snapshot::from_str(r#"{"sale": {"name": "sale", "path": 3}}"#).unwrap_err();
    assert!(matches!(err, AnalyseError::MalformedInput(_)));

    let err = snapshot::from_str(r#"["sale"]"#).unwrap_err();
    assert!(matches!(err, AnalyseError::MalformedInput(_)));

    assert!(snapshot::read("/does/not/exist.json").is_err());
}
