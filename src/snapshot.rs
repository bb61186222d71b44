//! Lossless JSON snapshots of a registry.
//!
//! The top level is an object keyed by module name in registry order; each
//! value is the serialized [`Module`] record.

use std::io::{Read, Write};
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{AnalyseError, Result};
use crate::registry::{Module, Registry};

/// Path meaning stdin or stdout.
pub const STDIO: &str = "-";

pub fn to_structured(registry: &Registry) -> Result<Value> {
    let mut map = Map::new();
    for module in registry.iter() {
        map.insert(module.name.clone(), serde_json::to_value(module)?);
    }
    Ok(Value::Object(map))
}

pub fn from_structured(value: Value) -> Result<Registry> {
    let Value::Object(map) = value else {
        return Err(AnalyseError::MalformedInput(
            "top level is not an object".to_string(),
        ));
    };

    let mut registry = Registry::new();
    for (key, entry) in map {
        let Value::Object(record) = &entry else {
            return Err(AnalyseError::MalformedInput(format!(
                "entry {} is not an object",
                key
            )));
        };
        match record.get("name") {
            Some(Value::String(name)) if *name == key => {}
            Some(Value::String(name)) => {
                return Err(AnalyseError::MalformedInput(format!(
                    "entry {} is named {}",
                    key, name
                )))
            }
            _ => {
                return Err(AnalyseError::MalformedInput(format!(
                    "entry {} has no name",
                    key
                )))
            }
        }

        let module: Module = serde_json::from_value(entry)
            .map_err(|e| AnalyseError::MalformedInput(format!("module {}: {}", key, e)))?;
        registry.insert(module);
    }

    Ok(registry)
}

pub fn to_string(registry: &Registry) -> Result<String> {
    let mut text = serde_json::to_string_pretty(&to_structured(registry)?)?;
    text.push('\n');
    Ok(text)
}

pub fn from_str(text: &str) -> Result<Registry> {
    from_structured(serde_json::from_str(text)?)
}

/// Reads a snapshot from a file, or stdin for `-`.
pub fn read(source: &str) -> Result<Registry> {
    let text = if source == STDIO {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(Path::new(source))?
    };
    let registry = from_str(&text)?;
    tracing::info!("Loaded {} modules from {}", registry.len(), source);
    Ok(registry)
}

/// Reads several snapshots; later ones replace same-named modules.
pub fn read_many(sources: &[String]) -> Result<Registry> {
    let mut registry = Registry::new();
    for source in sources {
        registry.merge(read(source)?);
    }
    Ok(registry)
}

/// Writes a snapshot to a file, or stdout for `-`.
pub fn write(registry: &Registry, target: &str) -> Result<()> {
    let text = to_string(registry)?;
    if target == STDIO {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
    } else {
        std::fs::write(Path::new(target), text)?;
        tracing::info!("Saved {} modules to {}", registry.len(), target);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ImportEdge, Manifest, ModelDeclaration, ReferenceEdge, View};
    use serde_json::json;
    use tempfile::TempDir;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        let mut sale = Module::new("sale", "/addons/sale").with_manifest(
            Manifest::default()
                .with_depends(["base"])
                .with_version("16.0.1.0.0"),
        );
        sale.declare_model(
            "sale.order",
            ModelDeclaration::new("sale")
                .with_class_name("SaleOrder")
                .with_field("name", "fields.Char"),
        );
        sale.add_view(View::new("sale.view_order_form").with_model("sale.order"));
        sale.imports.insert(ImportEdge::new("base", "models"));
        sale.refers.insert(ReferenceEdge::new("base", "base.group_user"));
        registry.insert(sale);
        registry.insert(Module::new("base", "/addons/base"));
        registry
    }

    #[test]
    fn test_round_trip() {
        let original = registry();
        let value = to_structured(&original).unwrap();
        let restored = from_structured(value.clone()).unwrap();

        assert_eq!(restored, original);
        assert_eq!(to_structured(&restored).unwrap(), value);
    }

    #[test]
    fn test_module_order_is_kept() {
        let value = to_structured(&registry()).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["sale", "base"]);
    }

    #[test]
    fn test_edges_are_pairs() {
        let value = to_structured(&registry()).unwrap();
        assert_eq!(value["sale"]["imports"], json!([["base", "models"]]));
        assert_eq!(value["sale"]["refers"], json!([["base", "base.group_user"]]));
    }

    #[test]
    fn test_malformed_inputs() {
        let cases = [
            json!([]),
            json!({"sale": 1}),
            json!({"sale": {"path": "/addons/sale"}}),
            json!({"sale": {"name": "other", "path": "/x"}}),
            json!({"sale": {"name": "sale"}}),
            json!({"sale": {"name": "sale", "path": "/x", "imports": [1]}}),
        ];
        for case in cases {
            let err = from_structured(case).unwrap_err();
            assert!(matches!(err, AnalyseError::MalformedInput(_)), "{}", err);
        }
    }

    #[test]
    fn test_minimal_record_uses_defaults() {
        let registry = from_structured(json!({"x": {"name": "x", "path": "/x"}})).unwrap();
        let module = registry.get("x").unwrap();
        assert!(module.depends().is_empty());
        assert!(module.models.is_empty());
    }

    #[test]
    fn test_write_and_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");
        let path = path.to_string_lossy().to_string();

        write(&registry(), &path).unwrap();
        let restored = read(&path).unwrap();
        assert_eq!(restored, registry());

        let merged = read_many(&[path.clone(), path]).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(from_str("{not json").is_err());
    }
}
