//! engine::composite
//!
//! Default assembly hooks for composite datasets.
//!
//! When a mapper supplies no hooks, a composite is a JSON object with one
//! field per component: assembly collects the component objects under
//! their names, disassembly reads them back out.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::core::types::DataId;
use crate::mapper::{ComponentInfo, MapperError};

/// Build `{component: object, ...}`.
pub fn generic_assembler(
    _data_id: &DataId,
    components: &BTreeMap<String, Value>,
) -> Result<Value, MapperError> {
    let obj: Map<String, Value> = components
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Ok(Value::Object(obj))
}

/// Split an object into its component fields.
///
/// Input-only components may be absent; every other component must be
/// present.
pub fn generic_disassembler(
    value: &Value,
    _data_id: &DataId,
    components: &BTreeMap<String, ComponentInfo>,
) -> Result<BTreeMap<String, Value>, MapperError> {
    let obj = value.as_object().ok_or_else(|| MapperError::Transform {
        dataset_type: "composite".into(),
        message: "only objects can be disassembled".into(),
    })?;

    let mut out = BTreeMap::new();
    for (name, info) in components {
        match obj.get(name) {
            Some(component) => {
                out.insert(name.clone(), component.clone());
            }
            None if info.input_only => {}
            None => {
                return Err(MapperError::Transform {
                    dataset_type: info.dataset_type.clone(),
                    message: format!("component '{}' missing from object", name),
                })
            }
        }
    }
    Ok(out)
}
