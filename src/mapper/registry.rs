//! mapper::registry
//!
//! Lookup tables of registered datasets.
//!
//! # Format
//!
//! A repository may carry a `registry.json` document mapping table names to
//! rows of dimension values:
//!
//! ```json
//! { "raw": [ {"visit": 1, "ccd": 0, "filter": "r"}, {"visit": 1, "ccd": 1, "filter": "r"} ] }
//! ```
//!
//! A row matches an identifier when every dimension the row carries agrees
//! with the identifier. Dimensions absent from the row do not constrain it.
//! Lookups return distinct tuples in first-seen order.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde_json::Value;

use super::traits::MapperError;
use crate::core::types::{DataId, DataValue};

/// A source of registered dimension values.
pub trait Registry: Send + Sync + Debug {
    /// Distinct tuples of `fields` from rows of `table` matching `data_id`.
    ///
    /// Rows lacking any requested field are skipped. An unknown table
    /// yields no rows.
    fn lookup(
        &self,
        table: &str,
        fields: &[String],
        data_id: &DataId,
    ) -> Result<Vec<Vec<DataValue>>, MapperError>;

    /// Table names, sorted.
    fn tables(&self) -> Vec<String>;
}

type Row = BTreeMap<String, DataValue>;

/// Registry loaded from a JSON document.
#[derive(Debug, Clone, Default)]
pub struct JsonRegistry {
    tables: BTreeMap<String, Vec<Row>>,
}

impl JsonRegistry {
    /// Build from the `{table: [rows]}` document.
    ///
    /// # Errors
    ///
    /// [`MapperError::Registry`] if the document does not have that shape or
    /// a row holds a non-scalar value.
    pub fn from_value(doc: &Value) -> Result<Self, MapperError> {
        let obj = doc
            .as_object()
            .ok_or_else(|| MapperError::Registry("registry must be an object".into()))?;

        let mut tables = BTreeMap::new();
        for (table, rows) in obj {
            let rows = rows.as_array().ok_or_else(|| {
                MapperError::Registry(format!("table '{}' must be an array", table))
            })?;
            let parsed = rows
                .iter()
                .enumerate()
                .map(|(i, row)| parse_row(table, i, row))
                .collect::<Result<Vec<_>, _>>()?;
            tables.insert(table.clone(), parsed);
        }
        Ok(Self { tables })
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }
}

fn parse_row(table: &str, index: usize, row: &Value) -> Result<Row, MapperError> {
    let obj = row.as_object().ok_or_else(|| {
        MapperError::Registry(format!("row {} of '{}' must be an object", index, table))
    })?;
    obj.iter()
        .map(|(k, v)| {
            DataValue::from_json(v).map(|v| (k.clone(), v)).ok_or_else(|| {
                MapperError::Registry(format!(
                    "row {} of '{}': '{}' is not a scalar",
                    index, table, k
                ))
            })
        })
        .collect()
}

fn row_matches(row: &Row, data_id: &DataId) -> bool {
    data_id
        .iter()
        .all(|(k, v)| row.get(k).map_or(true, |have| have == v))
}

impl Registry for JsonRegistry {
    fn lookup(
        &self,
        table: &str,
        fields: &[String],
        data_id: &DataId,
    ) -> Result<Vec<Vec<DataValue>>, MapperError> {
        let Some(rows) = self.tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut out: Vec<Vec<DataValue>> = Vec::new();
        for row in rows.iter().filter(|row| row_matches(row, data_id)) {
            let tuple: Option<Vec<DataValue>> =
                fields.iter().map(|f| row.get(f).cloned()).collect();
            if let Some(tuple) = tuple {
                if !out.contains(&tuple) {
                    out.push(tuple);
                }
            }
        }
        Ok(out)
    }

    fn tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}
