use crate::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One row: at most one entry per field name.
pub type Record = Vec<Field>;

/// Overlay `values` onto `record` in place.
///
/// Each value replaces the first field with the same name. Values naming a
/// field the record does not have are dropped.
pub fn merge(record: &mut Record, values: &[Field]) {
    for value in values {
        if let Some(field) = record.iter_mut().find(|f| f.name == value.name) {
            field.value = value.value.clone();
        }
    }
}

/// Keep only the fields named in `allowed`, in record order.
pub fn project(record: Record, allowed: &[String]) -> Record {
    record
        .into_iter()
        .filter(|f| allowed.iter().any(|name| *name == f.name))
        .collect()
}

pub fn encode(record: &[Field]) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(record).map_err(Into::into)
}

pub fn decode(blob: &[u8]) -> Result<Record, Error> {
    serde_json::from_slice(blob).map_err(Into::into)
}
