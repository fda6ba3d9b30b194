use indexmap::IndexMap;

use crate::core::types::IndexRecord;
use crate::extract::{FieldMap, FieldSpecifier};

pub type Record = IndexMap<String, Option<String>>;

pub trait RecordFilter {
    fn retain(&self, fields: &FieldMap) -> bool;
}

impl<F> RecordFilter for F
where
    F: Fn(&FieldMap) -> bool,
{
    fn retain(&self, fields: &FieldMap) -> bool {
        self(fields)
    }
}

#[derive(Debug, Clone)]
pub struct AnyPopulated {
    keys: Vec<String>,
}

impl AnyPopulated {
    pub fn new(specifiers: &[FieldSpecifier]) -> Self {
        Self {
            keys: specifiers.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RecordFilter for AnyPopulated {
    fn retain(&self, fields: &FieldMap) -> bool {
        self.keys
            .iter()
            .any(|key| fields.get(key).map_or(false, is_populated))
    }
}

pub fn is_populated(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    Record(Record),
    Skipped { object_id: String },
}

// Merges a manifest row with extracted fields. Extracted values win on key
// collisions but the column keeps its manifest position. With a filter, a
// rejected field map produces `Skipped` and nothing else.
pub fn assemble(
    index: &IndexRecord,
    fields: FieldMap,
    filter: Option<&dyn RecordFilter>,
) -> Assembly {
    if let Some(filter) = filter {
        if !filter.retain(&fields) {
            return Assembly::Skipped {
                object_id: index.object_id.clone(),
            };
        }
    }

    let mut record: Record = index
        .columns
        .iter()
        .map(|(column, value)| (column.clone(), Some(value.clone())))
        .collect();
    record.extend(fields);

    Assembly::Record(record)
}
