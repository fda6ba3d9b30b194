use super::document::Document;
use super::fields::FieldMap;
use super::path::{FieldSpecifier, Namespace};

pub const RECORD_KEY_COLUMN: &str = "OBJECT_ID";

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub tag: FieldSpecifier,
    pub fields: Vec<FieldSpecifier>,
    pub key_column: String,
}

impl GroupSpec {
    pub fn new(tag: impl Into<FieldSpecifier>, fields: Vec<FieldSpecifier>) -> Self {
        Self {
            tag: tag.into(),
            fields,
            key_column: RECORD_KEY_COLUMN.to_string(),
        }
    }

    pub fn recipients(fields: Vec<FieldSpecifier>) -> Self {
        Self::new("RecipientTable", fields)
    }
}

// One record per group element found anywhere below the root.
// Field lookups are scoped to the matched element. Unlike
// [`extract_fields`](super::fields::extract_fields), a missing field is an
// empty string here, never absent.
pub fn extract_group(
    document: &Document,
    group: &GroupSpec,
    record_key: &str,
    namespace: &Namespace,
) -> Vec<FieldMap> {
    let group_path = group.tag.resolve(namespace);
    if group_path.is_empty() {
        return Vec::new();
    }

    let resolved: Vec<_> = group
        .fields
        .iter()
        .map(|field| (field, field.resolve(namespace)))
        .collect();

    document
        .root()
        .find_all_deep(group_path.elements())
        .into_iter()
        .map(|element| {
            let mut record = FieldMap::new();
            record.insert(group.key_column.clone(), Some(record_key.to_string()));

            for (field, path) in &resolved {
                let found = if path.is_empty() {
                    None
                } else {
                    element.find_first(path.elements())
                };
                let value = match path.attribute() {
                    Some(attribute) => found.and_then(|e| e.attributes.get(attribute).cloned()),
                    None => found.and_then(|e| e.text.clone()),
                };
                record.insert(field.to_string(), Some(value.unwrap_or_default()));
            }

            record
        })
        .collect()
}
