use indexmap::IndexMap;

use super::document::{Document, Element};
use super::path::{FieldSpecifier, Namespace, SEGMENT_DELIMITER};

pub type FieldMap = IndexMap<String, Option<String>>;

// Looks up every specifier against the document root.
// Each specifier gets exactly one entry for its own value. When the element
// exists and carries attributes, one extra entry per attribute is added under
// `specifier/attributeName`. Specifiers ending in `@attr` yield that
// attribute's value instead and add no extra entries.
pub fn extract_fields(
    document: &Document,
    specifiers: &[FieldSpecifier],
    namespace: &Namespace,
) -> FieldMap {
    let mut fields = FieldMap::new();

    for specifier in specifiers {
        let path = specifier.resolve(namespace);
        let element = if path.is_empty() {
            None
        } else {
            document.root().find_first(path.elements())
        };

        match path.attribute() {
            Some(attribute) => {
                let value = element.and_then(|e| e.attributes.get(attribute).cloned());
                fields.insert(specifier.to_string(), value);
            }
            None => {
                fields.insert(specifier.to_string(), element.and_then(|e| e.text.clone()));
                if let Some(element) = element {
                    insert_attributes(&mut fields, specifier, element);
                }
            }
        }
    }

    fields
}

fn insert_attributes(fields: &mut FieldMap, specifier: &FieldSpecifier, element: &Element) {
    for (name, value) in &element.attributes {
        fields.insert(
            format!("{}{}{}", specifier, SEGMENT_DELIMITER, name),
            Some(value.clone()),
        );
    }
}
