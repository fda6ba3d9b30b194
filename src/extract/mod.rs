pub mod document;
pub mod fields;
pub mod group;
pub mod path;

pub use document::{Document, Element};
pub use fields::{extract_fields, FieldMap};
pub use group::{extract_group, GroupSpec, RECORD_KEY_COLUMN};
pub use path::{resolve, FieldSpecifier, Namespace, QualifiedName, QualifiedPath};
