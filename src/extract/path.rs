use serde::{Deserialize, Serialize};
use std::fmt;

pub const TEXT_MARKER: &str = "/text()";
pub const SEGMENT_DELIMITER: char = '/';
pub const ATTRIBUTE_MARKER: char = '@';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: &str, uri: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        }
    }

    pub fn irs_efile() -> Self {
        Self::new("irs", "http://www.irs.gov/efile")
    }

    pub fn qualifier(&self) -> String {
        format!("{}:", self.prefix)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::irs_efile()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSpecifier(String);

impl FieldSpecifier {
    pub fn new(specifier: impl Into<String>) -> Self {
        Self(specifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self, namespace: &Namespace) -> QualifiedPath {
        resolve(&self.0, namespace)
    }
}

impl From<&str> for FieldSpecifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FieldSpecifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for FieldSpecifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QualifiedName {
    pub fn new(namespace: Option<&str>, local: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            local: local.to_string(),
        }
    }

    pub fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == namespace
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedPath {
    prefix: String,
    elements: Vec<QualifiedName>,
    attribute: Option<String>,
}

impl QualifiedPath {
    pub fn elements(&self) -> &[QualifiedName] {
        &self.elements
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl fmt::Display for QualifiedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for element in &self.elements {
            if !first {
                write!(f, "{}", SEGMENT_DELIMITER)?;
            }
            first = false;
            write!(f, "{}:{}", self.prefix, element.local)?;
        }
        if let Some(attribute) = &self.attribute {
            if !first {
                write!(f, "{}", SEGMENT_DELIMITER)?;
            }
            write!(f, "{}{}", ATTRIBUTE_MARKER, attribute)?;
        }
        Ok(())
    }
}

// Turns a field specifier into a namespace-qualified lookup path.
// Text markers are dropped, empty segments collapse, and every element step
// gets the namespace. Nothing here fails: a malformed specifier yields a
// path that simply matches no element.
pub fn resolve(specifier: &str, namespace: &Namespace) -> QualifiedPath {
    let stripped = specifier.replace(TEXT_MARKER, "");
    let mut segments: Vec<&str> = stripped
        .split(SEGMENT_DELIMITER)
        .filter(|segment| !segment.is_empty())
        .collect();

    let attribute = match segments.last() {
        Some(last) if last.len() > 1 && last.starts_with(ATTRIBUTE_MARKER) => {
            let name = last[1..].to_string();
            segments.pop();
            Some(name)
        }
        _ => None,
    };

    let elements = segments
        .into_iter()
        .map(|segment| QualifiedName::new(Some(&namespace.uri), segment))
        .collect();

    QualifiedPath {
        prefix: namespace.prefix.clone(),
        elements,
        attribute,
    }
}
