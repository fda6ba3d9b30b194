use anyhow::{anyhow, Result};
use chardet::detect;
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use indexmap::IndexMap;
use std::io::Read;

use super::path::QualifiedName;

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: QualifiedName,
    pub text: Option<String>,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(namespace: Option<&str>, local: &str) -> Self {
        Self {
            name: QualifiedName::new(namespace, local),
            text: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_named(&self, name: &QualifiedName) -> bool {
        name.matches(self.name.namespace.as_deref(), &self.name.local)
    }

    // First element reached by descending `path` child by child, in document
    // order. Backtracks across same-named siblings.
    pub fn find_first(&self, path: &[QualifiedName]) -> Option<&Element> {
        let (head, rest) = path.split_first()?;
        self.children
            .iter()
            .filter(|child| child.is_named(head))
            .find_map(|child| {
                if rest.is_empty() {
                    Some(child)
                } else {
                    child.find_first(rest)
                }
            })
    }

    pub fn find_all_deep(&self, path: &[QualifiedName]) -> Vec<&Element> {
        let Some((head, rest)) = path.split_first() else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for element in self.descendants().into_iter().filter(|e| e.is_named(head)) {
            if rest.is_empty() {
                found.push(element);
            } else {
                element.collect_path(rest, &mut found);
            }
        }
        found
    }

    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    fn collect_path<'a>(&'a self, path: &[QualifiedName], out: &mut Vec<&'a Element>) {
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        for child in self.children.iter().filter(|c| c.is_named(head)) {
            if rest.is_empty() {
                out.push(child);
            } else {
                child.collect_path(rest, out);
            }
        }
    }
}

fn collect_descendants<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    for child in &element.children {
        out.push(child);
        collect_descendants(child, out);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn parse(content: &str) -> Result<Self, roxmltree::Error> {
        let xml_tree = roxmltree::Document::parse(content)?;
        Ok(Self {
            root: convert(xml_tree.root_element()),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let content = decode(bytes)?;
        Self::parse(&content).map_err(|e| anyhow!("Failed to parse XML: {}", e))
    }
}

fn decode(bytes: &[u8]) -> Result<String> {
    if let Ok(content) = std::str::from_utf8(bytes) {
        return Ok(content.trim_start_matches('\u{feff}').to_string());
    }

    let charenc = detect(bytes).0;
    log::debug!("Detected character encoding: {}", charenc);

    let mut reader = DecodeReaderBytesBuilder::new()
        .encoding(Encoding::for_label(charenc.as_bytes()))
        .build(bytes);

    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|e| anyhow!("Failed to decode document as {}: {}", charenc, e))?;
    Ok(content)
}

fn convert(node: roxmltree::Node) -> Element {
    let tag = node.tag_name();

    let attributes = node
        .attributes()
        .map(|attr| {
            let key = match attr.namespace() {
                Some(ns) => format!("{{{}}}{}", ns, attr.name()),
                None => attr.name().to_string(),
            };
            (key, attr.value().to_string())
        })
        .collect();

    let children = node
        .children()
        .filter(|child| child.is_element())
        .map(convert)
        .collect();

    Element {
        name: QualifiedName::new(tag.namespace(), tag.name()),
        text: leading_text(node),
        attributes,
        children,
    }
}

// Text chunks before the first child element. Comments and processing
// instructions in between are dropped, so `<A><!-- x -->5</A>` reads as `5`.
fn leading_text(node: roxmltree::Node) -> Option<String> {
    let mut text: Option<String> = None;
    for child in node.children() {
        if child.is_element() {
            break;
        }
        if !child.is_text() {
            continue;
        }
        if let Some(chunk) = child.text() {
            text.get_or_insert_with(String::new).push_str(chunk);
        }
    }
    text
}
