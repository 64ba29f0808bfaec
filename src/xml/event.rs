//! Pull events and attribute access.

use std::fmt;

/// One opened element with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,

    /// True when the source element was self-closing. The reader emits a
    /// synthetic close event after a self-closing open, so `empty` is a
    /// hint for validation, not for stream alignment.
    empty: bool,
}

impl Element {
    pub fn new(name: String, attrs: Vec<(String, String)>, empty: bool) -> Self {
        Self { name, attrs, empty }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_int(&self, key: &str) -> Option<i64> {
        self.attr_str(key).and_then(|v| v.parse().ok())
    }

    pub fn attr_bool(&self, key: &str) -> bool {
        matches!(self.attr_str(key), Some("true") | Some("1") | Some("yes"))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attrs {
            write!(f, " {}=\"{}\"", k, v)?;
        }
        if self.empty {
            write!(f, "/>")
        } else {
            write!(f, ">")
        }
    }
}

/// One structural event pulled from the token source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Open(Element),
    Close(String),
    Text(String),
    EndOfDocument,
}

impl XmlEvent {
    /// True when this is an open event for `name`.
    pub fn matches(&self, name: &str) -> bool {
        matches!(self, XmlEvent::Open(el) if el.name() == name)
    }

    /// True when this is a close event for `name`.
    pub fn matches_close(&self, name: &str) -> bool {
        matches!(self, XmlEvent::Close(n) if n == name)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, XmlEvent::EndOfDocument)
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            XmlEvent::Open(el) => Some(el),
            _ => None,
        }
    }
}

impl fmt::Display for XmlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XmlEvent::Open(el) => write!(f, "{}", el),
            XmlEvent::Close(name) => write!(f, "</{}>", name),
            XmlEvent::Text(text) => write!(f, "{:?}", text),
            XmlEvent::EndOfDocument => write!(f, "<end of document>"),
        }
    }
}
