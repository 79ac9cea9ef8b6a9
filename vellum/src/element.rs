use std::ops::Range;

use crate::ast::Node;
use crate::expr::Expr;

/// Tags with reserved meaning. Any other capitalized tag is a component
/// reference; lowercase tags are named wrapper blocks emitted verbatim.
pub const BUILTIN_TAGS: &[&str] = &[
    "If", "Else", "Loop", "Break", "Return", "Ask", "Option", "Invoke", "Let",
    "Component", "Param", "Children", "Import",
];

pub fn is_builtin(tag: &str) -> bool {
    BUILTIN_TAGS.contains(&tag)
}

/// An XML-style element embedded in the document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<Attr>,
    pub children: Vec<Node>,
    /// Byte span of the opening tag.
    pub span: Range<usize>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    /// The attribute's literal string form, if it was written as `name="..."`.
    pub fn string_attr(&self, name: &str) -> Option<&str> {
        match self.attr(name) {
            Some(AttrValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// True if the tag names a component (capitalized, not a built-in).
    pub fn is_component_ref(&self) -> bool {
        !is_builtin(&self.tag)
            && self.tag.chars().next().is_some_and(|c| c.is_ascii_uppercase())
    }

    /// True if the tag is a named wrapper block (lowercase first letter).
    pub fn is_wrapper(&self) -> bool {
        self.tag.chars().next().is_some_and(|c| c.is_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: AttrValue,
    /// Byte span of the attribute within the opening tag.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// `name="literal text"`
    Str(String),
    /// `name={expression}`
    Expr(Expr),
    /// Bare attribute with no value.
    Flag,
}
