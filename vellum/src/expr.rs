use std::fmt;

/// A compile-time handle on a host-visible value: a stable root name plus an
/// accumulated property-access path. Handles are immutable; extending the
/// path always produces a new handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub root: String,
    pub path: Vec<String>,
}

impl Handle {
    pub fn new(root: impl Into<String>) -> Self {
        Handle {
            root: root.into(),
            path: Vec::new(),
        }
    }

    /// Extend the access path by one field, returning a new handle.
    pub fn get(&self, field: impl Into<String>) -> Handle {
        let mut path = self.path.clone();
        path.push(field.into());
        Handle {
            root: self.root.clone(),
            path,
        }
    }

    /// The flattened shell variable name for this handle:
    /// path segments joined to the root with underscores.
    pub fn shell_name(&self) -> String {
        let mut name = self.root.clone();
        for segment in &self.path {
            name.push('_');
            name.push_str(segment);
        }
        name
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// A literal value in an attribute expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    /// `{key: literal, ...}`, used for typed invocation inputs.
    Object(Vec<(String, Literal)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        };
        write!(f, "{}", s)
    }
}

/// An attribute expression: a boolean/comparison tree over handles and
/// literals. Built once per site during parsing, never mutated afterward.
/// A bare handle in boolean context means "truthy check".
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ref(Handle),
    Lit(Literal),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}
