use std::collections::HashMap;
use std::ops::Range;

use vellum::expr::Expr;

use crate::ir::Block;

/// What a component parameter is bound to during one expansion.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Plain text from a string attribute or a declared default.
    Text(String),
    /// The resolved expression from an `attr={...}` attribute.
    Expr(Expr),
}

/// Scoped state for one component expansion: the parameter bindings plus the
/// caller-supplied children, already lowered in the caller's context.
/// Saved and restored around every nested expansion, so bindings never bleed
/// between call sites.
#[derive(Debug, Clone)]
pub struct CompositionContext {
    bindings: HashMap<String, Binding>,
    children: Vec<Block>,
    /// Source file the component body was declared in.
    pub source_id: usize,
    /// Span of the call site, used for errors inside body content that
    /// carries no span of its own.
    pub call_span: Range<usize>,
}

impl CompositionContext {
    pub fn new(source_id: usize, call_span: Range<usize>) -> Self {
        CompositionContext {
            bindings: HashMap::new(),
            children: Vec::new(),
            source_id,
            call_span,
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Binding) {
        self.bindings.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn set_children(&mut self, children: Vec<Block>) {
        self.children = children;
    }

    pub fn children(&self) -> &[Block] {
        &self.children
    }
}

/// Names of the components currently being expanded, innermost last.
/// Detects direct and transitive self-reference before it can recurse.
#[derive(Debug, Default)]
pub struct ExpansionStack {
    names: Vec<String>,
}

impl ExpansionStack {
    pub fn new() -> Self {
        ExpansionStack { names: Vec::new() }
    }

    /// Record entry into an expansion, failing if the component is already
    /// being expanded somewhere up the stack.
    pub fn enter(&mut self, name: &str) -> Result<(), String> {
        if self.names.iter().any(|n| n == name) {
            let mut chain: Vec<&str> = self.names.iter().map(|n| n.as_str()).collect();
            chain.push(name);
            return Err(format!(
                "component <{}> expands into itself ({})",
                name,
                chain.join(" -> ")
            ));
        }
        self.names.push(name.to_string());
        Ok(())
    }

    pub fn leave(&mut self) {
        self.names.pop();
    }
}
