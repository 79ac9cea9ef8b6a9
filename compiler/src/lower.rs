use std::ops::Range;

use vellum::ast::{Inline, Node};
use vellum::element::{AttrValue, Element};
use vellum::expr::{Expr, Literal};

use crate::context::{Binding, CompositionContext, ExpansionStack};
use crate::emit;
use crate::error::CompileError;
use crate::ir::{AssignSource, Block, InputValue, LoopLimit, Payload, is_identifier};
use crate::registry::ComponentRegistry;
use crate::shell;

/// Walks the parsed component tree and produces IR: markdown nodes map
/// directly, built-in elements compile to control-flow/side-effect nodes,
/// and component references expand through the registry. Each conversion is
/// pure; document order is the only ordering.
pub struct Lowerer<'a> {
    registry: &'a ComponentRegistry,
    source_id: usize,
    ctx_stack: Vec<CompositionContext>,
    expansion: ExpansionStack,
    loop_depth: usize,
}

impl<'a> Lowerer<'a> {
    pub fn new(registry: &'a ComponentRegistry, source_id: usize) -> Self {
        Lowerer {
            registry,
            source_id,
            ctx_stack: Vec::new(),
            expansion: ExpansionStack::new(),
            loop_depth: 0,
        }
    }

    pub fn lower_document(&mut self, nodes: &[Node]) -> Result<Vec<Block>, CompileError> {
        self.lower_nodes(nodes)
    }

    /// The file the content currently being lowered was written in.
    fn sid(&self) -> usize {
        self.ctx_stack
            .last()
            .map(|ctx| ctx.source_id)
            .unwrap_or(self.source_id)
    }

    /// Fallback span for content that carries no span of its own: the call
    /// site of the expansion in progress.
    fn err_span(&self) -> Range<usize> {
        self.ctx_stack
            .last()
            .map(|ctx| ctx.call_span.clone())
            .unwrap_or(0..0)
    }

    fn lower_nodes(&mut self, nodes: &[Node]) -> Result<Vec<Block>, CompileError> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                Node::Element(el) => self.lower_element(el, &mut out)?,
                Node::Heading { level, content } => out.push(Block::Heading {
                    level: *level,
                    content: self.subst_inlines(content)?,
                }),
                Node::Paragraph(inlines) => {
                    out.push(Block::Paragraph(self.subst_inlines(inlines)?));
                }
                Node::CodeBlock { language, content } => out.push(Block::CodeBlock {
                    language: language.clone(),
                    content: self.subst_text(content, self.err_span())?,
                }),
                Node::Quote(inner) => out.push(Block::Quote(self.lower_nodes(inner)?)),
                Node::List {
                    ordered,
                    start,
                    items,
                } => {
                    let mut lowered = Vec::with_capacity(items.len());
                    for item in items {
                        lowered.push(self.lower_nodes(item)?);
                    }
                    out.push(Block::List {
                        ordered: *ordered,
                        start: *start,
                        items: lowered,
                    });
                }
                Node::Table {
                    alignments,
                    headers,
                    rows,
                } => {
                    let mut header_cells = Vec::with_capacity(headers.len());
                    for cell in headers {
                        header_cells.push(self.subst_inlines(cell)?);
                    }
                    let mut row_cells = Vec::with_capacity(rows.len());
                    for row in rows {
                        let mut cells = Vec::with_capacity(row.len());
                        for cell in row {
                            cells.push(self.subst_inlines(cell)?);
                        }
                        row_cells.push(cells);
                    }
                    out.push(Block::Table {
                        alignments: alignments.clone(),
                        headers: header_cells,
                        rows: row_cells,
                    });
                }
                Node::Raw(text) => {
                    out.push(Block::Raw(self.subst_text(text, self.err_span())?));
                }
            }
        }
        Ok(out)
    }

    fn lower_element(&mut self, el: &Element, out: &mut Vec<Block>) -> Result<(), CompileError> {
        match el.tag.as_str() {
            "If" => {
                let block = self.lower_if(el)?;
                out.push(block);
            }
            "Else" => {
                return Err(self.structural("found <Else> outside an <If> element", el));
            }
            "Loop" => {
                let block = self.lower_loop(el)?;
                out.push(block);
            }
            "Break" => {
                self.no_children(el)?;
                if self.loop_depth == 0 {
                    return Err(self.structural("<Break /> is only valid inside a <Loop>", el));
                }
                out.push(Block::Break);
            }
            "Return" => {
                self.no_children(el)?;
                out.push(Block::Return);
            }
            "Ask" => {
                let block = self.lower_ask(el)?;
                out.push(block);
            }
            "Option" => {
                return Err(self.structural("found <Option> outside an <Ask> element", el));
            }
            "Invoke" => {
                let block = self.lower_invoke(el)?;
                out.push(block);
            }
            "Let" => {
                let block = self.lower_let(el)?;
                out.push(block);
            }
            "Children" => {
                let Some(ctx) = self.ctx_stack.last() else {
                    return Err(self.structural(
                        "<Children /> is only valid inside a component body",
                        el,
                    ));
                };
                // Spread: the caller's blocks land as siblings here.
                out.extend_from_slice(ctx.children());
            }
            "Param" => {
                return Err(
                    self.structural("found <Param> outside a <Component> declaration", el)
                );
            }
            "Component" | "Import" => {
                return Err(self.structural(
                    format!("<{}> must appear at the top level of a document", el.tag),
                    el,
                ));
            }
            _ if el.is_wrapper() => {
                let mut attrs = Vec::with_capacity(el.attrs.len());
                for attr in &el.attrs {
                    match &attr.value {
                        AttrValue::Str(s) => {
                            attrs.push((attr.name.clone(), self.subst_text(s, el.span.clone())?));
                        }
                        _ => {
                            return Err(self.structural(
                                format!(
                                    "wrapper attribute '{}' must be a quoted string",
                                    attr.name
                                ),
                                el,
                            ));
                        }
                    }
                }
                let children = self.lower_nodes(&el.children)?;
                out.push(Block::Wrapper {
                    tag: el.tag.clone(),
                    attrs,
                    children,
                });
            }
            _ if el.is_component_ref() => {
                self.expand_component(el, out)?;
            }
            other => {
                return Err(self.structural(format!("unrecognized element <{}>", other), el));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Built-in elements
    // -----------------------------------------------------------------------

    fn lower_if(&mut self, el: &Element) -> Result<Block, CompileError> {
        let test = self.require_expr_attr(el, "test")?;
        self.validate_condition(&test, el)?;

        // An <Else /> separator (or a paired <Else> wrapper) splits the arms.
        let mut then_nodes: Vec<Node> = Vec::new();
        let mut else_nodes: Option<Vec<Node>> = None;
        for child in &el.children {
            if let Node::Element(inner) = child {
                if inner.tag == "Else" {
                    if else_nodes.is_some() {
                        return Err(self.structural("an <If> can only have one <Else>", el));
                    }
                    else_nodes = Some(inner.children.clone());
                    continue;
                }
            }
            match &mut else_nodes {
                Some(nodes) => nodes.push(child.clone()),
                None => then_nodes.push(child.clone()),
            }
        }

        let then_blocks = self.lower_nodes(&then_nodes)?;
        let else_blocks = match else_nodes {
            Some(nodes) => Some(self.lower_nodes(&nodes)?),
            None => None,
        };

        Block::conditional(test, then_blocks, else_blocks)
            .map_err(|message| self.structural(message, el))
    }

    fn lower_loop(&mut self, el: &Element) -> Result<Block, CompileError> {
        let limit = match self.require_expr_attr(el, "max")? {
            Expr::Lit(Literal::Int(n)) => LoopLimit::Count(n),
            Expr::Ref(handle) => LoopLimit::Ref(handle),
            _ => {
                return Err(self.structural(
                    "the loop bound must be an integer or a variable reference",
                    el,
                ));
            }
        };
        let counter = self.opt_str_attr(el, "counter")?;
        if let Some(name) = &counter {
            if !is_identifier(name) {
                return Err(self.structural(
                    format!("'{}' is not a valid counter name", name),
                    el,
                ));
            }
        }

        self.loop_depth += 1;
        let body = self.lower_nodes(&el.children);
        self.loop_depth -= 1;

        Block::repeat(limit, counter, body?).map_err(|message| self.structural(message, el))
    }

    fn lower_ask(&mut self, el: &Element) -> Result<Block, CompileError> {
        let var = self.require_str_attr(el, "var")?;
        if !is_identifier(&var) {
            return Err(self.structural(format!("'{}' is not a valid variable name", var), el));
        }
        let question = self.require_str_attr(el, "question")?;

        let mut options = Vec::new();
        for child in &el.children {
            match child {
                Node::Element(option) if option.tag == "Option" => {
                    options.push(self.require_str_attr(option, "label")?);
                }
                _ => {
                    return Err(
                        self.structural("only <Option /> elements are allowed inside <Ask>", el)
                    );
                }
            }
        }

        Block::ask(question, options, var).map_err(|message| self.structural(message, el))
    }

    fn lower_invoke(&mut self, el: &Element) -> Result<Block, CompileError> {
        let agent = self.require_str_attr(el, "agent")?;
        let model = self.opt_str_attr(el, "model")?;
        let description = self.require_str_attr(el, "description")?;

        let input = match el.attr("input") {
            None => None,
            Some(AttrValue::Str(s)) => Some(InputValue::Lit(Literal::Str(
                self.subst_text(s, el.span.clone())?,
            ))),
            Some(AttrValue::Expr(expr)) => {
                match self.resolve_expr(expr, el.span.clone())? {
                    Expr::Ref(handle) => Some(InputValue::Ref(handle)),
                    Expr::Lit(lit) => Some(InputValue::Lit(lit)),
                    _ => {
                        return Err(CompileError::value(
                            "an invocation input must be a value, not a condition",
                            el.span.clone(),
                            self.sid(),
                        ));
                    }
                }
            }
            Some(AttrValue::Flag) => {
                return Err(self.structural("the input attribute needs a value", el));
            }
        };

        let prompt = self.lower_nodes(&el.children)?;
        let payload = match (input, prompt.is_empty()) {
            (Some(value), true) => Payload::Input(value),
            (None, false) => Payload::Prompt(prompt),
            (Some(_), false) => {
                return Err(self.structural(
                    "an invocation takes either prompt content or an input value, not both",
                    el,
                ));
            }
            (None, true) => {
                return Err(self.structural(
                    "an invocation needs prompt content or an input value",
                    el,
                ));
            }
        };

        Block::invoke(agent, model, description, payload)
            .map_err(|message| self.structural(message, el))
    }

    fn lower_let(&mut self, el: &Element) -> Result<Block, CompileError> {
        self.no_children(el)?;
        let var = self.require_str_attr(el, "var")?;

        let mut sources = Vec::new();
        if let Some(value) = self.opt_str_attr(el, "value")? {
            sources.push(AssignSource::Literal(value));
        }
        if let Some(command) = self.opt_str_attr(el, "command")? {
            sources.push(AssignSource::Command(command));
        }
        if let Some(env) = self.opt_str_attr(el, "env")? {
            if !is_identifier(&env) {
                return Err(self.structural(
                    format!("'{}' is not a valid environment variable name", env),
                    el,
                ));
            }
            sources.push(AssignSource::Env(env));
        }

        if sources.len() != 1 {
            return Err(self.structural(
                "a <Let> needs exactly one of value, command, or env",
                el,
            ));
        }

        Block::assign(var, sources.remove(0)).map_err(|message| self.structural(message, el))
    }

    // -----------------------------------------------------------------------
    // Component expansion
    // -----------------------------------------------------------------------

    fn expand_component(&mut self, el: &Element, out: &mut Vec<Block>) -> Result<(), CompileError> {
        let sid = self.sid();
        let def = self.registry.get(&el.tag).ok_or_else(|| {
            CompileError::resolution(
                format!("unknown component <{}>", el.tag),
                el.span.clone(),
                sid,
            )
            .with_note("components are declared with <Component> or brought in with <Import>")
        })?;

        // Children belong to the caller: lower them under the current
        // context, before the expansion identity is recorded.
        let children_blocks = self.lower_nodes(&el.children)?;

        self.expansion
            .enter(&el.tag)
            .map_err(|message| CompileError::resolution(message, el.span.clone(), sid))?;
        let result = self.expand_body(el, def, children_blocks);
        self.expansion.leave();

        let mut blocks = result?;
        match blocks.len() {
            0 => {}
            1 => out.push(blocks.remove(0)),
            // A fragment body: group it so the emitter keeps it tight.
            _ => out.push(Block::Group(blocks)),
        }
        Ok(())
    }

    fn expand_body(
        &mut self,
        el: &Element,
        def: &crate::registry::Definition,
        children_blocks: Vec<Block>,
    ) -> Result<Vec<Block>, CompileError> {
        let sid = self.sid();

        for attr in &el.attrs {
            if !def.params.iter().any(|p| p.name == attr.name) {
                return Err(CompileError::structural(
                    format!("component <{}> has no parameter '{}'", el.tag, attr.name),
                    attr.span.clone(),
                    sid,
                ));
            }
        }

        let mut ctx = CompositionContext::new(def.source_id, el.span.clone());
        for param in &def.params {
            match el.attr(&param.name) {
                Some(AttrValue::Str(s)) => {
                    let text = self.subst_text(s, el.span.clone())?;
                    ctx.bind(&param.name, Binding::Text(text));
                }
                Some(AttrValue::Expr(expr)) => {
                    let resolved = self.resolve_expr(expr, el.span.clone())?;
                    ctx.bind(&param.name, Binding::Expr(resolved));
                }
                Some(AttrValue::Flag) => {
                    ctx.bind(&param.name, Binding::Expr(Expr::Lit(Literal::Bool(true))));
                }
                None => match &param.default {
                    Some(default) => ctx.bind(&param.name, Binding::Text(default.clone())),
                    None => {
                        return Err(CompileError::structural(
                            format!(
                                "component <{}> requires parameter '{}'",
                                el.tag, param.name
                            ),
                            el.span.clone(),
                            sid,
                        ));
                    }
                },
            }
        }
        ctx.set_children(children_blocks);

        self.ctx_stack.push(ctx);
        let body = self.lower_nodes(&def.body);
        self.ctx_stack.pop();
        body
    }

    // -----------------------------------------------------------------------
    // Parameter substitution
    // -----------------------------------------------------------------------

    /// Substitute `{ident}` placeholders that name a parameter of the
    /// innermost expansion in progress. Everything else, host placeholders
    /// included, is copied verbatim.
    fn subst_text(&self, text: &str, span: Range<usize>) -> Result<String, CompileError> {
        let Some(ctx) = self.ctx_stack.last() else {
            return Ok(text.to_string());
        };

        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '{' {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                if j > i + 1 && chars.get(j) == Some(&'}') {
                    let name: String = chars[i + 1..j].iter().collect();
                    if let Some(binding) = ctx.lookup(&name) {
                        out.push_str(&self.render_binding(&name, binding, &span)?);
                        i = j + 1;
                        continue;
                    }
                }
            }
            out.push(chars[i]);
            i += 1;
        }
        Ok(out)
    }

    fn render_binding(
        &self,
        name: &str,
        binding: &Binding,
        span: &Range<usize>,
    ) -> Result<String, CompileError> {
        match binding {
            Binding::Text(s) => Ok(s.clone()),
            Binding::Expr(Expr::Lit(lit)) => Ok(emit::literal_text(lit)),
            Binding::Expr(Expr::Ref(handle)) => Ok(shell::var_ref(handle)),
            Binding::Expr(_) => Err(CompileError::value(
                format!("parameter '{}' is bound to a condition and cannot be used as text", name),
                span.clone(),
                self.sid(),
            )),
        }
    }

    fn subst_inlines(&self, inlines: &[Inline]) -> Result<Vec<Inline>, CompileError> {
        let span = self.err_span();
        let mut out = Vec::with_capacity(inlines.len());
        for inline in inlines {
            out.push(match inline {
                Inline::Text(s) => Inline::Text(self.subst_text(s, span.clone())?),
                Inline::Code(s) => Inline::Code(self.subst_text(s, span.clone())?),
                Inline::Strong(children) => Inline::Strong(self.subst_inlines(children)?),
                Inline::Emphasis(children) => Inline::Emphasis(self.subst_inlines(children)?),
                Inline::Link { dest, content } => Inline::Link {
                    dest: self.subst_text(dest, span.clone())?,
                    content: self.subst_inlines(content)?,
                },
                Inline::SoftBreak => Inline::SoftBreak,
                Inline::HardBreak => Inline::HardBreak,
            });
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Expression resolution
    // -----------------------------------------------------------------------

    /// Resolve parameter references inside an attribute expression: a handle
    /// whose root names a parameter of the expansion in progress becomes that
    /// parameter's bound value, with any remaining path re-applied.
    fn resolve_expr(&self, expr: &Expr, span: Range<usize>) -> Result<Expr, CompileError> {
        match expr {
            Expr::Ref(handle) => {
                let Some(ctx) = self.ctx_stack.last() else {
                    return Ok(expr.clone());
                };
                let Some(binding) = ctx.lookup(&handle.root) else {
                    return Ok(expr.clone());
                };
                match binding {
                    Binding::Text(s) => {
                        if handle.path.is_empty() {
                            Ok(Expr::Lit(Literal::Str(s.clone())))
                        } else {
                            Err(CompileError::value(
                                format!(
                                    "parameter '{}' is text and has no field '{}'",
                                    handle.root, handle.path[0]
                                ),
                                span,
                                self.sid(),
                            ))
                        }
                    }
                    Binding::Expr(bound) => {
                        if handle.path.is_empty() {
                            Ok(bound.clone())
                        } else if let Expr::Ref(base) = bound {
                            let mut extended = base.clone();
                            for field in &handle.path {
                                extended = extended.get(field);
                            }
                            Ok(Expr::Ref(extended))
                        } else {
                            Err(CompileError::value(
                                format!("parameter '{}' has no fields to access", handle.root),
                                span,
                                self.sid(),
                            ))
                        }
                    }
                }
            }
            Expr::Lit(_) => Ok(expr.clone()),
            Expr::Not(inner) => Ok(Expr::Not(Box::new(self.resolve_expr(inner, span)?))),
            Expr::And(left, right) => Ok(Expr::And(
                Box::new(self.resolve_expr(left, span.clone())?),
                Box::new(self.resolve_expr(right, span)?),
            )),
            Expr::Or(left, right) => Ok(Expr::Or(
                Box::new(self.resolve_expr(left, span.clone())?),
                Box::new(self.resolve_expr(right, span)?),
            )),
            Expr::Cmp { op, left, right } => Ok(Expr::Cmp {
                op: *op,
                left: Box::new(self.resolve_expr(left, span.clone())?),
                right: Box::new(self.resolve_expr(right, span)?),
            }),
        }
    }

    /// Reject condition shapes the shell rendering has no meaning for.
    fn validate_condition(&self, expr: &Expr, el: &Element) -> Result<(), CompileError> {
        match expr {
            Expr::Ref(_) => Ok(()),
            Expr::Lit(Literal::Object(_)) => Err(CompileError::value(
                "an object literal cannot appear in a condition",
                el.span.clone(),
                self.sid(),
            )),
            Expr::Lit(_) => Ok(()),
            Expr::Not(inner) => self.validate_condition(inner, el),
            Expr::And(left, right) | Expr::Or(left, right) => {
                self.validate_condition(left, el)?;
                self.validate_condition(right, el)
            }
            Expr::Cmp { left, right, .. } => {
                for side in [left.as_ref(), right.as_ref()] {
                    match side {
                        Expr::Ref(_) => {}
                        Expr::Lit(Literal::Object(_)) => {
                            return Err(CompileError::value(
                                "an object literal cannot appear in a comparison",
                                el.span.clone(),
                                self.sid(),
                            ));
                        }
                        Expr::Lit(_) => {}
                        _ => {
                            return Err(CompileError::value(
                                "comparison operands must be values or variable references",
                                el.span.clone(),
                                self.sid(),
                            ));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Attribute helpers
    // -----------------------------------------------------------------------

    fn structural(&self, message: impl Into<String>, el: &Element) -> CompileError {
        CompileError::structural(message, el.span.clone(), self.sid())
    }

    fn no_children(&self, el: &Element) -> Result<(), CompileError> {
        if el.children.is_empty() {
            Ok(())
        } else {
            Err(self.structural(format!("a <{}> element takes no children", el.tag), el))
        }
    }

    fn require_str_attr(&self, el: &Element, name: &str) -> Result<String, CompileError> {
        match el.attr(name) {
            Some(AttrValue::Str(s)) => self.subst_text(s, el.span.clone()),
            Some(_) => Err(self.structural(
                format!("the {} attribute of <{}> must be a quoted string", name, el.tag),
                el,
            )),
            None => Err(self.structural(
                format!("<{}> needs a {} attribute", el.tag, name),
                el,
            )),
        }
    }

    fn opt_str_attr(&self, el: &Element, name: &str) -> Result<Option<String>, CompileError> {
        match el.attr(name) {
            None => Ok(None),
            Some(AttrValue::Str(s)) => Ok(Some(self.subst_text(s, el.span.clone())?)),
            Some(_) => Err(self.structural(
                format!("the {} attribute of <{}> must be a quoted string", name, el.tag),
                el,
            )),
        }
    }

    fn require_expr_attr(&self, el: &Element, name: &str) -> Result<Expr, CompileError> {
        match el.attr(name) {
            Some(AttrValue::Expr(expr)) => self.resolve_expr(expr, el.span.clone()),
            Some(_) => Err(self.structural(
                format!(
                    "the {} attribute of <{}> must be an expression: {}={{...}}",
                    name, el.tag, name
                ),
                el,
            )),
            None => Err(self.structural(
                format!("<{}> needs a {} attribute", el.tag, name),
                el,
            )),
        }
    }
}
