use vellum::ast::{ColumnAlignment, Inline};
use vellum::expr::{Expr, Handle, Literal};

/// Block-level IR. The emitter and every other consumer match this
/// exhaustively, so adding a kind without updating them fails the build.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    Paragraph(Vec<Inline>),
    List {
        ordered: bool,
        start: u64,
        items: Vec<Vec<Block>>,
    },
    Table {
        alignments: Vec<ColumnAlignment>,
        headers: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    CodeBlock {
        language: Option<String>,
        content: String,
    },
    Quote(Vec<Block>),
    /// A named wrapper emitted as literal open/close tags around its children.
    Wrapper {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Block>,
    },
    /// Verbatim passthrough text.
    Raw(String),
    /// Sibling blocks emitted with tight (single-newline) spacing.
    /// Produced when a component body expands to more than one block.
    Group(Vec<Block>),

    If {
        test: Expr,
        then_blocks: Vec<Block>,
        else_blocks: Option<Vec<Block>>,
    },
    Loop {
        limit: LoopLimit,
        counter: Option<String>,
        body: Vec<Block>,
    },
    Break,
    Return,
    Ask {
        question: String,
        options: Vec<String>,
        var: String,
    },
    Invoke {
        agent: String,
        model: Option<String>,
        description: String,
        payload: Payload,
    },
    Assign {
        var: String,
        source: AssignSource,
    },
}

/// Loop iteration bound: a literal count or a handle resolved by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopLimit {
    Count(i64),
    Ref(Handle),
}

/// What an invocation hands to the target: free-form prompt content or a
/// typed input value. Exactly one, enforced at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Prompt(Vec<Block>),
    Input(InputValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Ref(Handle),
    Lit(Literal),
}

/// Where an assignment's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignSource {
    Literal(String),
    Command(String),
    Env(String),
}

impl Block {
    /// A conditional node. The then-arm must be non-empty; an else-arm, if
    /// present, must be non-empty too.
    pub fn conditional(
        test: Expr,
        then_blocks: Vec<Block>,
        else_blocks: Option<Vec<Block>>,
    ) -> Result<Block, String> {
        if then_blocks.is_empty() {
            return Err("a conditional needs child content".to_string());
        }
        if matches!(&else_blocks, Some(blocks) if blocks.is_empty()) {
            return Err("an else arm needs child content".to_string());
        }
        Ok(Block::If {
            test,
            then_blocks,
            else_blocks,
        })
    }

    /// A bounded loop node. Unbounded iteration does not exist: a literal
    /// bound must be at least 1, and the body must be non-empty.
    pub fn repeat(
        limit: LoopLimit,
        counter: Option<String>,
        body: Vec<Block>,
    ) -> Result<Block, String> {
        if let LoopLimit::Count(n) = limit {
            if n < 1 {
                return Err(format!("loop bound must be at least 1, got {}", n));
            }
        }
        if body.is_empty() {
            return Err("a loop needs child content".to_string());
        }
        Ok(Block::Loop {
            limit,
            counter,
            body,
        })
    }

    /// A user-prompt node with 2-4 labeled options.
    pub fn ask(question: String, options: Vec<String>, var: String) -> Result<Block, String> {
        if question.trim().is_empty() {
            return Err("a prompt needs a question".to_string());
        }
        if !(2..=4).contains(&options.len()) {
            return Err(format!(
                "a prompt needs between 2 and 4 options, got {}",
                options.len()
            ));
        }
        Ok(Block::Ask {
            question,
            options,
            var,
        })
    }

    /// An external-process invocation node.
    pub fn invoke(
        agent: String,
        model: Option<String>,
        description: String,
        payload: Payload,
    ) -> Result<Block, String> {
        if agent.trim().is_empty() {
            return Err("an invocation needs a target agent".to_string());
        }
        if matches!(&payload, Payload::Prompt(blocks) if blocks.is_empty()) {
            return Err("an invocation needs prompt content or an input value".to_string());
        }
        Ok(Block::Invoke {
            agent,
            model,
            description,
            payload,
        })
    }

    /// A variable-assignment node. The name must be a shell identifier.
    pub fn assign(var: String, source: AssignSource) -> Result<Block, String> {
        if !is_identifier(&var) {
            return Err(format!("'{}' is not a valid variable name", var));
        }
        Ok(Block::Assign { var, source })
    }
}

/// True for names usable as shell variables: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
