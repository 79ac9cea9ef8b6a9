use vellum::ast::{ColumnAlignment, Inline};
use vellum::expr::Literal;
use vellum::frontmatter::{DocKind, FrontMatter};

use crate::ir::{AssignSource, Block, InputValue, LoopLimit, Payload};
use crate::shell;

/// Serialize a compiled document: front matter, a blank line, then the body.
/// Block siblings are joined with a blank line; tight groups use a single
/// newline. The output is a pure function of the IR.
pub fn render_document(meta: &FrontMatter, blocks: &[Block]) -> String {
    let mut out = String::new();

    match meta.kind {
        DocKind::Agent => {
            out.push_str("---\n");
            out.push_str(&format!("name: {}\n", meta.name.as_deref().unwrap_or_default()));
            out.push_str(&format!(
                "description: {}\n",
                meta.description.as_deref().unwrap_or_default()
            ));
            if !meta.capabilities.is_empty() {
                out.push_str(&format!("capabilities: {}\n", meta.capabilities.join(", ")));
            }
            if let Some(color) = &meta.color {
                out.push_str(&format!("color: {}\n", color));
            }
            out.push_str("---\n");
        }
        DocKind::Command => {
            if !meta.fields.is_empty() {
                out.push_str("---\n");
                for (key, value) in &meta.fields {
                    out.push_str(&format!("{}: {}\n", key, value));
                }
                out.push_str("---\n");
            }
        }
        // These kinds never reach the document emitter.
        DocKind::Component | DocKind::State => {}
    }

    let body = join_blocks(blocks, "\n\n");
    if !out.is_empty() && !body.is_empty() {
        out.push('\n');
    }
    out.push_str(&body);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

pub fn join_blocks(blocks: &[Block], sep: &str) -> String {
    blocks
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join(sep)
}

pub fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, content } => {
            format!("{} {}", "#".repeat(*level as usize), render_inlines(content))
        }

        Block::Paragraph(content) => render_inlines(content),

        Block::List {
            ordered,
            start,
            items,
        } => {
            let mut lines: Vec<String> = Vec::new();
            for (idx, item) in items.iter().enumerate() {
                let marker = if *ordered {
                    format!("{}. ", start + idx as u64)
                } else {
                    "- ".to_string()
                };
                let body = join_blocks(item, "\n");
                if body.is_empty() {
                    lines.push(marker.trim_end().to_string());
                    continue;
                }
                let indent = " ".repeat(marker.len());
                for (line_idx, line) in body.lines().enumerate() {
                    if line_idx == 0 {
                        lines.push(format!("{}{}", marker, line));
                    } else if line.is_empty() {
                        lines.push(String::new());
                    } else {
                        lines.push(format!("{}{}", indent, line));
                    }
                }
            }
            lines.join("\n")
        }

        Block::Table {
            alignments,
            headers,
            rows,
        } => render_table(alignments, headers, rows),

        Block::CodeBlock { language, content } => {
            let mut out = String::from("```");
            if let Some(lang) = language {
                out.push_str(lang);
            }
            out.push('\n');
            out.push_str(content);
            if !content.is_empty() && !content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```");
            out
        }

        Block::Quote(children) => prefix_lines(&join_blocks(children, "\n\n"), "> "),

        Block::Wrapper {
            tag,
            attrs,
            children,
        } => {
            let mut open = format!("<{}", tag);
            for (name, value) in attrs {
                open.push_str(&format!(" {}=\"{}\"", name, value));
            }
            open.push('>');
            let inner = join_blocks(children, "\n\n");
            if inner.is_empty() {
                format!("{}\n</{}>", open, tag)
            } else {
                format!("{}\n{}\n</{}>", open, inner, tag)
            }
        }

        Block::Raw(text) => text.clone(),

        Block::Group(children) => join_blocks(children, "\n"),

        Block::If {
            test,
            then_blocks,
            else_blocks,
        } => {
            let mut out = format!(
                "**If {}:**\n\n{}",
                shell::test_fragment(test),
                join_blocks(then_blocks, "\n\n")
            );
            if let Some(else_blocks) = else_blocks {
                out.push_str(&format!("\n\n**Else:**\n\n{}", join_blocks(else_blocks, "\n\n")));
            }
            out
        }

        Block::Loop {
            limit,
            counter,
            body,
        } => {
            let bound = match limit {
                LoopLimit::Count(n) => n.to_string(),
                LoopLimit::Ref(handle) => shell::var_ref(handle),
            };
            let header = match counter {
                Some(name) => format!(
                    "**Repeat (at most {} times, counter ${{{}}}):**",
                    bound, name
                ),
                None => format!("**Repeat (at most {} times):**", bound),
            };
            format!("{}\n\n{}", header, join_blocks(body, "\n\n"))
        }

        Block::Break => "**Stop repeating.**".to_string(),

        Block::Return => "**Stop.**".to_string(),

        Block::Ask {
            question,
            options,
            var,
        } => {
            let mut out = format!("**Ask the user:** {}\n\n", question);
            for (idx, option) in options.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", idx + 1, option));
            }
            out.push('\n');
            out.push_str(&format!("Store the selected option in ${{{}}}.", var));
            out
        }

        Block::Invoke {
            agent,
            model,
            description,
            payload,
        } => {
            let header = match model {
                Some(model) => format!(
                    "**Delegate to `{}` (model: {}):** {}",
                    agent, model, description
                ),
                None => format!("**Delegate to `{}`:** {}", agent, description),
            };
            match payload {
                Payload::Prompt(blocks) => {
                    format!("{}\n\n{}", header, prefix_lines(&join_blocks(blocks, "\n\n"), "> "))
                }
                Payload::Input(InputValue::Ref(handle)) => {
                    format!("{}\n\nInput: `{}`", header, shell::var_ref(handle))
                }
                Payload::Input(InputValue::Lit(lit)) => match lit {
                    Literal::Object(_) => {
                        let json = serde_json::to_string_pretty(&literal_json(lit))
                            .expect("json rendering cannot fail");
                        format!("{}\n\nInput:\n\n```json\n{}\n```", header, json)
                    }
                    _ => format!("{}\n\nInput: `{}`", header, literal_json(lit)),
                },
            }
        }

        Block::Assign { var, source } => {
            format!("```bash\n{}\n```", assignment(var, source))
        }
    }
}

/// The single shell assignment line for a variable binding.
pub fn assignment(var: &str, source: &AssignSource) -> String {
    match source {
        AssignSource::Literal(value) => format!("{}={}", var, shell::quote(value)),
        AssignSource::Command(command) => format!("{}=\"$({})\"", var, command),
        AssignSource::Env(name) => format!("{}=\"${{{}}}\"", var, name),
    }
}

pub fn render_inlines(inlines: &[Inline]) -> String {
    inlines.iter().map(|inline| inline.to_string()).collect()
}

fn render_table(
    alignments: &[ColumnAlignment],
    headers: &[Vec<Inline>],
    rows: &[Vec<Vec<Inline>>],
) -> String {
    let mut out = String::new();

    out.push('|');
    for header in headers {
        out.push_str(&format!(" {} |", render_inlines(header)));
    }
    out.push('\n');

    out.push('|');
    for idx in 0..headers.len() {
        let marker = match alignments.get(idx).copied().unwrap_or(ColumnAlignment::None) {
            ColumnAlignment::None => "---",
            ColumnAlignment::Left => ":---",
            ColumnAlignment::Center => ":---:",
            ColumnAlignment::Right => "---:",
        };
        out.push_str(&format!(" {} |", marker));
    }

    for row in rows {
        out.push('\n');
        out.push('|');
        for cell in row {
            out.push_str(&format!(" {} |", render_inlines(cell)));
        }
    }

    out
}

fn prefix_lines(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                prefix.trim_end().to_string()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A literal as a JSON value, for typed invocation inputs.
pub fn literal_json(lit: &Literal) -> serde_json::Value {
    match lit {
        Literal::Str(s) => serde_json::Value::String(s.clone()),
        Literal::Int(n) => serde_json::Value::from(*n),
        Literal::Bool(b) => serde_json::Value::from(*b),
        Literal::Object(entries) => {
            let map: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(key, value)| (key.clone(), literal_json(value)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// A literal as plain text, for placeholder substitution.
pub fn literal_text(lit: &Literal) -> String {
    match lit {
        Literal::Str(s) => s.clone(),
        Literal::Int(n) => n.to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Object(_) => literal_json(lit).to_string(),
    }
}
