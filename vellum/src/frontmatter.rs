use serde_yaml::Value;

/// Which artifact family a document compiles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    /// Free-form metadata + markdown body.
    Command,
    /// Mandatory name/description, optional capability list and color tag.
    Agent,
    /// Exports a single component for other documents to import.
    Component,
    /// Generates the shell+sqlite CRUD script family.
    State,
}

/// Parsed front-matter metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub kind: DocKind,
    pub name: Option<String>,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    pub color: Option<String>,
    /// Every key except `kind`, stringified, in authored order.
    /// Command documents emit these verbatim.
    pub fields: Vec<(String, String)>,
}

impl FrontMatter {
    pub fn empty() -> Self {
        FrontMatter {
            kind: DocKind::Command,
            name: None,
            description: None,
            capabilities: Vec::new(),
            color: None,
            fields: Vec::new(),
        }
    }
}

/// Split a leading `---`-delimited front-matter block off the source.
/// Returns the YAML text (without delimiters) and the byte offset where the
/// body starts. A document without a closed block is all body.
pub fn split(source: &str) -> (Option<&str>, usize) {
    let Some(rest) = source.strip_prefix("---\n") else {
        return (None, 0);
    };
    let mut pos = 0;
    loop {
        let end = rest[pos..].find('\n').map(|i| pos + i).unwrap_or(rest.len());
        let line = &rest[pos..end];
        if line.trim_end() == "---" {
            let yaml = &rest[..pos];
            // Skip the delimiter line and its newline, if present.
            let body = 4 + if end < rest.len() { end + 1 } else { rest.len() };
            return (Some(yaml), body.min(source.len()));
        }
        if end == rest.len() {
            return (None, 0);
        }
        pos = end + 1;
    }
}

/// Parse the YAML text of a front-matter block.
/// Key order is preserved; unknown keys are kept as free-form fields.
pub fn parse(yaml: &str) -> Result<FrontMatter, String> {
    let mapping: serde_yaml::Mapping = if yaml.trim().is_empty() {
        serde_yaml::Mapping::new()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| format!("invalid front matter: {}", e))?
    };

    let mut meta = FrontMatter::empty();

    for (key, value) in &mapping {
        let Some(key) = key.as_str() else {
            return Err("front-matter keys must be strings".to_string());
        };
        match key {
            "kind" => {
                let kind = value.as_str().unwrap_or_default();
                meta.kind = match kind {
                    "command" => DocKind::Command,
                    "agent" => DocKind::Agent,
                    "component" => DocKind::Component,
                    "state" => DocKind::State,
                    other => {
                        return Err(format!(
                            "unknown document kind '{}' (expected command, agent, component, or state)",
                            other
                        ));
                    }
                };
            }
            _ => {
                let text = scalar_text(key, value)?;
                match key {
                    "name" => meta.name = Some(text.clone()),
                    "description" => meta.description = Some(text.clone()),
                    "capabilities" => {
                        meta.capabilities =
                            text.split(',').map(|s| s.trim().to_string()).collect();
                    }
                    "color" => meta.color = Some(text.clone()),
                    _ => {}
                }
                meta.fields.push((key.to_string(), text));
            }
        }
    }

    Ok(meta)
}

/// Render a scalar (or list-of-scalars) metadata value as plain text.
fn scalar_text(key: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Sequence(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(scalar_text(key, item)?);
            }
            Ok(parts.join(", "))
        }
        _ => Err(format!(
            "front-matter value for '{}' must be a scalar or a list of scalars",
            key
        )),
    }
}
