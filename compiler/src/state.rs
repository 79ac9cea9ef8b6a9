use std::path::PathBuf;

use vellum::SourceDoc;
use vellum::ast::Node;

use crate::Artifact;
use crate::emit::render_inlines;
use crate::error::CompileError;
use crate::ir::is_identifier;

/// Script variables the generated shell uses for itself.
const RESERVED_FIELDS: &[&str] = &["id", "db", "value"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldType {
    Text,
    Int,
    Bool,
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    ty: FieldType,
    default: String,
}

/// Compile a state document into its fixed script family: one shell+sqlite
/// artifact per operation (init, create, get, update, delete, list).
pub fn generate(doc: &SourceDoc) -> Result<Vec<Artifact>, CompileError> {
    let source_id = doc.source_id;
    let name = doc.meta.name.clone().ok_or_else(|| {
        CompileError::structural(
            "a state document needs a name",
            doc.meta_span.clone(),
            source_id,
        )
    })?;
    if !is_identifier(&name) {
        return Err(CompileError::structural(
            format!("'{}' is not a valid state name", name),
            doc.meta_span.clone(),
            source_id,
        ));
    }

    let fields = collect_fields(doc)?;

    let ops: [(&str, fn(&str, &[Field]) -> String); 6] = [
        ("init", init_script),
        ("create", create_script),
        ("get", get_script),
        ("update", update_script),
        ("delete", delete_script),
        ("list", list_script),
    ];

    Ok(ops
        .iter()
        .map(|(op, build)| Artifact {
            output_path: PathBuf::from(format!("state/{}.{}.sh", name, op)),
            text: build(&name, &fields),
        })
        .collect())
}

/// Pull the field declarations out of the body's field table.
fn collect_fields(doc: &SourceDoc) -> Result<Vec<Field>, CompileError> {
    let source_id = doc.source_id;
    let table = doc.nodes.iter().find_map(|node| match node {
        Node::Table { headers, rows, .. } => {
            let names: Vec<String> = headers
                .iter()
                .map(|cell| render_inlines(cell).trim().to_lowercase())
                .collect();
            if names.first().map(String::as_str) == Some("field")
                && names.get(1).map(String::as_str) == Some("type")
            {
                Some(rows)
            } else {
                None
            }
        }
        _ => None,
    });

    let rows = table.ok_or_else(|| {
        CompileError::structural(
            "a state document needs a field table (Field | Type | Default)",
            doc.meta_span.clone(),
            source_id,
        )
    })?;

    let mut fields = Vec::with_capacity(rows.len());
    for row in rows {
        let name = row
            .first()
            .map(|cell| render_inlines(cell).trim().to_string())
            .unwrap_or_default();
        if !is_identifier(&name) {
            return Err(CompileError::value(
                format!("'{}' is not a valid field name", name),
                doc.meta_span.clone(),
                source_id,
            ));
        }
        if RESERVED_FIELDS.contains(&name.as_str()) {
            return Err(CompileError::value(
                format!("field name '{}' is reserved", name),
                doc.meta_span.clone(),
                source_id,
            ));
        }

        let ty_text = row
            .get(1)
            .map(|cell| render_inlines(cell).trim().to_lowercase())
            .unwrap_or_default();
        let ty = match ty_text.as_str() {
            "text" => FieldType::Text,
            "int" => FieldType::Int,
            "bool" => FieldType::Bool,
            other => {
                return Err(CompileError::value(
                    format!("unknown field type '{}' (expected text, int, or bool)", other),
                    doc.meta_span.clone(),
                    source_id,
                ));
            }
        };

        let default = row
            .get(2)
            .map(|cell| render_inlines(cell).trim().to_string())
            .unwrap_or_default();
        validate_default(&name, ty, &default, doc)?;

        fields.push(Field { name, ty, default });
    }

    if fields.is_empty() {
        return Err(CompileError::structural(
            "a state document needs at least one field",
            doc.meta_span.clone(),
            source_id,
        ));
    }
    Ok(fields)
}

fn validate_default(
    name: &str,
    ty: FieldType,
    default: &str,
    doc: &SourceDoc,
) -> Result<(), CompileError> {
    let ok = match ty {
        FieldType::Text => true,
        FieldType::Int => default.is_empty() || default.parse::<i64>().is_ok(),
        FieldType::Bool => matches!(default, "" | "true" | "false" | "0" | "1"),
    };
    if ok {
        Ok(())
    } else {
        Err(CompileError::value(
            format!("'{}' is not a valid default for field '{}'", default, name),
            doc.meta_span.clone(),
            doc.source_id,
        ))
    }
}

// ---------------------------------------------------------------------------
// Script rendering
// ---------------------------------------------------------------------------

/// Double embedded single quotes, the SQL string-literal escape.
fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn column_sql(field: &Field) -> String {
    match field.ty {
        FieldType::Text => format!(
            "{} TEXT NOT NULL DEFAULT '{}'",
            field.name,
            sql_escape(&field.default)
        ),
        FieldType::Int => {
            let default = if field.default.is_empty() { "0" } else { &field.default };
            format!("{} INTEGER NOT NULL DEFAULT {}", field.name, default)
        }
        FieldType::Bool => {
            let default = match field.default.as_str() {
                "true" | "1" => "1",
                _ => "0",
            };
            format!("{} INTEGER NOT NULL DEFAULT {}", field.name, default)
        }
    }
}

fn preamble(name: &str, op: &str, usage_args: &str) -> String {
    let usage = if usage_args.is_empty() {
        format!("{}.{}.sh", name, op)
    } else {
        format!("{}.{}.sh {}", name, op, usage_args)
    };
    let mut out = String::new();
    out.push_str("#!/bin/sh\n");
    out.push_str("# generated by vellum; do not edit\n");
    out.push_str(&format!("# usage: {}\n", usage));
    out.push_str("set -eu\n\n");
    out.push_str(&format!("db=\"${{STATE_DB:-.vellum/{}.db}}\"\n", name));
    out
}

/// `arg=$(printf '%s' "$N" | sed ...)`: capture a positional argument with
/// its single quotes doubled for SQL.
fn capture_arg(var: &str, position: usize) -> String {
    format!(
        "{}=$(printf '%s' \"${{{}-}}\" | sed \"s/'/''/g\")",
        var, position
    )
}

fn init_script(name: &str, fields: &[Field]) -> String {
    let columns: Vec<String> = fields.iter().map(|f| format!("  {}", column_sql(f))).collect();
    let mut out = preamble(name, "init", "");
    out.push('\n');
    out.push_str("mkdir -p \"$(dirname \"$db\")\"\n\n");
    out.push_str("sqlite3 \"$db\" <<'SQL'\n");
    out.push_str(&format!("CREATE TABLE IF NOT EXISTS {} (\n", name));
    out.push_str("  id INTEGER PRIMARY KEY AUTOINCREMENT,\n");
    out.push_str(&columns.join(",\n"));
    out.push_str("\n);\nSQL\n");
    out
}

fn create_script(name: &str, fields: &[Field]) -> String {
    let usage: Vec<String> = fields.iter().map(|f| format!("<{}>", f.name)).collect();
    let captures: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(idx, f)| capture_arg(&f.name, idx + 1))
        .collect();
    let columns: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    let values: Vec<String> = fields.iter().map(|f| format!("'${}'", f.name)).collect();
    format!(
        "{}\n{}\n\nsqlite3 \"$db\" \"INSERT INTO {} ({}) VALUES ({});\"\n",
        preamble(name, "create", &usage.join(" ")),
        captures.join("\n"),
        name,
        columns.join(", "),
        values.join(", ")
    )
}

fn get_script(name: &str, _fields: &[Field]) -> String {
    format!(
        "{}\n{}\n\nsqlite3 \"$db\" \"SELECT * FROM {} WHERE id = '$id';\"\n",
        preamble(name, "get", "<id>"),
        capture_arg("id", 1),
        name
    )
}

fn update_script(name: &str, fields: &[Field]) -> String {
    let field_names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    format!(
        "{}\ncase \"${{2-}}\" in\n  {}) ;;\n  *) echo \"unknown field: ${{2-}}\" >&2; exit 2 ;;\nesac\n\n{}\n{}\n\nsqlite3 \"$db\" \"UPDATE {} SET ${{2}} = '$value' WHERE id = '$id';\"\n",
        preamble(name, "update", "<id> <field> <value>"),
        field_names.join("|"),
        capture_arg("id", 1),
        capture_arg("value", 3),
        name
    )
}

fn delete_script(name: &str, _fields: &[Field]) -> String {
    format!(
        "{}\n{}\n\nsqlite3 \"$db\" \"DELETE FROM {} WHERE id = '$id';\"\n",
        preamble(name, "delete", "<id>"),
        capture_arg("id", 1),
        name
    )
}

fn list_script(name: &str, _fields: &[Field]) -> String {
    format!(
        "{}\nsqlite3 \"$db\" \"SELECT * FROM {} ORDER BY id;\"\n",
        preamble(name, "list", ""),
        name
    )
}
