use vellum::expr::{CmpOp, Expr, Handle, Literal};

/// Escape a string for a double-quoted POSIX shell context and wrap it in
/// double quotes. Newlines are kept literal; the quoted form spans lines.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// The shell variable reference for a handle: `${root_field_...}`.
pub fn var_ref(handle: &Handle) -> String {
    format!("${{{}}}", handle.shell_name())
}

/// Render a condition tree as a POSIX test fragment whose exit status is the
/// condition's truth value. `&&` and `||` have equal precedence in the shell,
/// so nested combinations of different operators are grouped with `{ ...; }`.
pub fn test_fragment(expr: &Expr) -> String {
    match expr {
        // A bare reference is a truthy check: set and non-empty.
        Expr::Ref(handle) => format!("[ -n \"{}\" ]", var_ref(handle)),

        Expr::Lit(Literal::Bool(true)) => "true".to_string(),
        Expr::Lit(Literal::Bool(false)) => "false".to_string(),
        Expr::Lit(Literal::Int(n)) => format!("[ {} -ne 0 ]", n),
        Expr::Lit(Literal::Str(s)) => format!("[ -n {} ]", quote(s)),
        // Object literals are rejected during lowering; nothing reaches here.
        Expr::Lit(Literal::Object(_)) => "false".to_string(),

        Expr::Not(inner) => {
            let frag = test_fragment(inner);
            if matches!(inner.as_ref(), Expr::And(..) | Expr::Or(..)) {
                format!("! {{ {}; }}", frag)
            } else {
                format!("! {}", frag)
            }
        }

        Expr::And(left, right) => format!(
            "{} && {}",
            grouped(left, Combinator::And),
            grouped(right, Combinator::And)
        ),
        Expr::Or(left, right) => format!(
            "{} || {}",
            grouped(left, Combinator::Or),
            grouped(right, Combinator::Or)
        ),

        Expr::Cmp { op, left, right } => {
            let numeric = is_int_literal(left) || is_int_literal(right);
            let op_str = match (op, numeric) {
                (CmpOp::Eq, false) => "=",
                (CmpOp::Ne, false) => "!=",
                (CmpOp::Eq, true) => "-eq",
                (CmpOp::Ne, true) => "-ne",
                (CmpOp::Gt, _) => "-gt",
                (CmpOp::Ge, _) => "-ge",
                (CmpOp::Lt, _) => "-lt",
                (CmpOp::Le, _) => "-le",
            };
            format!("[ {} {} {} ]", operand(left), op_str, operand(right))
        }
    }
}

#[derive(PartialEq, Clone, Copy)]
enum Combinator {
    And,
    Or,
}

/// Render an and/or operand, grouping it when it is itself a combinator of
/// the other kind (where the shell's flat precedence would change meaning).
fn grouped(expr: &Expr, parent: Combinator) -> String {
    let frag = test_fragment(expr);
    let differs = match expr {
        Expr::And(..) => parent != Combinator::And,
        Expr::Or(..) => parent != Combinator::Or,
        _ => false,
    };
    if differs {
        format!("{{ {}; }}", frag)
    } else {
        frag
    }
}

fn is_int_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Lit(Literal::Int(_)))
}

/// Render a comparison operand.
fn operand(expr: &Expr) -> String {
    match expr {
        Expr::Ref(handle) => format!("\"{}\"", var_ref(handle)),
        Expr::Lit(Literal::Str(s)) => quote(s),
        Expr::Lit(Literal::Int(n)) => n.to_string(),
        Expr::Lit(Literal::Bool(b)) => format!("\"{}\"", b),
        // Compound operands and objects are rejected during lowering.
        other => test_fragment(other),
    }
}
