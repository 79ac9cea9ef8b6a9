use std::io::Write;
use std::path::Path;
use std::process::Command;

use compiler::ir::AssignSource;
use compiler::{Artifact, Compiler, CompileError, ErrorKind, emit, shell};
use vellum::expr::{CmpOp, Expr, Handle, Literal};

fn compile(source: &str) -> Vec<Artifact> {
    let mut compiler = Compiler::new();
    compiler
        .compile_source("test.vmd", source, Path::new("."))
        .expect("compile failed")
}

fn compile_text(source: &str) -> String {
    let artifacts = compile(source);
    assert_eq!(artifacts.len(), 1, "expected a single artifact");
    artifacts[0].text.clone()
}

fn compile_err(source: &str) -> CompileError {
    let mut compiler = Compiler::new();
    compiler
        .compile_source("test.vmd", source, Path::new("."))
        .expect_err("expected a compile error")
        .remove(0)
}

// ---------------------------------------------------------------------------
// Documents and front matter
// ---------------------------------------------------------------------------

#[test]
fn command_front_matter_and_body() {
    let text = compile_text("---\nname: x\ndescription: y\n---\n\nHello\n");
    assert_eq!(text, "---\nname: x\ndescription: y\n---\n\nHello\n");
}

#[test]
fn command_artifact_path_uses_the_declared_name() {
    let artifacts = compile("---\nname: deploy\n---\n\nShip it.\n");
    assert_eq!(
        artifacts[0].output_path,
        Path::new("commands/deploy.md")
    );
}

#[test]
fn command_without_front_matter_uses_the_file_stem() {
    let artifacts = compile("Just a body.\n");
    assert_eq!(artifacts[0].output_path, Path::new("commands/test.md"));
    assert_eq!(artifacts[0].text, "Just a body.\n");
}

#[test]
fn agent_front_matter_is_canonical() {
    let src = "---\nkind: agent\nname: scout\ndescription: Finds things\ncapabilities: [grep, read]\ncolor: blue\n---\n\nScout body.\n";
    let artifacts = compile(src);
    assert_eq!(artifacts[0].output_path, Path::new("agents/scout.md"));
    assert_eq!(
        artifacts[0].text,
        "---\nname: scout\ndescription: Finds things\ncapabilities: grep, read\ncolor: blue\n---\n\nScout body.\n"
    );
}

#[test]
fn agent_without_description_is_rejected() {
    let err = compile_err("---\nkind: agent\nname: scout\n---\n\nBody.\n");
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("description"), "got: {}", err.message);
}

#[test]
fn compiling_twice_is_byte_identical() {
    let src = "---\nname: x\n---\n\n<If test={ctx.error}>\n\nOops.\n\n</If>\n";
    assert_eq!(compile_text(src), compile_text(src));
}

// ---------------------------------------------------------------------------
// Markdown passthrough
// ---------------------------------------------------------------------------

#[test]
fn markdown_body_round_trips() {
    let src = "# Title\n\n- one\n- two\n\n> quoted\n";
    assert_eq!(compile_text(src), "# Title\n\n- one\n- two\n\n> quoted\n");
}

#[test]
fn tables_keep_their_alignment_row() {
    let src = "| Name | Count |\n|:-----|------:|\n| a | 1 |\n";
    assert_eq!(
        compile_text(src),
        "| Name | Count |\n| :--- | ---: |\n| a | 1 |\n"
    );
}

#[test]
fn wrapper_blocks_emit_literal_tags() {
    let src = "<example>\n\nInner text.\n\n</example>\n";
    assert_eq!(compile_text(src), "<example>\nInner text.\n</example>\n");
}

#[test]
fn raw_text_sharing_a_block_with_a_tag_passes_through() {
    let src = "<If test={x}>\nraw line here\n</If>\n";
    assert_eq!(
        compile_text(src),
        "**If [ -n \"${x}\" ]:**\n\nraw line here\n"
    );
}

// ---------------------------------------------------------------------------
// Conditionals and loops
// ---------------------------------------------------------------------------

#[test]
fn conditional_without_else() {
    let src = "<If test={ctx.error}>\n\nSomething failed.\n\n</If>\n";
    assert_eq!(
        compile_text(src),
        "**If [ -n \"${ctx_error}\" ]:**\n\nSomething failed.\n"
    );
}

#[test]
fn conditional_with_else_arm() {
    let src = "<If test={ok}>\n\nYes.\n\n<Else />\n\nNo.\n\n</If>\n";
    assert_eq!(
        compile_text(src),
        "**If [ -n \"${ok}\" ]:**\n\nYes.\n\n**Else:**\n\nNo.\n"
    );
}

#[test]
fn conditional_with_no_content_is_rejected() {
    let err = compile_err("<If test={ok}>\n</If>\n");
    assert_eq!(err.kind, ErrorKind::Structural);
}

#[test]
fn loop_with_counter_and_break() {
    let src = "<Loop max={3} counter=\"i\">\n\nTry again.\n\n<If test={ctx.done}>\n\n<Break />\n\n</If>\n\n</Loop>\n";
    assert_eq!(
        compile_text(src),
        "**Repeat (at most 3 times, counter ${i}):**\n\nTry again.\n\n**If [ -n \"${ctx_done}\" ]:**\n\n**Stop repeating.**\n"
    );
}

#[test]
fn loop_bound_can_be_a_handle() {
    let src = "<Loop max={limits.retries}>\n\nAgain.\n\n</Loop>\n";
    assert_eq!(
        compile_text(src),
        "**Repeat (at most ${limits_retries} times):**\n\nAgain.\n"
    );
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let err = compile_err("<Break />\n");
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("<Loop>"), "got: {}", err.message);
}

#[test]
fn return_is_valid_anywhere() {
    assert_eq!(compile_text("<Return />\n"), "**Stop.**\n");
}

// ---------------------------------------------------------------------------
// Prompts, invocations, assignments
// ---------------------------------------------------------------------------

#[test]
fn ask_emits_numbered_options_and_a_binding() {
    let src = "<Ask var=\"choice\" question=\"Proceed?\">\n<Option label=\"Yes\" />\n<Option label=\"No\" />\n</Ask>\n";
    assert_eq!(
        compile_text(src),
        "**Ask the user:** Proceed?\n\n1. Yes\n2. No\n\nStore the selected option in ${choice}.\n"
    );
}

#[test]
fn ask_with_one_option_is_rejected() {
    let src = "<Ask var=\"choice\" question=\"Proceed?\">\n<Option label=\"Yes\" />\n</Ask>\n";
    let err = compile_err(src);
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("between 2 and 4"), "got: {}", err.message);
}

#[test]
fn invoke_with_prompt_content() {
    let src = "<Invoke agent=\"scout\" model=\"fast\" description=\"Find the file.\">\n\nLook under src.\n\n</Invoke>\n";
    assert_eq!(
        compile_text(src),
        "**Delegate to `scout` (model: fast):** Find the file.\n\n> Look under src.\n"
    );
}

#[test]
fn invoke_with_a_handle_input() {
    let src = "<Invoke agent=\"scout\" description=\"Check it.\" input={ctx.payload} />\n";
    assert_eq!(
        compile_text(src),
        "**Delegate to `scout`:** Check it.\n\nInput: `${ctx_payload}`\n"
    );
}

#[test]
fn invoke_with_an_object_input() {
    let src = "<Invoke agent=\"scout\" description=\"Check it.\" input={{target: \"prod\", retries: 2}} />\n";
    let text = compile_text(src);
    assert!(text.contains("```json"), "got: {}", text);
    assert!(text.contains("\"target\": \"prod\""), "got: {}", text);
    assert!(text.contains("\"retries\": 2"), "got: {}", text);
}

#[test]
fn invoke_with_both_prompt_and_input_is_rejected() {
    let src = "<Invoke agent=\"scout\" description=\"D\" input={x}>\n\nAlso a prompt.\n\n</Invoke>\n";
    let err = compile_err(src);
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("not both"), "got: {}", err.message);
}

#[test]
fn let_value_emits_a_shell_assignment() {
    assert_eq!(
        compile_text("<Let var=\"greeting\" value=\"Hello\" />\n"),
        "```bash\ngreeting=\"Hello\"\n```\n"
    );
}

#[test]
fn let_command_and_env_forms() {
    assert_eq!(
        compile_text("<Let var=\"status\" command=\"git status\" />\n"),
        "```bash\nstatus=\"$(git status)\"\n```\n"
    );
    assert_eq!(
        compile_text("<Let var=\"home\" env=\"HOME\" />\n"),
        "```bash\nhome=\"${HOME}\"\n```\n"
    );
}

#[test]
fn let_with_two_sources_is_rejected() {
    let err = compile_err("<Let var=\"x\" value=\"a\" env=\"HOME\" />\n");
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("exactly one"), "got: {}", err.message);
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[test]
fn component_default_parameter() {
    let src = "<Component name=\"Note\">\n<Param name=\"title\" default=\"Untitled\" />\n\n**{title}**\n\n<Children />\n\n</Component>\n\n<Note>\n\nBody text.\n\n</Note>\n";
    assert_eq!(compile_text(src), "**Untitled**\nBody text.\n");
}

#[test]
fn component_fragment_bodies_are_emitted_tight() {
    let src = "<Component name=\"Pair\">\n\nFirst.\n\nSecond.\n\n</Component>\n\nBefore.\n\n<Pair />\n\nAfter.\n";
    assert_eq!(
        compile_text(src),
        "Before.\n\nFirst.\nSecond.\n\nAfter.\n"
    );
}

#[test]
fn children_spread_preserves_sibling_order() {
    let src = "<Component name=\"Wrap\">\n\nAbove.\n\n<Children />\n\nBelow.\n\n</Component>\n\n<Wrap>\n\nOne.\n\nTwo.\n\n</Wrap>\n";
    assert_eq!(
        compile_text(src),
        "Above.\nOne.\nTwo.\nBelow.\n"
    );
}

#[test]
fn placeholders_only_substitute_in_scope_parameters() {
    let src = "<Component name=\"Shout\">\n<Param name=\"word\" />\n\n{word} and {OTHER} stay distinct.\n\n</Component>\n\n<Shout word=\"go\" />\n\nOutside {word} is untouched.\n";
    assert_eq!(
        compile_text(src),
        "go and {OTHER} stay distinct.\n\nOutside {word} is untouched.\n"
    );
}

#[test]
fn parameter_bindings_do_not_bleed_into_nested_expansions() {
    let src = "<Component name=\"Inner\">\n\nInner sees {word}.\n\n</Component>\n\n<Component name=\"Outer\">\n<Param name=\"word\" />\n\n<Inner />\n\n</Component>\n\n<Outer word=\"go\" />\n";
    // Inner has no `word` parameter, so the placeholder must pass through.
    assert_eq!(compile_text(src), "Inner sees {word}.\n");
}

#[test]
fn missing_required_parameter_is_rejected() {
    let src = "<Component name=\"Shout\">\n<Param name=\"word\" />\n\n{word}!\n\n</Component>\n\n<Shout />\n";
    let err = compile_err(src);
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(
        err.message.contains("requires parameter 'word'"),
        "got: {}",
        err.message
    );
}

#[test]
fn unknown_attribute_on_a_component_is_rejected() {
    let src = "<Component name=\"Shout\">\n\nHi.\n\n</Component>\n\n<Shout volume=\"11\" />\n";
    let err = compile_err(src);
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("no parameter"), "got: {}", err.message);
}

#[test]
fn unknown_component_is_a_resolution_error() {
    let err = compile_err("<Mystery />\n");
    assert_eq!(err.kind, ErrorKind::Resolution);
    assert!(err.message.contains("<Mystery>"), "got: {}", err.message);
}

#[test]
fn self_including_component_is_a_resolution_error() {
    let src = "<Component name=\"Loopy\">\n\n<Loopy />\n\n</Component>\n\n<Loopy />\n";
    let err = compile_err(src);
    assert_eq!(err.kind, ErrorKind::Resolution);
    assert!(
        err.message.contains("expands into itself"),
        "got: {}",
        err.message
    );
}

#[test]
fn indirect_cycles_are_detected() {
    let src = "<Component name=\"A\">\n\n<B />\n\n</Component>\n\n<Component name=\"B\">\n\n<A />\n\n</Component>\n\n<A />\n";
    let err = compile_err(src);
    assert_eq!(err.kind, ErrorKind::Resolution);
    assert!(err.message.contains("A -> B -> A"), "got: {}", err.message);
}

#[test]
fn nested_calls_to_the_same_component_are_not_a_cycle() {
    let src = "<Component name=\"Box\">\n\n<Children />\n\n</Component>\n\n<Box>\n\n<Box>\n\ndeep\n\n</Box>\n\n</Box>\n";
    assert_eq!(compile_text(src), "deep\n");
}

#[test]
fn expression_attributes_forward_parameters() {
    let src = "<Component name=\"Gate\">\n<Param name=\"when\" />\n\n<If test={when}>\n\nOpen.\n\n</If>\n\n</Component>\n\n<Gate when={ctx.ready} />\n";
    assert_eq!(
        compile_text(src),
        "**If [ -n \"${ctx_ready}\" ]:**\n\nOpen.\n"
    );
}

#[test]
fn parameter_handles_extend_with_field_access() {
    let src = "<Component name=\"Gate\">\n<Param name=\"state\" />\n\n<If test={state.ready}>\n\nOpen.\n\n</If>\n\n</Component>\n\n<Gate state={job} />\n";
    assert_eq!(
        compile_text(src),
        "**If [ -n \"${job_ready}\" ]:**\n\nOpen.\n"
    );
}

#[test]
fn condition_valued_parameter_cannot_be_text() {
    let src = "<Component name=\"Bad\">\n<Param name=\"p\" />\n\nValue: {p}\n\n</Component>\n\n<Bad p={a && b} />\n";
    let err = compile_err(src);
    assert_eq!(err.kind, ErrorKind::Value);
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

#[test]
fn import_resolves_a_component_document() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    let lib_path = dir.path().join("badge.vmd");
    let mut lib = std::fs::File::create(&lib_path).unwrap();
    write!(
        lib,
        "---\nkind: component\n---\n\n<Component name=\"Badge\">\n<Param name=\"label\" default=\"info\" />\n\n**{{label}}**\n\n</Component>\n"
    )
    .unwrap();

    let mut compiler = Compiler::new();
    let artifacts = compiler
        .compile_source(
            "main.vmd",
            "<Import path=\"badge\" />\n\n<Badge label=\"warn\" />\n",
            dir.path(),
        )
        .expect("compile failed");
    assert_eq!(artifacts[0].text, "**warn**\n");
}

#[test]
fn unresolvable_import_is_a_resolution_error() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let mut compiler = Compiler::new();
    let err = compiler
        .compile_source("main.vmd", "<Import path=\"missing\" />\n\nBody.\n", dir.path())
        .expect_err("expected a compile error")
        .remove(0);
    assert_eq!(err.kind, ErrorKind::Resolution);
    assert!(err.message.contains("missing"), "got: {}", err.message);
}

#[test]
fn import_of_a_non_component_document_is_rejected() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let lib_path = dir.path().join("plain.vmd");
    std::fs::write(&lib_path, "---\nname: plain\n---\n\nJust a command.\n").unwrap();

    let mut compiler = Compiler::new();
    let err = compiler
        .compile_source("main.vmd", "<Import path=\"plain\" />\n\nBody.\n", dir.path())
        .expect_err("expected a compile error")
        .remove(0);
    assert_eq!(err.kind, ErrorKind::Resolution);
    assert!(
        err.message.contains("not a component document"),
        "got: {}",
        err.message
    );
}

// ---------------------------------------------------------------------------
// Shell rendering
// ---------------------------------------------------------------------------

fn handle(root: &str, path: &[&str]) -> Handle {
    let mut h = Handle::new(root);
    for field in path {
        h = h.get(*field);
    }
    h
}

#[test]
fn condition_grouping_preserves_tree_shape() {
    // a.ready && (b.count > 2 || !c)
    let expr = Expr::And(
        Box::new(Expr::Ref(handle("a", &["ready"]))),
        Box::new(Expr::Or(
            Box::new(Expr::Cmp {
                op: CmpOp::Gt,
                left: Box::new(Expr::Ref(handle("b", &["count"]))),
                right: Box::new(Expr::Lit(Literal::Int(2))),
            }),
            Box::new(Expr::Not(Box::new(Expr::Ref(handle("c", &[]))))),
        )),
    );
    assert_eq!(
        shell::test_fragment(&expr),
        "[ -n \"${a_ready}\" ] && { [ \"${b_count}\" -gt 2 ] || ! [ -n \"${c}\" ]; }"
    );
}

#[test]
fn same_operator_chains_stay_flat() {
    let expr = Expr::And(
        Box::new(Expr::And(
            Box::new(Expr::Ref(handle("a", &[]))),
            Box::new(Expr::Ref(handle("b", &[]))),
        )),
        Box::new(Expr::Ref(handle("c", &[]))),
    );
    assert_eq!(
        shell::test_fragment(&expr),
        "[ -n \"${a}\" ] && [ -n \"${b}\" ] && [ -n \"${c}\" ]"
    );
}

/// Evaluate a condition tree directly against an environment of flattened
/// variables, mirroring the semantics the shell fragments encode.
fn eval_expr(expr: &Expr, env: &[(&str, &str)]) -> bool {
    fn lookup<'a>(env: &'a [(&str, &str)], name: &str) -> &'a str {
        env.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .unwrap_or("")
    }
    fn value(expr: &Expr, env: &[(&str, &str)]) -> String {
        match expr {
            Expr::Ref(h) => lookup(env, &h.shell_name()).to_string(),
            Expr::Lit(Literal::Str(s)) => s.clone(),
            Expr::Lit(Literal::Int(n)) => n.to_string(),
            Expr::Lit(Literal::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
    match expr {
        Expr::Ref(h) => !lookup(env, &h.shell_name()).is_empty(),
        Expr::Lit(Literal::Bool(b)) => *b,
        Expr::Lit(Literal::Int(n)) => *n != 0,
        Expr::Lit(Literal::Str(s)) => !s.is_empty(),
        Expr::Lit(Literal::Object(_)) => false,
        Expr::Not(inner) => !eval_expr(inner, env),
        Expr::And(l, r) => eval_expr(l, env) && eval_expr(r, env),
        Expr::Or(l, r) => eval_expr(l, env) || eval_expr(r, env),
        Expr::Cmp { op, left, right } => {
            let lv = value(left, env);
            let rv = value(right, env);
            let numeric = matches!(left.as_ref(), Expr::Lit(Literal::Int(_)))
                || matches!(right.as_ref(), Expr::Lit(Literal::Int(_)))
                || matches!(op, CmpOp::Gt | CmpOp::Ge | CmpOp::Lt | CmpOp::Le);
            if numeric {
                let (Ok(ln), Ok(rn)) = (lv.parse::<i64>(), rv.parse::<i64>()) else {
                    return false;
                };
                match op {
                    CmpOp::Eq => ln == rn,
                    CmpOp::Ne => ln != rn,
                    CmpOp::Gt => ln > rn,
                    CmpOp::Ge => ln >= rn,
                    CmpOp::Lt => ln < rn,
                    CmpOp::Le => ln <= rn,
                }
            } else {
                match op {
                    CmpOp::Eq => lv == rv,
                    CmpOp::Ne => lv != rv,
                    _ => false,
                }
            }
        }
    }
}

fn sh_eval(fragment: &str, env: &[(&str, &str)]) -> bool {
    let script = format!("if {}; then echo yes; else echo no; fi", fragment);
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&script);
    for (key, value) in env {
        cmd.env(key, value);
    }
    let output = cmd.output().expect("failed to run sh");
    String::from_utf8_lossy(&output.stdout).trim() == "yes"
}

#[test]
fn condition_fragments_agree_with_direct_evaluation() {
    let env: &[(&str, &str)] = &[
        ("ctx_error", "boom"),
        ("ctx_ok", ""),
        ("ctx_count", "5"),
        ("ctx_label", "prod"),
    ];

    let cases = vec![
        Expr::Ref(handle("ctx", &["error"])),
        Expr::Ref(handle("ctx", &["ok"])),
        Expr::Not(Box::new(Expr::Ref(handle("ctx", &["ok"])))),
        Expr::Cmp {
            op: CmpOp::Gt,
            left: Box::new(Expr::Ref(handle("ctx", &["count"]))),
            right: Box::new(Expr::Lit(Literal::Int(3))),
        },
        Expr::Cmp {
            op: CmpOp::Le,
            left: Box::new(Expr::Ref(handle("ctx", &["count"]))),
            right: Box::new(Expr::Lit(Literal::Int(4))),
        },
        Expr::Cmp {
            op: CmpOp::Eq,
            left: Box::new(Expr::Ref(handle("ctx", &["label"]))),
            right: Box::new(Expr::Lit(Literal::Str("prod".to_string()))),
        },
        Expr::Cmp {
            op: CmpOp::Ne,
            left: Box::new(Expr::Ref(handle("ctx", &["label"]))),
            right: Box::new(Expr::Lit(Literal::Str("dev".to_string()))),
        },
        Expr::And(
            Box::new(Expr::Ref(handle("ctx", &["error"]))),
            Box::new(Expr::Or(
                Box::new(Expr::Ref(handle("ctx", &["ok"]))),
                Box::new(Expr::Cmp {
                    op: CmpOp::Eq,
                    left: Box::new(Expr::Ref(handle("ctx", &["count"]))),
                    right: Box::new(Expr::Lit(Literal::Int(5))),
                }),
            )),
        ),
        Expr::Or(
            Box::new(Expr::Ref(handle("ctx", &["ok"]))),
            Box::new(Expr::And(
                Box::new(Expr::Ref(handle("ctx", &["error"]))),
                Box::new(Expr::Not(Box::new(Expr::Ref(handle("ctx", &["ok"]))))),
            )),
        ),
    ];

    for expr in &cases {
        let fragment = shell::test_fragment(expr);
        assert_eq!(
            sh_eval(&fragment, env),
            eval_expr(expr, env),
            "fragment disagreed: {}",
            fragment
        );
    }
}

#[test]
fn escaped_assignment_round_trips_through_the_shell() {
    let nasty = "a \"quoted\" $VAR `tick` \\slash\nand a newline";
    let line = emit::assignment("v", &AssignSource::Literal(nasty.to_string()));
    let script = format!("{}\nprintf '%s' \"$v\"", line);
    let output = Command::new("sh")
        .arg("-c")
        .arg(&script)
        .output()
        .expect("failed to run sh");
    assert!(output.status.success(), "shell rejected: {}", script);
    assert_eq!(String::from_utf8_lossy(&output.stdout), nasty);
}

// ---------------------------------------------------------------------------
// State documents
// ---------------------------------------------------------------------------

const STATE_DOC: &str = "---\nkind: state\nname: todos\n---\n\n| Field | Type | Default |\n|-------|------|---------|\n| title | text |         |\n| done  | bool | false   |\n";

#[test]
fn state_documents_generate_the_crud_script_family() {
    let artifacts = compile(STATE_DOC);
    let paths: Vec<String> = artifacts
        .iter()
        .map(|a| a.output_path.display().to_string())
        .collect();
    assert_eq!(
        paths,
        vec![
            "state/todos.init.sh",
            "state/todos.create.sh",
            "state/todos.get.sh",
            "state/todos.update.sh",
            "state/todos.delete.sh",
            "state/todos.list.sh",
        ]
    );
}

#[test]
fn state_init_declares_the_table() {
    let artifacts = compile(STATE_DOC);
    let init = &artifacts[0].text;
    assert!(init.starts_with("#!/bin/sh\n"), "got: {}", init);
    assert!(init.contains("CREATE TABLE IF NOT EXISTS todos"), "got: {}", init);
    assert!(init.contains("title TEXT NOT NULL DEFAULT ''"), "got: {}", init);
    assert!(init.contains("done INTEGER NOT NULL DEFAULT 0"), "got: {}", init);
}

#[test]
fn state_update_validates_the_field_name() {
    let artifacts = compile(STATE_DOC);
    let update = &artifacts[3].text;
    assert!(update.contains("title|done)"), "got: {}", update);
    assert!(update.contains("unknown field"), "got: {}", update);
}

#[test]
fn state_create_escapes_sql_values() {
    let artifacts = compile(STATE_DOC);
    let create = &artifacts[1].text;
    assert!(create.contains("sed \"s/'/''/g\""), "got: {}", create);
    assert!(
        create.contains("INSERT INTO todos (title, done) VALUES ('$title', '$done');"),
        "got: {}",
        create
    );
}

#[test]
fn state_without_a_field_table_is_rejected() {
    let err = compile_err("---\nkind: state\nname: todos\n---\n\nNo table here.\n");
    assert_eq!(err.kind, ErrorKind::Structural);
    assert!(err.message.contains("field table"), "got: {}", err.message);
}

#[test]
fn state_with_an_unknown_type_is_rejected() {
    let err = compile_err(
        "---\nkind: state\nname: todos\n---\n\n| Field | Type |\n|-------|------|\n| title | blob |\n",
    );
    assert_eq!(err.kind, ErrorKind::Value);
    assert!(err.message.contains("blob"), "got: {}", err.message);
}
