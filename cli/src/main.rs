use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use compiler::{CompileError, Compiler};

#[derive(Parser)]
#[command(name = "vellum", version, about = "Vellum document compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile documents and write their artifacts
    Build(BuildArgs),

    /// Compile documents without writing anything
    Check(CheckArgs),
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Source files or directories (searched recursively for .vmd files)
    inputs: Vec<String>,

    /// Directory artifacts are written under
    #[arg(short, long, default_value = "out")]
    out_dir: String,

    /// Print artifacts to stdout instead of writing files
    #[arg(long)]
    stdout: bool,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Source files or directories (searched recursively for .vmd files)
    inputs: Vec<String>,

    /// Dump the parsed document tree
    #[arg(long)]
    ast: bool,
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Build(args) => do_build(args, cli.no_color),
        Command::Check(args) => do_check(args, cli.no_color),
    };
    process::exit(exit_code);
}

fn do_build(args: BuildArgs, no_color: bool) -> i32 {
    let sources = collect_sources(&args.inputs);
    if sources.is_empty() {
        eprintln!("error: no .vmd source files found");
        return 1;
    }

    let mut compiler = Compiler::new();
    let mut failures = 0usize;

    // One document failing never stops the others.
    for source in &sources {
        match compiler.compile(source) {
            Ok(artifacts) => {
                for artifact in artifacts {
                    if args.stdout {
                        println!("==> {}", artifact.output_path.display());
                        print!("{}", artifact.text);
                        continue;
                    }
                    let target = Path::new(&args.out_dir).join(&artifact.output_path);
                    if let Err(e) = write_artifact(&target, &artifact.text) {
                        eprintln!("error: cannot write '{}': {}", target.display(), e);
                        failures += 1;
                        continue;
                    }
                    println!("wrote {}", target.display());
                }
            }
            Err(errors) => {
                emit_errors(&compiler, &errors, no_color);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        eprintln!(
            "{} of {} documents failed",
            failures,
            sources.len()
        );
        1
    } else {
        0
    }
}

fn do_check(args: CheckArgs, no_color: bool) -> i32 {
    let sources = collect_sources(&args.inputs);
    if sources.is_empty() {
        eprintln!("error: no .vmd source files found");
        return 1;
    }

    if args.ast {
        for source in &sources {
            match std::fs::read_to_string(source) {
                Ok(text) => match vellum::parser::Parser::new(text, 0).parse() {
                    Ok(doc) => println!("{:#?}", doc),
                    Err(errors) => {
                        for error in errors {
                            eprintln!("{}: {}", source.display(), error);
                        }
                        return 1;
                    }
                },
                Err(e) => {
                    eprintln!("error: cannot read '{}': {}", source.display(), e);
                    return 1;
                }
            }
        }
        return 0;
    }

    let mut compiler = Compiler::new();
    let mut failures = 0usize;
    for source in &sources {
        match compiler.compile(source) {
            Ok(_) => println!("ok: {}", source.display()),
            Err(errors) => {
                emit_errors(&compiler, &errors, no_color);
                failures += 1;
            }
        }
    }
    if failures > 0 { 1 } else { 0 }
}

/// Expand the input arguments: files are taken as-is, directories are
/// searched recursively for .vmd files.
fn collect_sources(inputs: &[String]) -> Vec<PathBuf> {
    let mut sources = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_dir() {
            collect_dir(&path, &mut sources);
        } else {
            sources.push(path);
        }
    }
    sources.sort();
    sources
}

fn collect_dir(dir: &Path, sources: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_dir(&path, sources);
        } else if path.extension().is_some_and(|ext| ext == "vmd") {
            sources.push(path);
        }
    }
}

fn write_artifact(target: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, text)
}

fn emit_errors(compiler: &Compiler, errors: &[CompileError], no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    for error in errors {
        let diagnostic = error.to_diagnostic();
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, compiler.files(), &diagnostic);
    }
}
