pub mod context;
pub mod emit;
pub mod error;
pub mod ir;
pub mod lower;
pub mod registry;
pub mod shell;
pub mod state;

pub use error::{CompileError, ErrorKind};

use std::path::{Path, PathBuf};

use codespan_reporting::files::SimpleFiles;
use vellum::SourceDoc;
use vellum::frontmatter::DocKind;
use vellum::parser::Parser;

use crate::lower::Lowerer;
use crate::registry::ComponentRegistry;

/// One generated output file: a path relative to the output root plus the
/// full text to write there.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub output_path: PathBuf,
    pub text: String,
}

/// Compiles documents one at a time. Owns the source-file database that
/// diagnostics index into; every other piece of state (registry, expansion
/// stack, composition contexts) is created per invocation, so separate
/// compilers are safe to run concurrently.
pub struct Compiler {
    files: SimpleFiles<String, String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            files: SimpleFiles::new(),
        }
    }

    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    /// Compile one source file. All artifacts for the document are returned
    /// together; any error aborts the document with no partial output.
    pub fn compile(&mut self, path: &Path) -> Result<Vec<Artifact>, Vec<CompileError>> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                let file_id = self.files.add(path.display().to_string(), String::new());
                return Err(vec![CompileError::resolution(
                    format!("cannot read '{}': {}", path.display(), e),
                    0..0,
                    file_id,
                )]);
            }
        };
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        self.compile_source(&path.display().to_string(), &source, &base_dir)
    }

    /// Compile from in-memory source. `name` labels diagnostics and supplies
    /// the fallback artifact name; `base_dir` anchors relative imports.
    pub fn compile_source(
        &mut self,
        name: &str,
        source: &str,
        base_dir: &Path,
    ) -> Result<Vec<Artifact>, Vec<CompileError>> {
        let file_id = self.files.add(name.to_string(), source.to_string());
        let doc = Parser::new(source.to_string(), file_id)
            .parse()
            .map_err(|errors| {
                errors
                    .into_iter()
                    .map(CompileError::from)
                    .collect::<Vec<_>>()
            })?;
        self.compile_doc(&doc, name, base_dir).map_err(|e| vec![e])
    }

    fn compile_doc(
        &mut self,
        doc: &SourceDoc,
        name: &str,
        base_dir: &Path,
    ) -> Result<Vec<Artifact>, CompileError> {
        match doc.meta.kind {
            DocKind::State => state::generate(doc),

            DocKind::Component => {
                // Nothing to emit, but resolve the declarations anyway so a
                // component document checked directly still surfaces defects.
                let mut registry = ComponentRegistry::new(base_dir);
                registry.collect(&doc.nodes, doc.source_id, &mut self.files)?;
                Ok(Vec::new())
            }

            DocKind::Command | DocKind::Agent => {
                if doc.meta.kind == DocKind::Agent
                    && (doc.meta.name.is_none() || doc.meta.description.is_none())
                {
                    return Err(CompileError::structural(
                        "an agent document needs name and description metadata",
                        doc.meta_span.clone(),
                        doc.source_id,
                    ));
                }

                let mut registry = ComponentRegistry::new(base_dir);
                let body = registry.collect(&doc.nodes, doc.source_id, &mut self.files)?;
                let mut lowerer = Lowerer::new(&registry, doc.source_id);
                let blocks = lowerer.lower_document(&body)?;
                let text = emit::render_document(&doc.meta, &blocks);

                let artifact_name = doc
                    .meta
                    .name
                    .clone()
                    .unwrap_or_else(|| file_stem(name));
                let dir = match doc.meta.kind {
                    DocKind::Agent => "agents",
                    _ => "commands",
                };
                Ok(vec![Artifact {
                    output_path: PathBuf::from(format!("{}/{}.md", dir, artifact_name)),
                    text,
                }])
            }
        }
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}
