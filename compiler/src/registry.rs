use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};

use codespan_reporting::files::SimpleFiles;
use vellum::ast::Node;
use vellum::element::{AttrValue, Element, is_builtin};
use vellum::frontmatter::DocKind;
use vellum::parser::Parser;

use crate::error::CompileError;
use crate::ir::is_identifier;

/// A declared component parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<String>,
}

/// A named, parameterized template. Discovered during document parsing and
/// expanded at every call site; carries no output identity of its own.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
    pub span: Range<usize>,
    pub source_id: usize,
}

/// All components visible to one compile invocation: local declarations plus
/// everything reachable through relative imports. Instantiated per document,
/// never shared.
pub struct ComponentRegistry {
    components: HashMap<String, Definition>,
    base_dir: PathBuf,
    /// Canonical paths already loaded (or being loaded), so imports are
    /// parsed once and import cycles terminate.
    visited: HashSet<PathBuf>,
}

impl ComponentRegistry {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        ComponentRegistry {
            components: HashMap::new(),
            base_dir: base_dir.into(),
            visited: HashSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.components.get(name)
    }

    /// Walk the document's top-level nodes: register every `Component`
    /// declaration, resolve every `Import`, and return the remaining body.
    pub fn collect(
        &mut self,
        nodes: &[Node],
        source_id: usize,
        files: &mut SimpleFiles<String, String>,
    ) -> Result<Vec<Node>, CompileError> {
        let base_dir = self.base_dir.clone();
        self.collect_with_base(nodes, source_id, &base_dir, files)
    }

    fn collect_with_base(
        &mut self,
        nodes: &[Node],
        source_id: usize,
        base_dir: &Path,
        files: &mut SimpleFiles<String, String>,
    ) -> Result<Vec<Node>, CompileError> {
        let mut body = Vec::new();
        for node in nodes {
            match node {
                Node::Element(el) if el.tag == "Component" => {
                    self.define(el, source_id)?;
                }
                Node::Element(el) if el.tag == "Import" => {
                    self.load_import(el, source_id, base_dir, files)?;
                }
                other => body.push(other.clone()),
            }
        }
        Ok(body)
    }

    /// Register a component declaration.
    fn define(&mut self, el: &Element, source_id: usize) -> Result<(), CompileError> {
        let name = el.string_attr("name").ok_or_else(|| {
            CompileError::structural(
                "a component declaration needs a name attribute",
                el.span.clone(),
                source_id,
            )
        })?;
        if !name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return Err(CompileError::structural(
                format!("component name '{}' must start with an uppercase letter", name),
                el.span.clone(),
                source_id,
            ));
        }
        if is_builtin(name) {
            return Err(CompileError::structural(
                format!("'{}' is a reserved element name", name),
                el.span.clone(),
                source_id,
            ));
        }
        if self.components.contains_key(name) {
            return Err(CompileError::resolution(
                format!("component <{}> is declared more than once", name),
                el.span.clone(),
                source_id,
            ));
        }

        let mut params = Vec::new();
        let mut body = Vec::new();
        for child in &el.children {
            match child {
                Node::Element(param) if param.tag == "Param" => {
                    let param_name = param.string_attr("name").ok_or_else(|| {
                        CompileError::structural(
                            "a parameter declaration needs a name attribute",
                            param.span.clone(),
                            source_id,
                        )
                    })?;
                    if !is_identifier(param_name) {
                        return Err(CompileError::structural(
                            format!("'{}' is not a valid parameter name", param_name),
                            param.span.clone(),
                            source_id,
                        ));
                    }
                    let default = match param.attr("default") {
                        None => None,
                        Some(AttrValue::Str(s)) => Some(s.clone()),
                        Some(_) => {
                            return Err(CompileError::structural(
                                "parameter defaults must be string attributes",
                                param.span.clone(),
                                source_id,
                            ));
                        }
                    };
                    params.push(Param {
                        name: param_name.to_string(),
                        default,
                    });
                }
                other => body.push(other.clone()),
            }
        }

        self.components.insert(
            name.to_string(),
            Definition {
                name: name.to_string(),
                params,
                body,
                span: el.span.clone(),
                source_id,
            },
        );
        Ok(())
    }

    /// Resolve an `Import` element: parse the referenced component document
    /// and register the component it exports.
    fn load_import(
        &mut self,
        el: &Element,
        source_id: usize,
        base_dir: &Path,
        files: &mut SimpleFiles<String, String>,
    ) -> Result<(), CompileError> {
        let path = el.string_attr("path").ok_or_else(|| {
            CompileError::structural(
                "an import needs a path attribute",
                el.span.clone(),
                source_id,
            )
        })?;

        let resolved = base_dir.join(path);
        let resolved = if resolved.extension().is_none() {
            resolved.with_extension("vmd")
        } else {
            resolved
        };
        let canonical = resolved.canonicalize().map_err(|e| {
            CompileError::resolution(
                format!("cannot resolve import '{}': {}", path, e),
                el.span.clone(),
                source_id,
            )
        })?;

        // Already loaded, or a cyclic import chain: either way, done.
        if !self.visited.insert(canonical.clone()) {
            return Ok(());
        }

        let source = std::fs::read_to_string(&canonical).map_err(|e| {
            CompileError::resolution(
                format!("cannot read import '{}': {}", path, e),
                el.span.clone(),
                source_id,
            )
        })?;

        let import_id = files.add(canonical.display().to_string(), source.clone());
        let doc = Parser::new(source, import_id).parse().map_err(|mut errors| {
            CompileError::from(errors.remove(0))
                .with_note(format!("while importing '{}'", path))
        })?;

        if doc.meta.kind != DocKind::Component {
            return Err(CompileError::resolution(
                format!("import '{}' is not a component document", path),
                el.span.clone(),
                source_id,
            )
            .with_note("imported documents need `kind: component` front matter"));
        }

        let import_dir = canonical.parent().unwrap_or(base_dir).to_path_buf();
        let before = self.components.len();
        // Body content other than declarations and imports is tolerated in a
        // component document but never compiled.
        self.collect_with_base(&doc.nodes, import_id, &import_dir, files)?;
        if self.components.len() == before {
            return Err(CompileError::resolution(
                format!("import '{}' does not declare a component", path),
                el.span.clone(),
                source_id,
            ));
        }
        Ok(())
    }
}
