//! TypeScript to script transform
//!
//! Type syntax is erased in place (blanked, never removed) so that every
//! statement of the emitted code sits on the same line as in the source and
//! runtime stack traces point at the right place. ES module syntax is then
//! rewritten to the `exports` / `require` convention of the module wrapper
//! built by [`crate::source`]. Everything on the first line that precedes the
//! source text is the module prologue (export getters).
//!
//! Constructs that would need code generation rather than erasure (enums,
//! namespaces, parameter properties, decorators, dynamic `import()`) are
//! rejected with a [`HarnessError::CompileError`] naming the line.

mod edits;
mod lexer;
mod parser;

use crate::error::{HarnessError, Result};
use crate::options::CompilerOptions;
use edits::Edit;
use parser::{ImportClause, ImportDecl, ModuleSyntax, Parser, Reexport, ReexportDecl};
use std::fmt::Write as _;
use std::path::Path;

const ES_MODULE_MARKER: &str = r#"Object.defineProperty(exports, "__esModule", { value: true }); "#;

/// One module import found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub specifier: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct TranspiledModule {
    pub code: String,
    /// Modules this one loads, in source order, each listed once.
    pub requests: Vec<ModuleRequest>,
}

pub fn transpile_module(
    source: &str,
    path: &Path,
    options: &CompilerOptions,
) -> Result<TranspiledModule> {
    let lexed = lexer::tokenize(source)
        .map_err(|e| HarnessError::compile(path, e.line, e.message))?;

    let mut edits = Vec::new();
    if source.starts_with('\u{feff}') {
        edits.push(Edit::blank(0, 3));
    }
    if let Some(hashbang) = &lexed.hashbang {
        edits.push(Edit::blank(hashbang.start, hashbang.end));
    }
    if options.remove_comments {
        edits.extend(lexed.comments.iter().map(|c| Edit::blank(c.start, c.end)));
    }

    let syntax = Parser::new(source, lexed)
        .parse_module()
        .map_err(|e| HarnessError::compile(path, e.line, e.message))?;

    let mut rewriter = ModuleRewriter::new(options.elide_unused_imports, &syntax);
    for import in &syntax.imports {
        rewriter.import(import);
    }
    for reexport in &syntax.reexports {
        rewriter.reexport(reexport);
    }
    let ModuleRewriter {
        edits: module_edits,
        mut requests,
        getters,
        ..
    } = rewriter;

    let mut prologue = String::from(ES_MODULE_MARKER);
    for (exported, local) in &syntax.exports {
        push_getter(&mut prologue, exported, local);
    }
    for (exported, target) in &getters {
        push_getter(&mut prologue, exported, target);
    }

    edits.push(Edit::insert(0, prologue));
    edits.extend(syntax.edits);
    edits.extend(module_edits);

    requests.sort_by_key(|(start, _)| *start);
    let mut unique: Vec<ModuleRequest> = Vec::new();
    for (_, request) in requests {
        if !unique.iter().any(|r| r.specifier == request.specifier) {
            unique.push(request);
        }
    }

    Ok(TranspiledModule {
        code: edits::apply(source, edits),
        requests: unique,
    })
}

fn push_getter(prologue: &mut String, exported: &str, target: &str) {
    let _ = write!(
        prologue,
        "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {target}; }} }}); ",
        quote(exported)
    );
}

fn quote(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// `object.name`, or `object["name"]` when `name` is not an identifier.
fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", quote(name))
    }
}

struct ModuleRewriter<'s> {
    elide: bool,
    syntax: &'s ModuleSyntax,
    edits: Vec<Edit>,
    /// `(source offset, request)`
    requests: Vec<(usize, ModuleRequest)>,
    /// `(exported, expression)` for re-exports.
    getters: Vec<(String, String)>,
    import_temps: usize,
    reexport_temps: usize,
}

impl<'s> ModuleRewriter<'s> {
    fn new(elide: bool, syntax: &'s ModuleSyntax) -> Self {
        Self {
            elide,
            syntax,
            edits: Vec::new(),
            requests: Vec::new(),
            getters: Vec::new(),
            import_temps: 0,
            reexport_temps: 0,
        }
    }

    fn used(&self, local: &str) -> bool {
        !self.elide || self.syntax.value_refs.contains(local)
    }

    fn request(&mut self, start: usize, specifier: &str, line: usize) -> String {
        self.requests.push((
            start,
            ModuleRequest {
                specifier: specifier.to_string(),
                line,
            },
        ));
        format!("require({})", quote(specifier))
    }

    fn import(&mut self, decl: &ImportDecl) {
        let bindings = match &decl.clause {
            ImportClause::SideEffect => {
                let require = self.request(decl.start, &decl.specifier, decl.line);
                self.edits
                    .push(Edit::replace(decl.start, decl.end, format!("{require};")));
                return;
            }
            ImportClause::Bindings(bindings) => bindings,
        };

        let default = bindings.default.as_deref().filter(|l| self.used(l));
        let namespace = bindings.namespace.as_deref().filter(|l| self.used(l));
        let named: Vec<&(String, String)> = bindings
            .named
            .iter()
            .filter(|(_, local)| self.used(local))
            .collect();

        if default.is_none() && namespace.is_none() && named.is_empty() {
            let text = if self.elide {
                String::new()
            } else {
                format!("{};", self.request(decl.start, &decl.specifier, decl.line))
            };
            self.edits.push(Edit::replace(decl.start, decl.end, text));
            return;
        }

        let require = self.request(decl.start, &decl.specifier, decl.line);
        let pattern = (!named.is_empty()).then(|| {
            let parts: Vec<String> = named
                .iter()
                .map(|(imported, local)| {
                    if imported == local {
                        local.clone()
                    } else if is_identifier(imported) {
                        format!("{imported}: {local}")
                    } else {
                        format!("{}: {local}", quote(imported))
                    }
                })
                .collect();
            format!("{{ {} }}", parts.join(", "))
        });

        let parts = [default.is_some(), namespace.is_some(), pattern.is_some()];
        let text = if parts.iter().filter(|p| **p).count() == 1 {
            if let Some(local) = default {
                format!("const {local} = __dtm_importDefault({require});")
            } else if let Some(local) = namespace {
                format!("const {local} = {require};")
            } else {
                format!("const {} = {require};", pattern.unwrap_or_default())
            }
        } else {
            self.import_temps += 1;
            let temp = format!("__import{}", self.import_temps);
            let mut text = format!("const {temp} = {require};");
            if let Some(local) = default {
                let _ = write!(text, " const {local} = __dtm_importDefault({temp});");
            }
            if let Some(local) = namespace {
                let _ = write!(text, " const {local} = {temp};");
            }
            if let Some(pattern) = pattern {
                let _ = write!(text, " const {pattern} = {temp};");
            }
            text
        };
        self.edits.push(Edit::replace(decl.start, decl.end, text));
    }

    fn reexport(&mut self, decl: &ReexportDecl) {
        let require = self.request(decl.start, &decl.specifier, decl.line);
        let text = match &decl.kind {
            Reexport::All { namespace: None } => format!("__dtm_exportStar(exports, {require});"),
            Reexport::All {
                namespace: Some(namespace),
            } => {
                let temp = self.reexport_temp();
                self.getters.push((namespace.clone(), temp.clone()));
                format!("var {temp} = {require};")
            }
            Reexport::Named(names) => {
                let temp = self.reexport_temp();
                for (imported, exported) in names {
                    self.getters.push((exported.clone(), member(&temp, imported)));
                }
                format!("var {temp} = {require};")
            }
        };
        self.edits.push(Edit::replace(decl.start, decl.end, text));
    }

    fn reexport_temp(&mut self) -> String {
        self.reexport_temps += 1;
        format!("__reexport{}", self.reexport_temps)
    }
}
