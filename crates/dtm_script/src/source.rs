//! Source loading and bundling
//!
//! [`SourceArtifact`] walks the relative-import graph of the entry file,
//! transpiles every module and concatenates them into one self-contained
//! script: a small module loader followed by one `__dtm_define` block per
//! module, dependencies first. Evaluating the script yields the entry
//! module's exports object.
//!
//! Output is deterministic for a given set of files and options.

use crate::error::{HarnessError, Result};
use crate::options::{CompilerOptions, RunnerOptions};
use crate::transpile::{transpile_module, TranspiledModule};
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

const LOADER: &str = r#"(function () {
var __dtm_modules = Object.create(null);
var __dtm_cache = Object.create(null);
function __dtm_define(id, deps, factory) { __dtm_modules[id] = { deps: deps, factory: factory }; }
function __dtm_load(id) {
  var cached = __dtm_cache[id];
  if (cached) { return cached.exports; }
  var record = __dtm_modules[id];
  var module = { exports: {} };
  __dtm_cache[id] = module;
  var require = function (specifier) {
    var target = record.deps[specifier];
    if (target === undefined) { throw new Error("Cannot find module '" + specifier + "' from '" + id + "'"); }
    return __dtm_load(target);
  };
  record.factory.call(undefined, module.exports, require, module);
  return module.exports;
}
function __dtm_exportStar(exports, source) {
  Object.keys(source).forEach(function (key) {
    if (key === "default" || Object.prototype.hasOwnProperty.call(exports, key)) { return; }
    Object.defineProperty(exports, key, { enumerable: true, get: function () { return source[key]; } });
  });
}
function __dtm_importDefault(m) { return m && m.__esModule ? m.default : m; }
"#;

/// Placement of one module inside the bundled script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Path relative to the base directory, `/`-separated.
    pub id: String,
    pub path: PathBuf,
    /// 1-based line of the module's first source line in the bundle.
    pub first_line: usize,
    pub line_count: usize,
}

/// The executable form of a smart function.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    code: String,
    entry: String,
    modules: Vec<ModuleInfo>,
}

impl CompiledArtifact {
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Id of the entry module.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Modules in evaluation order, entry last.
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// Maps a bundle line to the module and 1-based line it came from.
    pub fn locate(&self, line: usize) -> Option<(&ModuleInfo, usize)> {
        self.modules
            .iter()
            .find(|m| line >= m.first_line && line < m.first_line + m.line_count)
            .map(|m| (m, line - m.first_line + 1))
    }

    /// Rewrites `eval_script:LINE` positions in a script stack trace to
    /// `module-id:LINE`.
    pub fn map_stack(&self, stack: &str) -> String {
        const MARKER: &str = "eval_script:";
        let mut out = String::with_capacity(stack.len());
        let mut rest = stack;
        while let Some(at) = rest.find(MARKER) {
            out.push_str(&rest[..at]);
            let after = &rest[at + MARKER.len()..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            let located = after[..digits]
                .parse::<usize>()
                .ok()
                .and_then(|line| self.locate(line));
            match located {
                Some((module, line)) => {
                    out.push_str(&module.id);
                    out.push(':');
                    out.push_str(&line.to_string());
                }
                None => {
                    out.push_str(MARKER);
                    out.push_str(&after[..digits]);
                }
            }
            rest = &after[digits..];
        }
        out.push_str(rest);
        out
    }

    /// Bundle line of the first frame in a stack such as
    /// `"    at f (eval_script:12:3)"`.
    pub(crate) fn first_script_line(stack: &str) -> Option<usize> {
        let at = stack.find("eval_script:")?;
        let after = &stack[at + "eval_script:".len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        after[..digits].parse().ok()
    }
}

/// A smart function on disk: entry file plus the options to compile it with.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    entry_path: PathBuf,
    base_dir: PathBuf,
    options: CompilerOptions,
}

struct CompiledModule {
    id: String,
    path: PathBuf,
    deps: BTreeMap<String, String>,
    code: String,
}

impl SourceArtifact {
    pub fn new(entry_path: impl Into<PathBuf>, base_dir: impl Into<PathBuf>, options: CompilerOptions) -> Self {
        Self {
            entry_path: entry_path.into(),
            base_dir: base_dir.into(),
            options,
        }
    }

    pub fn from_options(options: &RunnerOptions) -> Self {
        Self::new(
            options.entry_path(),
            options.resolution_root(),
            options.compiler_options.clone(),
        )
    }

    pub fn entry_path(&self) -> &Path {
        &self.entry_path
    }

    /// Reads, transpiles and bundles the entry file and everything it
    /// imports.
    pub fn prepare(&self) -> Result<CompiledArtifact> {
        if !self.entry_path.is_file() {
            return Err(HarnessError::SourceNotFound {
                path: self.entry_path.clone(),
            });
        }
        let entry = self
            .entry_path
            .canonicalize()
            .map_err(|source| HarnessError::Io {
                path: self.entry_path.clone(),
                source,
            })?;
        let base_dir = self
            .base_dir
            .canonicalize()
            .unwrap_or_else(|_| self.base_dir.clone());

        let mut graph = Graph {
            options: &self.options,
            base_dir: &base_dir,
            visited: HashSet::new(),
            ordered: Vec::new(),
        };
        let entry_id = graph.visit(&entry)?;
        let modules = graph.ordered;

        let mut code = String::from(LOADER);
        let mut line = LOADER.matches('\n').count();
        let mut infos = Vec::with_capacity(modules.len());
        let strict = if self.options.always_strict { " \"use strict\";" } else { "" };
        for module in modules {
            let deps = serde_json::to_string(&module.deps).unwrap_or_else(|_| "{}".into());
            code.push_str(&format!(
                "__dtm_define({}, {deps}, function (exports, require, module) {{{strict}\n",
                serde_json::Value::from(module.id.as_str())
            ));
            line += 1;
            let line_count = module.code.matches('\n').count();
            infos.push(ModuleInfo {
                id: module.id,
                path: module.path,
                first_line: line + 1,
                line_count,
            });
            code.push_str(&module.code);
            code.push_str("});\n");
            line += line_count + 1;
        }
        code.push_str(&format!(
            "return __dtm_load({});\n}})()",
            serde_json::Value::from(entry_id.as_str())
        ));

        tracing::debug!(
            entry = %self.entry_path.display(),
            modules = infos.len(),
            bytes = code.len(),
            "bundled smart function"
        );

        Ok(CompiledArtifact {
            code,
            entry: entry_id,
            modules: infos,
        })
    }
}

struct Graph<'a> {
    options: &'a CompilerOptions,
    base_dir: &'a Path,
    visited: HashSet<PathBuf>,
    ordered: Vec<CompiledModule>,
}

impl Graph<'_> {
    /// Depth-first, dependencies before dependants. A module is marked
    /// before its imports are visited, so cycles terminate.
    fn visit(&mut self, path: &Path) -> Result<String> {
        let id = self.module_id(path);
        if !self.visited.insert(path.to_path_buf()) {
            return Ok(id);
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if is_declaration_file(path) {
            return Err(HarnessError::compile(path, 1, "declaration files cannot be executed"));
        }
        if matches!(extension, "tsx" | "jsx") {
            return Err(HarnessError::compile(path, 1, "JSX is not supported"));
        }

        let source = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let TranspiledModule { mut code, requests } = transpile_module(&source, path, self.options)?;
        if !code.ends_with('\n') {
            code.push('\n');
        }

        let mut deps = BTreeMap::new();
        for request in requests {
            let resolved = self.resolve(path, &request.specifier).ok_or_else(|| {
                HarnessError::ModuleNotFound {
                    specifier: request.specifier.clone(),
                    importer: path.to_path_buf(),
                    line: request.line,
                }
            })?;
            let dep_id = self.visit(&resolved)?;
            deps.insert(request.specifier, dep_id);
        }

        tracing::trace!(module = %id, deps = deps.len(), "transpiled module");
        self.ordered.push(CompiledModule {
            id: id.clone(),
            path: path.to_path_buf(),
            deps,
            code,
        });
        Ok(id)
    }

    fn module_id(&self, path: &Path) -> String {
        match path.strip_prefix(self.base_dir) {
            Ok(relative) => relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    /// Resolves a relative specifier. Bare specifiers never resolve: smart
    /// functions cannot load packages.
    fn resolve(&self, importer: &Path, specifier: &str) -> Option<PathBuf> {
        let relative = specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier == "."
            || specifier == "..";
        if !relative {
            return None;
        }
        let base = importer.parent()?.join(specifier);

        let mut candidates = vec![base.clone()];
        if let Some(stem) = specifier.strip_suffix(".js") {
            candidates.push(importer.parent()?.join(format!("{stem}.ts")));
        }
        for ext in &self.options.extensions {
            let mut with_ext = OsString::from(base.as_os_str());
            with_ext.push(ext);
            candidates.push(PathBuf::from(with_ext));
        }
        for ext in &self.options.extensions {
            candidates.push(base.join(format!("index{ext}")));
        }

        candidates
            .into_iter()
            .find(|candidate| candidate.is_file() && !is_declaration_file(candidate))
            .and_then(|found| found.canonicalize().ok())
    }
}

fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".d.ts"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn prepare(dir: &TempDir, entry: &str) -> Result<CompiledArtifact> {
        SourceArtifact::new(dir.path().join(entry), dir.path(), CompilerOptions::default()).prepare()
    }

    #[test]
    fn dependencies_are_bundled_before_the_entry() {
        let dir = TempDir::new().unwrap();
        write(&dir, "lib/math.ts", "export const double = (x: number): number => x * 2;\n");
        write(&dir, "lib/index.ts", "export * from './math';\n");
        write(&dir, "main.ts", "import { double } from './lib';\nexport function run() { return double(2); }\n");

        let artifact = prepare(&dir, "main.ts").unwrap();
        let ids: Vec<&str> = artifact.modules().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["lib/math.ts", "lib/index.ts", "main.ts"]);
        assert_eq!(artifact.entry(), "main.ts");
        assert!(artifact.code().contains(r#"__dtm_define("main.ts", {"./lib":"lib/index.ts"}"#));
        assert!(artifact.code().ends_with(r#"return __dtm_load("main.ts");
})()"#));
    }

    #[test]
    fn ts_file_wins_for_js_specifier_and_declarations_are_ignored() {
        let dir = TempDir::new().unwrap();
        write(&dir, "util.ts", "export const a = 1;\n");
        write(&dir, "types.d.ts", "export interface T {}\n");
        write(&dir, "main.ts", "import { a } from './util.js';\nexport const b = a;\n");
        let artifact = prepare(&dir, "main.ts").unwrap();
        assert_eq!(artifact.modules()[0].id, "util.ts");

        write(&dir, "main2.ts", "import { c } from './types';\nexport const d = c;\n");
        let err = prepare(&dir, "main2.ts").unwrap_err();
        assert!(matches!(err, HarnessError::ModuleNotFound { ref specifier, line: 1, .. } if specifier == "./types"));
    }

    #[test]
    fn cycles_terminate() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.ts", "import { b } from './b';\nexport const a = () => b;\n");
        write(&dir, "b.ts", "import { a } from './a';\nexport const b = () => a;\n");
        let artifact = prepare(&dir, "a.ts").unwrap();
        assert_eq!(artifact.modules().len(), 2);
    }

    #[test]
    fn output_is_deterministic() {
        let dir = TempDir::new().unwrap();
        write(&dir, "x.ts", "export const x = 1;\n");
        write(&dir, "y.ts", "export const y = 2;\n");
        write(&dir, "main.ts", "import { y } from './y';\nimport { x } from './x';\nexport const z = x + y;\n");
        assert_eq!(prepare(&dir, "main.ts").unwrap().code(), prepare(&dir, "main.ts").unwrap().code());
    }

    #[test]
    fn unresolvable_imports_name_the_line() {
        let dir = TempDir::new().unwrap();
        write(&dir, "main.ts", "const a = 1;\n\nimport { b } from './missing';\nexport const c = a + b;\n");
        match prepare(&dir, "main.ts") {
            Err(HarnessError::ModuleNotFound { specifier, line, .. }) => {
                assert_eq!(specifier, "./missing");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected {other:?}"),
        }

        write(&dir, "pkg.ts", "import { z } from 'zod';\nexport const y = z;\n");
        assert!(matches!(prepare(&dir, "pkg.ts"), Err(HarnessError::ModuleNotFound { .. })));
    }

    #[test]
    fn missing_entry_is_source_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(prepare(&dir, "nope.ts"), Err(HarnessError::SourceNotFound { .. })));
    }

    #[test]
    fn compile_errors_point_at_the_dependency() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "bad.ts", "export const a = 1;\nenum E { A }\n");
        write(&dir, "main.ts", "import { a } from './bad';\nexport const b = a;\n");
        match prepare(&dir, "main.ts") {
            Err(HarnessError::CompileError { path, line, .. }) => {
                assert_eq!(path, bad.canonicalize().unwrap());
                assert_eq!(line, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bundle_lines_map_back_to_modules() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dep.ts", "export const one = 1;\nexport function boom() {\n  throw new Error('x');\n}\n");
        write(&dir, "main.ts", "import { boom } from './dep';\nexport function run() { boom(); }\n");
        let artifact = prepare(&dir, "main.ts").unwrap();

        let dep = &artifact.modules()[0];
        let boom_line = dep.first_line + 2;
        assert_eq!(artifact.code().lines().nth(boom_line - 1).unwrap().trim(), "throw new Error('x');");
        let (module, line) = artifact.locate(boom_line).unwrap();
        assert_eq!((module.id.as_str(), line), ("dep.ts", 3));

        let stack = format!("    at boom (eval_script:{boom_line}:9)\n    at <eval> (eval_script:1:1)");
        assert_eq!(
            artifact.map_stack(&stack),
            "    at boom (dep.ts:3:9)\n    at <eval> (eval_script:1:1)"
        );
        assert_eq!(CompiledArtifact::first_script_line(&stack), Some(boom_line));
    }
}
