//! Import resolution (spec §6).
//!
//! Snow has no built-in notion of a filesystem: the caller supplies an
//! `ImportResolver` callback mapping a dotted module name to source text
//! (or `None` if the name doesn't exist). This mirrors the teacher's
//! include resolver, generalized from "always read a path" to "ask the
//! embedder", since a hosted compiler (tests, a playground, an editor
//! plugin) rarely wants Snow reaching into the filesystem on its own.

use crate::ast::Module;
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind};
use crate::lexer;
use crate::parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// `name -> source text`, or `None` if the module doesn't exist. Boxed so
/// callers can close over whatever backing store they like (an in-memory
/// map in tests, a directory tree, an embedded stdlib, ...).
pub type ImportResolver<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Walks the entry module's `Import` list (and transitively, each
/// imported module's own imports), returning every module reached —
/// entry module first — plus any diagnostics raised along the way.
/// Already-visited module names are skipped rather than re-parsed, so an
/// import cycle (or a diamond) is resolved, not rejected.
pub fn resolve_imports(
    entry: Module,
    resolver: &ImportResolver,
) -> (Vec<Module>, DiagnosticBag) {
    let mut diagnostics = DiagnosticBag::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut modules = Vec::new();

    visited.insert(entry.name.clone());
    let mut queue: Vec<Module> = vec![entry];

    while let Some(module) = queue.pop() {
        for import in module.imports.clone() {
            let target = import.alias.clone().unwrap_or_else(|| import.module.clone());
            if visited.contains(&import.module) {
                continue;
            }
            visited.insert(import.module.clone());
            match resolver(&import.module) {
                Some(source) => {
                    let virtual_path = PathBuf::from(format!("{}.snow", import.module));
                    let (imported, diags) = parse_one(&virtual_path, &source);
                    diagnostics.extend(diags);
                    queue.push(imported);
                }
                None => diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedSymbol,
                    module_file(&module),
                    import.source.line,
                    import.source.col,
                    format!(
                        "import '{}' (as '{}') did not resolve to any source",
                        import.module, target
                    ),
                )),
            }
        }
        modules.push(module);
    }

    (modules, diagnostics)
}

fn module_file(module: &Module) -> PathBuf {
    module.source.file.clone()
}

fn parse_one(file: &Path, source: &str) -> (Module, DiagnosticBag) {
    let (tokens, mut diagnostics) = lexer::tokenize(file, source);
    let (module, parse_diags) = parser::parse_file(file, tokens);
    diagnostics.extend(parse_diags);
    (module, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolver_from(map: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |name: &str| map.get(name).map(|s| s.to_string())
    }

    fn parse_entry(src: &str) -> Module {
        let (tokens, diags) = lexer::tokenize(Path::new("entry.snow"), src);
        assert!(diags.is_empty());
        let (module, diags) = parser::parse_file(Path::new("entry.snow"), tokens);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        module
    }

    #[test]
    fn resolves_single_import() {
        let entry = parse_entry("module: App\nimport: math\nend module");
        let mut lib = HashMap::new();
        lib.insert(
            "math",
            "module: math\nfunction: add returns: int body: return 1 end body end function end module",
        );
        let (modules, diags) = resolve_imports(entry, &resolver_from(lib));
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        assert_eq!(modules.len(), 2);
        assert!(modules.iter().any(|m| m.name == "math"));
    }

    #[test]
    fn unresolved_import_is_a_diagnostic_not_a_panic() {
        let entry = parse_entry("module: App\nimport: nope\nend module");
        let (_modules, diags) = resolve_imports(entry, &resolver_from(HashMap::new()));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn import_cycle_terminates() {
        let entry = parse_entry("module: A\nimport: b\nend module");
        let mut lib = HashMap::new();
        lib.insert("b", "module: b\nimport: A\nend module");
        let (modules, diags) = resolve_imports(entry, &resolver_from(lib));
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        assert_eq!(modules.len(), 2);
    }
}
