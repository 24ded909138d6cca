//! Snow Compiler Library
//!
//! Compiles Snow source to a textual `.water` instruction listing executed
//! by `snow-vm`. The pipeline is lexer → parser → import resolver →
//! semantic pre-pass → IR builder → backend, with a `Diagnostic` sink
//! threaded through every stage instead of panicking on malformed input.
//!
//! ```rust,ignore
//! use snowc::{compile, config::CompilerConfig};
//!
//! let config = CompilerConfig::new();
//! let result = compile("function: main returns: int body: return 1+2 end body end function", &config);
//! assert!(result.diagnostics.is_empty());
//! println!("{}", result.listing.unwrap());
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod semantic;
pub mod types;

pub use ast::Module;
pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind};

use std::path::Path;
use tracing::{debug, info};

/// The result of a compile: the assembled `.water` listing (if the
/// pipeline got far enough to emit one) plus every diagnostic raised
/// along the way. A non-empty `diagnostics` doesn't necessarily mean
/// `listing` is `None` — lexer/parser errors abort early, but most
/// semantic/IR diagnostics still let codegen run so a caller sees as
/// complete a picture as possible in one pass.
pub struct CompileResult {
    pub listing: Option<String>,
    pub diagnostics: DiagnosticBag,
}

/// Compiles a single entry source file, resolving any `import:` clauses
/// through `config.import_resolver`.
pub fn compile(source: &str, config: &CompilerConfig) -> CompileResult {
    compile_named(Path::new("main.snow"), source, config)
}

pub fn compile_named(file: &Path, source: &str, config: &CompilerConfig) -> CompileResult {
    info!(file = %file.display(), "compiling");
    let mut diagnostics = DiagnosticBag::new();

    let (tokens, lex_diags) = lexer::tokenize(file, source);
    diagnostics.extend(lex_diags);
    if !diagnostics.is_empty() {
        return CompileResult { listing: None, diagnostics };
    }

    let (entry_module, parse_diags) = parser::parse_file(file, tokens);
    diagnostics.extend(parse_diags);
    if !diagnostics.is_empty() {
        return CompileResult { listing: None, diagnostics };
    }

    let modules = match &config.import_resolver {
        Some(resolve) => {
            let (modules, resolve_diags) = resolver::resolve_imports(entry_module, resolve.as_ref());
            diagnostics.extend(resolve_diags);
            modules
        }
        None => vec![entry_module],
    };
    debug!(modules = modules.len(), "imports resolved");

    let (model, semantic_diags) = semantic::build(&modules);
    diagnostics.extend(semantic_diags);

    let (program, ir_diags) = ir::build(&modules, &model);
    diagnostics.extend(ir_diags);

    if program.entry.is_none() {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnresolvedSymbol,
            file.to_path_buf(),
            1,
            1,
            "no 'main' or script-mode entry function defined".to_string(),
        ));
    }

    let listing = emit_listing_if_clean(&diagnostics, &program);
    CompileResult { listing, diagnostics }
}

fn emit_listing_if_clean(diagnostics: &DiagnosticBag, program: &ir::IrProgram) -> Option<String> {
    if diagnostics.is_empty() {
        Some(codegen::emit(program))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_arithmetic_entry_point() {
        let config = CompilerConfig::new();
        let result = compile(
            "function: main returns: int body: return 1+2 end body end function",
            &config,
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics.iter().collect::<Vec<_>>());
        let listing = result.listing.expect("clean compile should emit a listing");
        assert!(listing.contains(".entry main"));
    }

    #[test]
    fn missing_main_without_script_statements_is_diagnosed() {
        let config = CompilerConfig::new();
        let result = compile(
            "module: Lib\nfunction: helper returns: int body: return 1 end body end function\nend module",
            &config,
        );
        assert!(result.listing.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnresolvedSymbol));
    }

    #[test]
    fn unresolved_import_prevents_listing_emission() {
        let config = CompilerConfig::new().with_import_resolver(|_| None);
        let result = compile(
            "module: App\nimport: math\nfunction: main returns: int body: return 1 end body end function\nend module",
            &config,
        );
        assert!(result.listing.is_none());
        assert!(!result.diagnostics.is_empty());
    }
}
