//! Compiler configuration for extensibility.
//!
//! Mirrors the teacher's `seqc::CompilerConfig`: a plain struct threaded
//! through a compile rather than global state, so an embedder (tests, a
//! playground, a build tool) can parameterize `compile` without reaching
//! into statics.

use crate::resolver::ImportResolver;
use std::path::PathBuf;

/// Configuration for a single compile.
///
/// `std_search_paths` is never read by the compiler core itself — it's
/// populated by an external driver from `SNOW_LIB`/`SNOW_HOME` and handed
/// to whatever `import_resolver` the driver builds, keeping the env-var
/// lookup a collaborator concern rather than something baked into this
/// crate.
pub struct CompilerConfig<'a> {
    /// Resolves an import's dotted module name to source text. `None`
    /// means "no imports can be resolved" (a single self-contained file).
    pub import_resolver: Option<Box<ImportResolver<'a>>>,

    /// Directories an external driver discovered for standard-library
    /// modules. Informational only: nothing in this crate reads the
    /// filesystem on its own.
    pub std_search_paths: Vec<PathBuf>,
}

impl<'a> Default for CompilerConfig<'a> {
    fn default() -> Self {
        CompilerConfig {
            import_resolver: None,
            std_search_paths: Vec::new(),
        }
    }
}

impl<'a> CompilerConfig<'a> {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_import_resolver(mut self, resolver: impl Fn(&str) -> Option<String> + 'a) -> Self {
        self.import_resolver = Some(Box::new(resolver));
        self
    }

    pub fn with_std_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.std_search_paths.push(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_resolver() {
        let config = CompilerConfig::new();
        assert!(config.import_resolver.is_none());
    }

    #[test]
    fn builder_sets_resolver_and_search_path() {
        let config = CompilerConfig::new()
            .with_import_resolver(|name| (name == "math").then(|| "module: math end module".to_string()))
            .with_std_search_path("/opt/snow/lib");

        assert!(config.import_resolver.is_some());
        assert_eq!(config.std_search_paths, vec![PathBuf::from("/opt/snow/lib")]);
        let resolver = config.import_resolver.unwrap();
        assert!(resolver("math").is_some());
        assert!(resolver("nope").is_none());
    }
}
