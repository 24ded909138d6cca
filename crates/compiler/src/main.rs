//! Snow Compiler CLI
//!
//! Thin command-line driver: reads one or more `.snow` files, resolves
//! `import:` clauses from the other files given on the command line plus
//! `--lib-path` directories, and writes the resulting `.water` listing.

use clap::Parser as ClapParser;
use snowc::config::CompilerConfig;
use snowc::{compile_named, DiagnosticBag};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(ClapParser)]
#[command(name = "snowc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Snow compiler - compile .snow programs to .water listings", long_about = None)]
struct Cli {
    /// Entry source file
    input: PathBuf,

    /// Output .water listing path (defaults to input filename with a .water extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Additional .snow files available to `import:` by module name
    #[arg(long = "lib", value_name = "PATH")]
    libs: Vec<PathBuf>,

    /// Directories searched for `<module>.snow` when an import isn't
    /// satisfied by an explicit --lib
    #[arg(long = "lib-path", value_name = "DIR")]
    lib_paths: Vec<PathBuf>,

    /// Compile, then immediately run the listing through snow-vm
    #[arg(long)]
    run: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("snowc=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            error!(file = %cli.input.display(), error = %e, "failed to read input");
            return ExitCode::FAILURE;
        }
    };

    let mut named_libs = HashMap::new();
    for lib in &cli.libs {
        let name = lib.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        match fs::read_to_string(lib) {
            Ok(text) => {
                named_libs.insert(name, text);
            }
            Err(e) => {
                error!(file = %lib.display(), error = %e, "failed to read --lib file");
                return ExitCode::FAILURE;
            }
        }
    }
    let lib_paths = cli.lib_paths.clone();

    let config = CompilerConfig::new().with_import_resolver(move |module_name: &str| {
        if let Some(text) = named_libs.get(module_name) {
            return Some(text.clone());
        }
        for dir in &lib_paths {
            let candidate = dir.join(format!("{module_name}.snow"));
            if let Ok(text) = fs::read_to_string(&candidate) {
                return Some(text);
            }
        }
        None
    });

    let result = compile_named(&cli.input, &source, &config);
    report_diagnostics(&result.diagnostics);

    let Some(listing) = result.listing else {
        error!("compile failed, no listing emitted");
        return ExitCode::FAILURE;
    };

    let output_path = cli.output.clone().unwrap_or_else(|| cli.input.with_extension("water"));
    if let Err(e) = fs::write(&output_path, &listing) {
        error!(file = %output_path.display(), error = %e, "failed to write listing");
        return ExitCode::FAILURE;
    }
    info!(file = %output_path.display(), "wrote listing");

    if cli.run {
        match snow_vm::run_listing(&listing, &[]) {
            Ok(code) => return ExitCode::from(code as u8),
            Err(e) => {
                error!(error = %e, "snow-vm run failed");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn report_diagnostics(diagnostics: &DiagnosticBag) {
    for d in diagnostics.iter() {
        eprintln!("{d}");
    }
}
