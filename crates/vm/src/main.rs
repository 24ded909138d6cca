//! SnowVM CLI
//!
//! Thin command-line driver: loads a `.water` listing and runs it,
//! forwarding everything after `--` to the program as `argv`.

use clap::Parser as ClapParser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(ClapParser)]
#[command(name = "snowvm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SnowVM - run a .water instruction listing", long_about = None)]
struct Cli {
    /// .water listing to execute
    input: PathBuf,

    /// Arguments forwarded to the program as argv
    #[arg(last = true)]
    argv: Vec<String>,

    /// Maximum call-stack depth before aborting with StackOverflow
    #[arg(long, default_value_t = 1024)]
    max_call_depth: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("snow_vm=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let listing = match fs::read_to_string(&cli.input) {
        Ok(text) => text,
        Err(e) => {
            error!(file = %cli.input.display(), error = %e, "failed to read listing");
            return ExitCode::FAILURE;
        }
    };

    let program = match snow_vm::loader::load(&listing) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to load listing");
            return ExitCode::FAILURE;
        }
    };

    let config = snow_vm::VmConfig { argv: cli.argv, max_call_depth: cli.max_call_depth, trace: false };
    let mut vm = snow_vm::Vm::new(&program, config);
    match vm.run() {
        Ok(value) => ExitCode::from(exit_code(&value)),
        Err(e) => {
            error!(error = %e, "program execution failed");
            ExitCode::FAILURE
        }
    }
}

fn exit_code(value: &snow_core::Value) -> u8 {
    match value {
        snow_core::Value::Byte(n) => *n as u8,
        snow_core::Value::Short(n) => *n as u8,
        snow_core::Value::Int(n) => *n as u8,
        snow_core::Value::Long(n) => *n as u8,
        _ => 0,
    }
}
