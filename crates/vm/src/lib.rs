//! SnowVM: loads a `.water` textual listing and executes it.
//!
//! `run_listing` is the sole public entry point external drivers need,
//! mirroring `snow_compiler::compile` on the compiler side.

pub mod arithmetic;
pub mod error;
pub mod frame;
pub mod loader;
pub mod opcodes;
pub mod registry;
pub mod syscalls;
pub mod value;
pub mod vm;

pub use error::VmError;
pub use vm::{Vm, VmConfig};

/// Loads `listing` and runs its `.entry` function to completion,
/// returning the process-style exit code `run_listing` promises callers
/// (spec.md §6: `run(listing, argv) -> exit-code`). A non-integer
/// top-level return value exits 0; any `VmError` exits 1 after the VM
/// has already printed its call-stack dump to stderr.
pub fn run_listing(listing: &str, argv: &[String]) -> Result<i32, VmError> {
    let program = loader::load(listing)?;
    let config = VmConfig { argv: argv.to_vec(), ..VmConfig::default() };
    let mut vm = Vm::new(&program, config);
    match vm.run() {
        Ok(value) => Ok(exit_code_of(&value)),
        Err(err) => Err(err),
    }
}

fn exit_code_of(value: &snow_core::Value) -> i32 {
    match value {
        snow_core::Value::Byte(n) => *n as i32,
        snow_core::Value::Short(n) => *n as i32,
        snow_core::Value::Int(n) => *n,
        snow_core::Value::Long(n) => *n as i32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_listing_returns_the_entry_functions_value_as_exit_code() {
        let listing = ".globals 0\n.entry main\n\n.function main 0 2\n\
            LOADCONST r0 2i\nLOADCONST r1 3i\nADD_I r0 r0 r1\nRET r0\n.end\n";
        assert_eq!(run_listing(listing, &[]).unwrap(), 5);
    }

    #[test]
    fn run_listing_propagates_a_vm_error() {
        let listing = ".globals 0\n.entry main\n\n.function main 0 2\n\
            LOADCONST r0 1i\nLOADCONST r1 0i\nDIV_I r0 r0 r1\nRET r0\n.end\n";
        assert_eq!(run_listing(listing, &[]).unwrap_err(), VmError::DivideByZero);
    }

    #[test]
    fn malformed_listing_is_reported_as_malformed_instruction() {
        let err = run_listing("not a real listing", &[]).unwrap_err();
        assert!(matches!(err, VmError::MalformedInstruction(_)));
    }
}
