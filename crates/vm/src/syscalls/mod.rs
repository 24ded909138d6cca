//! Syscall fan-out (spec §6): a fixed 16-bit code identifies the
//! operation, grouped into ranges — I/O (`0x11xx`), sockets (`0x14xx`),
//! locks (`0x16xx`), time (`0x17xx`), string ops (`0x18xx`). One module
//! per range, the way the teacher separates `io.rs`/`time_ops.rs`/
//! `tcp.rs`/`cond.rs`/`string_ops.rs`. Each handler here covers the
//! representative code the backend actually emits today
//! (`snow_compiler::ir::builtin_syscall`); an out-of-range or
//! unimplemented code is a fatal `UnknownSyscall`, never a silent no-op.

pub mod io;
pub mod locks;
pub mod sockets;
pub mod strings;
pub mod time;

use crate::error::VmError;
use snow_core::Value;

/// Syscall handlers' shared mutable state: the registries backing
/// sockets and locks. I/O, time, and string ops are pure w.r.t. this
/// state (stdin/stdout aside) and don't need an entry here.
#[derive(Default)]
pub struct SyscallState {
    pub sockets: sockets::SocketRegistry,
    pub locks: locks::LockRegistry,
    pub argv: Vec<String>,
}

pub fn dispatch(code: u32, args: &[Value], state: &mut SyscallState) -> Result<Option<Value>, VmError> {
    match code {
        0x1100..=0x11ff => io::dispatch(code, args, &state.argv),
        0x1400..=0x14ff => sockets::dispatch(code, args, &mut state.sockets),
        0x1600..=0x16ff => locks::dispatch(code, args, &mut state.locks),
        0x1700..=0x17ff => time::dispatch(code, args),
        0x1800..=0x18ff => strings::dispatch(code, args),
        other => Err(VmError::UnknownSyscall(other)),
    }
}

pub(crate) fn expect_str(v: &Value) -> Result<&str, VmError> {
    match v {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(VmError::TypeMismatch(format!("expected a string, got {}", other.kind_name()))),
    }
}

pub(crate) fn expect_handle(v: &Value) -> Result<i64, VmError> {
    match v {
        Value::Int(n) => Ok(*n as i64),
        Value::Long(n) => Ok(*n),
        other => Err(VmError::TypeMismatch(format!("expected an integer handle, got {}", other.kind_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_code_is_unknown_syscall() {
        let mut state = SyscallState::default();
        let err = dispatch(0xffff, &[], &mut state).unwrap_err();
        assert_eq!(err, VmError::UnknownSyscall(0xffff));
    }
}
