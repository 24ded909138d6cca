//! I/O syscalls (`0x11xx`). Grounded on the teacher's `runtime/src/io.rs`
//! (stdout-line-write as the representative I/O primitive), translated
//! from an FFI stack-juggling ABI to a plain argument/return pair since
//! there's no FFI boundary to cross here.

use super::expect_str;
use crate::error::VmError;
use snow_core::Value;
use std::io::{self, BufRead, Write};

pub const IO_WRITE: u32 = 0x1101;
pub const IO_READ_LINE: u32 = 0x1102;
/// Program arguments aren't an ordinary global (spec.md §6: "bound to
/// a reserved global slot accessible via a syscall"); exposed here as
/// a length query plus an indexed getter instead of one bulk transfer,
/// matching the rest of this family's one-value-at-a-time shape.
pub const ARGV_LEN: u32 = 0x1103;
pub const ARGV_GET: u32 = 0x1104;

pub fn dispatch(code: u32, args: &[Value], argv: &[String]) -> Result<Option<Value>, VmError> {
    match code {
        IO_WRITE => {
            let text = expect_str(args.first().ok_or(VmError::StackUnderflow)?)?;
            let mut out = io::stdout();
            writeln!(out, "{text}").map_err(|e| VmError::TypeMismatch(format!("io_write failed: {e}")))?;
            Ok(None)
        }
        IO_READ_LINE => {
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| VmError::TypeMismatch(format!("io_read_line failed: {e}")))?;
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Ok(Some(Value::Str(line)))
        }
        ARGV_LEN => Ok(Some(Value::Int(argv.len() as i32))),
        ARGV_GET => {
            let index = match args.first().ok_or(VmError::StackUnderflow)? {
                Value::Int(n) => *n as usize,
                Value::Long(n) => *n as usize,
                other => return Err(VmError::TypeMismatch(format!("expected an integer index, got {}", other.kind_name()))),
            };
            let arg = argv
                .get(index)
                .ok_or_else(|| VmError::TypeMismatch(format!("argv index {index} out of range")))?;
            Ok(Some(Value::Str(arg.clone())))
        }
        other => Err(VmError::UnknownSyscall(other)),
    }
}
