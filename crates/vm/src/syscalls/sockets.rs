//! Socket syscalls (`0x14xx`). Grounded on the teacher's `runtime/src/tcp.rs`
//! connect/close pair, translated from the FFI handle-pointer ABI to a
//! plain `Registry`-backed integer handle.

use super::{expect_handle, expect_str};
use crate::error::VmError;
use crate::registry::Registry;
use snow_core::Value;
use std::net::TcpStream;

pub const SOCK_OPEN: u32 = 0x1401;
pub const SOCK_CLOSE: u32 = 0x1402;

#[derive(Default)]
pub struct SocketRegistry {
    streams: Registry<TcpStream>,
}

pub fn dispatch(code: u32, args: &[Value], registry: &mut SocketRegistry) -> Result<Option<Value>, VmError> {
    match code {
        SOCK_OPEN => {
            let addr = expect_str(args.first().ok_or(VmError::StackUnderflow)?)?;
            let stream = TcpStream::connect(addr)
                .map_err(|e| VmError::TypeMismatch(format!("sock_open failed: {e}")))?;
            let handle = registry.streams.insert(stream);
            Ok(Some(Value::Long(handle)))
        }
        SOCK_CLOSE => {
            let handle = expect_handle(args.first().ok_or(VmError::StackUnderflow)?)?;
            registry
                .streams
                .remove(handle)
                .ok_or(VmError::SlotOutOfRange(handle as u32))?;
            Ok(None)
        }
        other => Err(VmError::UnknownSyscall(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_on_unknown_handle_is_an_error_not_a_panic() {
        let mut registry = SocketRegistry::default();
        let err = dispatch(SOCK_CLOSE, &[Value::Int(7)], &mut registry).unwrap_err();
        assert_eq!(err, VmError::SlotOutOfRange(7));
    }
}
