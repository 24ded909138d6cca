//! Time syscalls (`0x17xx`). Grounded on `runtime/src/time_ops.rs`'s
//! wall-clock-since-epoch primitive.

use crate::error::VmError;
use snow_core::Value;
use std::time::{SystemTime, UNIX_EPOCH};

pub const TIME_NOW_MILLIS: u32 = 0x1701;

pub fn dispatch(code: u32, _args: &[Value]) -> Result<Option<Value>, VmError> {
    match code {
        TIME_NOW_MILLIS => {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            Ok(Some(Value::Long(millis)))
        }
        other => Err(VmError::UnknownSyscall(other)),
    }
}
