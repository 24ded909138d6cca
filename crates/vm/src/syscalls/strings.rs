//! String syscalls (`0x18xx`). Grounded on the teacher's
//! `runtime/src/string_ops.rs` length/concat primitives.

use super::expect_str;
use crate::error::VmError;
use snow_core::Value;

pub const STR_LEN: u32 = 0x1801;
pub const STR_CONCAT: u32 = 0x1802;

pub fn dispatch(code: u32, args: &[Value]) -> Result<Option<Value>, VmError> {
    match code {
        STR_LEN => {
            let s = expect_str(args.first().ok_or(VmError::StackUnderflow)?)?;
            Ok(Some(Value::Int(s.chars().count() as i32)))
        }
        STR_CONCAT => {
            let a = expect_str(args.first().ok_or(VmError::StackUnderflow)?)?;
            let b = expect_str(args.get(1).ok_or(VmError::StackUnderflow)?)?;
            Ok(Some(Value::Str(format!("{a}{b}"))))
        }
        other => Err(VmError::UnknownSyscall(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_chars_not_bytes() {
        let v = dispatch(STR_LEN, &[Value::Str("hi".to_string())]).unwrap();
        assert_eq!(v, Some(Value::Int(2)));
    }

    #[test]
    fn concat_joins_two_strings() {
        let v = dispatch(STR_CONCAT, &[Value::Str("foo".to_string()), Value::Str("bar".to_string())]).unwrap();
        assert_eq!(v, Some(Value::Str("foobar".to_string())));
    }
}
