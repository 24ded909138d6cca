//! Width-dispatched arithmetic, comparison, and conversion.
//!
//! Grounded on the teacher's `seq-runtime/src/arithmetic.rs` +
//! `float_ops.rs` split (wrapping integer ops, one function per
//! operator, dispatch on operand width) extended across Snow's six
//! widths instead of the teacher's single `Int`/`Float`. Comparisons
//! yield `Value::Int(0)` / `Value::Int(1)` — Snow has no dedicated
//! boolean runtime tag, matching `snow_core::Value`'s own doc comment.

use crate::error::VmError;
use crate::opcodes::{ArithOp, UnaryOp};
use snow_core::{Value, Width};

fn bool_value(b: bool) -> Value {
    Value::Int(if b { 1 } else { 0 })
}

macro_rules! int_arith {
    ($l:expr, $r:expr, $op:expr, $ctor:expr) => {
        match $op {
            ArithOp::Add => $ctor($l.wrapping_add($r)),
            ArithOp::Sub => $ctor($l.wrapping_sub($r)),
            ArithOp::Mul => $ctor($l.wrapping_mul($r)),
            ArithOp::Div => {
                if $r == 0 {
                    return Err(VmError::DivideByZero);
                }
                $ctor($l.wrapping_div($r))
            }
            ArithOp::Mod => {
                if $r == 0 {
                    return Err(VmError::DivideByZero);
                }
                $ctor($l.wrapping_rem($r))
            }
            ArithOp::CmpEq => bool_value($l == $r),
            ArithOp::CmpNe => bool_value($l != $r),
            ArithOp::CmpLt => bool_value($l < $r),
            ArithOp::CmpLe => bool_value($l <= $r),
            ArithOp::CmpGt => bool_value($l > $r),
            ArithOp::CmpGe => bool_value($l >= $r),
        }
    };
}

macro_rules! float_arith {
    ($l:expr, $r:expr, $op:expr, $ctor:expr) => {
        match $op {
            ArithOp::Add => $ctor($l + $r),
            ArithOp::Sub => $ctor($l - $r),
            ArithOp::Mul => $ctor($l * $r),
            ArithOp::Div => {
                if $r == 0.0 {
                    return Err(VmError::DivideByZero);
                }
                $ctor($l / $r)
            }
            ArithOp::Mod => {
                if $r == 0.0 {
                    return Err(VmError::DivideByZero);
                }
                $ctor($l % $r)
            }
            ArithOp::CmpEq => bool_value($l == $r),
            ArithOp::CmpNe => bool_value($l != $r),
            ArithOp::CmpLt => bool_value($l < $r),
            ArithOp::CmpLe => bool_value($l <= $r),
            ArithOp::CmpGt => bool_value($l > $r),
            ArithOp::CmpGe => bool_value($l >= $r),
        }
    };
}

pub fn apply_binary(op: ArithOp, width: Width, lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
    match width {
        Width::Byte => {
            let (l, r) = (as_i8(lhs)?, as_i8(rhs)?);
            Ok(int_arith!(l, r, op, Value::Byte))
        }
        Width::Short => {
            let (l, r) = (as_i16(lhs)?, as_i16(rhs)?);
            Ok(int_arith!(l, r, op, Value::Short))
        }
        Width::Int => {
            let (l, r) = (as_i32(lhs)?, as_i32(rhs)?);
            Ok(int_arith!(l, r, op, Value::Int))
        }
        Width::Long => {
            let (l, r) = (as_i64(lhs)?, as_i64(rhs)?);
            Ok(int_arith!(l, r, op, Value::Long))
        }
        Width::Float => {
            let (l, r) = (as_f32(lhs)?, as_f32(rhs)?);
            Ok(float_arith!(l, r, op, Value::Float))
        }
        Width::Double => {
            let (l, r) = (as_f64(lhs)?, as_f64(rhs)?);
            Ok(float_arith!(l, r, op, Value::Double))
        }
    }
}

pub fn apply_unary(op: UnaryOp, width: Width, operand: &Value) -> Result<Value, VmError> {
    match op {
        UnaryOp::Not => Ok(bool_value(!operand.is_truthy())),
        UnaryOp::Neg => match width {
            Width::Byte => Ok(Value::Byte(as_i8(operand)?.wrapping_neg())),
            Width::Short => Ok(Value::Short(as_i16(operand)?.wrapping_neg())),
            Width::Int => Ok(Value::Int(as_i32(operand)?.wrapping_neg())),
            Width::Long => Ok(Value::Long(as_i64(operand)?.wrapping_neg())),
            Width::Float => Ok(Value::Float(-as_f32(operand)?)),
            Width::Double => Ok(Value::Double(-as_f64(operand)?)),
        },
    }
}

pub fn convert(value: &Value, to: Width) -> Result<Value, VmError> {
    let as_double = as_f64(value)?;
    Ok(match to {
        Width::Byte => Value::Byte(as_double as i8),
        Width::Short => Value::Short(as_double as i16),
        Width::Int => Value::Int(as_double as i32),
        Width::Long => Value::Long(as_double as i64),
        Width::Float => Value::Float(as_double as f32),
        Width::Double => Value::Double(as_double),
    })
}

/// Widens any numeric `Value` to `f64`, unlike `snow_core::Value::as_f64`
/// (which panics outside the float family) — the VM sees values whose
/// exact width may not match the instruction's declared width when a
/// `CONVERT` was skipped upstream, so this has to stay a `Result`.
fn as_f64(v: &Value) -> Result<f64, VmError> {
    match v {
        Value::Byte(n) => Ok(*n as f64),
        Value::Short(n) => Ok(*n as f64),
        Value::Int(n) => Ok(*n as f64),
        Value::Long(n) => Ok(*n as f64),
        Value::Float(n) => Ok(*n as f64),
        Value::Double(n) => Ok(*n),
        other => Err(type_error(other)),
    }
}

fn as_i64(v: &Value) -> Result<i64, VmError> {
    match v {
        Value::Byte(n) => Ok(*n as i64),
        Value::Short(n) => Ok(*n as i64),
        Value::Int(n) => Ok(*n as i64),
        Value::Long(n) => Ok(*n),
        Value::Float(n) => Ok(*n as i64),
        Value::Double(n) => Ok(*n as i64),
        other => Err(type_error(other)),
    }
}

fn as_i8(v: &Value) -> Result<i8, VmError> {
    as_i64(v).map(|n| n as i8)
}
fn as_i16(v: &Value) -> Result<i16, VmError> {
    as_i64(v).map(|n| n as i16)
}
fn as_i32(v: &Value) -> Result<i32, VmError> {
    as_i64(v).map(|n| n as i32)
}
fn as_f32(v: &Value) -> Result<f32, VmError> {
    as_f64(v).map(|n| n as f32)
}

fn type_error(v: &Value) -> VmError {
    VmError::TypeMismatch(format!("expected a numeric operand, got {}", v.kind_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_by_zero_is_an_error() {
        let err = apply_binary(ArithOp::Div, Width::Int, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err, VmError::DivideByZero);
    }

    #[test]
    fn integer_overflow_wraps() {
        let v = apply_binary(ArithOp::Add, Width::Byte, &Value::Byte(i8::MAX), &Value::Byte(1)).unwrap();
        assert_eq!(v, Value::Byte(i8::MIN));
    }

    #[test]
    fn comparisons_yield_int_zero_or_one() {
        let v = apply_binary(ArithOp::CmpLt, Width::Int, &Value::Int(1), &Value::Int(2)).unwrap();
        assert_eq!(v, Value::Int(1));
        let v = apply_binary(ArithOp::CmpLt, Width::Int, &Value::Int(2), &Value::Int(1)).unwrap();
        assert_eq!(v, Value::Int(0));
    }

    #[test]
    fn float_division_by_zero_is_an_error_not_inf() {
        let err = apply_binary(ArithOp::Div, Width::Double, &Value::Double(1.0), &Value::Double(0.0)).unwrap_err();
        assert_eq!(err, VmError::DivideByZero);
    }

    #[test]
    fn convert_widens_int_to_double() {
        let v = convert(&Value::Int(7), Width::Double).unwrap();
        assert_eq!(v, Value::Double(7.0));
    }
}
