//! Call frames (spec §4.6: "frames of `{returnAddress, localVariableStore,
//! methodContext}`"). A frame's local variable store is its register
//! file, sized to the callee's declared register count up front — the
//! backend never emits an access past that count, so growth at runtime
//! is never required. What to do with a callee's return value lives on
//! `vm::CallFrame` instead of here, since it's a caller-side decision
//! (ordinary call vs. `NEW`'s constructor call), not part of the frame
//! itself.

use crate::error::VmError;
use snow_core::Value;

#[derive(Debug)]
pub struct Frame {
    pub function_name: String,
    pub return_pc: usize,
    pub registers: Vec<Value>,
    pub pc: usize,
}

impl Frame {
    pub fn new(function_name: String, register_count: u32, return_pc: usize) -> Self {
        Frame { function_name, return_pc, registers: vec![Value::Int(0); register_count as usize], pc: 0 }
    }

    pub fn get(&self, reg: u32) -> Result<&Value, VmError> {
        self.registers
            .get(reg as usize)
            .ok_or(VmError::SlotOutOfRange(reg))
    }

    pub fn set(&mut self, reg: u32, value: Value) -> Result<(), VmError> {
        let slot = self
            .registers
            .get_mut(reg as usize)
            .ok_or(VmError::SlotOutOfRange(reg))?;
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_start_zeroed_and_are_sized_to_the_frame() {
        let frame = Frame::new("main".to_string(), 3, 0);
        assert_eq!(frame.registers.len(), 3);
        assert_eq!(*frame.get(2).unwrap(), Value::Int(0));
    }

    #[test]
    fn out_of_range_register_is_an_error_not_a_panic() {
        let frame = Frame::new("main".to_string(), 1, 0);
        assert_eq!(frame.get(5).unwrap_err(), VmError::SlotOutOfRange(5));
    }
}
