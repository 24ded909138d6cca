//! The decode loop (spec §4.6): an explicit call stack of `Frame`s, a
//! shared global store, an object heap, and syscall registries. One
//! `Op` is fetched and executed per iteration; control-flow ops set the
//! next `pc` themselves rather than relying on a fall-through `+= 1`.

use crate::arithmetic;
use crate::error::VmError;
use crate::frame::Frame;
use crate::loader::{Function, Program};
use crate::opcodes::{CallTarget, Op};
use crate::syscalls::{self, SyscallState};
use crate::value::{ancestor_chain, Heap};
use snow_core::Value;

/// What to do with a callee's return value once its frame pops, decided
/// at call time rather than inferred afterward: an ordinary call writes
/// the callee's own `Return` value into the caller's register; a
/// constructor call (driven by `NEW`) instead writes the freshly
/// allocated instance reference, discarding whatever the constructor's
/// own (always-void) `Return` produced.
#[derive(Debug)]
enum ReturnAction {
    Discard,
    SetRegister(u32),
    SetRegisterTo(u32, Value),
}

struct CallFrame {
    frame: Frame,
    on_return: ReturnAction,
}

pub struct VmConfig {
    pub argv: Vec<String>,
    pub max_call_depth: usize,
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig { argv: Vec::new(), max_call_depth: 1024, trace: false }
    }
}

pub struct Vm<'p> {
    program: &'p Program,
    globals: Vec<Value>,
    heap: Heap,
    syscalls: SyscallState,
    max_call_depth: usize,
    #[allow(dead_code)]
    trace: bool,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program, config: VmConfig) -> Self {
        let mut syscalls = SyscallState::default();
        syscalls.argv = config.argv;
        Vm {
            program,
            globals: vec![Value::Int(0); program.global_names.len()],
            heap: Heap::new(),
            syscalls,
            max_call_depth: config.max_call_depth,
            trace: config.trace,
        }
    }

    pub fn run(&mut self) -> Result<Value, VmError> {
        let entry = self
            .program
            .entry
            .as_deref()
            .ok_or_else(|| VmError::MalformedInstruction("listing has no .entry".to_string()))?;
        self.call_function(entry, Vec::new())
    }

    fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, VmError> {
        let func = self.lookup_function(name)?;
        let mut stack = vec![self.new_top_frame(func, args)?];
        match self.execute(&mut stack) {
            Ok(value) => Ok(value),
            Err(err) => {
                dump_failure(&stack, &err);
                Err(err)
            }
        }
    }

    fn new_top_frame(&self, func: &Function, args: Vec<Value>) -> Result<CallFrame, VmError> {
        let mut frame = Frame::new(func.name.clone(), func.register_count, 0);
        for (i, v) in args.into_iter().enumerate() {
            frame.set(i as u32, v)?;
        }
        Ok(CallFrame { frame, on_return: ReturnAction::Discard })
    }

    fn lookup_function(&self, name: &str) -> Result<&Function, VmError> {
        self.program
            .functions
            .get(name)
            .ok_or_else(|| VmError::MalformedInstruction(format!("call to unknown function '{name}'")))
    }

    fn execute(&mut self, stack: &mut Vec<CallFrame>) -> Result<Value, VmError> {
        loop {
            let top = stack.last().expect("call stack never runs empty mid-loop");
            let func = self.lookup_function(&top.frame.function_name)?;
            let instr = func
                .instrs
                .get(top.frame.pc)
                .ok_or_else(|| VmError::MalformedInstruction(format!("pc out of range in '{}'", func.name)))?
                .clone();

            #[cfg(feature = "trace")]
            tracing::trace!(function = %top.frame.function_name, pc = top.frame.pc, ?instr, "dispatch");

            match instr {
                Op::LoadConst(dst, value) => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::Move(dst, src) => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let value = frame.get(src)?.clone();
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::Convert { dst, src, to, .. } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let value = arithmetic::convert(frame.get(src)?, to)?;
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::Binary { dst, op, width, lhs, rhs } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let value = arithmetic::apply_binary(op, width, frame.get(lhs)?, frame.get(rhs)?)?;
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::Unary { dst, op, width, operand } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let value = arithmetic::apply_unary(op, width, frame.get(operand)?)?;
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::LoadGlobal(dst, name) => {
                    let idx = self.global_index(&name)?;
                    let value = self.globals[idx].clone();
                    let frame = &mut stack.last_mut().unwrap().frame;
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::StoreGlobal(name, src) => {
                    let idx = self.global_index(&name)?;
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let value = frame.get(src)?.clone();
                    frame.pc += 1;
                    self.globals[idx] = value;
                }
                Op::New { dst, struct_name, args } => {
                    let struct_def = self.program.structs.get(&struct_name).ok_or_else(|| {
                        VmError::MalformedInstruction(format!("NEW references unknown struct '{struct_name}'"))
                    })?;
                    // Int(0) placeholder per field; the constructor always
                    // runs immediately after and is expected to PUTFIELD
                    // every field it cares about.
                    let defaults = vec![Value::Int(0); struct_def.fields.len()];
                    let id = self.heap.allocate(struct_name.clone(), defaults);

                    let frame = &mut stack.last_mut().unwrap().frame;
                    let mut ctor_args = vec![Value::Ref(Some(id))];
                    for r in &args {
                        ctor_args.push(frame.get(*r)?.clone());
                    }
                    frame.pc += 1;

                    let ctor_name = format!("{struct_name}.__init__{}", args.len());
                    let ctor_func = self.lookup_function(&ctor_name)?;
                    if stack.len() >= self.max_call_depth {
                        return Err(VmError::StackOverflow);
                    }
                    let mut callee_frame = Frame::new(ctor_func.name.clone(), ctor_func.register_count, 0);
                    for (i, v) in ctor_args.into_iter().enumerate() {
                        callee_frame.set(i as u32, v)?;
                    }
                    stack.push(CallFrame {
                        frame: callee_frame,
                        on_return: ReturnAction::SetRegisterTo(dst, Value::Ref(Some(id))),
                    });
                }
                Op::GetField { dst, receiver, field } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let id = expect_ref(frame.get(receiver)?)?;
                    let instance = self.heap.get(id)?;
                    let struct_def = self.program.structs.get(&instance.struct_name).ok_or_else(|| {
                        VmError::MalformedInstruction(format!("unknown struct '{}'", instance.struct_name))
                    })?;
                    let idx = struct_def
                        .field_index(&field)
                        .ok_or_else(|| VmError::TypeMismatch(format!("no field '{field}' on '{}'", instance.struct_name)))?;
                    let value = instance.fields[idx].clone();
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::PutField { receiver, field, value } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let id = expect_ref(frame.get(receiver)?)?;
                    let new_value = frame.get(value)?.clone();
                    frame.pc += 1;
                    let struct_name = self.heap.get(id)?.struct_name.clone();
                    let struct_def = self.program.structs.get(&struct_name).ok_or_else(|| {
                        VmError::MalformedInstruction(format!("unknown struct '{struct_name}'"))
                    })?;
                    let idx = struct_def
                        .field_index(&field)
                        .ok_or_else(|| VmError::TypeMismatch(format!("no field '{field}' on '{struct_name}'")))?;
                    self.heap.get_mut(id)?.fields[idx] = new_value;
                }
                Op::MakeArray { dst, elements } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let values = elements.iter().map(|r| frame.get(*r).cloned()).collect::<Result<Vec<_>, _>>()?;
                    frame.set(dst, Value::List(values))?;
                    frame.pc += 1;
                }
                Op::IndexGet { dst, receiver, index } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let list = expect_list(frame.get(receiver)?)?;
                    let idx = expect_index(frame.get(index)?)?;
                    let value = list
                        .get(idx)
                        .cloned()
                        .ok_or_else(|| VmError::TypeMismatch(format!("array index {idx} out of range")))?;
                    frame.set(dst, value)?;
                    frame.pc += 1;
                }
                Op::IndexSet { receiver, index, value } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let idx = expect_index(frame.get(index)?)?;
                    let new_value = frame.get(value)?.clone();
                    let mut list = expect_list(frame.get(receiver)?)?.clone();
                    if idx >= list.len() {
                        return Err(VmError::TypeMismatch(format!("array index {idx} out of range")));
                    }
                    list[idx] = new_value;
                    frame.set(receiver, Value::List(list))?;
                    frame.pc += 1;
                }
                Op::Call { dst, target, args } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let arg_values = args.iter().map(|r| frame.get(*r).cloned()).collect::<Result<Vec<_>, _>>()?;
                    frame.pc += 1;

                    let callee_name = match &target {
                        CallTarget::Direct(name) => name.clone(),
                        CallTarget::Virtual(method) => {
                            let receiver = arg_values
                                .first()
                                .ok_or(VmError::StackUnderflow)?;
                            let id = expect_ref(receiver)?;
                            let runtime_struct = self.heap.get(id)?.struct_name.clone();
                            self.resolve_virtual(&runtime_struct, method)?
                        }
                    };
                    if stack.len() >= self.max_call_depth {
                        return Err(VmError::StackOverflow);
                    }
                    let callee_func = self.lookup_function(&callee_name)?;
                    let mut callee_frame = Frame::new(callee_func.name.clone(), callee_func.register_count, 0);
                    for (i, v) in arg_values.into_iter().enumerate() {
                        callee_frame.set(i as u32, v)?;
                    }
                    let on_return = match dst {
                        Some(d) => ReturnAction::SetRegister(d),
                        None => ReturnAction::Discard,
                    };
                    stack.push(CallFrame { frame: callee_frame, on_return });
                }
                Op::Syscall { dst, code, args } => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let arg_values = args.iter().map(|r| frame.get(*r).cloned()).collect::<Result<Vec<_>, _>>()?;
                    let result = syscalls::dispatch(code, &arg_values, &mut self.syscalls)?;
                    let frame = &mut stack.last_mut().unwrap().frame;
                    if let Some(d) = dst {
                        frame.set(d, result.unwrap_or(Value::Int(0)))?;
                    }
                    frame.pc += 1;
                }
                Op::Jump(target) => {
                    stack.last_mut().unwrap().frame.pc = target;
                }
                Op::JumpIfFalse(cond, target) => {
                    let frame = &mut stack.last_mut().unwrap().frame;
                    let taken = !frame.get(cond)?.is_truthy();
                    frame.pc = if taken { target } else { frame.pc + 1 };
                }
                Op::Return(reg) => {
                    let returned = {
                        let frame = &stack.last().unwrap().frame;
                        match reg {
                            Some(r) => frame.get(r)?.clone(),
                            None => Value::Int(0),
                        }
                    };
                    let finished = stack.pop().expect("just matched on its top");
                    if stack.is_empty() {
                        return Ok(returned);
                    }
                    let caller = &mut stack.last_mut().unwrap().frame;
                    match finished.on_return {
                        ReturnAction::Discard => {}
                        ReturnAction::SetRegister(d) => caller.set(d, returned)?,
                        ReturnAction::SetRegisterTo(d, value) => caller.set(d, value)?,
                    }
                }
            }
        }
    }

    fn resolve_virtual(&self, runtime_struct: &str, method: &str) -> Result<String, VmError> {
        for name in ancestor_chain(&self.program.structs, runtime_struct) {
            let candidate = format!("{name}.m_{method}");
            if self.program.functions.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(VmError::UnresolvedVtableEntry { struct_name: runtime_struct.to_string(), method: method.to_string() })
    }

    fn global_index(&self, name: &str) -> Result<usize, VmError> {
        self.program
            .global_names
            .iter()
            .position(|g| g == name)
            .ok_or_else(|| VmError::MalformedInstruction(format!("reference to unknown global '{name}'")))
    }
}

/// Prints the call-stack/operand-stack snapshot spec.md §4.6 requires on
/// a fatal `VmError`: method name, return address, and local table per
/// frame, innermost first.
fn dump_failure(stack: &[CallFrame], err: &VmError) {
    tracing::error!(%err, "VM execution aborted");
    eprintln!("snowvm: fatal: {err}");
    for (depth, call_frame) in stack.iter().rev().enumerate() {
        eprintln!(
            "  #{depth} {} (return pc {}) locals={:?}",
            call_frame.frame.function_name, call_frame.frame.return_pc, call_frame.frame.registers
        );
    }
}

fn expect_ref(v: &Value) -> Result<u64, VmError> {
    match v {
        Value::Ref(Some(id)) => Ok(*id),
        Value::Ref(None) => Err(VmError::NullFieldAccess),
        other => Err(VmError::TypeMismatch(format!("expected a reference, got {}", other.kind_name()))),
    }
}

fn expect_list(v: &Value) -> Result<&Vec<Value>, VmError> {
    match v {
        Value::List(items) => Ok(items),
        other => Err(VmError::TypeMismatch(format!("expected an array, got {}", other.kind_name()))),
    }
}

fn expect_index(v: &Value) -> Result<usize, VmError> {
    match v {
        Value::Int(n) => Ok(*n as usize),
        Value::Long(n) => Ok(*n as usize),
        other => Err(VmError::TypeMismatch(format!("expected an integer index, got {}", other.kind_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;

    fn run_source(text: &str) -> Result<Value, VmError> {
        let program = loader::load(text).unwrap();
        let mut vm = Vm::new(&program, VmConfig::default());
        vm.run()
    }

    #[test]
    fn arithmetic_entry_point_returns_the_sum() {
        let text = ".globals 0\n.entry main\n\n.function main 0 3\n\
            LOADCONST r0 1i\nLOADCONST r1 2i\nADD_I r2 r0 r1\nRET r2\n.end\n";
        assert_eq!(run_source(text).unwrap(), Value::Int(3));
    }

    #[test]
    fn loop_with_jumpf_counts_down_to_zero() {
        let text = ".globals 0\n.entry main\n\n.function main 0 3\n\
            LOADCONST r0 3i\n\
            LOADCONST r1 1i\n\
            CMP_GT_I r2 r0 r1\n\
            JUMPF r2 6\n\
            SUB_I r0 r0 r1\n\
            JUMP 2\n\
            RET r0\n.end\n";
        assert_eq!(run_source(text).unwrap(), Value::Int(1));
    }

    #[test]
    fn direct_call_passes_arguments_and_returns() {
        let text = ".globals 0\n.entry main\n\n\
            .function double 1 2\n  LOADCONST r1 2i\n  MUL_I r0 r0 r1\n  RET r0\n.end\n\
            .function main 0 2\n  LOADCONST r0 5i\n  CALL r1 double 1 r0\n  RET r1\n.end\n";
        assert_eq!(run_source(text).unwrap(), Value::Int(10));
    }

    #[test]
    fn struct_new_and_field_access_round_trip() {
        let text = ".globals 0\n.entry main\n\n\
            .struct Point\n  field x\n.end\n\n\
            .function Point.__init__1 2 2\n  PUTFIELD r0 x r1\n  RET -\n.end\n\
            .function main 0 2\n  LOADCONST r0 7i\n  NEW r1 Point 1 r0\n  GETFIELD r0 r1 x\n  RET r0\n.end\n";
        assert_eq!(run_source(text).unwrap(), Value::Int(7));
    }

    #[test]
    fn virtual_dispatch_resolves_to_the_overriding_method() {
        let text = ".globals 0\n.entry main\n\n\
            .struct Animal\n.end\n\
            .struct Dog extends Animal\n.end\n\n\
            .function Dog.__init__0 1 1\n  RET -\n.end\n\
            .function Dog.m_speak 1 1\n  LOADCONST r0 2i\n  RET r0\n.end\n\
            .function main 0 2\n  NEW r0 Dog 0\n  CALLV r1 speak 1 r0\n  RET r1\n.end\n";
        assert_eq!(run_source(text).unwrap(), Value::Int(2));
    }

    #[test]
    fn divide_by_zero_is_a_vm_error_not_a_panic() {
        let text = ".globals 0\n.entry main\n\n.function main 0 2\n\
            LOADCONST r0 1i\nLOADCONST r1 0i\nDIV_I r0 r0 r1\nRET r0\n.end\n";
        assert_eq!(run_source(text).unwrap_err(), VmError::DivideByZero);
    }

    #[test]
    fn call_stack_overflow_is_reported() {
        let text = ".globals 0\n.entry main\n\n.function main 0 1\n  CALL - main 0\n.end\n";
        let program = loader::load(text).unwrap();
        let mut vm = Vm::new(&program, VmConfig { max_call_depth: 4, ..VmConfig::default() });
        assert_eq!(vm.run().unwrap_err(), VmError::StackOverflow);
    }
}
