//! Parses a `.water` textual listing (`snow_compiler::codegen::emit`'s
//! output) back into the in-memory `Program` the interpreter executes.
//!
//! The backend already resolved `JUMP`/`JUMPF` to concrete instruction
//! indices and merged struct layouts parent-first, so this loader does
//! no fix-up work of its own beyond building name→function and
//! name→struct lookup tables — the textual form is already in its final
//! shape by the time it reaches here.

use crate::error::VmError;
use crate::opcodes::{ArithOp, CallTarget, Op, UnaryOp};
use snow_core::{Value, Width};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<String>,
}

impl StructDef {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub param_count: usize,
    pub register_count: u32,
    pub instrs: Vec<Op>,
}

#[derive(Debug, Default)]
pub struct Program {
    pub global_names: Vec<String>,
    pub entry: Option<String>,
    pub structs: HashMap<String, StructDef>,
    pub functions: HashMap<String, Function>,
}

pub fn load(text: &str) -> Result<Program, VmError> {
    let mut program = Program::default();
    let mut lines = text.lines().peekable();

    while let Some(raw) = lines.peek() {
        let line = raw.trim();
        if line.is_empty() {
            lines.next();
            continue;
        }
        if let Some(rest) = line.strip_prefix(".globals ") {
            let count: usize = rest
                .trim()
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad .globals count: {rest}")))?;
            lines.next();
            for _ in 0..count {
                let gline = lines
                    .next()
                    .ok_or_else(|| VmError::MalformedInstruction("truncated .globals section".into()))?;
                let name = gline
                    .trim()
                    .strip_prefix(".global ")
                    .ok_or_else(|| VmError::MalformedInstruction(format!("expected .global, got '{gline}'")))?;
                program.global_names.push(name.trim().to_string());
            }
        } else if let Some(rest) = line.strip_prefix(".entry ") {
            program.entry = Some(rest.trim().to_string());
            lines.next();
        } else if let Some(rest) = line.strip_prefix(".struct ") {
            let s = parse_struct(rest, &mut lines)?;
            program.structs.insert(s.name.clone(), s);
        } else if let Some(rest) = line.strip_prefix(".function ") {
            let f = parse_function(rest, &mut lines)?;
            program.functions.insert(f.name.clone(), f);
        } else {
            return Err(VmError::MalformedInstruction(format!("unexpected top-level line: {line}")));
        }
    }

    Ok(program)
}

fn parse_struct<'a>(
    header: &str,
    lines: &mut std::iter::Peekable<std::str::Lines<'a>>,
) -> Result<StructDef, VmError> {
    lines.next();
    let mut parts = header.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| VmError::MalformedInstruction("struct header missing name".into()))?
        .to_string();
    let parent = match parts.next() {
        Some("extends") => Some(
            parts
                .next()
                .ok_or_else(|| VmError::MalformedInstruction("'extends' missing parent name".into()))?
                .to_string(),
        ),
        Some(other) => {
            return Err(VmError::MalformedInstruction(format!("unexpected struct header token: {other}")))
        }
        None => None,
    };

    let mut fields = Vec::new();
    loop {
        let line = lines
            .next()
            .ok_or_else(|| VmError::MalformedInstruction("unterminated .struct block".into()))?;
        let line = line.trim();
        if line == ".end" {
            break;
        }
        let field = line
            .strip_prefix("field ")
            .ok_or_else(|| VmError::MalformedInstruction(format!("expected 'field', got '{line}'")))?;
        fields.push(field.trim().to_string());
    }
    Ok(StructDef { name, parent, fields })
}

fn parse_function<'a>(
    header: &str,
    lines: &mut std::iter::Peekable<std::str::Lines<'a>>,
) -> Result<Function, VmError> {
    lines.next();
    let mut parts = header.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| VmError::MalformedInstruction("function header missing name".into()))?
        .to_string();
    let param_count: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| VmError::MalformedInstruction(format!("bad param count in function '{name}'")))?;
    let register_count: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| VmError::MalformedInstruction(format!("bad register count in function '{name}'")))?;

    let mut instrs = Vec::new();
    loop {
        let line = lines
            .next()
            .ok_or_else(|| VmError::MalformedInstruction(format!("unterminated function '{name}'")))?;
        let line = line.trim();
        if line == ".end" {
            break;
        }
        instrs.push(parse_instr(line)?);
    }
    Ok(Function { name, param_count, register_count, instrs })
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            let mut tok = String::from("\"");
            chars.next();
            while let Some(c) = chars.next() {
                tok.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        tok.push(escaped);
                    }
                } else if c == '"' {
                    break;
                }
            }
            tokens.push(tok);
            continue;
        }
        let mut tok = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            tok.push(c);
            chars.next();
        }
        tokens.push(tok);
    }
    tokens
}

fn reg(tok: &str) -> Result<u32, VmError> {
    tok.strip_prefix('r')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| VmError::MalformedInstruction(format!("expected register, got '{tok}'")))
}

fn opt_reg(tok: &str) -> Result<Option<u32>, VmError> {
    if tok == "-" {
        Ok(None)
    } else {
        reg(tok).map(Some)
    }
}

fn regs(toks: &[String]) -> Result<Vec<u32>, VmError> {
    toks.iter().map(|t| reg(t)).collect()
}

fn parse_value(tok: &str) -> Result<Value, VmError> {
    if let Some(s) = tok.strip_prefix('"') {
        let s = s.strip_suffix('"').unwrap_or(s);
        return Ok(Value::Str(unescape(s)));
    }
    if tok == "null" {
        return Ok(Value::Ref(None));
    }
    if let Some(id) = tok.strip_prefix("ref#") {
        let id: u64 = id
            .parse()
            .map_err(|_| VmError::MalformedInstruction(format!("bad ref literal: {tok}")))?;
        return Ok(Value::Ref(Some(id)));
    }
    let (digits, suffix) = tok.split_at(tok.len() - 1);
    let bad = || VmError::MalformedInstruction(format!("bad constant literal: {tok}"));
    match suffix {
        "b" => digits.parse().map(Value::Byte).map_err(|_| bad()),
        "s" => digits.parse().map(Value::Short).map_err(|_| bad()),
        "i" => digits.parse().map(Value::Int).map_err(|_| bad()),
        "l" => digits.parse().map(Value::Long).map_err(|_| bad()),
        "f" => digits.parse().map(Value::Float).map_err(|_| bad()),
        "d" => digits.parse().map(Value::Double).map_err(|_| bad()),
        _ => Err(bad()),
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_width_pair(tag: &str) -> Result<(Width, Width), VmError> {
    let mut chars = tag.chars();
    let from = chars
        .next()
        .and_then(Width::from_mnemonic_prefix)
        .ok_or_else(|| VmError::MalformedInstruction(format!("bad CONVERT tag: {tag}")))?;
    let to = chars
        .next()
        .and_then(Width::from_mnemonic_prefix)
        .ok_or_else(|| VmError::MalformedInstruction(format!("bad CONVERT tag: {tag}")))?;
    Ok((from, to))
}

fn parse_width(letter: &str) -> Result<Width, VmError> {
    letter
        .chars()
        .next()
        .and_then(Width::from_mnemonic_prefix)
        .ok_or_else(|| VmError::MalformedInstruction(format!("bad width letter: {letter}")))
}

fn parse_instr(line: &str) -> Result<Op, VmError> {
    let toks = tokenize(line);
    let mnemonic = toks
        .first()
        .ok_or_else(|| VmError::MalformedInstruction("empty instruction".into()))?
        .as_str();
    let rest = &toks[1..];

    if let Some(suffix) = mnemonic.strip_prefix("CONVERT_") {
        let (from, to) = parse_width_pair(suffix)?;
        return Ok(Op::Convert { dst: reg(&rest[0])?, src: reg(&rest[1])?, from, to });
    }
    if let Some(suffix) = mnemonic.strip_prefix("NEG_") {
        let width = parse_width(suffix)?;
        return Ok(Op::Unary { dst: reg(&rest[0])?, op: UnaryOp::Neg, width, operand: reg(&rest[1])? });
    }
    if let Some((op, width_tag)) = arith_prefix(mnemonic) {
        let width = parse_width(width_tag)?;
        return Ok(Op::Binary { dst: reg(&rest[0])?, op, width, lhs: reg(&rest[1])?, rhs: reg(&rest[2])? });
    }

    match mnemonic {
        "LOADCONST" => Ok(Op::LoadConst(reg(&rest[0])?, parse_value(&rest[1])?)),
        "MOVE" => Ok(Op::Move(reg(&rest[0])?, reg(&rest[1])?)),
        "NOT" => Ok(Op::Unary { dst: reg(&rest[0])?, op: UnaryOp::Not, width: Width::Int, operand: reg(&rest[1])? }),
        "LOADGLOBAL" => Ok(Op::LoadGlobal(reg(&rest[0])?, rest[1].clone())),
        "STOREGLOBAL" => Ok(Op::StoreGlobal(rest[0].clone(), reg(&rest[1])?)),
        "NEW" => {
            let dst = reg(&rest[0])?;
            let struct_name = rest[1].clone();
            let argc: usize = rest[2]
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad NEW argcount: {}", rest[2])))?;
            Ok(Op::New { dst, struct_name, args: regs(&rest[3..3 + argc])? })
        }
        "GETFIELD" => Ok(Op::GetField { dst: reg(&rest[0])?, receiver: reg(&rest[1])?, field: rest[2].clone() }),
        "PUTFIELD" => Ok(Op::PutField { receiver: reg(&rest[0])?, field: rest[1].clone(), value: reg(&rest[2])? }),
        "MAKEARRAY" => {
            let dst = reg(&rest[0])?;
            let count: usize = rest[1]
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad MAKEARRAY count: {}", rest[1])))?;
            Ok(Op::MakeArray { dst, elements: regs(&rest[2..2 + count])? })
        }
        "INDEXGET" => Ok(Op::IndexGet { dst: reg(&rest[0])?, receiver: reg(&rest[1])?, index: reg(&rest[2])? }),
        "INDEXSET" => Ok(Op::IndexSet { receiver: reg(&rest[0])?, index: reg(&rest[1])?, value: reg(&rest[2])? }),
        "CALL" => {
            let dst = opt_reg(&rest[0])?;
            let name = rest[1].clone();
            let argc: usize = rest[2]
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad CALL argcount: {}", rest[2])))?;
            Ok(Op::Call { dst, target: CallTarget::Direct(name), args: regs(&rest[3..3 + argc])? })
        }
        "CALLV" => {
            let dst = opt_reg(&rest[0])?;
            let method = rest[1].clone();
            let argc: usize = rest[2]
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad CALLV argcount: {}", rest[2])))?;
            Ok(Op::Call { dst, target: CallTarget::Virtual(method), args: regs(&rest[3..3 + argc])? })
        }
        "SYSCALL" => {
            let dst = opt_reg(&rest[0])?;
            let code = u32::from_str_radix(rest[1].trim_start_matches("0x"), 16)
                .map_err(|_| VmError::MalformedInstruction(format!("bad SYSCALL code: {}", rest[1])))?;
            let argc: usize = rest[2]
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad SYSCALL argcount: {}", rest[2])))?;
            Ok(Op::Syscall { dst, code, args: regs(&rest[3..3 + argc])? })
        }
        "JUMP" => {
            let target: usize = rest[0]
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad JUMP target: {}", rest[0])))?;
            Ok(Op::Jump(target))
        }
        "JUMPF" => {
            let cond = reg(&rest[0])?;
            let target: usize = rest[1]
                .parse()
                .map_err(|_| VmError::MalformedInstruction(format!("bad JUMPF target: {}", rest[1])))?;
            Ok(Op::JumpIfFalse(cond, target))
        }
        "RET" => Ok(Op::Return(opt_reg(&rest[0])?)),
        other => Err(VmError::UnknownOpcode(other.to_string())),
    }
}

fn arith_prefix(mnemonic: &str) -> Option<(ArithOp, &str)> {
    let table: &[(&str, ArithOp)] = &[
        ("ADD_", ArithOp::Add),
        ("SUB_", ArithOp::Sub),
        ("MUL_", ArithOp::Mul),
        ("DIV_", ArithOp::Div),
        ("MOD_", ArithOp::Mod),
        ("CMP_EQ_", ArithOp::CmpEq),
        ("CMP_NE_", ArithOp::CmpNe),
        ("CMP_LT_", ArithOp::CmpLt),
        ("CMP_LE_", ArithOp::CmpLe),
        ("CMP_GT_", ArithOp::CmpGt),
        ("CMP_GE_", ArithOp::CmpGe),
    ];
    for (prefix, op) in table {
        if let Some(width) = mnemonic.strip_prefix(prefix) {
            return Some((*op, width));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_globals_structs_and_functions() {
        let text = ".globals 1\n.global counter\n.entry main\n\n\
            .struct Animal\n  field age\n.end\n\
            .struct Dog extends Animal\n  field breed\n.end\n\n\
            .function main 0 2\n  LOADCONST r0 1i\n  LOADCONST r1 2i\n  ADD_I r0 r0 r1\n  RET r0\n.end\n";
        let program = load(text).unwrap();
        assert_eq!(program.global_names, vec!["counter".to_string()]);
        assert_eq!(program.entry.as_deref(), Some("main"));
        assert_eq!(program.structs["Dog"].parent.as_deref(), Some("Animal"));
        assert_eq!(program.structs["Dog"].fields, vec!["breed".to_string()]);
        let main = &program.functions["main"];
        assert_eq!(main.register_count, 2);
        assert_eq!(main.instrs.len(), 4);
    }

    #[test]
    fn parses_string_constant_with_spaces() {
        let text = ".globals 0\n\n.function main 0 1\n  LOADCONST r0 \"hello world\"\n  RET r0\n.end\n";
        let program = load(text).unwrap();
        match &program.functions["main"].instrs[0] {
            Op::LoadConst(_, Value::Str(s)) => assert_eq!(s, "hello world"),
            other => panic!("expected LoadConst(Str), got {other:?}"),
        }
    }

    #[test]
    fn unknown_opcode_is_reported_not_panicking() {
        let text = ".globals 0\n\n.function main 0 1\n  BOGUS r0\n.end\n";
        let err = load(text).unwrap_err();
        assert!(matches!(err, VmError::UnknownOpcode(_)));
    }
}
