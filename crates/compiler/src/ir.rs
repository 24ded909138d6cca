//! AST → three-address IR lowering (spec §4.3).
//!
//! Every local variable (parameter or `declare`) is a virtual register;
//! there is no separate load/store-local instruction because a register
//! read/write already is one. Control flow (`if`/`loop`/`break`/
//! `continue`) lowers to `Jump`/`JumpIfFalse` over `Label`s threaded
//! through a loop-context stack, the way the teacher's
//! `codegen::control_flow` module threads a block-exit-label stack
//! through its own `if`/`while` lowering.

use crate::ast::{BinaryOp, Declaration, Expr, Function, Module, Statement, StructDef, UnaryOp};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind};
use crate::semantic::SemanticModel;
use crate::types::Type;
use snow_core::{Value, Width};
use std::collections::HashMap;

pub type VReg = u32;

#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// A direct call to a free function or constructor, by its lowered
    /// name (`fact`, `Point.__init__2`). Resolved to a concrete address
    /// by the backend, not by runtime type lookup.
    Direct(String),
    /// A method call dispatched on the receiver's *runtime* struct (spec
    /// §4.3's inheritance dispatch): the backend emits a virtual-call
    /// marker and the VM resolves `method` against the receiver's actual
    /// object tag at execution time, walking up its parent chain.
    Virtual { method: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LoadConst(VReg, Value),
    Move(VReg, VReg),
    Convert {
        dst: VReg,
        src: VReg,
        from: Width,
        to: Width,
    },
    BinaryOp {
        dst: VReg,
        op: BinaryOp,
        width: Width,
        lhs: VReg,
        rhs: VReg,
    },
    UnaryOp {
        dst: VReg,
        op: UnaryOp,
        width: Width,
        operand: VReg,
    },
    LoadGlobal(VReg, String),
    StoreGlobal(String, VReg),
    New {
        dst: VReg,
        struct_name: String,
        args: Vec<VReg>,
    },
    GetField {
        dst: VReg,
        receiver: VReg,
        field: String,
    },
    PutField {
        receiver: VReg,
        field: String,
        value: VReg,
    },
    MakeArray {
        dst: VReg,
        elements: Vec<VReg>,
    },
    IndexGet {
        dst: VReg,
        receiver: VReg,
        index: VReg,
    },
    IndexSet {
        receiver: VReg,
        index: VReg,
        value: VReg,
    },
    Call {
        dst: Option<VReg>,
        target: CallTarget,
        args: Vec<VReg>,
    },
    Syscall {
        dst: Option<VReg>,
        code: u32,
        args: Vec<VReg>,
    },
    Label(u32),
    Jump(u32),
    JumpIfFalse(VReg, u32),
    Return(Option<VReg>),
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    /// Lowered name: free functions keep their surface name, methods
    /// become `Type.m_name`, constructors become `Type.__init__N`
    /// (N = explicit arg count).
    pub name: String,
    pub param_count: usize,
    pub instrs: Vec<Instr>,
    /// Filled in by the register allocator (codegen): one past the
    /// highest virtual register this function uses.
    pub register_count: u32,
}

/// A struct's runtime layout: the merged (parent-first) field list and
/// its parent name, carried into the listing so the VM can allocate
/// instances and resolve `CALLV`'s virtual dispatch (walking the parent
/// chain for the runtime receiver's actual struct) without re-deriving
/// either from the AST, which the VM never sees.
#[derive(Debug, Clone)]
pub struct IrStructDef {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, Default)]
pub struct IrProgram {
    pub functions: Vec<IrFunction>,
    pub structs: Vec<IrStructDef>,
    /// Declaration order matches `SemanticModel::globals`, which fixes VM
    /// global-slot indices.
    pub global_names: Vec<String>,
    pub entry: Option<String>,
}

struct LoopCtx {
    break_label: u32,
    continue_label: u32,
}

struct Builder<'a> {
    model: &'a SemanticModel,
    diagnostics: DiagnosticBag,
    next_reg: VReg,
    next_label: u32,
    scope: Vec<HashMap<String, VReg>>,
    reg_types: HashMap<VReg, Type>,
    loops: Vec<LoopCtx>,
    instrs: Vec<Instr>,
}

/// Builtin free-function names the compiler lowers to a VM syscall
/// instead of an ordinary call (spec §6's syscall registries). Covers a
/// representative entry per code range; the VM implements the full
/// family each code belongs to.
fn builtin_syscall(name: &str) -> Option<u32> {
    match name {
        "io_write" => Some(0x1101),
        "io_read_line" => Some(0x1102),
        "time_now_millis" => Some(0x1701),
        "lock_acquire" => Some(0x1601),
        "lock_release" => Some(0x1602),
        "sock_open" => Some(0x1401),
        "sock_close" => Some(0x1402),
        "str_len" => Some(0x1801),
        "str_concat" => Some(0x1802),
        "argv_len" => Some(0x1103),
        "argv_get" => Some(0x1104),
        _ => None,
    }
}

pub fn build(modules: &[Module], model: &SemanticModel) -> (IrProgram, DiagnosticBag) {
    let mut diagnostics = DiagnosticBag::new();
    let mut program = IrProgram {
        global_names: model.globals.iter().map(|g| g.name.clone()).collect(),
        structs: model
            .structs
            .values()
            .map(|s| IrStructDef {
                name: s.name.clone(),
                parent: s.parent.clone(),
                fields: s.fields.iter().map(|f| f.name.clone()).collect(),
            })
            .collect(),
        ..Default::default()
    };
    program.structs.sort_by(|a, b| a.name.cmp(&b.name));

    for module in modules {
        for s in &module.structs {
            lower_struct(s, model, &mut program, &mut diagnostics);
        }
        for f in &module.functions {
            if let Some(func) = lower_function(f, None, model, &mut diagnostics) {
                if f.name == "main" || f.name == "_start" {
                    program.entry = Some(func.name.clone());
                }
                program.functions.push(func);
            }
        }
    }

    (program, diagnostics)
}

fn lower_struct(
    s: &StructDef,
    model: &SemanticModel,
    program: &mut IrProgram,
    diagnostics: &mut DiagnosticBag,
) {
    for ctor in &s.constructors {
        if let Some(mut func) = lower_function(ctor, Some(&s.name), model, diagnostics) {
            let arity = ctor.params.len();
            func.name = format!("{}.__init__{}", s.name, arity);
            program.functions.push(func);
        }
    }
    for method in &s.methods {
        if let Some(mut func) = lower_function(method, Some(&s.name), model, diagnostics) {
            func.name = format!("{}.m_{}", s.name, method.name);
            program.functions.push(func);
        }
    }
}

fn lower_function(
    f: &Function,
    owner: Option<&str>,
    model: &SemanticModel,
    diagnostics: &mut DiagnosticBag,
) -> Option<IrFunction> {
    let mut b = Builder {
        model,
        diagnostics: DiagnosticBag::new(),
        next_reg: 0,
        next_label: 0,
        scope: vec![HashMap::new()],
        reg_types: HashMap::new(),
        loops: Vec::new(),
        instrs: Vec::new(),
    };

    let mut param_count = 0;
    if let Some(struct_name) = owner {
        // Implicit `this`, always register 0 for methods/constructors.
        let r = b.fresh_reg();
        b.bind("this", r, Type::Struct(struct_name.to_string()));
        param_count += 1;
    }
    for p in &f.params {
        let r = b.fresh_reg();
        b.bind(&p.name, r, p.ty.clone());
        param_count += 1;
    }

    for stmt in &f.body {
        b.lower_statement(stmt);
    }
    // Functions with no trailing `return` fall off the end; emit an
    // implicit bare return so the VM always hits a `Return` instruction.
    if !matches!(b.instrs.last(), Some(Instr::Return(_))) {
        b.instrs.push(Instr::Return(None));
    }

    diagnostics.extend(b.diagnostics);
    Some(IrFunction {
        name: f.name.clone(),
        param_count,
        instrs: b.instrs,
        register_count: b.next_reg,
    })
}

impl<'a> Builder<'a> {
    fn fresh_reg(&mut self) -> VReg {
        let r = self.next_reg;
        self.next_reg += 1;
        r
    }

    fn fresh_label(&mut self) -> u32 {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    fn bind(&mut self, name: &str, reg: VReg, ty: Type) {
        self.scope.last_mut().unwrap().insert(name.to_string(), reg);
        self.reg_types.insert(reg, ty);
    }

    fn lookup(&self, name: &str) -> Option<VReg> {
        self.scope.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn reg_type(&self, reg: VReg) -> Type {
        self.reg_types.get(&reg).cloned().unwrap_or(Type::Any)
    }

    fn error(&mut self, kind: DiagnosticKind, source: &crate::ast::SourceLocation, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(
            kind,
            source.file.clone(),
            source.line,
            source.col,
            message,
        ));
    }

    fn lower_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Declare(decl) => self.lower_declare(decl),
            Statement::Assignment { name, value, source } => {
                let (v, _) = self.lower_expr(value);
                match self.lookup(name) {
                    Some(reg) => self.instrs.push(Instr::Move(reg, v)),
                    None if self.model.globals.iter().any(|g| &g.name == name) => {
                        self.instrs.push(Instr::StoreGlobal(name.clone(), v));
                    }
                    None => match self.implicit_this_field(name) {
                        Some((this_reg, _)) => {
                            self.instrs.push(Instr::PutField {
                                receiver: this_reg,
                                field: name.clone(),
                                value: v,
                            });
                        }
                        None => self.error(
                            DiagnosticKind::UnresolvedIdentifier,
                            source,
                            format!("assignment to undeclared name '{name}'"),
                        ),
                    },
                }
            }
            Statement::MemberAssignment { receiver, field, value, source } => {
                let (recv, recv_ty) = self.lower_expr(receiver);
                let (val, _) = self.lower_expr(value);
                match recv_ty.struct_name() {
                    Some(struct_name) if self.field_exists(struct_name, field) => {
                        self.instrs.push(Instr::PutField {
                            receiver: recv,
                            field: field.clone(),
                            value: val,
                        });
                    }
                    Some(struct_name) => self.error(
                        DiagnosticKind::UnresolvedSymbol,
                        source,
                        format!("no field '{field}' on '{struct_name}'"),
                    ),
                    None => self.error(
                        DiagnosticKind::UnresolvedSymbol,
                        source,
                        format!("no field '{field}' on this expression"),
                    ),
                }
            }
            Statement::IndexAssignment {
                target,
                indices,
                value,
                source,
            } => {
                let (mut recv, _) = self.lower_expr(target);
                let (val, _) = self.lower_expr(value);
                if indices.is_empty() {
                    self.error(
                        DiagnosticKind::ParseErrorUnsupportedFeature,
                        source,
                        "index assignment with no index",
                    );
                    return;
                }
                for idx in &indices[..indices.len() - 1] {
                    let (ireg, _) = self.lower_expr(idx);
                    let dst = self.fresh_reg();
                    self.instrs.push(Instr::IndexGet {
                        dst,
                        receiver: recv,
                        index: ireg,
                    });
                    recv = dst;
                }
                let (last_idx, _) = self.lower_expr(indices.last().unwrap());
                self.instrs.push(Instr::IndexSet {
                    receiver: recv,
                    index: last_idx,
                    value: val,
                });
            }
            Statement::If(stmt) => self.lower_if(stmt),
            Statement::Loop(stmt) => self.lower_loop(stmt),
            Statement::Break(source) => {
                match self.loops.last() {
                    Some(ctx) => {
                        let label = ctx.break_label;
                        self.instrs.push(Instr::Jump(label));
                    }
                    None => self.error(
                        DiagnosticKind::ParseErrorUnsupportedFeature,
                        source,
                        "'break' used outside of a loop",
                    ),
                }
            }
            Statement::Continue(source) => {
                match self.loops.last() {
                    Some(ctx) => {
                        let label = ctx.continue_label;
                        self.instrs.push(Instr::Jump(label));
                    }
                    None => self.error(
                        DiagnosticKind::ParseErrorUnsupportedFeature,
                        source,
                        "'continue' used outside of a loop",
                    ),
                }
            }
            Statement::Return { value, .. } => {
                let reg = value.as_ref().map(|e| self.lower_expr(e).0);
                self.instrs.push(Instr::Return(reg));
            }
            Statement::ExprStmt(expr) => {
                self.lower_expr(expr);
            }
        }
    }

    fn lower_declare(&mut self, decl: &Declaration) {
        let reg = self.fresh_reg();
        let mut ty = decl.ty.clone().unwrap_or(Type::Any);
        if let Some(init) = &decl.initializer {
            let (v, _) = self.lower_expr(init);
            self.instrs.push(Instr::Move(reg, v));
            // Widen a declared ancestor type to the constructed subclass
            // (spec §4.3) so later field/method lookups on this variable
            // see the more specific type instead of the static one.
            if let (Expr::New { type_name, .. }, Some(declared)) = (init, ty.struct_name()) {
                if self.model.is_subtype(type_name, declared) {
                    ty = Type::Struct(type_name.clone());
                }
            }
        } else {
            self.instrs.push(Instr::LoadConst(reg, default_value(&ty)));
        }
        self.bind(&decl.name, reg, ty);
    }

    fn lower_if(&mut self, stmt: &crate::ast::IfStmt) {
        let (cond, _) = self.lower_expr(&stmt.condition);
        let else_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.instrs.push(Instr::JumpIfFalse(cond, else_label));
        self.scope.push(HashMap::new());
        for s in &stmt.then_branch {
            self.lower_statement(s);
        }
        self.scope.pop();
        self.instrs.push(Instr::Jump(end_label));
        self.instrs.push(Instr::Label(else_label));
        if let Some(else_branch) = &stmt.else_branch {
            self.scope.push(HashMap::new());
            for s in else_branch {
                self.lower_statement(s);
            }
            self.scope.pop();
        }
        self.instrs.push(Instr::Label(end_label));
    }

    fn lower_loop(&mut self, stmt: &crate::ast::LoopStmt) {
        self.scope.push(HashMap::new());
        if let Some(init) = &stmt.init {
            self.lower_statement(init);
        }
        let cond_label = self.fresh_label();
        let body_label = self.fresh_label();
        let step_label = self.fresh_label();
        let end_label = self.fresh_label();

        self.instrs.push(Instr::Label(cond_label));
        if let Some(cond) = &stmt.cond {
            let (c, _) = self.lower_expr(cond);
            self.instrs.push(Instr::JumpIfFalse(c, end_label));
        }
        self.instrs.push(Instr::Label(body_label));
        self.loops.push(LoopCtx {
            break_label: end_label,
            continue_label: step_label,
        });
        self.scope.push(HashMap::new());
        for s in &stmt.body {
            self.lower_statement(s);
        }
        self.scope.pop();
        self.loops.pop();
        self.instrs.push(Instr::Label(step_label));
        if let Some(step) = &stmt.step {
            self.lower_statement(step);
        }
        self.instrs.push(Instr::Jump(cond_label));
        self.instrs.push(Instr::Label(end_label));
        self.scope.pop();
    }

    /// Returns the register holding the expression's value and its
    /// static type, promoting numeric operands per spec §4.3's lattice.
    fn lower_expr(&mut self, expr: &Expr) -> (VReg, Type) {
        match expr {
            Expr::Number {
                text,
                width,
                is_float_form,
                ..
            } => {
                let v = literal_value(text, *width, *is_float_form);
                let ty = width_to_type(*width);
                let r = self.fresh_reg();
                self.instrs.push(Instr::LoadConst(r, v));
                (r, ty)
            }
            Expr::Bool(b, _) => {
                let r = self.fresh_reg();
                self.instrs.push(Instr::LoadConst(r, Value::from_bool(*b)));
                (r, Type::Bool)
            }
            Expr::Str(s, _) => {
                let r = self.fresh_reg();
                self.instrs.push(Instr::LoadConst(r, Value::Str(s.clone())));
                (r, Type::String)
            }
            Expr::Array(items, _) => {
                let mut elems = Vec::new();
                let mut elem_ty = Type::Any;
                for item in items {
                    let (r, ty) = self.lower_expr(item);
                    elem_ty = ty;
                    elems.push(r);
                }
                let dst = self.fresh_reg();
                self.instrs.push(Instr::MakeArray { dst, elements: elems });
                (dst, Type::Array(Box::new(elem_ty)))
            }
            Expr::Identifier(name, source) => {
                if let Some(reg) = self.lookup(name) {
                    (reg, self.reg_type(reg))
                } else if let Some(g) = self.model.globals.iter().find(|g| &g.name == name) {
                    let dst = self.fresh_reg();
                    self.instrs.push(Instr::LoadGlobal(dst, name.clone()));
                    (dst, g.ty.clone().unwrap_or(Type::Any))
                } else {
                    self.error(
                        DiagnosticKind::UnresolvedIdentifier,
                        source,
                        format!("unresolved identifier '{name}'"),
                    );
                    let dst = self.fresh_reg();
                    self.instrs.push(Instr::LoadConst(dst, Value::Int(0)));
                    (dst, Type::Any)
                }
            }
            Expr::Member { receiver, name, source } => {
                let (recv, recv_ty) = self.lower_expr(receiver);
                if let Some(struct_name) = recv_ty.struct_name() {
                    if self.field_exists(struct_name, name) {
                        let dst = self.fresh_reg();
                        self.instrs.push(Instr::GetField {
                            dst,
                            receiver: recv,
                            field: name.clone(),
                        });
                        let fty = self.field_type(struct_name, name);
                        return (dst, fty);
                    }
                }
                self.error(
                    DiagnosticKind::UnresolvedSymbol,
                    source,
                    format!("no field '{name}' on this expression"),
                );
                let dst = self.fresh_reg();
                self.instrs.push(Instr::LoadConst(dst, Value::Int(0)));
                (dst, Type::Any)
            }
            Expr::Call { callee, args, source } => self.lower_call(callee, args, source),
            Expr::Index { receiver, index, .. } => {
                let (recv, recv_ty) = self.lower_expr(receiver);
                let (idx, _) = self.lower_expr(index);
                let dst = self.fresh_reg();
                self.instrs.push(Instr::IndexGet {
                    dst,
                    receiver: recv,
                    index: idx,
                });
                let elem_ty = match recv_ty {
                    Type::Array(inner) => *inner,
                    _ => Type::Any,
                };
                (dst, elem_ty)
            }
            Expr::Binary { op, lhs, rhs, .. } => self.lower_binary(*op, lhs, rhs),
            Expr::Unary { op, operand, .. } => {
                let (o, ty) = self.lower_expr(operand);
                let dst = self.fresh_reg();
                let width = ty.width().unwrap_or(Width::Int);
                self.instrs.push(Instr::UnaryOp {
                    dst,
                    op: *op,
                    width,
                    operand: o,
                });
                (dst, ty)
            }
            Expr::New { type_name, args, source } => {
                let mut arg_regs = Vec::new();
                for a in args {
                    arg_regs.push(self.lower_expr(a).0);
                }
                if self.model.constructor_for_arity(type_name, args.len()).is_none() {
                    self.error(
                        DiagnosticKind::CtorNotFound,
                        source,
                        format!(
                            "struct '{}' has no constructor taking {} argument(s)",
                            type_name,
                            args.len()
                        ),
                    );
                }
                let dst = self.fresh_reg();
                self.instrs.push(Instr::New {
                    dst,
                    struct_name: type_name.clone(),
                    args: arg_regs,
                });
                (dst, Type::Struct(type_name.clone()))
            }
        }
    }

    fn field_exists(&self, struct_name: &str, field: &str) -> bool {
        self.model
            .structs
            .get(struct_name)
            .is_some_and(|s| s.field_index(field).is_some())
    }

    /// A bare-name assignment inside a method/constructor that doesn't
    /// name a local or a global falls back to an implicit `this.<name>`
    /// field write when `this` is bound and owns that field.
    fn implicit_this_field(&self, field: &str) -> Option<(VReg, String)> {
        let reg = self.lookup("this")?;
        let struct_name = self.reg_type(reg).struct_name()?.to_string();
        self.field_exists(&struct_name, field).then_some((reg, struct_name))
    }

    fn field_type(&self, struct_name: &str, field: &str) -> Type {
        self.model
            .structs
            .get(struct_name)
            .and_then(|s| s.fields.iter().find(|f| f.name == field))
            .map(|f| f.ty.clone())
            .unwrap_or(Type::Any)
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], source: &crate::ast::SourceLocation) -> (VReg, Type) {
        if let Expr::Identifier(name, _) = callee {
            if name == "super" {
                return self.lower_super_call(args, source);
            }
        }
        if let Expr::Member { receiver, name, .. } = callee {
            let (recv, recv_ty) = self.lower_expr(receiver);
            let mut arg_regs = vec![recv];
            for a in args {
                arg_regs.push(self.lower_expr(a).0);
            }
            let returns = recv_ty
                .struct_name()
                .and_then(|sn| self.model.method_lookup(sn, name))
                .map(|m| m.returns.clone())
                .unwrap_or_else(|| {
                    self.error(
                        DiagnosticKind::UnresolvedSymbol,
                        source,
                        format!("no method '{name}' on '{recv_ty}'"),
                    );
                    Type::Any
                });
            let dst = (!matches!(returns, Type::Void)).then(|| self.fresh_reg());
            self.instrs.push(Instr::Call {
                dst,
                target: CallTarget::Virtual { method: name.clone() },
                args: arg_regs,
            });
            return (dst.unwrap_or_else(|| self.fresh_reg()), returns);
        }

        if let Expr::Identifier(name, _) = callee {
            if let Some(code) = builtin_syscall(name) {
                let mut arg_regs = Vec::new();
                for a in args {
                    arg_regs.push(self.lower_expr(a).0);
                }
                let dst = self.fresh_reg();
                self.instrs.push(Instr::Syscall {
                    dst: Some(dst),
                    code,
                    args: arg_regs,
                });
                return (dst, Type::Any);
            }
            let mut arg_regs = Vec::new();
            for a in args {
                arg_regs.push(self.lower_expr(a).0);
            }
            let returns = self
                .model
                .functions
                .get(name)
                .map(|f| f.returns.clone())
                .unwrap_or_else(|| {
                    self.error(
                        DiagnosticKind::UnresolvedSymbol,
                        source,
                        format!("call to unresolved function '{name}'"),
                    );
                    Type::Any
                });
            let dst = (!matches!(returns, Type::Void)).then(|| self.fresh_reg());
            self.instrs.push(Instr::Call {
                dst,
                target: CallTarget::Direct(name.clone()),
                args: arg_regs,
            });
            return (dst.unwrap_or_else(|| self.fresh_reg()), returns);
        }

        self.error(
            DiagnosticKind::ParseErrorUnsupportedFeature,
            source,
            "unsupported call target",
        );
        let dst = self.fresh_reg();
        self.instrs.push(Instr::LoadConst(dst, Value::Int(0)));
        (dst, Type::Any)
    }

    /// `super(args)` inside a constructor chains to the parent struct's
    /// matching-arity `__init__`, passing this constructor's own `this`
    /// ahead of the explicit args. Constructors are void, so the call is
    /// fire-and-forget; the expression result is a dummy register nothing
    /// should read.
    fn lower_super_call(&mut self, args: &[Expr], source: &crate::ast::SourceLocation) -> (VReg, Type) {
        let dummy = || Type::Void;
        let this_reg = match self.lookup("this") {
            Some(reg) => reg,
            None => {
                self.error(
                    DiagnosticKind::UnresolvedSymbol,
                    source,
                    "'super' used outside a constructor",
                );
                let dst = self.fresh_reg();
                self.instrs.push(Instr::LoadConst(dst, Value::Int(0)));
                return (dst, dummy());
            }
        };
        let struct_name = self.reg_type(this_reg).struct_name().unwrap_or_default().to_string();
        let parent = self
            .model
            .structs
            .get(&struct_name)
            .and_then(|s| s.parent.clone());
        let parent = match parent {
            Some(p) => p,
            None => {
                self.error(
                    DiagnosticKind::UnresolvedSymbol,
                    source,
                    format!("'{struct_name}' has no parent struct for 'super' to chain to"),
                );
                let dst = self.fresh_reg();
                self.instrs.push(Instr::LoadConst(dst, Value::Int(0)));
                return (dst, dummy());
            }
        };
        let mut arg_regs = vec![this_reg];
        for a in args {
            arg_regs.push(self.lower_expr(a).0);
        }
        if self.model.constructor_for_arity(&parent, args.len()).is_none() {
            self.error(
                DiagnosticKind::CtorNotFound,
                source,
                format!(
                    "struct '{}' has no constructor taking {} argument(s)",
                    parent,
                    args.len()
                ),
            );
        }
        self.instrs.push(Instr::Call {
            dst: None,
            target: CallTarget::Direct(format!("{parent}.__init__{}", args.len())),
            args: arg_regs,
        });
        let dst = self.fresh_reg();
        self.instrs.push(Instr::LoadConst(dst, Value::Int(0)));
        (dst, dummy())
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> (VReg, Type) {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lower_short_circuit(op, lhs, rhs);
        }
        let (l, lty) = self.lower_expr(lhs);
        let (r, rty) = self.lower_expr(rhs);
        let lw = lty.width().unwrap_or(Width::Int);
        let rw = rty.width().unwrap_or(Width::Int);
        let width = lw.promote(rw);
        let l = self.convert_if_needed(l, lw, width);
        let r = self.convert_if_needed(r, rw, width);
        let dst = self.fresh_reg();
        let result_ty = if matches!(
            op,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        ) {
            Type::Bool
        } else {
            width_to_type(width)
        };
        self.instrs.push(Instr::BinaryOp {
            dst,
            op,
            width,
            lhs: l,
            rhs: r,
        });
        (dst, result_ty)
    }

    fn lower_short_circuit(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> (VReg, Type) {
        let result = self.fresh_reg();
        let (l, _) = self.lower_expr(lhs);
        self.instrs.push(Instr::Move(result, l));
        let skip = self.fresh_label();
        match op {
            BinaryOp::And => self.instrs.push(Instr::JumpIfFalse(result, skip)),
            BinaryOp::Or => {
                // Skip evaluating rhs when lhs is already true: jump past
                // it by inverting through a temporary falsehood check.
                let not_l = self.fresh_reg();
                self.instrs.push(Instr::UnaryOp {
                    dst: not_l,
                    op: UnaryOp::Not,
                    width: Width::Int,
                    operand: l,
                });
                self.instrs.push(Instr::JumpIfFalse(not_l, skip));
            }
            _ => unreachable!(),
        }
        let (r, _) = self.lower_expr(rhs);
        self.instrs.push(Instr::Move(result, r));
        self.instrs.push(Instr::Label(skip));
        (result, Type::Bool)
    }

    fn convert_if_needed(&mut self, reg: VReg, from: Width, to: Width) -> VReg {
        if from == to {
            return reg;
        }
        let dst = self.fresh_reg();
        self.instrs.push(Instr::Convert { dst, src: reg, from, to });
        dst
    }
}

fn width_to_type(w: Width) -> Type {
    match w {
        Width::Byte => Type::Byte,
        Width::Short => Type::Short,
        Width::Int => Type::Int,
        Width::Long => Type::Long,
        Width::Float => Type::Float,
        Width::Double => Type::Double,
    }
}

fn literal_value(text: &str, width: Width, is_float_form: bool) -> Value {
    if is_float_form {
        match width {
            Width::Float => Value::Float(text.parse().unwrap_or(0.0)),
            _ => Value::Double(text.parse().unwrap_or(0.0)),
        }
    } else {
        let parsed: i64 = text.parse().unwrap_or(0);
        match width {
            Width::Byte => Value::Byte(parsed as i8),
            Width::Short => Value::Short(parsed as i16),
            Width::Int => Value::Int(parsed as i32),
            Width::Long => Value::Long(parsed),
            Width::Float => Value::Float(parsed as f32),
            Width::Double => Value::Double(parsed as f64),
        }
    }
}

fn default_value(ty: &Type) -> Value {
    match ty.width() {
        Some(Width::Byte) => Value::Byte(0),
        Some(Width::Short) => Value::Short(0),
        Some(Width::Int) => Value::Int(0),
        Some(Width::Long) => Value::Long(0),
        Some(Width::Float) => Value::Float(0.0),
        Some(Width::Double) => Value::Double(0.0),
        None => match ty {
            Type::Bool => Value::from_bool(false),
            Type::String => Value::Str(String::new()),
            _ => Value::Ref(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_file;
    use crate::semantic;
    use std::path::Path;

    fn build_ir(src: &str) -> (IrProgram, DiagnosticBag) {
        let (tokens, diags) = tokenize(Path::new("t.snow"), src);
        assert!(diags.is_empty());
        let (module, diags) = parse_file(Path::new("t.snow"), tokens);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let (model, diags) = semantic::build(&[module.clone()]);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        build(&[module], &model)
    }

    #[test]
    fn arithmetic_return_folds_into_binary_op() {
        let (program, diags) = build_ir(
            "function: main returns: int body: return 1+2 end body end function",
        );
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let f = &program.functions[0];
        assert!(f.instrs.iter().any(|i| matches!(i, Instr::BinaryOp { op: BinaryOp::Add, .. })));
        assert!(matches!(f.instrs.last(), Some(Instr::Return(Some(_)))));
    }

    #[test]
    fn break_outside_loop_is_a_diagnostic() {
        let (_program, diags) =
            build_ir("function: f returns: void body: break end body end function");
        assert!(diags.iter().any(|d| d.message.contains("'break'")));
    }

    #[test]
    fn loop_lowers_with_matching_labels() {
        let src = "function: count returns: int body: declare i:int=0 \
            loop: cond: i<3 step: i=i+1 body: i=i end body end loop \
            return i end body end function";
        let (program, diags) = build_ir(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let f = &program.functions[0];
        let labels: Vec<u32> = f
            .instrs
            .iter()
            .filter_map(|i| if let Instr::Label(l) = i { Some(*l) } else { None })
            .collect();
        let jumps: Vec<u32> = f
            .instrs
            .iter()
            .filter_map(|i| match i {
                Instr::Jump(l) => Some(*l),
                Instr::JumpIfFalse(_, l) => Some(*l),
                _ => None,
            })
            .collect();
        assert!(jumps.iter().all(|j| labels.contains(j)));
    }

    #[test]
    fn method_call_lowers_to_virtual_dispatch() {
        let src = "struct: Animal function: speak returns: int body: return 1 end body end function end struct\n\
            struct: Dog extends Animal function: speak returns: int body: return 2 end body end function end struct\n\
            function: main returns: int body: declare a:Animal=new Dog() return a.speak() end body end function";
        let (program, diags) = build_ir(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let main = program.functions.iter().find(|f| f.name == "main").unwrap();
        assert!(main.instrs.iter().any(|i| matches!(
            i,
            Instr::Call {
                target: CallTarget::Virtual { method },
                ..
            } if method == "speak"
        )));
    }

    #[test]
    fn ctor_not_found_is_reported() {
        let src = "struct: Point fields: x:int end struct\n\
            function: main returns: void body: declare p:Point=new Point(1,2) end body end function";
        let (_program, diags) = build_ir(src);
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::CtorNotFound));
    }
}
