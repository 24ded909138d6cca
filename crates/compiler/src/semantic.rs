//! Semantic pre-pass (spec §4.3): struct layout, inheritance, function/
//! method/constructor signature tables, and global constant folding. Runs
//! once over every resolved module before IR construction, so the IR
//! builder never has to re-derive field offsets or guess a call's target.

use crate::ast::{Declaration, Expr, Module, StructDef};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind};
use crate::types::Type;
use snow_core::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    /// The struct that declared this field (may be an ancestor of the
    /// struct this `FieldInfo` appears under).
    pub owner: String,
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub parent: Option<String>,
    /// Parent fields first, then this struct's own new fields — a field
    /// re-declared with the same name as an inherited one is dropped
    /// rather than shadowed, per spec §4.3.
    pub fields: Vec<FieldInfo>,
}

impl StructInfo {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<Type>,
    pub returns: Type,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub struct_name: String,
    pub name: String,
    /// `Type.m_K`, K = explicit args + 1 (implicit `this`), per spec §4.3.
    pub lowered: String,
    pub params: Vec<Type>,
    pub returns: Type,
}

#[derive(Debug, Clone)]
pub struct CtorInfo {
    pub struct_name: String,
    /// `Type.__init__N`, N = explicit arg count.
    pub lowered: String,
    pub params: Vec<Type>,
}

#[derive(Debug, Clone)]
pub struct GlobalInfo {
    pub name: String,
    pub ty: Option<Type>,
    pub is_const: bool,
    /// Present only for `const` globals whose initializer folded cleanly.
    pub const_value: Option<Value>,
    pub initializer: Option<Expr>,
}

#[derive(Debug, Default)]
pub struct SemanticModel {
    pub structs: HashMap<String, StructInfo>,
    pub functions: HashMap<String, FunctionInfo>,
    pub methods: HashMap<(String, String), MethodInfo>,
    pub constructors: HashMap<String, Vec<CtorInfo>>,
    /// Declaration order matters: it fixes VM global-slot indices.
    pub globals: Vec<GlobalInfo>,
}

impl SemanticModel {
    pub fn method_lookup(&self, struct_name: &str, method_name: &str) -> Option<&MethodInfo> {
        let mut current = Some(struct_name.to_string());
        while let Some(name) = current {
            if let Some(m) = self.methods.get(&(name.clone(), method_name.to_string())) {
                return Some(m);
            }
            current = self.structs.get(&name).and_then(|s| s.parent.clone());
        }
        None
    }

    pub fn constructor_for_arity(&self, struct_name: &str, arity: usize) -> Option<&CtorInfo> {
        self.constructors
            .get(struct_name)
            .and_then(|ctors| ctors.iter().find(|c| c.params.len() == arity))
    }

    pub fn is_subtype(&self, child: &str, ancestor: &str) -> bool {
        if child == ancestor {
            return true;
        }
        let mut current = self.structs.get(child).and_then(|s| s.parent.clone());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.structs.get(&name).and_then(|s| s.parent.clone());
        }
        false
    }
}

pub fn build(modules: &[Module]) -> (SemanticModel, DiagnosticBag) {
    let mut diagnostics = DiagnosticBag::new();
    let mut model = SemanticModel::default();
    let mut raw_structs: HashMap<String, &StructDef> = HashMap::new();

    for module in modules {
        for s in &module.structs {
            if raw_structs.insert(s.name.clone(), s).is_some() {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateName,
                    s.source.file.clone(),
                    s.source.line,
                    s.source.col,
                    format!("struct '{}' is defined more than once", s.name),
                ));
            }
        }
    }

    for name in raw_structs.keys().cloned().collect::<Vec<_>>() {
        if !model.structs.contains_key(&name) {
            resolve_layout(&name, &raw_structs, &mut model, &mut diagnostics, &mut Vec::new());
        }
    }

    for module in modules {
        for s in &module.structs {
            register_constructors(s, &mut model, &mut diagnostics);
            register_methods(s, &mut model, &mut diagnostics);
        }
        for f in &module.functions {
            let info = FunctionInfo {
                name: f.name.clone(),
                params: f.params.iter().map(|p| p.ty.clone()).collect(),
                returns: f.returns.clone(),
            };
            if model.functions.insert(f.name.clone(), info).is_some() {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateName,
                    f.source.file.clone(),
                    f.source.line,
                    f.source.col,
                    format!("function '{}' is defined more than once", f.name),
                ));
            }
        }
    }

    let mut folded: HashMap<String, Value> = HashMap::new();
    for module in modules {
        for g in &module.globals {
            register_global(g, &mut folded, &mut model, &mut diagnostics);
        }
    }

    (model, diagnostics)
}

/// Resolves a struct's merged field layout, recursing into its parent
/// first. `stack` tracks the in-progress chain so an inheritance cycle is
/// caught instead of recursing forever.
fn resolve_layout(
    name: &str,
    raw: &HashMap<String, &StructDef>,
    model: &mut SemanticModel,
    diagnostics: &mut DiagnosticBag,
    stack: &mut Vec<String>,
) {
    if model.structs.contains_key(name) {
        return;
    }
    let Some(def) = raw.get(name) else { return };
    if stack.contains(&name.to_string()) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnresolvedSymbol,
            def.source.file.clone(),
            def.source.line,
            def.source.col,
            format!(
                "inheritance cycle detected at struct '{}' (chain: {} -> {})",
                name,
                stack.join(" -> "),
                name
            ),
        ));
        model.structs.insert(
            name.to_string(),
            StructInfo {
                name: name.to_string(),
                parent: None,
                fields: Vec::new(),
            },
        );
        return;
    }

    let mut fields = Vec::new();
    if let Some(parent_name) = &def.parent {
        if !raw.contains_key(parent_name) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnresolvedSymbol,
                def.source.file.clone(),
                def.source.line,
                def.source.col,
                format!("struct '{}' extends unknown struct '{}'", name, parent_name),
            ));
        } else {
            stack.push(name.to_string());
            resolve_layout(parent_name, raw, model, diagnostics, stack);
            stack.pop();
            if let Some(parent_info) = model.structs.get(parent_name) {
                fields.extend(parent_info.fields.clone());
            }
        }
    }

    for field in &def.fields {
        if fields.iter().any(|f: &FieldInfo| f.name == field.name) {
            continue; // re-declaration of an inherited field is dropped, not shadowed
        }
        fields.push(FieldInfo {
            name: field.name.clone(),
            ty: field.ty.clone(),
            owner: name.to_string(),
        });
    }

    model.structs.insert(
        name.to_string(),
        StructInfo {
            name: name.to_string(),
            parent: def.parent.clone(),
            fields,
        },
    );
}

fn register_constructors(s: &StructDef, model: &mut SemanticModel, diagnostics: &mut DiagnosticBag) {
    let mut by_arity: HashMap<usize, ()> = HashMap::new();
    let entry = model.constructors.entry(s.name.clone()).or_default();
    for ctor in &s.constructors {
        let arity = ctor.params.len();
        if by_arity.insert(arity, ()).is_some() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::CtorAmbiguous,
                ctor.source.file.clone(),
                ctor.source.line,
                ctor.source.col,
                format!(
                    "struct '{}' declares more than one constructor with {} parameter(s)",
                    s.name, arity
                ),
            ));
            continue;
        }
        entry.push(CtorInfo {
            struct_name: s.name.clone(),
            lowered: format!("{}.__init__{}", s.name, arity),
            params: ctor.params.iter().map(|p| p.ty.clone()).collect(),
        });
    }
}

fn register_methods(s: &StructDef, model: &mut SemanticModel, diagnostics: &mut DiagnosticBag) {
    for method in &s.methods {
        let info = MethodInfo {
            struct_name: s.name.clone(),
            name: method.name.clone(),
            // Method names are already required unique per struct (the
            // DuplicateName check just below), so the lowered name only
            // needs the owner and the method's own name, not an arity
            // tag — unlike constructors, which share the `init` name and
            // can only be told apart by arity.
            lowered: format!("{}.m_{}", s.name, method.name),
            params: method.params.iter().map(|p| p.ty.clone()).collect(),
            returns: method.returns.clone(),
        };
        let key = (s.name.clone(), method.name.clone());
        if model.methods.insert(key, info).is_some() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::DuplicateName,
                method.source.file.clone(),
                method.source.line,
                method.source.col,
                format!(
                    "struct '{}' declares method '{}' more than once",
                    s.name, method.name
                ),
            ));
        }
    }
}

fn register_global(
    g: &Declaration,
    folded: &mut HashMap<String, Value>,
    model: &mut SemanticModel,
    diagnostics: &mut DiagnosticBag,
) {
    if model.globals.iter().any(|existing| existing.name == g.name) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::DuplicateName,
            g.source.file.clone(),
            g.source.line,
            g.source.col,
            format!("global '{}' is declared more than once", g.name),
        ));
        return;
    }

    let const_value = if g.is_const {
        match g.initializer.as_ref().and_then(|e| fold_const(e, folded)) {
            Some(v) => {
                folded.insert(g.name.clone(), v.clone());
                Some(v)
            }
            None => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    g.source.file.clone(),
                    g.source.line,
                    g.source.col,
                    format!(
                        "const '{}' initializer is not a compile-time constant",
                        g.name
                    ),
                ));
                None
            }
        }
    } else {
        None
    };

    model.globals.push(GlobalInfo {
        name: g.name.clone(),
        ty: g.ty.clone(),
        is_const: g.is_const,
        const_value,
        initializer: g.initializer.clone(),
    });
}

/// A deliberately small constant folder: literals, unary +/- and `!`, and
/// binary arithmetic/comparison/logical ops over already-folded operands
/// (including references to earlier `const` globals, evaluated in
/// declaration order — forward references between consts don't fold).
pub fn fold_const(expr: &Expr, consts: &HashMap<String, Value>) -> Option<Value> {
    match expr {
        Expr::Number {
            text,
            width,
            is_float_form,
            ..
        } => Some(number_literal_value(text, *width, *is_float_form)),
        Expr::Bool(b, _) => Some(Value::from_bool(*b)),
        Expr::Str(s, _) => Some(Value::Str(s.clone())),
        Expr::Identifier(name, _) => consts.get(name).cloned(),
        Expr::Unary { op, operand, .. } => {
            let v = fold_const(operand, consts)?;
            fold_unary(*op, v)
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let l = fold_const(lhs, consts)?;
            let r = fold_const(rhs, consts)?;
            fold_binary(*op, l, r)
        }
        _ => None,
    }
}

fn number_literal_value(text: &str, width: snow_core::Width, is_float_form: bool) -> Value {
    use snow_core::Width;
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

fn fold_unary(op: crate::ast::UnaryOp, v: Value) -> Option<Value> {
    use crate::ast::UnaryOp;
    match (op, &v) {
        (UnaryOp::Neg, Value::Byte(n)) => Some(Value::Byte(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Short(n)) => Some(Value::Short(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Int(n)) => Some(Value::Int(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Long(n)) => Some(Value::Long(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(n)) => Some(Value::Float(-n)),
        (UnaryOp::Neg, Value::Double(n)) => Some(Value::Double(-n)),
        (UnaryOp::Not, _) => Some(Value::from_bool(!v.is_truthy())),
        _ => None,
    }
}

fn fold_binary(op: crate::ast::BinaryOp, l: Value, r: Value) -> Option<Value> {
    use crate::ast::BinaryOp;
    match op {
        BinaryOp::And => return Some(Value::from_bool(l.is_truthy() && r.is_truthy())),
        BinaryOp::Or => return Some(Value::from_bool(l.is_truthy() || r.is_truthy())),
        _ => {}
    }
    if let (Value::Str(a), Value::Str(b)) = (&l, &r) {
        return match op {
            BinaryOp::Add => Some(Value::Str(format!("{a}{b}"))),
            BinaryOp::Eq => Some(Value::from_bool(a == b)),
            BinaryOp::NotEq => Some(Value::from_bool(a != b)),
            _ => None,
        };
    }
    let (lw, rw) = (l.width()?, r.width()?);
    let width = lw.promote(rw);
    if width.is_float() {
        let (a, b) = (l.as_f64(), r.as_f64());
        let num = |x: f64| {
            if width == snow_core::Width::Float {
                Value::Float(x as f32)
            } else {
                Value::Double(x)
            }
        };
        return match op {
            BinaryOp::Add => Some(num(a + b)),
            BinaryOp::Sub => Some(num(a - b)),
            BinaryOp::Mul => Some(num(a * b)),
            BinaryOp::Div => (b != 0.0).then(|| num(a / b)),
            BinaryOp::Mod => (b != 0.0).then(|| num(a % b)),
            BinaryOp::Eq => Some(Value::from_bool(a == b)),
            BinaryOp::NotEq => Some(Value::from_bool(a != b)),
            BinaryOp::Lt => Some(Value::from_bool(a < b)),
            BinaryOp::Le => Some(Value::from_bool(a <= b)),
            BinaryOp::Gt => Some(Value::from_bool(a > b)),
            BinaryOp::Ge => Some(Value::from_bool(a >= b)),
            _ => None,
        };
    }
    let (a, b) = (l.as_i64(), r.as_i64());
    let num = |x: i64| match width {
        snow_core::Width::Byte => Value::Byte(x as i8),
        snow_core::Width::Short => Value::Short(x as i16),
        snow_core::Width::Int => Value::Int(x as i32),
        _ => Value::Long(x),
    };
    match op {
        BinaryOp::Add => Some(num(a.wrapping_add(b))),
        BinaryOp::Sub => Some(num(a.wrapping_sub(b))),
        BinaryOp::Mul => Some(num(a.wrapping_mul(b))),
        BinaryOp::Div => (b != 0).then(|| num(a.wrapping_div(b))),
        BinaryOp::Mod => (b != 0).then(|| num(a.wrapping_rem(b))),
        BinaryOp::Eq => Some(Value::from_bool(a == b)),
        BinaryOp::NotEq => Some(Value::from_bool(a != b)),
        BinaryOp::Lt => Some(Value::from_bool(a < b)),
        BinaryOp::Le => Some(Value::from_bool(a <= b)),
        BinaryOp::Gt => Some(Value::from_bool(a > b)),
        BinaryOp::Ge => Some(Value::from_bool(a >= b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_file;
    use std::path::Path;

    fn build_from(src: &str) -> (SemanticModel, DiagnosticBag) {
        let (tokens, diags) = tokenize(Path::new("t.snow"), src);
        assert!(diags.is_empty());
        let (module, diags) = parse_file(Path::new("t.snow"), tokens);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        build(&[module])
    }

    #[test]
    fn inheritance_merges_fields_parent_first() {
        let src = "struct: Animal fields: legs:int end struct\n\
            struct: Dog extends Animal fields: breed:string end struct";
        let (model, diags) = build_from(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let dog = &model.structs["Dog"];
        assert_eq!(dog.fields[0].name, "legs");
        assert_eq!(dog.fields[1].name, "breed");
    }

    #[test]
    fn duplicate_field_name_is_dropped_not_shadowed() {
        let src = "struct: Animal fields: legs:int end struct\n\
            struct: Dog extends Animal fields: legs:int, breed:string end struct";
        let (model, diags) = build_from(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let dog = &model.structs["Dog"];
        assert_eq!(dog.fields.len(), 2);
        assert_eq!(dog.fields[0].owner, "Animal");
    }

    #[test]
    fn inheritance_cycle_is_diagnosed_not_infinite() {
        let src = "struct: A extends B end struct\nstruct: B extends A end struct";
        let (_model, diags) = build_from(src);
        assert!(!diags.is_empty());
    }

    #[test]
    fn method_lookup_walks_up_to_ancestor() {
        let src = "struct: Animal function: speak returns: int body: return 1 end body end function end struct\n\
            struct: Dog extends Animal end struct";
        let (model, diags) = build_from(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let m = model.method_lookup("Dog", "speak").expect("inherited method");
        assert_eq!(m.struct_name, "Animal");
        assert_eq!(m.lowered, "Animal.m_speak");
    }

    #[test]
    fn constructor_ambiguity_on_duplicate_arity() {
        let src = "struct: Point fields: x:int, y:int \
            init: params: declare x:int body: return end body end init \
            init: params: declare y:int body: return end body end init \
            end struct";
        let (_model, diags) = build_from(src);
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::CtorAmbiguous));
    }

    #[test]
    fn const_folding_propagates_through_earlier_consts() {
        let src = "const declare a:int=2\nconst declare b:int=a*3";
        let (model, diags) = build_from(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        assert_eq!(model.globals[1].const_value, Some(Value::Int(6)));
    }
}
