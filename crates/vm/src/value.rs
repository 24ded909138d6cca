//! Runtime value and heap-object representation.
//!
//! Reuses `snow_core::Value` rather than a separate FFI-layout type —
//! the teacher's 40-byte `#[repr(C)]` stack value exists only to cross
//! an LLVM-codegen FFI boundary, which a pure Rust interpreter never
//! has. Struct instances are `Value::Ref`, an index into `Heap`.

use crate::error::VmError;
use crate::loader::StructDef;
use snow_core::Value;
use std::collections::HashMap;

/// A live struct instance: its runtime struct name (for `CALLV` dispatch
/// and `instanceof`-style checks) plus its field values, laid out in the
/// same parent-first order as the struct's merged layout.
#[derive(Debug, Clone)]
pub struct Instance {
    pub struct_name: String,
    pub fields: Vec<Value>,
}

/// The VM's object table. `New` allocates into it; `GetField`/`PutField`
/// and `CALLV` look receivers up by the `ObjectRef` handle carried in a
/// `Value::Ref`.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Instance>,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    pub fn allocate(&mut self, struct_name: String, fields: Vec<Value>) -> u64 {
        let id = self.objects.len() as u64;
        self.objects.push(Instance { struct_name, fields });
        id
    }

    pub fn get(&self, id: u64) -> Result<&Instance, VmError> {
        self.objects
            .get(id as usize)
            .ok_or_else(|| VmError::TypeMismatch(format!("reference #{id} does not name a live object")))
    }

    pub fn get_mut(&mut self, id: u64) -> Result<&mut Instance, VmError> {
        self.objects
            .get_mut(id as usize)
            .ok_or_else(|| VmError::TypeMismatch(format!("reference #{id} does not name a live object")))
    }
}

/// Walks a struct's ancestor chain, innermost first, yielding each
/// struct name up to and including the root. Used both to build a new
/// instance's default field layout and to resolve `CALLV`'s vtable walk.
pub fn ancestor_chain<'a>(structs: &'a HashMap<String, StructDef>, mut name: &'a str) -> Vec<&'a str> {
    let mut chain = Vec::new();
    loop {
        chain.push(name);
        match structs.get(name).and_then(|s| s.parent.as_deref()) {
            Some(parent) => name = parent,
            None => break,
        }
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_get_round_trips() {
        let mut heap = Heap::new();
        let id = heap.allocate("Dog".to_string(), vec![Value::Int(3)]);
        assert_eq!(heap.get(id).unwrap().struct_name, "Dog");
    }

    #[test]
    fn get_on_unknown_id_is_an_error_not_a_panic() {
        let heap = Heap::new();
        assert!(heap.get(99).is_err());
    }

    #[test]
    fn ancestor_chain_walks_to_root() {
        let mut structs = HashMap::new();
        structs.insert("Animal".to_string(), StructDef { name: "Animal".into(), parent: None, fields: vec![] });
        structs.insert(
            "Dog".to_string(),
            StructDef { name: "Dog".into(), parent: Some("Animal".into()), fields: vec![] },
        );
        assert_eq!(ancestor_chain(&structs, "Dog"), vec!["Dog", "Animal"]);
    }
}
