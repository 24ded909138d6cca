//! Snow Core: shared numeric-width model and tagged value representation.
//!
//! This crate is the common foundation linking the compiler (which folds
//! constants and picks width-tagged opcodes) and the VM (which tags every
//! operand-stack entry and local slot with the same widths). Keeping both
//! sides of the pipeline built on one `Width`/`Value` definition is what lets
//! `ADD_I32` mean the same thing to the backend that emits it and the VM
//! handler that executes it.
//!
//! # Modules
//!
//! - `width`: the promotion lattice `byte ≺ short ≺ int ≺ long ≺ float ≺
//!   double` and the mnemonic prefix letters used in `.water` opcodes.
//! - `value`: `Value`, the tagged constant/runtime value.

pub mod value;
pub mod width;

pub use value::Value;
pub use width::Width;
