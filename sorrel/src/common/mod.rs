//! Module containing datastructures and utilities shared in various other modules.

pub mod insn;
pub use insn::Opcode;

mod prototype;
pub use prototype::{CaptureInfo, CaptureKind, FunctionPrototype};

mod module;
pub use module::{CompiledModule, Module};

mod immutable_string;
pub use immutable_string::ImmutableString;

mod disassembler;
pub use disassembler::Disassembler;
