//! Module containing the bytecode compiler.

pub mod ast;
mod builder;
mod codegen;

pub use codegen::compile;
