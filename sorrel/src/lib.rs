pub mod common;
pub mod compiler;
pub mod config;
pub mod error;
pub mod vm;

pub use vm::VM;

pub use common::{CompiledModule, Module};
pub use config::Config;
pub use error::SorrelError;
pub use vm::value::Value;
