//! Module containing the bytecode interpreter.

mod eval;
pub mod frame;
mod run;
pub mod trace;
pub mod value;

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;

use self::frame::StackFrame;
use self::value::Value;

/// An installed catch target.
#[derive(Debug, Clone, Copy)]
struct Handler {
    /// Index into the call stack of the frame that installed it.
    frame_index: usize,
    /// Instruction offset execution continues at after a raise.
    catch_ip: usize,
}

#[derive(Debug)]
pub struct VM {
    config: Box<Config>,
    /// The call stack. Frames are shared because generators retain
    /// theirs between resumptions.
    frames: Vec<Rc<RefCell<StackFrame>>>,
    /// Active exception handlers across the whole call stack,
    /// innermost last.
    handlers: Vec<Handler>,
    /// The value most recently raised, consumed by the handler.
    exception: Option<Value>,
}

impl VM {
    pub fn new() -> VM {
        VM::with_config(Config::new())
    }

    pub fn with_config(config: Config) -> VM {
        VM {
            config: Box::new(config),
            frames: Vec::new(),
            handlers: Vec::new(),
            exception: None,
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        VM::new()
    }
}
