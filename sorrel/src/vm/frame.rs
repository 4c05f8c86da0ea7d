//! Call frames.

use std::cell::RefCell;
use std::rc::Rc;

use crate::vm::value::{CaptureCell, Closure, Value};

/// One activation of a closure. Frames are reference counted because a
/// generator keeps its frame alive across resumptions, and open capture
/// cells point back into the frame they read from.
#[derive(Debug)]
pub struct StackFrame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    /// Open capture cells by local slot, shared with every closure that
    /// captured the slot.
    pub open_captures: Vec<Option<Rc<CaptureCell>>>,
    /// How many entries on the shared handler stack this frame owns.
    pub handler_count: usize,
    /// Catch offsets carried across a yield, innermost first.
    pub saved_handlers: Vec<usize>,
    pub yielded: bool,
    /// Set when an exception unwinds past this frame.
    pub aborted: bool,
}

impl StackFrame {
    pub fn new(closure: Rc<Closure>) -> StackFrame {
        let num_locals = closure.prototype.max_local_count as usize;
        let stack = Vec::with_capacity(closure.prototype.max_stack_count as usize);
        StackFrame {
            closure,
            ip: 0,
            locals: vec![Value::Nil; num_locals],
            stack,
            open_captures: vec![None; num_locals],
            handler_count: 0,
            saved_handlers: Vec::new(),
            yielded: false,
            aborted: false,
        }
    }

    /// Bind call arguments to parameter slots. Missing arguments take
    /// the closure's defaults; a variadic final parameter collects any
    /// excess into a list, or an empty list when none were given.
    pub fn set_args(&mut self, args: Vec<Value>) {
        let prototype = Rc::clone(&self.closure.prototype);
        let num_params = prototype.num_params as usize;
        let fixed = if prototype.has_vargs {
            num_params.saturating_sub(1)
        } else {
            num_params
        };

        let mut args = args.into_iter();
        for i in 0..fixed {
            self.locals[i] = match args.next() {
                Some(value) => value,
                None => self.closure.defaults.get(i).cloned().unwrap_or(Value::Nil),
            };
        }
        if prototype.has_vargs && num_params > 0 {
            let rest: Vec<Value> = args.collect();
            self.locals[num_params - 1] = Value::List(Rc::new(RefCell::new(rest)));
        }
    }

    /// Rewind for a tail call; the caller rebinds arguments after.
    pub fn reset(&mut self) {
        self.ip = 0;
        self.stack.clear();
        for local in self.locals.iter_mut() {
            *local = Value::Nil;
        }
        self.handler_count = 0;
        self.yielded = false;
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => panic!("operand stack underflow"),
        }
    }

    /// Pop `count` values, preserving their stack order.
    pub fn pop_count(&mut self, count: usize) -> Vec<Value> {
        debug_assert!(count <= self.stack.len(), "operand stack underflow");
        let at = self.stack.len().saturating_sub(count);
        self.stack.split_off(at)
    }

    pub fn peek(&self) -> &Value {
        match self.stack.last() {
            Some(value) => value,
            None => panic!("operand stack underflow"),
        }
    }

    pub fn dup(&mut self) {
        let value = self.peek().clone();
        self.push(value);
    }

    pub fn has_value(&self) -> bool {
        !self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FunctionPrototype, Module};

    fn frame(num_params: u32, has_vargs: bool, defaults: Vec<Value>) -> StackFrame {
        let prototype = FunctionPrototype {
            num_params,
            has_vargs,
            max_local_count: num_params + 1,
            max_stack_count: 8,
            ..FunctionPrototype::default()
        };
        StackFrame::new(Rc::new(Closure {
            prototype: Rc::new(prototype),
            module: Module::empty(),
            captures: Vec::new(),
            defaults,
        }))
    }

    #[test]
    fn missing_arguments_take_defaults() {
        let mut f = frame(2, false, vec![Value::Nil, Value::Number(7.0)]);
        f.set_args(vec![Value::Number(1.0)]);
        assert_eq!(f.locals[0], Value::Number(1.0));
        assert_eq!(f.locals[1], Value::Number(7.0));
    }

    #[test]
    fn vargs_collect_the_excess() {
        let mut f = frame(2, true, vec![Value::Nil]);
        f.set_args(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
        ]);
        assert_eq!(f.locals[0], Value::Number(1.0));
        let rest = Value::List(Rc::new(RefCell::new(vec![
            Value::Number(2.0),
            Value::Number(3.0),
        ])));
        assert_eq!(f.locals[1], rest);
    }

    #[test]
    fn vargs_default_to_an_empty_list() {
        let mut f = frame(1, true, vec![]);
        f.set_args(vec![]);
        assert_eq!(f.locals[0], Value::List(Rc::new(RefCell::new(vec![]))));
    }

    #[test]
    fn pop_count_preserves_order() {
        let mut f = frame(0, false, vec![]);
        f.push(Value::Number(1.0));
        f.push(Value::Number(2.0));
        f.push(Value::Number(3.0));
        let args = f.pop_count(2);
        assert_eq!(args, vec![Value::Number(2.0), Value::Number(3.0)]);
        assert_eq!(f.pop(), Value::Number(1.0));
    }

    #[test]
    fn reset_clears_execution_state() {
        let mut f = frame(1, false, vec![]);
        f.set_args(vec![Value::Number(4.0)]);
        f.push(Value::Nil);
        f.ip = 10;
        f.handler_count = 2;
        f.reset();
        assert_eq!(f.ip, 0);
        assert!(!f.has_value());
        assert_eq!(f.locals[0], Value::Nil);
        assert_eq!(f.handler_count, 0);
    }
}
