//! The interpreter loop.

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::insn::{self, Opcode};
use crate::common::{CaptureKind, ImmutableString};

use super::frame::StackFrame;
use super::trace::Trace;
use super::value::{
    CaptureCell, Closure, Generator, GeneratorKind, GeneratorState, Value,
};
use super::{Handler, VM};

/// Outcome of resuming a generator.
pub(crate) enum Resumed {
    /// The generator yielded a value.
    Value(Value),
    /// The generator just died; resuming it produced no value.
    Done,
    /// An exception was raised and control already moved to a handler.
    Dispatched,
}

impl VM {
    /// Call a closure with the given arguments and run it to completion.
    pub(crate) fn call(&mut self, closure: Rc<Closure>, args: Vec<Value>) -> Result<Value, Trace> {
        match self.call_closure(closure, args)? {
            Some(value) => Ok(value),
            // the exception was dispatched to an enclosing frame
            None => Ok(Value::Nil),
        }
    }

    fn call_closure(
        &mut self,
        closure: Rc<Closure>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Trace> {
        let mut frame = StackFrame::new(closure);
        frame.set_args(args);
        self.execute(Rc::new(RefCell::new(frame)))
    }

    /// Run `frame` until it returns, yields, or is unwound by a raise.
    ///
    /// `Ok(None)` means the frame was aborted and an enclosing frame's
    /// handler has already been given control.
    fn execute(&mut self, frame: Rc<RefCell<StackFrame>>) -> Result<Option<Value>, Trace> {
        self.frames.push(Rc::clone(&frame));
        self.reinstall_handlers(&frame);

        loop {
            let (ip, word, done) = {
                let f = frame.borrow();
                if f.aborted {
                    // the raise that unwound this frame already removed
                    // it from the call stack
                    return Ok(None);
                }
                if f.yielded {
                    break;
                }
                let code = &f.closure.prototype.code;
                if f.ip >= code.len() {
                    (0, 0, true)
                } else {
                    (f.ip, code[f.ip], false)
                }
            };
            if done {
                break;
            }
            frame.borrow_mut().ip = ip + 1;
            if self.config.trace {
                eprintln!("{:04} {:?}", ip, insn::get_op(word));
            }
            self.dispatch(&frame, word)?;
        }

        let yielded = frame.borrow().yielded;
        if yielded {
            let value = frame.borrow_mut().pop();
            self.suspend(&frame);
            self.frames.pop();
            return Ok(Some(value));
        }

        self.end_call(&frame);
        self.frames.pop();
        let value = {
            let mut f = frame.borrow_mut();
            if f.has_value() {
                f.pop()
            } else {
                Value::Nil
            }
        };
        Ok(Some(value))
    }

    /// Put back the handlers this frame saved when it last yielded.
    fn reinstall_handlers(&mut self, frame: &Rc<RefCell<StackFrame>>) {
        let saved: Vec<usize> = frame.borrow_mut().saved_handlers.drain(..).collect();
        if saved.is_empty() {
            return;
        }
        let frame_index = self.frames.len() - 1;
        let mut f = frame.borrow_mut();
        // saved innermost first, so reinstall in reverse
        for catch_ip in saved.into_iter().rev() {
            self.handlers.push(Handler {
                frame_index,
                catch_ip,
            });
            f.handler_count += 1;
        }
    }

    /// Take this frame's handlers off the shared stack so they survive
    /// the yield; its open captures stay open.
    fn suspend(&mut self, frame: &Rc<RefCell<StackFrame>>) {
        let mut f = frame.borrow_mut();
        for _ in 0..f.handler_count {
            match self.handlers.pop() {
                Some(handler) => f.saved_handlers.push(handler.catch_ip),
                None => panic!("handler stack out of sync"),
            }
        }
        f.handler_count = 0;
    }

    fn end_call(&mut self, frame: &Rc<RefCell<StackFrame>>) {
        let count = frame.borrow().handler_count;
        for _ in 0..count {
            self.handlers.pop();
        }
        frame.borrow_mut().handler_count = 0;
        self.close_frame_captures(frame);
    }

    fn close_frame_captures(&mut self, frame: &Rc<RefCell<StackFrame>>) {
        let cells: Vec<Rc<CaptureCell>> = {
            let mut f = frame.borrow_mut();
            f.open_captures.iter_mut().filter_map(|cell| cell.take()).collect()
        };
        for cell in cells {
            cell.close();
        }
    }

    /// Hand `value` to the innermost handler, unwinding frames down to
    /// the one that installed it. With no handler installed the raise is
    /// fatal and carries a frame-by-frame trace.
    fn raise(&mut self, value: Value) -> Result<(), Trace> {
        let handler = match self.handlers.pop() {
            Some(handler) => handler,
            None => return Err(self.unhandled(value)),
        };
        while self.frames.len() > handler.frame_index + 1 {
            if let Some(frame) = self.frames.pop() {
                frame.borrow_mut().aborted = true;
                self.close_frame_captures(&frame);
            }
        }
        let frame = Rc::clone(&self.frames[handler.frame_index]);
        let mut f = frame.borrow_mut();
        f.handler_count = f.handler_count.saturating_sub(1);
        f.ip = handler.catch_ip;
        self.exception = Some(value);
        Ok(())
    }

    fn raise_message(&mut self, message: String) -> Result<(), Trace> {
        self.raise(Value::String(ImmutableString::from(message)))
    }

    fn unhandled(&mut self, value: Value) -> Trace {
        let message = match &value {
            Value::String(s) => format!("Unhandled exception: {}", s),
            other => format!("Unhandled exception: {}", other),
        };
        let mut trace = Trace::new(&message);
        while let Some(frame) = self.frames.pop() {
            frame.borrow_mut().aborted = true;
            self.close_frame_captures(&frame);
            let f = frame.borrow();
            let prototype = &f.closure.prototype;
            let line = prototype
                .lines
                .get(f.ip.saturating_sub(1))
                .copied()
                .unwrap_or(0);
            trace.add_frame(prototype.format_name(), &prototype.file_name, line);
        }
        self.handlers.clear();
        self.exception = None;
        trace
    }

    fn dispatch(&mut self, frame: &Rc<RefCell<StackFrame>>, word: u32) -> Result<(), Trace> {
        match insn::get_op(word) {
            Opcode::NoOp => {}
            Opcode::Pop => {
                frame.borrow_mut().pop();
            }
            Opcode::Dup => frame.borrow_mut().dup(),
            Opcode::Close => {
                let new_top = insn::get_c(word) as usize;
                let cells: Vec<Rc<CaptureCell>> = {
                    let mut f = frame.borrow_mut();
                    f.open_captures[new_top..]
                        .iter_mut()
                        .filter_map(|cell| cell.take())
                        .collect()
                };
                for cell in cells {
                    cell.close();
                }
            }

            Opcode::Jump => frame.borrow_mut().ip = insn::get_c(word) as usize,
            Opcode::JumpEq => {
                let mut f = frame.borrow_mut();
                let rhs = f.pop();
                let lhs = f.pop();
                if lhs == rhs {
                    f.ip = insn::get_c(word) as usize;
                }
            }
            Opcode::JumpNeq => {
                let mut f = frame.borrow_mut();
                let rhs = f.pop();
                let lhs = f.pop();
                if lhs != rhs {
                    f.ip = insn::get_c(word) as usize;
                }
            }
            Opcode::JumpTrue => {
                let mut f = frame.borrow_mut();
                let value = f.pop();
                if value.is_truthy() {
                    f.ip = insn::get_c(word) as usize;
                }
            }
            Opcode::JumpFalse => {
                let mut f = frame.borrow_mut();
                let value = f.pop();
                if !value.is_truthy() {
                    f.ip = insn::get_c(word) as usize;
                }
            }

            Opcode::And => {
                // short-circuit: a falsy lhs stays as the result
                let mut f = frame.borrow_mut();
                if f.peek().is_truthy() {
                    f.pop();
                } else {
                    f.ip = insn::get_c(word) as usize;
                }
            }
            Opcode::Or => {
                let mut f = frame.borrow_mut();
                if f.peek().is_truthy() {
                    f.ip = insn::get_c(word) as usize;
                } else {
                    f.pop();
                }
            }
            Opcode::Not => {
                let mut f = frame.borrow_mut();
                let value = f.pop();
                f.push(Value::Boolean(!value.is_truthy()));
            }

            Opcode::LoadLocal => {
                let slot = insn::get_c(word) as usize;
                let mut f = frame.borrow_mut();
                let value = f.locals[slot].clone();
                f.push(value);
            }
            Opcode::SaveLocal => {
                // the value stays on the stack; a Pop follows at
                // statement level
                let slot = insn::get_c(word) as usize;
                let mut f = frame.borrow_mut();
                let value = f.peek().clone();
                f.locals[slot] = value;
            }
            Opcode::LoadCapture => {
                let index = insn::get_c(word) as usize;
                let cell = Rc::clone(&frame.borrow().closure.captures[index]);
                let value = cell.get();
                frame.borrow_mut().push(value);
            }
            Opcode::SaveCapture => {
                let index = insn::get_c(word) as usize;
                let cell = Rc::clone(&frame.borrow().closure.captures[index]);
                let value = frame.borrow().peek().clone();
                cell.set(value);
            }
            Opcode::LoadGlobal => {
                let name = self.constant_string(frame, word);
                let module = Rc::clone(&frame.borrow().closure.module);
                let value = module.borrow().get_var(&name);
                match value {
                    Some(value) => frame.borrow_mut().push(value),
                    None => self.raise_message(format!("Undefined variable '{}'.", name))?,
                }
            }
            Opcode::SaveGlobal => {
                let name = self.constant_string(frame, word);
                let value = frame.borrow().peek().clone();
                let module = Rc::clone(&frame.borrow().closure.module);
                let result = module.borrow_mut().set_var(&name, value);
                if let Err(message) = result {
                    self.raise_message(message)?;
                }
            }

            Opcode::LoadIndex => {
                let count = insn::get_c(word) as usize;
                let (args, target) = {
                    let mut f = frame.borrow_mut();
                    let args = f.pop_count(count);
                    let target = f.pop();
                    (args, target)
                };
                match target.get_index(&args[0]) {
                    Ok(value) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }
            Opcode::SaveIndex => {
                let count = insn::get_c(word) as usize;
                let (value, args, target) = {
                    let mut f = frame.borrow_mut();
                    let value = f.pop();
                    let args = f.pop_count(count);
                    let target = f.pop();
                    (value, args, target)
                };
                match target.set_index(&args[0], value.clone()) {
                    Ok(()) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }
            Opcode::LoadField => {
                let name = self.constant_string(frame, word);
                let target = frame.borrow_mut().pop();
                match target.get_field(&name) {
                    Ok(value) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }
            Opcode::SaveField => {
                let name = self.constant_string(frame, word);
                let (value, target) = {
                    let mut f = frame.borrow_mut();
                    let value = f.pop();
                    let target = f.pop();
                    (value, target)
                };
                match target.set_field(&name, value.clone()) {
                    Ok(()) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }
            Opcode::LoadOperIndex => {
                let oper = self.constant_string(frame, word);
                let target = frame.borrow_mut().pop();
                match target.get_oper_index(&oper) {
                    Ok(value) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }
            Opcode::SaveOperIndex => {
                let oper = self.constant_string(frame, word);
                let (value, target) = {
                    let mut f = frame.borrow_mut();
                    let value = f.pop();
                    let target = f.pop();
                    (value, target)
                };
                match target.set_oper_index(&oper, value.clone()) {
                    Ok(()) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }

            Opcode::Prefix => {
                let oper = self.constant_string(frame, word);
                let value = frame.borrow_mut().pop();
                match value.prefix(&oper) {
                    Ok(value) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }
            Opcode::Infix => {
                let oper = self.constant_string(frame, word);
                let (lhs, rhs) = {
                    let mut f = frame.borrow_mut();
                    let rhs = f.pop();
                    let lhs = f.pop();
                    (lhs, rhs)
                };
                match Value::infix(&oper, &lhs, &rhs) {
                    Ok(value) => frame.borrow_mut().push(value),
                    Err(message) => self.raise_message(message)?,
                }
            }

            Opcode::Nil => frame.borrow_mut().push(Value::Nil),
            Opcode::True => frame.borrow_mut().push(Value::Boolean(true)),
            Opcode::False => frame.borrow_mut().push(Value::Boolean(false)),
            Opcode::LoadNumber => {
                let index = insn::get_c(word) as usize;
                let mut f = frame.borrow_mut();
                let value = f.closure.prototype.numbers[index];
                f.push(Value::Number(value));
            }
            Opcode::LoadString => {
                let value = self.constant_string(frame, word);
                frame
                    .borrow_mut()
                    .push(Value::String(ImmutableString::from(value)));
            }

            Opcode::BuildList => {
                let count = insn::get_c(word) as usize;
                let mut f = frame.borrow_mut();
                let values = f.pop_count(count);
                f.push(Value::List(Rc::new(RefCell::new(values))));
            }
            Opcode::BuildClosure => self.build_closure(frame, word),
            Opcode::BuildGenerator => {
                let value = frame.borrow_mut().pop();
                match value {
                    Value::Closure(closure) => {
                        frame.borrow_mut().push(Value::Spawner(closure))
                    }
                    other => self.raise_message(format!(
                        "Only a function can be made into a generator, got a(n) {}.",
                        other.type_name()
                    ))?,
                }
            }

            Opcode::Call => {
                let argc = insn::get_c(word) as usize;
                let (args, callee) = {
                    let mut f = frame.borrow_mut();
                    let args = f.pop_count(argc);
                    let callee = f.pop();
                    (args, callee)
                };
                self.invoke(frame, callee, args)?;
            }
            Opcode::CallMethod => {
                let argc = insn::get_a(word) as usize;
                let name = {
                    let f = frame.borrow();
                    f.closure.prototype.strings[insn::get_b(word) as usize].clone()
                };
                let (args, target) = {
                    let mut f = frame.borrow_mut();
                    let args = f.pop_count(argc);
                    let target = f.pop();
                    (args, target)
                };
                match target.get_field(&name) {
                    Ok(method) => self.invoke(frame, method, args)?,
                    Err(message) => self.raise_message(message)?,
                }
            }
            Opcode::TailCall => {
                let argc = insn::get_c(word) as usize;
                let args = frame.borrow_mut().pop_count(argc);
                // tear the frame down in place instead of growing the
                // call stack
                let count = frame.borrow().handler_count;
                for _ in 0..count {
                    self.handlers.pop();
                }
                self.close_frame_captures(frame);
                let mut f = frame.borrow_mut();
                f.reset();
                f.set_args(args);
            }
            Opcode::Return => {
                let mut f = frame.borrow_mut();
                f.ip = f.closure.prototype.code.len();
            }

            Opcode::Yield => frame.borrow_mut().yielded = true,
            Opcode::Resume => {
                let value = frame.borrow_mut().pop();
                match value {
                    Value::Generator(generator) => match self.resume(&generator)? {
                        Resumed::Value(value) => frame.borrow_mut().push(value),
                        Resumed::Done => frame.borrow_mut().push(Value::Nil),
                        Resumed::Dispatched => {}
                    },
                    other => self.raise_message(format!(
                        "Expected a generator to resume, got a(n) {}.",
                        other.type_name()
                    ))?,
                }
            }

            Opcode::Throw => {
                let value = frame.borrow_mut().pop();
                self.raise(value)?;
            }
            Opcode::PushHandler => {
                self.handlers.push(Handler {
                    frame_index: self.frames.len() - 1,
                    catch_ip: insn::get_c(word) as usize,
                });
                frame.borrow_mut().handler_count += 1;
            }
            Opcode::PopHandler => {
                self.handlers.pop();
                let mut f = frame.borrow_mut();
                f.handler_count = f.handler_count.saturating_sub(1);
            }
            Opcode::BeginHandler => {
                // drop whatever the aborted body left behind
                let depth = insn::get_c(word) as usize;
                frame.borrow_mut().stack.truncate(depth);
            }
            Opcode::SaveException => {
                let slot = insn::get_c(word) as usize;
                let value = self.exception.take().unwrap_or(Value::Nil);
                frame.borrow_mut().locals[slot] = value;
            }

            Opcode::IterPrep => self.iter_prep(frame, word)?,
            Opcode::IterLoop => self.iter_loop(frame, word),
            Opcode::EachPrep => {
                let var = insn::get_c(word) as usize;
                if let Some(generator) = self.each_prep(frame)? {
                    frame.borrow_mut().locals[var + 1] = Value::Generator(generator);
                }
            }
            Opcode::EachLoop => {
                let var = insn::get_a(word) as usize;
                let exit = insn::get_b(word) as usize;
                let generator = self.loop_generator(frame, var + 1);
                match self.resume(&generator)? {
                    Resumed::Value(value) => frame.borrow_mut().locals[var] = value,
                    Resumed::Done => frame.borrow_mut().ip = exit,
                    Resumed::Dispatched => {}
                }
            }
            Opcode::IEachPrep => {
                let var = insn::get_c(word) as usize;
                if let Some(generator) = self.each_prep(frame)? {
                    let mut f = frame.borrow_mut();
                    f.locals[var + 1] = Value::Number(0.0);
                    f.locals[var + 3] = Value::Generator(generator);
                }
            }
            Opcode::IEachLoop => {
                let var = insn::get_a(word) as usize;
                let exit = insn::get_b(word) as usize;
                let generator = self.loop_generator(frame, var + 3);
                match self.resume(&generator)? {
                    Resumed::Value(value) => {
                        let mut f = frame.borrow_mut();
                        let count = match f.locals[var + 1] {
                            Value::Number(count) => count + 1.0,
                            _ => panic!("indexed each counter slot corrupted"),
                        };
                        f.locals[var] = Value::Number(count);
                        f.locals[var + 1] = Value::Number(count);
                        f.locals[var + 2] = value;
                    }
                    Resumed::Done => frame.borrow_mut().ip = exit,
                    Resumed::Dispatched => {}
                }
            }
        }
        Ok(())
    }

    fn constant_string(&self, frame: &Rc<RefCell<StackFrame>>, word: u32) -> String {
        let index = insn::get_c(word) as usize;
        frame.borrow().closure.prototype.strings[index].clone()
    }

    fn build_closure(&mut self, frame: &Rc<RefCell<StackFrame>>, word: u32) {
        let index = insn::get_a(word) as usize;
        let num_defaults = insn::get_b(word) as usize;

        let prototype = {
            let f = frame.borrow();
            Rc::clone(&f.closure.prototype.nested[index])
        };

        // defaults are emitted for the trailing parameters; pad the
        // leading ones with nil
        let fixed = (prototype.num_params as usize)
            .saturating_sub(if prototype.has_vargs { 1 } else { 0 });
        let given = frame.borrow_mut().pop_count(num_defaults);
        let mut defaults = vec![Value::Nil; fixed.saturating_sub(num_defaults)];
        defaults.extend(given);

        let mut captures = Vec::with_capacity(prototype.captures.len());
        for info in prototype.captures.iter() {
            let cell = match info.kind {
                CaptureKind::Local => self.capture_local(frame, info.index as usize),
                CaptureKind::Outer => {
                    Rc::clone(&frame.borrow().closure.captures[info.index as usize])
                }
            };
            captures.push(cell);
        }

        let module = Rc::clone(&frame.borrow().closure.module);
        frame.borrow_mut().push(Value::Closure(Rc::new(Closure {
            prototype,
            module,
            captures,
            defaults,
        })));
    }

    /// Reuse the open cell for `slot` if one exists, otherwise open one.
    fn capture_local(&self, frame: &Rc<RefCell<StackFrame>>, slot: usize) -> Rc<CaptureCell> {
        if let Some(cell) = &frame.borrow().open_captures[slot] {
            return Rc::clone(cell);
        }
        let cell = CaptureCell::open(frame, slot);
        frame.borrow_mut().open_captures[slot] = Some(Rc::clone(&cell));
        cell
    }

    fn invoke(
        &mut self,
        frame: &Rc<RefCell<StackFrame>>,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<(), Trace> {
        match callee {
            Value::Closure(closure) => {
                if let Some(value) = self.call_closure(closure, args)? {
                    frame.borrow_mut().push(value);
                }
                Ok(())
            }
            Value::Spawner(closure) => {
                // arguments are bound now, execution waits for the
                // first resume
                let mut gen_frame = StackFrame::new(Rc::clone(&closure));
                gen_frame.set_args(args);
                let generator =
                    Generator::from_frame(closure, Rc::new(RefCell::new(gen_frame)));
                frame
                    .borrow_mut()
                    .push(Value::Generator(Rc::new(generator)));
                Ok(())
            }
            other => self.raise_message(format!(
                "Cannot call a value of type {}.",
                other.type_name()
            )),
        }
    }

    pub(crate) fn resume(&mut self, generator: &Rc<Generator>) -> Result<Resumed, Trace> {
        match generator.state.get() {
            GeneratorState::Running => {
                self.raise_message("Attempt to resume a running generator.".to_string())?;
                return Ok(Resumed::Dispatched);
            }
            GeneratorState::Dead => {
                self.raise_message("Attempt to resume a dead generator.".to_string())?;
                return Ok(Resumed::Dispatched);
            }
            GeneratorState::Suspended => {}
        }

        match &generator.kind {
            GeneratorKind::List { values, index } => {
                let i = index.get();
                let value = {
                    let values = values.borrow();
                    values.get(i).cloned()
                };
                match value {
                    Some(value) => {
                        index.set(i + 1);
                        Ok(Resumed::Value(value))
                    }
                    None => {
                        generator.state.set(GeneratorState::Dead);
                        Ok(Resumed::Done)
                    }
                }
            }
            GeneratorKind::Closure { frame, .. } => {
                generator.state.set(GeneratorState::Running);
                match self.execute(Rc::clone(frame)) {
                    Err(trace) => {
                        generator.state.set(GeneratorState::Dead);
                        Err(trace)
                    }
                    Ok(None) => {
                        generator.state.set(GeneratorState::Dead);
                        Ok(Resumed::Dispatched)
                    }
                    Ok(Some(value)) => {
                        let yielded = {
                            let mut f = frame.borrow_mut();
                            let yielded = f.yielded;
                            f.yielded = false;
                            yielded
                        };
                        if yielded {
                            generator.state.set(GeneratorState::Suspended);
                            Ok(Resumed::Value(value))
                        } else {
                            // The body's final value is discarded; a dead
                            // generator never produces one.
                            generator.state.set(GeneratorState::Dead);
                            Ok(Resumed::Done)
                        }
                    }
                }
            }
        }
    }

    /// Pop the enumerated value and get a generator out of it.
    /// `Ok(None)` means an exception was raised instead.
    fn each_prep(
        &mut self,
        frame: &Rc<RefCell<StackFrame>>,
    ) -> Result<Option<Rc<Generator>>, Trace> {
        let value = frame.borrow_mut().pop();
        match value {
            Value::Generator(generator) => Ok(Some(generator)),
            other => match other.get_field("enumerator") {
                Ok(Value::Generator(generator)) => Ok(Some(generator)),
                _ => {
                    self.raise_message(format!(
                        "Failed to get a generator from a value of type {} to enumerate.",
                        other.type_name()
                    ))?;
                    Ok(None)
                }
            },
        }
    }

    fn loop_generator(&self, frame: &Rc<RefCell<StackFrame>>, slot: usize) -> Rc<Generator> {
        match &frame.borrow().locals[slot] {
            Value::Generator(generator) => Rc::clone(generator),
            _ => panic!("each loop generator slot corrupted"),
        }
    }

    fn iter_prep(&mut self, frame: &Rc<RefCell<StackFrame>>, word: u32) -> Result<(), Trace> {
        let var = insn::get_a(word) as usize;
        let has_step = insn::get_b(word) != 0;

        let (init, limit, step) = {
            let mut f = frame.borrow_mut();
            let step = if has_step { Some(f.pop()) } else { None };
            let limit = f.pop();
            let init = f.pop();
            (init, limit, step)
        };

        let init = match init {
            Value::Number(value) => value,
            _ => return self.raise_message("iter initial value must be a number.".to_string()),
        };
        let limit = match limit {
            Value::Number(value) => value,
            _ => return self.raise_message("iter limit must be a number.".to_string()),
        };
        let step = match step {
            None => {
                if init < limit {
                    1.0
                } else {
                    -1.0
                }
            }
            Some(Value::Number(value)) => {
                if value == 0.0 {
                    return self.raise_message("iter step cannot be zero.".to_string());
                }
                let away = if init < limit { value < 0.0 } else { value > 0.0 };
                if away {
                    return self.raise_message(
                        "Invalid iter step. The given step will lead the index away \
                         from the limit, dooming the loop to never complete."
                            .to_string(),
                    );
                }
                value
            }
            Some(_) => return self.raise_message("iter step must be a number.".to_string()),
        };

        let mut f = frame.borrow_mut();
        // start one step back; the loop instruction advances first
        f.locals[var] = Value::Number(init - step);
        f.locals[var + 1] = Value::Number(init - step);
        f.locals[var + 2] = Value::Number(limit);
        f.locals[var + 3] = Value::Number(step);
        Ok(())
    }

    fn iter_loop(&mut self, frame: &Rc<RefCell<StackFrame>>, word: u32) {
        let var = insn::get_a(word) as usize;
        let exit = insn::get_b(word) as usize;

        let mut f = frame.borrow_mut();
        let (index, limit, step) = match (&f.locals[var + 1], &f.locals[var + 2], &f.locals[var + 3]) {
            (Value::Number(index), Value::Number(limit), Value::Number(step)) => {
                (*index, *limit, *step)
            }
            _ => panic!("iter loop slots corrupted"),
        };

        let next = index + step;
        let in_range = if step > 0.0 { next < limit } else { next > limit };
        if in_range {
            f.locals[var] = Value::Number(next);
            f.locals[var + 1] = Value::Number(next);
        } else {
            f.ip = exit;
        }
    }
}
