//! Instruction-level builder for a single function body.
//!
//! The builder owns the bytecode vector, the local slot table, the
//! constant pools and the capture descriptors while a function is being
//! compiled. It also tracks a conservative stack high-water mark so the
//! runtime can preallocate each frame's operand stack.

use std::rc::Rc;

use crate::common::insn::{self, Opcode};
use crate::common::{CaptureInfo, CaptureKind, FunctionPrototype};

#[derive(Debug)]
struct LocalInfo {
    /// `None` for slots the compiler reserved for its own bookkeeping.
    name: Option<String>,
    captured: bool,
}

#[derive(Debug)]
struct Scope {
    initial_local_count: u32,
}

#[derive(Debug)]
struct FlowBlock {
    label: Option<String>,
    cont_target: u32,
    /// Scopes opened while this block was innermost and not yet closed.
    num_scopes: u32,
    breaks: Vec<u32>,
    conts: Vec<u32>,
}

impl FlowBlock {
    fn matches(&self, label: Option<&str>) -> bool {
        match label {
            None => true,
            Some(label) => self.label.as_deref() == Some(label),
        }
    }
}

#[derive(Debug)]
pub struct FunctionBuilder {
    pub enclosing: Option<Box<FunctionBuilder>>,
    pub name: String,
    pub file_name: String,
    pub has_vargs: bool,
    pub is_generator: bool,
    pub current_line: u32,
    num_params: u32,
    code: Vec<u32>,
    lines: Vec<u32>,
    locals: Vec<LocalInfo>,
    /// Live locals currently marked as captured.
    captured_count: u32,
    scopes: Vec<Scope>,
    flow_blocks: Vec<FlowBlock>,
    captures: Vec<CaptureInfo>,
    nested: Vec<Rc<FunctionPrototype>>,
    strings: Vec<String>,
    numbers: Vec<f64>,
    stack_count: u32,
    max_stack_count: u32,
    max_local_count: u32,
}

impl FunctionBuilder {
    pub fn new(name: &str, file_name: &str) -> FunctionBuilder {
        FunctionBuilder {
            enclosing: None,
            name: name.to_string(),
            file_name: file_name.to_string(),
            has_vargs: false,
            is_generator: false,
            current_line: 1,
            num_params: 0,
            code: Vec::new(),
            lines: Vec::new(),
            locals: Vec::new(),
            captured_count: 0,
            scopes: Vec::new(),
            flow_blocks: Vec::new(),
            captures: Vec::new(),
            nested: Vec::new(),
            strings: Vec::new(),
            numbers: Vec::new(),
            stack_count: 0,
            max_stack_count: 0,
            max_local_count: 0,
        }
    }

    pub fn build(self) -> FunctionPrototype {
        FunctionPrototype {
            name: self.name,
            num_params: self.num_params,
            has_vargs: self.has_vargs,
            code: self.code,
            lines: self.lines,
            file_name: self.file_name,
            captures: self.captures,
            nested: self.nested,
            strings: self.strings,
            numbers: self.numbers,
            max_local_count: self.max_local_count,
            max_stack_count: self.max_stack_count,
        }
    }

    #[inline]
    pub fn insn_count(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn stack_count(&self) -> u32 {
        self.stack_count
    }

    fn push_stack(&mut self, count: u32) {
        self.stack_count += count;
        if self.stack_count > self.max_stack_count {
            self.max_stack_count = self.stack_count;
        }
    }

    fn pop_stack(&mut self, count: u32) {
        debug_assert!(self.stack_count >= count, "stack count underflow");
        self.stack_count = self.stack_count.saturating_sub(count);
    }

    fn put(&mut self, op: Opcode, c: u32) -> u32 {
        self.code.push(insn::build(op, c));
        self.lines.push(self.current_line);
        self.code.len() as u32 - 1
    }

    fn put_ab(&mut self, op: Opcode, a: u32, b: u32) -> u32 {
        self.code.push(insn::build_ab(op, a, b));
        self.lines.push(self.current_line);
        self.code.len() as u32 - 1
    }

    pub fn patch_c(&mut self, index: u32, c: u32) {
        let word = self.code[index as usize];
        self.code[index as usize] = insn::patch_c(word, c);
    }

    pub fn patch_b(&mut self, index: u32, b: u32) {
        let word = self.code[index as usize];
        self.code[index as usize] = insn::patch_b(word, b);
    }

    // ---- scopes and control flow ----

    pub fn start_scope(&mut self) {
        self.scopes.push(Scope {
            initial_local_count: self.locals.len() as u32,
        });
        if let Some(block) = self.flow_blocks.last_mut() {
            block.num_scopes += 1;
        }
    }

    pub fn end_scope(&mut self) {
        let scope = self
            .scopes
            .pop()
            .unwrap_or_else(|| panic!("end_scope without a matching start_scope"));
        let old_captured = self.captured_count;
        while self.locals.len() as u32 > scope.initial_local_count {
            if let Some(local) = self.locals.pop() {
                if local.captured {
                    self.captured_count -= 1;
                }
            }
        }
        if old_captured != self.captured_count {
            self.op_close(scope.initial_local_count);
        }
        if let Some(block) = self.flow_blocks.last_mut() {
            block.num_scopes -= 1;
        }
    }

    pub fn start_flow_block(&mut self, label: Option<&str>) {
        self.flow_blocks.push(FlowBlock {
            label: label.map(|l| l.to_string()),
            cont_target: self.insn_count(),
            num_scopes: 0,
            breaks: Vec::new(),
            conts: Vec::new(),
        });
    }

    pub fn end_flow_block(&mut self) {
        let block = self
            .flow_blocks
            .pop()
            .unwrap_or_else(|| panic!("end_flow_block without a matching start_flow_block"));
        let break_target = self.insn_count();
        for index in block.breaks {
            self.patch_c(index, break_target);
        }
        for index in block.conts {
            self.patch_c(index, block.cont_target);
        }
    }

    /// Find the flow block a break or continue targets, emitting Close
    /// instructions for any captured locals in the scopes the jump will
    /// leave, without actually closing those scopes.
    fn unwind_to_block(&mut self, label: Option<&str>) -> Result<usize, String> {
        if self.flow_blocks.is_empty() {
            return Err("There is no enclosing control flow block to break out of.".to_string());
        }
        let mut num_scopes = 0;
        let mut target = None;
        for (index, block) in self.flow_blocks.iter().enumerate().rev() {
            if block.matches(label) {
                target = Some(index);
                break;
            }
            num_scopes += block.num_scopes;
        }
        let target = match target {
            Some(target) => target,
            None => {
                return Err(
                    "There is no enclosing control flow block with a matching label to break out of."
                        .to_string(),
                )
            }
        };
        let mut local_count = self.locals.len() as u32;
        let mut captured = self.captured_count;
        let mut closes = Vec::new();
        for depth in 0..num_scopes as usize {
            let scope = &self.scopes[self.scopes.len() - 1 - depth];
            let old_captured = captured;
            while local_count > scope.initial_local_count {
                local_count -= 1;
                if self.locals[local_count as usize].captured {
                    captured -= 1;
                }
            }
            if old_captured != captured {
                closes.push(scope.initial_local_count);
            }
        }
        for new_top in closes {
            self.op_close(new_top);
        }
        Ok(target)
    }

    pub fn add_break(&mut self, label: Option<&str>) -> Result<(), String> {
        let block = self.unwind_to_block(label)?;
        let jump = self.op_jump(0);
        self.flow_blocks[block].breaks.push(jump);
        Ok(())
    }

    pub fn add_continue(&mut self, label: Option<&str>) -> Result<(), String> {
        let block = self.unwind_to_block(label)?;
        let jump = self.op_jump(0);
        self.flow_blocks[block].conts.push(jump);
        Ok(())
    }

    // ---- locals and captures ----

    pub fn add_local(&mut self, name: &str) -> Result<u32, String> {
        for local in self.locals.iter() {
            if local.name.as_deref() == Some(name) {
                return Err(format!("Duplicate local variable '{}'.", name));
            }
        }
        let slot = self.locals.len() as u32;
        self.locals.push(LocalInfo {
            name: Some(name.to_string()),
            captured: false,
        });
        if self.locals.len() as u32 > self.max_local_count {
            self.max_local_count = self.locals.len() as u32;
        }
        Ok(slot)
    }

    /// Reserve an anonymous slot for the compiler's own use.
    pub fn reserve_local(&mut self) -> u32 {
        let slot = self.locals.len() as u32;
        self.locals.push(LocalInfo {
            name: None,
            captured: false,
        });
        if self.locals.len() as u32 > self.max_local_count {
            self.max_local_count = self.locals.len() as u32;
        }
        slot
    }

    pub fn add_parameter(&mut self, name: &str) -> Result<u32, String> {
        let slot = self.add_local(name)?;
        self.num_params += 1;
        Ok(slot)
    }

    pub fn resolve_local(&self, name: &str) -> Option<u32> {
        self.locals
            .iter()
            .position(|local| local.name.as_deref() == Some(name))
            .map(|index| index as u32)
    }

    fn mark_captured(&mut self, slot: u32) {
        let local = &mut self.locals[slot as usize];
        if !local.captured {
            local.captured = true;
            self.captured_count += 1;
        }
    }

    /// Resolve `name` as a capture, adding descriptors up the enclosing
    /// builder chain as needed.
    pub fn resolve_capture(&mut self, name: &str) -> Option<u32> {
        if let Some(index) = self.captures.iter().position(|c| c.name == name) {
            return Some(index as u32);
        }
        let enclosing = self.enclosing.as_mut()?;
        if let Some(local) = enclosing.resolve_local(name) {
            enclosing.mark_captured(local);
            let index = self.captures.len() as u32;
            self.captures.push(CaptureInfo {
                name: name.to_string(),
                kind: CaptureKind::Local,
                index: local,
            });
            return Some(index);
        }
        if let Some(outer) = enclosing.resolve_capture(name) {
            let index = self.captures.len() as u32;
            self.captures.push(CaptureInfo {
                name: name.to_string(),
                kind: CaptureKind::Outer,
                index: outer,
            });
            return Some(index);
        }
        None
    }

    // ---- constant pools ----

    pub fn add_string(&mut self, value: &str) -> u32 {
        if let Some(index) = self.strings.iter().position(|s| s == value) {
            return index as u32;
        }
        self.strings.push(value.to_string());
        self.strings.len() as u32 - 1
    }

    pub fn add_number(&mut self, value: f64) -> u32 {
        if let Some(index) = self
            .numbers
            .iter()
            .position(|n| n.to_bits() == value.to_bits())
        {
            return index as u32;
        }
        self.numbers.push(value);
        self.numbers.len() as u32 - 1
    }

    pub fn add_prototype(&mut self, proto: Rc<FunctionPrototype>) -> u32 {
        self.nested.push(proto);
        self.nested.len() as u32 - 1
    }

    // ---- instruction emitters ----
    //
    // Each emitter records its effect on the compile-time stack count.
    // A handful of them deliberately overestimate; the count is a
    // preallocation bound, not an exact model.

    pub fn op_pop(&mut self, change_stack_count: bool) -> u32 {
        if change_stack_count {
            self.pop_stack(1);
        }
        self.put(Opcode::Pop, 0)
    }

    pub fn op_dup(&mut self) -> u32 {
        self.push_stack(1);
        self.put(Opcode::Dup, 0)
    }

    pub fn op_close(&mut self, new_top: u32) -> u32 {
        self.put(Opcode::Close, new_top)
    }

    pub fn op_jump(&mut self, to: u32) -> u32 {
        self.put(Opcode::Jump, to)
    }

    pub fn op_jump_eq(&mut self, to: u32) -> u32 {
        self.pop_stack(2);
        self.put(Opcode::JumpEq, to)
    }

    pub fn op_jump_neq(&mut self, to: u32) -> u32 {
        self.pop_stack(2);
        self.put(Opcode::JumpNeq, to)
    }

    pub fn op_jump_true(&mut self, to: u32) -> u32 {
        self.pop_stack(1);
        self.put(Opcode::JumpTrue, to)
    }

    pub fn op_jump_false(&mut self, to: u32) -> u32 {
        self.pop_stack(1);
        self.put(Opcode::JumpFalse, to)
    }

    pub fn op_and(&mut self, fail: u32) -> u32 {
        // two values were accounted for but only one survives
        self.pop_stack(1);
        self.put(Opcode::And, fail)
    }

    pub fn op_or(&mut self, pass: u32) -> u32 {
        self.pop_stack(1);
        self.put(Opcode::Or, pass)
    }

    pub fn op_not(&mut self) -> u32 {
        self.put(Opcode::Not, 0)
    }

    pub fn op_load_local(&mut self, slot: u32) -> u32 {
        self.push_stack(1);
        self.put(Opcode::LoadLocal, slot)
    }

    pub fn op_save_local(&mut self, slot: u32) -> u32 {
        self.put(Opcode::SaveLocal, slot)
    }

    pub fn op_load_capture(&mut self, index: u32) -> u32 {
        self.push_stack(1);
        self.put(Opcode::LoadCapture, index)
    }

    pub fn op_save_capture(&mut self, index: u32) -> u32 {
        self.put(Opcode::SaveCapture, index)
    }

    pub fn op_load_global(&mut self, name: &str) -> u32 {
        self.push_stack(1);
        let index = self.add_string(name);
        self.put(Opcode::LoadGlobal, index)
    }

    pub fn op_save_global(&mut self, name: &str) -> u32 {
        let index = self.add_string(name);
        self.put(Opcode::SaveGlobal, index)
    }

    pub fn op_load_index(&mut self, count: u32) -> u32 {
        self.pop_stack(count);
        self.put(Opcode::LoadIndex, count)
    }

    pub fn op_save_index(&mut self, count: u32) -> u32 {
        self.pop_stack(count + 1);
        self.put(Opcode::SaveIndex, count)
    }

    pub fn op_load_field(&mut self, name: &str) -> u32 {
        self.push_stack(1);
        let index = self.add_string(name);
        self.put(Opcode::LoadField, index)
    }

    pub fn op_save_field(&mut self, name: &str) -> u32 {
        let index = self.add_string(name);
        self.put(Opcode::SaveField, index)
    }

    pub fn op_load_oper_index(&mut self, oper: &str) -> u32 {
        self.push_stack(1);
        let index = self.add_string(oper);
        self.put(Opcode::LoadOperIndex, index)
    }

    pub fn op_save_oper_index(&mut self, oper: &str) -> u32 {
        let index = self.add_string(oper);
        self.put(Opcode::SaveOperIndex, index)
    }

    pub fn op_prefix(&mut self, oper: &str) -> u32 {
        let index = self.add_string(oper);
        self.put(Opcode::Prefix, index)
    }

    pub fn op_infix(&mut self, oper: &str) -> u32 {
        self.pop_stack(1);
        let index = self.add_string(oper);
        self.put(Opcode::Infix, index)
    }

    pub fn op_nil(&mut self) -> u32 {
        self.push_stack(1);
        self.put(Opcode::Nil, 0)
    }

    pub fn op_boolean(&mut self, value: bool) -> u32 {
        self.push_stack(1);
        if value {
            self.put(Opcode::True, 0)
        } else {
            self.put(Opcode::False, 0)
        }
    }

    pub fn op_number(&mut self, value: f64) -> u32 {
        self.push_stack(1);
        let index = self.add_number(value);
        self.put(Opcode::LoadNumber, index)
    }

    pub fn op_string(&mut self, value: &str) -> u32 {
        self.push_stack(1);
        let index = self.add_string(value);
        self.put(Opcode::LoadString, index)
    }

    pub fn op_list(&mut self, count: u32) -> u32 {
        if count == 0 {
            self.push_stack(1);
        } else {
            self.pop_stack(count - 1);
        }
        self.put(Opcode::BuildList, count)
    }

    pub fn op_closure(&mut self, proto: Rc<FunctionPrototype>, num_defaults: u32) -> u32 {
        self.push_stack(1);
        let index = self.add_prototype(proto);
        self.put_ab(Opcode::BuildClosure, index, num_defaults)
    }

    pub fn op_generator(&mut self) -> u32 {
        self.put(Opcode::BuildGenerator, 0)
    }

    pub fn op_call(&mut self, argc: u32) -> u32 {
        self.pop_stack(argc);
        self.put(Opcode::Call, argc)
    }

    pub fn op_call_method(&mut self, method: &str, argc: u32) -> u32 {
        self.pop_stack(argc);
        let index = self.add_string(method);
        self.put_ab(Opcode::CallMethod, argc, index)
    }

    pub fn op_tail_call(&mut self, argc: u32) -> u32 {
        // counts as producing a call result, though the frame restarts
        self.pop_stack(argc);
        self.push_stack(1);
        self.put(Opcode::TailCall, argc)
    }

    pub fn op_return(&mut self) -> u32 {
        self.put(Opcode::Return, 0)
    }

    pub fn op_yield(&mut self) -> u32 {
        // the yielded value is handed to the resumer
        self.pop_stack(1);
        self.put(Opcode::Yield, 0)
    }

    pub fn op_resume(&mut self) -> u32 {
        self.put(Opcode::Resume, 0)
    }

    pub fn op_throw(&mut self) -> u32 {
        self.pop_stack(1);
        self.put(Opcode::Throw, 0)
    }

    pub fn op_push_handler(&mut self, catch_ip: u32) -> u32 {
        self.put(Opcode::PushHandler, catch_ip)
    }

    pub fn op_pop_handler(&mut self) -> u32 {
        self.put(Opcode::PopHandler, 0)
    }

    pub fn op_begin_handler(&mut self, stack_bottom: u32) -> u32 {
        // the stack count is already accounted for at this point
        self.put(Opcode::BeginHandler, stack_bottom)
    }

    pub fn op_save_exception(&mut self, slot: u32) -> u32 {
        self.put(Opcode::SaveException, slot)
    }

    pub fn op_iter_prep(&mut self, var: u32, has_step: bool) -> u32 {
        self.pop_stack(if has_step { 3 } else { 2 });
        self.put_ab(Opcode::IterPrep, var, if has_step { 1 } else { 0 })
    }

    pub fn op_iter_loop(&mut self, var: u32, jump: u32) -> u32 {
        self.put_ab(Opcode::IterLoop, var, jump)
    }

    pub fn op_each_prep(&mut self, var: u32) -> u32 {
        self.pop_stack(1);
        self.put(Opcode::EachPrep, var)
    }

    pub fn op_each_loop(&mut self, var: u32, jump: u32) -> u32 {
        self.put_ab(Opcode::EachLoop, var, jump)
    }

    pub fn op_ieach_prep(&mut self, var: u32) -> u32 {
        self.pop_stack(1);
        self.put(Opcode::IEachPrep, var)
    }

    pub fn op_ieach_loop(&mut self, var: u32, jump: u32) -> u32 {
        self.put_ab(Opcode::IEachLoop, var, jump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::insn::get_op;

    #[test]
    fn duplicate_local_is_rejected() {
        let mut builder = FunctionBuilder::new("", "test");
        builder.start_scope();
        builder.add_local("x").unwrap();
        assert!(builder.add_local("x").is_err());
    }

    #[test]
    fn reserved_slots_do_not_collide_with_names() {
        let mut builder = FunctionBuilder::new("", "test");
        builder.start_scope();
        let a = builder.add_local("a").unwrap();
        let temp = builder.reserve_local();
        let b = builder.add_local("b").unwrap();
        assert_eq!((a, temp, b), (0, 1, 2));
        assert_eq!(builder.resolve_local("b"), Some(2));
    }

    #[test]
    fn end_scope_closes_captured_locals() {
        let mut outer = FunctionBuilder::new("", "test");
        outer.start_scope();
        outer.add_local("x").unwrap();

        let mut inner = FunctionBuilder::new("f", "test");
        inner.enclosing = Some(Box::new(outer));
        assert_eq!(inner.resolve_capture("x"), Some(0));

        let mut outer = *inner.enclosing.take().unwrap();
        outer.end_scope();
        let closes: Vec<_> = outer
            .code
            .iter()
            .filter(|word| get_op(**word) == Opcode::Close)
            .collect();
        assert_eq!(closes.len(), 1);
    }

    #[test]
    fn capture_is_marked_once() {
        let mut outer = FunctionBuilder::new("", "test");
        outer.start_scope();
        outer.add_local("x").unwrap();

        let mut inner = FunctionBuilder::new("f", "test");
        inner.enclosing = Some(Box::new(outer));
        assert_eq!(inner.resolve_capture("x"), Some(0));
        assert_eq!(inner.resolve_capture("x"), Some(0));
        assert_eq!(inner.captures.len(), 1);
        assert_eq!(inner.enclosing.as_ref().unwrap().captured_count, 1);
    }

    #[test]
    fn capture_of_transitive_local_is_forwarded() {
        let mut root = FunctionBuilder::new("", "test");
        root.start_scope();
        root.add_local("x").unwrap();

        let mut middle = FunctionBuilder::new("outer", "test");
        middle.enclosing = Some(Box::new(root));

        let mut leaf = FunctionBuilder::new("inner", "test");
        leaf.enclosing = Some(Box::new(middle));

        assert_eq!(leaf.resolve_capture("x"), Some(0));
        assert_eq!(leaf.captures[0].kind, CaptureKind::Outer);
        let middle = leaf.enclosing.as_ref().unwrap();
        assert_eq!(middle.captures[0].kind, CaptureKind::Local);
    }

    #[test]
    fn break_without_flow_block_errors() {
        let mut builder = FunctionBuilder::new("", "test");
        let result = builder.add_break(None);
        assert_eq!(
            result.unwrap_err(),
            "There is no enclosing control flow block to break out of."
        );
    }

    #[test]
    fn labeled_break_requires_matching_label() {
        let mut builder = FunctionBuilder::new("", "test");
        builder.start_flow_block(Some("outer"));
        assert!(builder.add_break(Some("outer")).is_ok());
        assert!(builder.add_break(Some("missing")).is_err());
        builder.end_flow_block();
    }

    #[test]
    fn breaks_patch_to_block_end() {
        let mut builder = FunctionBuilder::new("", "test");
        builder.start_flow_block(None);
        builder.add_break(None).unwrap();
        builder.op_nil();
        builder.op_pop(true);
        builder.end_flow_block();

        let target = insn::get_c(builder.code[0]);
        assert_eq!(target, builder.insn_count());
    }

    #[test]
    fn string_constants_are_deduplicated() {
        let mut builder = FunctionBuilder::new("", "test");
        assert_eq!(builder.add_string("+"), 0);
        assert_eq!(builder.add_string("name"), 1);
        assert_eq!(builder.add_string("+"), 0);
    }

    #[test]
    fn stack_high_water_tracks_pushes() {
        let mut builder = FunctionBuilder::new("", "test");
        builder.op_number(1.0);
        builder.op_number(2.0);
        builder.op_infix("+");
        builder.op_pop(true);
        assert_eq!(builder.stack_count(), 0);
        assert_eq!(builder.max_stack_count, 2);
    }
}
