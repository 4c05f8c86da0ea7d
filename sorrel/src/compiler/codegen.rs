//! Walks the syntax tree and emits bytecode through a [`FunctionBuilder`].
//!
//! Problems are collected as diagnostics instead of failing fast, so a
//! single pass can report every error in a script.

use std::mem;
use std::rc::Rc;

use crate::common::FunctionPrototype;
use crate::compiler::ast::{Expr, ExprKind, FunctionDecl, Stmt, StmtKind};
use crate::compiler::builder::FunctionBuilder;
use crate::error::{Diagnostic, Label, SorrelError};

/// Compile a script body into a prototype for the runtime.
pub fn compile(file_name: &str, statements: &[Stmt]) -> Result<Rc<FunctionPrototype>, SorrelError> {
    let mut compiler = Compiler::new(file_name);
    compiler.block(statements, true, false, true);
    if !compiler.diagnostics.is_empty() {
        return Err(SorrelError::CompileError(compiler.diagnostics));
    }
    Ok(Rc::new(compiler.builder.build()))
}

struct Compiler {
    builder: Box<FunctionBuilder>,
    diagnostics: Vec<Diagnostic>,
    file_name: String,
}

impl Compiler {
    fn new(file_name: &str) -> Compiler {
        Compiler {
            builder: Box::new(FunctionBuilder::new("", file_name)),
            diagnostics: Vec::new(),
            file_name: file_name.to_string(),
        }
    }

    fn error(&mut self, message: impl ToString, line: u32) {
        self.diagnostics.push(
            Diagnostic::error()
                .with_message(message)
                .in_file(&self.file_name)
                .with_labels(vec![Label::primary(line)]),
        );
    }

    fn block(&mut self, body: &[Stmt], result: bool, tail: bool, create_scope: bool) {
        if create_scope {
            self.builder.start_scope();
        }
        if body.is_empty() && result {
            self.builder.op_nil();
        }
        for (i, stmt) in body.iter().enumerate() {
            let last = i == body.len() - 1;
            self.statement(stmt, result && last, tail && last);
        }
        if create_scope {
            self.builder.end_scope();
        }
    }

    fn statement(&mut self, stmt: &Stmt, result: bool, tail: bool) {
        self.builder.current_line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expression(expr, tail);
                if !result {
                    self.builder.op_pop(true);
                }
            }
            StmtKind::Var(name, value) => {
                match value {
                    Some(value) => self.expression(value, false),
                    None => {
                        self.builder.op_nil();
                    }
                }
                let slot = self.declare_local(name, stmt.line);
                self.builder.current_line = stmt.line;
                self.builder.op_save_local(slot);
                if !result {
                    self.builder.op_pop(true);
                }
            }
            StmtKind::Function(decl) => {
                self.function(decl, stmt.line);
                self.builder.op_save_global(&decl.name);
                if !result {
                    self.builder.op_pop(true);
                }
            }
            StmtKind::Block(body) => self.block(body, result, tail, true),
            StmtKind::If {
                cond,
                then,
                or_else,
            } => self.if_stmt(cond, then, or_else.as_deref(), result, tail),
            StmtKind::While {
                label,
                cond,
                body,
                or_else,
            } => self.while_loop(
                label.as_deref(),
                cond,
                body,
                or_else.as_deref(),
                result,
                tail,
            ),
            StmtKind::Iter {
                label,
                var,
                init,
                limit,
                step,
                body,
            } => self.iter_loop(
                label.as_deref(),
                var,
                init,
                limit,
                step.as_ref(),
                body,
                result,
                tail,
                stmt.line,
            ),
            StmtKind::Each {
                label,
                var,
                value,
                body,
            } => self.each_loop(label.as_deref(), var, value, body, result, tail, stmt.line),
            StmtKind::IndexedEach {
                label,
                index,
                var,
                value,
                body,
            } => self.indexed_each_loop(
                label.as_deref(),
                index,
                var,
                value,
                body,
                result,
                tail,
                stmt.line,
            ),
            StmtKind::Break(label) => {
                if let Err(message) = self.builder.add_break(label.as_deref()) {
                    self.error(message, stmt.line);
                }
                // breaks still leave a value as far as the stack
                // accounting is concerned
                self.builder.op_nil();
            }
            StmtKind::Continue(label) => {
                if let Err(message) = self.builder.add_continue(label.as_deref()) {
                    self.error(message, stmt.line);
                }
                self.builder.op_nil();
            }
            StmtKind::Return(value) => {
                match value {
                    Some(value) => self.expression(value, false),
                    None => {
                        self.builder.op_nil();
                    }
                }
                self.builder.op_return();
            }
            StmtKind::Throw(value) => {
                self.expression(value, false);
                self.builder.current_line = stmt.line;
                self.builder.op_throw();
            }
            StmtKind::Try {
                body,
                name,
                handler,
            } => self.try_stmt(body, name.as_deref(), handler, result, tail, stmt.line),
        }
    }

    fn if_stmt(
        &mut self,
        cond: &Expr,
        then: &[Stmt],
        or_else: Option<&[Stmt]>,
        result: bool,
        tail: bool,
    ) {
        self.builder.start_scope();
        self.expression(cond, false);
        let fail = self.builder.op_jump_false(0);
        self.block(then, result, tail, false);
        self.builder.end_scope();

        match or_else {
            Some(or_else) => {
                let pass = self.builder.op_jump(0);
                let target = self.builder.insn_count();
                self.builder.patch_c(fail, target);
                self.builder.start_scope();
                self.block(or_else, result, tail, false);
                self.builder.end_scope();
                let target = self.builder.insn_count();
                self.builder.patch_c(pass, target);
            }
            None if result => {
                // the then branch must skip the fallback nil
                let pass = self.builder.op_jump(0);
                let target = self.builder.insn_count();
                self.builder.patch_c(fail, target);
                self.builder.op_nil();
                let target = self.builder.insn_count();
                self.builder.patch_c(pass, target);
            }
            None => {
                let target = self.builder.insn_count();
                self.builder.patch_c(fail, target);
            }
        }
    }

    fn while_loop(
        &mut self,
        label: Option<&str>,
        cond: &Expr,
        body: &[Stmt],
        or_else: Option<&[Stmt]>,
        result: bool,
        tail: bool,
    ) {
        let has_else = or_else.is_some();

        self.builder.start_scope();

        // the else branch is picked by testing the condition once up
        // front, before the loop is entered
        let mut init_fail = 0;
        if has_else {
            self.expression(cond, false);
            init_fail = self.builder.op_jump_false(0);
        }

        if result {
            self.builder.op_list(0);
        }

        let mut init_pass = 0;
        if has_else {
            init_pass = self.builder.op_jump(0);
        }

        // continues land just past the accumulator pop
        if result {
            let to = self.builder.insn_count() + 2;
            self.builder.op_jump(to);
        }
        self.builder.start_flow_block(label);
        if result {
            self.builder.op_pop(false);
        }

        let start = self.builder.insn_count();
        self.expression(cond, false);
        let fail = self.builder.op_jump_false(0);

        if has_else {
            let target = self.builder.insn_count();
            self.builder.patch_c(init_pass, target);
        }
        if result {
            self.builder.op_dup();
        }
        self.block(body, result, tail, false);
        if result {
            self.builder.op_save_oper_index("+");
            self.builder.op_pop(true);
        }
        self.builder.op_jump(start);

        if result {
            let to = self.builder.insn_count() + 2;
            self.builder.op_jump(to);
        }
        self.builder.end_flow_block();
        if result {
            self.builder.op_pop(false);
        }
        self.builder.end_scope();

        let target = self.builder.insn_count();
        self.builder.patch_c(fail, target);
        let final_fail = self.builder.op_jump(0);

        if let Some(or_else) = or_else {
            let target = self.builder.insn_count();
            self.builder.patch_c(init_fail, target);
            self.builder.start_scope();
            self.block(or_else, result, tail, false);
            self.builder.end_scope();
        }

        let target = self.builder.insn_count();
        self.builder.patch_c(final_fail, target);
    }

    fn iter_loop(
        &mut self,
        label: Option<&str>,
        var: &str,
        init: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
        result: bool,
        tail: bool,
        line: u32,
    ) {
        let has_step = step.is_some();

        self.builder.start_scope();

        let var_slot = self.declare_local(var, line);
        // hidden index, limit and step slots
        self.builder.reserve_local();
        self.builder.reserve_local();
        self.builder.reserve_local();

        self.expression(init, false);
        self.expression(limit, false);
        if let Some(step) = step {
            self.expression(step, false);
        }
        self.builder.current_line = line;
        self.builder.op_iter_prep(var_slot, has_step);

        let loop_pos = self.loop_body(label, result, tail, body, |builder| {
            builder.op_iter_loop(var_slot, 0)
        });
        self.builder.patch_b(loop_pos, self.builder.insn_count());

        self.loop_exit(result);
        self.builder.end_scope();
    }

    fn each_loop(
        &mut self,
        label: Option<&str>,
        var: &str,
        value: &Expr,
        body: &[Stmt],
        result: bool,
        tail: bool,
        line: u32,
    ) {
        self.builder.start_scope();

        let var_slot = self.declare_local(var, line);
        // hidden generator slot
        self.builder.reserve_local();

        self.expression(value, false);
        self.builder.current_line = line;
        self.builder.op_each_prep(var_slot);

        let loop_pos = self.loop_body(label, result, tail, body, |builder| {
            builder.op_each_loop(var_slot, 0)
        });
        self.builder.patch_b(loop_pos, self.builder.insn_count());

        self.loop_exit(result);
        self.builder.end_scope();
    }

    fn indexed_each_loop(
        &mut self,
        label: Option<&str>,
        index: &str,
        var: &str,
        value: &Expr,
        body: &[Stmt],
        result: bool,
        tail: bool,
        line: u32,
    ) {
        self.builder.start_scope();

        let index_slot = self.declare_local(index, line);
        // hidden counter slot
        self.builder.reserve_local();
        self.declare_local(var, line);
        // hidden generator slot
        self.builder.reserve_local();

        self.expression(value, false);
        self.builder.current_line = line;
        self.builder.op_ieach_prep(index_slot);

        let loop_pos = self.loop_body(label, result, tail, body, |builder| {
            builder.op_ieach_loop(index_slot, 0)
        });
        self.builder.patch_b(loop_pos, self.builder.insn_count());

        self.loop_exit(result);
        self.builder.end_scope();
    }

    /// Shared accumulator-loop choreography: the optional result list,
    /// the continue and break landing pads, the loop instruction and
    /// the body with its append.
    fn loop_body<F>(
        &mut self,
        label: Option<&str>,
        result: bool,
        tail: bool,
        body: &[Stmt],
        loop_op: F,
    ) -> u32
    where
        F: FnOnce(&mut FunctionBuilder) -> u32,
    {
        if result {
            self.builder.op_list(0);
        }
        if result {
            let to = self.builder.insn_count() + 2;
            self.builder.op_jump(to);
        }
        self.builder.start_flow_block(label);
        if result {
            self.builder.op_pop(false);
        }

        let loop_pos = loop_op(&mut self.builder);
        if result {
            self.builder.op_dup();
        }
        self.block(body, result, tail, false);
        if result {
            self.builder.op_save_oper_index("+");
            self.builder.op_pop(true);
        }
        self.builder.op_jump(loop_pos);
        loop_pos
    }

    fn loop_exit(&mut self, result: bool) {
        if result {
            let to = self.builder.insn_count() + 2;
            self.builder.op_jump(to);
        }
        self.builder.end_flow_block();
        if result {
            self.builder.op_pop(false);
        }
    }

    fn try_stmt(
        &mut self,
        body: &[Stmt],
        name: Option<&str>,
        handler: &[Stmt],
        result: bool,
        tail: bool,
        line: u32,
    ) {
        let stack_size = self.builder.stack_count();
        let handler_pos = self.builder.op_push_handler(0);

        self.builder.start_scope();
        self.block(body, result, tail, false);
        self.builder.end_scope();

        self.builder.op_pop_handler();
        let pass = self.builder.op_jump(0);

        let target = self.builder.insn_count();
        self.builder.patch_c(handler_pos, target);
        self.builder.op_begin_handler(stack_size);

        self.builder.start_scope();
        if let Some(name) = name {
            let slot = self.declare_local(name, line);
            self.builder.op_save_exception(slot);
        }
        self.block(handler, result, tail, false);
        self.builder.end_scope();

        let target = self.builder.insn_count();
        self.builder.patch_c(pass, target);
    }

    fn expression(&mut self, expr: &Expr, tail: bool) {
        self.builder.current_line = expr.line;
        match &expr.kind {
            ExprKind::Number(value) => {
                self.builder.op_number(*value);
            }
            ExprKind::String(value) => {
                self.builder.op_string(value);
            }
            ExprKind::Boolean(value) => {
                self.builder.op_boolean(*value);
            }
            ExprKind::Nil => {
                self.builder.op_nil();
            }
            ExprKind::List(values) => {
                for value in values.iter() {
                    self.expression(value, false);
                }
                self.builder.current_line = expr.line;
                self.builder.op_list(values.len() as u32);
            }
            ExprKind::Identifier(name) => self.load_variable(name),
            ExprKind::Assign(name, value) => {
                self.expression(value, false);
                self.builder.current_line = expr.line;
                self.store_variable(name);
            }
            ExprKind::Infix(op, lhs, rhs) => {
                self.expression(lhs, false);
                self.expression(rhs, false);
                self.builder.current_line = expr.line;
                self.builder.op_infix(op.symbol());
            }
            ExprKind::Prefix(op, value) => {
                self.expression(value, false);
                self.builder.current_line = expr.line;
                self.builder.op_prefix(op.symbol());
            }
            ExprKind::Not(value) => {
                self.expression(value, false);
                self.builder.op_not();
            }
            ExprKind::And(lhs, rhs) => {
                self.expression(lhs, false);
                let fail = self.builder.op_and(0);
                self.expression(rhs, false);
                let target = self.builder.insn_count();
                self.builder.patch_c(fail, target);
            }
            ExprKind::Or(lhs, rhs) => {
                self.expression(lhs, false);
                let pass = self.builder.op_or(0);
                self.expression(rhs, false);
                let target = self.builder.insn_count();
                self.builder.patch_c(pass, target);
            }
            ExprKind::Index(target, index) => {
                self.expression(target, false);
                self.expression(index, false);
                self.builder.current_line = expr.line;
                self.builder.op_load_index(1);
            }
            ExprKind::IndexAssign {
                target,
                index,
                value,
            } => {
                self.expression(target, false);
                self.expression(index, false);
                self.expression(value, false);
                self.builder.current_line = expr.line;
                self.builder.op_save_index(1);
            }
            ExprKind::Field(target, field) => {
                self.expression(target, false);
                self.builder.current_line = expr.line;
                self.builder.op_load_field(field);
            }
            ExprKind::FieldAssign {
                target,
                field,
                value,
            } => {
                self.expression(target, false);
                self.expression(value, false);
                self.builder.current_line = expr.line;
                self.builder.op_save_field(field);
            }
            ExprKind::OperIndex(target, oper) => {
                self.expression(target, false);
                self.builder.current_line = expr.line;
                self.builder.op_load_oper_index(oper.symbol());
            }
            ExprKind::OperIndexAssign {
                target,
                oper,
                value,
            } => {
                self.expression(target, false);
                self.expression(value, false);
                self.builder.current_line = expr.line;
                self.builder.op_save_oper_index(oper.symbol());
            }
            ExprKind::Call(callee, args) => {
                self.expression(callee, false);
                for arg in args.iter() {
                    self.expression(arg, false);
                }
                self.builder.current_line = expr.line;
                self.builder.op_call(args.len() as u32);
            }
            ExprKind::MethodCall {
                target,
                method,
                args,
            } => {
                self.expression(target, false);
                for arg in args.iter() {
                    self.expression(arg, false);
                }
                self.builder.current_line = expr.line;
                self.builder.op_call_method(method, args.len() as u32);
            }
            ExprKind::TailRec(args) => {
                if !tail {
                    self.error(
                        "tailrec call is not in tail position of function call, cannot optimize.",
                        expr.line,
                    );
                }
                for arg in args.iter() {
                    self.expression(arg, false);
                }
                self.builder.current_line = expr.line;
                self.builder.op_tail_call(args.len() as u32);
            }
            ExprKind::Resume(target) => {
                self.expression(target, false);
                self.builder.current_line = expr.line;
                self.builder.op_resume();
            }
            ExprKind::Yield(value) => {
                if !self.builder.is_generator {
                    self.error("Can only yield inside a generator.", expr.line);
                }
                match value {
                    Some(value) => self.expression(value, false),
                    None => {
                        self.builder.op_nil();
                    }
                }
                self.builder.current_line = expr.line;
                self.builder.op_yield();
                // a yield expression itself evaluates to nil
                self.builder.op_nil();
            }
            ExprKind::Function(decl) => self.function(decl, expr.line),
        }
    }

    fn function(&mut self, decl: &FunctionDecl, line: u32) {
        let parent = mem::replace(
            &mut self.builder,
            Box::new(FunctionBuilder::new(&decl.name, &self.file_name)),
        );
        self.builder.enclosing = Some(parent);
        self.builder.has_vargs = decl.has_vargs;
        self.builder.is_generator = decl.is_generator;
        self.builder.current_line = line;

        for param in decl.params.iter() {
            if let Err(message) = self.builder.add_parameter(&param.name) {
                self.error(message, line);
            }
        }
        self.block(&decl.body, true, true, true);

        let enclosing = self
            .builder
            .enclosing
            .take()
            .unwrap_or_else(|| panic!("function compiler has no enclosing builder"));
        let finished = mem::replace(&mut self.builder, enclosing);
        let proto = Rc::new(finished.build());

        // default values for trailing parameters ride along with the
        // closure instruction
        let mut num_defaults = 0;
        for param in decl.params.iter() {
            if let Some(default) = &param.default {
                num_defaults += 1;
                self.expression(default, false);
            }
        }
        self.builder.current_line = line;
        self.builder.op_closure(proto, num_defaults);
        if decl.is_generator {
            self.builder.op_generator();
        }
    }

    fn declare_local(&mut self, name: &str, line: u32) -> u32 {
        match self.builder.add_local(name) {
            Ok(slot) => slot,
            Err(message) => {
                self.error(message, line);
                0
            }
        }
    }

    fn load_variable(&mut self, name: &str) {
        if let Some(slot) = self.builder.resolve_local(name) {
            self.builder.op_load_local(slot);
        } else if let Some(index) = self.builder.resolve_capture(name) {
            self.builder.op_load_capture(index);
        } else {
            self.builder.op_load_global(name);
        }
    }

    fn store_variable(&mut self, name: &str) {
        if let Some(slot) = self.builder.resolve_local(name) {
            self.builder.op_save_local(slot);
        } else if let Some(index) = self.builder.resolve_capture(name) {
            self.builder.op_save_capture(index);
        } else {
            self.builder.op_save_global(name);
        }
    }
}
