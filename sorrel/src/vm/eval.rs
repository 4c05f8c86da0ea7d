//! Module containing the VM's evaluation methods.

use std::rc::Rc;

use crate::common::{CompiledModule, Disassembler, FunctionPrototype, Module};
use crate::compiler::ast::Stmt;
use crate::compiler::compile;
use crate::error::SorrelError;
use crate::vm::run::Resumed;
use crate::vm::value::{Closure, Generator, Value};
use crate::vm::VM;

impl VM {
    /// Compile a program and run it in a fresh module, returning the
    /// value of its last statement.
    ///
    /// # Examples
    ///
    /// ```
    /// use sorrel::compiler::ast::{Expr, Op, Stmt};
    /// use sorrel::{Value, VM};
    ///
    /// let program = vec![Stmt::expr(Expr::infix(
    ///     Op::Add,
    ///     Expr::number(1.0, 1),
    ///     Expr::number(2.0, 1),
    ///     1,
    /// ))];
    ///
    /// let mut vm = VM::new();
    /// assert_eq!(vm.run_script("adder", &program), Ok(Value::Number(3.0)));
    /// ```
    pub fn run_script(&mut self, file_name: &str, program: &[Stmt]) -> Result<Value, SorrelError> {
        let prototype = compile(file_name, program)?;
        let module = Module::new(file_name);
        self.interpret(prototype, module)
    }

    /// Compile a program and run it in a fresh module named after the
    /// configured default file name.
    pub fn eval(&mut self, program: &[Stmt]) -> Result<Value, SorrelError> {
        let file_name = self.config.default_filename.clone();
        self.run_script(&file_name, program)
    }

    /// Run an already compiled prototype inside `module`.
    pub fn interpret(
        &mut self,
        prototype: Rc<FunctionPrototype>,
        module: CompiledModule,
    ) -> Result<Value, SorrelError> {
        if self.config.dump_bytecode {
            Disassembler::new(&prototype).disassemble();
        }
        let closure = Rc::new(Closure::new(prototype, module));
        let value = self.call(closure, Vec::new())?;
        Ok(value)
    }

    /// Call a closure obtained from a module or a returned value.
    pub fn call_function(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
    ) -> Result<Value, SorrelError> {
        Ok(self.call(Rc::clone(closure), args)?)
    }

    /// Resume a generator from the host: `(true, value)` for a yield,
    /// `(false, Nil)` when the generator just died.
    pub fn resume_generator(
        &mut self,
        generator: &Rc<Generator>,
    ) -> Result<(bool, Value), SorrelError> {
        match self.resume(generator)? {
            Resumed::Value(value) => Ok((true, value)),
            Resumed::Done => Ok((false, Value::Nil)),
            // a handler installed by running script code took the raise
            Resumed::Dispatched => Ok((false, Value::Nil)),
        }
    }
}
