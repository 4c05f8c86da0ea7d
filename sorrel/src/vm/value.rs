//! Runtime values and the heap objects behind them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::common::{CompiledModule, FunctionPrototype, ImmutableString};
use crate::vm::frame::StackFrame;

/// A runtime value. Numbers, booleans, nil and strings have value
/// semantics; lists, closures and generators are shared references.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(ImmutableString),
    List(Rc<RefCell<Vec<Value>>>),
    Closure(Rc<Closure>),
    /// A closure waiting to be called into a generator.
    Spawner(Rc<Closure>),
    Generator(Rc<Generator>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Closure(_) => "function",
            Value::Spawner(_) => "generator function",
            Value::Generator(_) => "generator",
        }
    }

    /// Only `nil` and `false` fail a condition.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(value) => *value,
            _ => true,
        }
    }

    pub fn prefix(&self, oper: &str) -> Result<Value, String> {
        match (oper, self) {
            ("-", Value::Number(value)) => Ok(Value::Number(-value)),
            ("+", Value::Number(value)) => Ok(Value::Number(*value)),
            _ => Err(format!(
                "Cannot apply prefix operator '{}' to a value of type {}.",
                oper,
                self.type_name()
            )),
        }
    }

    pub fn infix(oper: &str, lhs: &Value, rhs: &Value) -> Result<Value, String> {
        match oper {
            "==" => return Ok(Value::Boolean(lhs == rhs)),
            "!=" => return Ok(Value::Boolean(lhs != rhs)),
            _ => {}
        }
        match (oper, lhs, rhs) {
            ("+", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            ("-", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
            ("*", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
            ("/", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
            ("%", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a % b)),
            ("+", Value::String(a), Value::String(b)) => Ok(Value::String(
                ImmutableString::from(format!("{}{}", a, b)),
            )),
            ("<", Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a < b)),
            ("<=", Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a <= b)),
            (">", Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a > b)),
            (">=", Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a >= b)),
            ("<", Value::String(a), Value::String(b)) => Ok(Value::Boolean(a < b)),
            ("<=", Value::String(a), Value::String(b)) => Ok(Value::Boolean(a <= b)),
            (">", Value::String(a), Value::String(b)) => Ok(Value::Boolean(a > b)),
            (">=", Value::String(a), Value::String(b)) => Ok(Value::Boolean(a >= b)),
            _ => Err(format!(
                "Cannot apply operator '{}' to values of type {} and {}.",
                oper,
                lhs.type_name(),
                rhs.type_name()
            )),
        }
    }

    pub fn get_index(&self, index: &Value) -> Result<Value, String> {
        match (self, index) {
            (Value::List(values), Value::Number(n)) => {
                let values = values.borrow();
                match list_index(*n, values.len()) {
                    Some(i) => Ok(values[i].clone()),
                    None => Err(format!(
                        "List index {} is out of bounds for a list of length {}.",
                        n,
                        values.len()
                    )),
                }
            }
            (Value::String(s), Value::Number(n)) => {
                match list_index(*n, s.chars().count()) {
                    Some(i) => {
                        // list_index already bounds-checked
                        let c = s.chars().nth(i).unwrap_or('\0');
                        Ok(Value::String(ImmutableString::from(c.to_string())))
                    }
                    None => Err(format!(
                        "String index {} is out of bounds for a string of length {}.",
                        n,
                        s.chars().count()
                    )),
                }
            }
            (Value::List(_), other) | (Value::String(_), other) => Err(format!(
                "Indices must be numbers, got a(n) {}.",
                other.type_name()
            )),
            _ => Err(format!(
                "Cannot index a value of type {}.",
                self.type_name()
            )),
        }
    }

    pub fn set_index(&self, index: &Value, value: Value) -> Result<(), String> {
        match (self, index) {
            (Value::List(values), Value::Number(n)) => {
                let mut values = values.borrow_mut();
                match list_index(*n, values.len()) {
                    Some(i) => {
                        values[i] = value;
                        Ok(())
                    }
                    None => Err(format!(
                        "List index {} is out of bounds for a list of length {}.",
                        n,
                        values.len()
                    )),
                }
            }
            (Value::List(_), other) => Err(format!(
                "Indices must be numbers, got a(n) {}.",
                other.type_name()
            )),
            _ => Err(format!(
                "Cannot index-assign a value of type {}.",
                self.type_name()
            )),
        }
    }

    pub fn get_field(&self, name: &str) -> Result<Value, String> {
        match (self, name) {
            (Value::List(values), "length") => {
                Ok(Value::Number(values.borrow().len() as f64))
            }
            (Value::List(values), "enumerator") => Ok(Value::Generator(Rc::new(
                Generator::over_list(Rc::clone(values)),
            ))),
            (Value::String(s), "length") => {
                Ok(Value::Number(s.chars().count() as f64))
            }
            _ => Err(format!(
                "No field '{}' on a value of type {}.",
                name,
                self.type_name()
            )),
        }
    }

    pub fn set_field(&self, name: &str, _value: Value) -> Result<(), String> {
        Err(format!(
            "Cannot set field '{}' on a value of type {}.",
            name,
            self.type_name()
        ))
    }

    /// Operator indices are write-only.
    pub fn get_oper_index(&self, oper: &str) -> Result<Value, String> {
        Err(format!(
            "Cannot read operator index '{}' from a value of type {}.",
            oper,
            self.type_name()
        ))
    }

    pub fn set_oper_index(&self, oper: &str, value: Value) -> Result<(), String> {
        match (self, oper) {
            (Value::List(values), "+") => {
                values.borrow_mut().push(value);
                Ok(())
            }
            _ => Err(format!(
                "Cannot apply operator index '{}' to a value of type {}.",
                oper,
                self.type_name()
            )),
        }
    }
}

/// Fractional, negative and out-of-range indices are rejected.
fn list_index(n: f64, len: usize) -> Option<usize> {
    if n.fract() != 0.0 || n < 0.0 {
        return None;
    }
    let i = n as usize;
    if i < len {
        Some(i)
    } else {
        None
    }
}

impl Default for Value {
    fn default() -> Value {
        Value::Nil
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Spawner(a), Value::Spawner(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Number(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{}", value),
            Value::List(values) => {
                write!(f, "[")?;
                for (i, value) in values.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match value {
                        Value::String(s) => write!(f, "\"{}\"", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "]")
            }
            Value::Closure(closure) => {
                write!(f, "<fun {}>", closure.prototype.format_name())
            }
            Value::Spawner(closure) => {
                write!(f, "<gen fun {}>", closure.prototype.format_name())
            }
            Value::Generator(generator) => {
                write!(f, "<gen {}>", generator.format_name())
            }
        }
    }
}

/// A function prototype bound to its module and captured variables.
#[derive(Debug)]
pub struct Closure {
    pub prototype: Rc<FunctionPrototype>,
    pub module: CompiledModule,
    pub captures: Vec<Rc<CaptureCell>>,
    /// Default parameter values, one slot per fixed parameter. Slots
    /// with no declared default hold nil.
    pub defaults: Vec<Value>,
}

impl Closure {
    /// A closure with no captured variables and no defaults.
    pub fn new(prototype: Rc<FunctionPrototype>, module: CompiledModule) -> Closure {
        Closure {
            prototype,
            module,
            captures: Vec::new(),
            defaults: Vec::new(),
        }
    }
}

/// A captured variable. Open while its frame is live, closed (holding
/// the value directly) once the frame unwinds or the scope ends.
#[derive(Debug)]
pub enum Capture {
    Open {
        frame: Weak<RefCell<StackFrame>>,
        slot: usize,
    },
    Closed(Value),
}

#[derive(Debug)]
pub struct CaptureCell(RefCell<Capture>);

impl CaptureCell {
    pub fn open(frame: &Rc<RefCell<StackFrame>>, slot: usize) -> Rc<CaptureCell> {
        Rc::new(CaptureCell(RefCell::new(Capture::Open {
            frame: Rc::downgrade(frame),
            slot,
        })))
    }

    pub fn closed(value: Value) -> Rc<CaptureCell> {
        Rc::new(CaptureCell(RefCell::new(Capture::Closed(value))))
    }

    pub fn get(&self) -> Value {
        match &*self.0.borrow() {
            Capture::Open { frame, slot } => {
                let frame = frame
                    .upgrade()
                    .unwrap_or_else(|| panic!("open capture outlived its frame"));
                let value = frame.borrow().locals[*slot].clone();
                value
            }
            Capture::Closed(value) => value.clone(),
        }
    }

    pub fn set(&self, value: Value) {
        match &mut *self.0.borrow_mut() {
            Capture::Open { frame, slot } => {
                let frame = frame
                    .upgrade()
                    .unwrap_or_else(|| panic!("open capture outlived its frame"));
                frame.borrow_mut().locals[*slot] = value;
            }
            Capture::Closed(cell) => *cell = value,
        }
    }

    /// Detach from the frame, keeping the current value.
    pub fn close(&self) {
        let value = self.get();
        *self.0.borrow_mut() = Capture::Closed(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Suspended,
    Running,
    Dead,
}

#[derive(Debug)]
pub enum GeneratorKind {
    /// Backed by a retained frame; resuming re-enters the interpreter.
    Closure {
        closure: Rc<Closure>,
        frame: Rc<RefCell<StackFrame>>,
    },
    /// Walks a list without any bytecode.
    List {
        values: Rc<RefCell<Vec<Value>>>,
        index: Cell<usize>,
    },
}

#[derive(Debug)]
pub struct Generator {
    pub kind: GeneratorKind,
    pub state: Cell<GeneratorState>,
}

impl Generator {
    pub fn from_frame(closure: Rc<Closure>, frame: Rc<RefCell<StackFrame>>) -> Generator {
        Generator {
            kind: GeneratorKind::Closure { closure, frame },
            state: Cell::new(GeneratorState::Suspended),
        }
    }

    pub fn over_list(values: Rc<RefCell<Vec<Value>>>) -> Generator {
        Generator {
            kind: GeneratorKind::List {
                values,
                index: Cell::new(0),
            },
            state: Cell::new(GeneratorState::Suspended),
        }
    }

    pub fn format_name(&self) -> &str {
        match &self.kind {
            GeneratorKind::Closure { closure, .. } => closure.prototype.format_name(),
            GeneratorKind::List { .. } => "list",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(values)))
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String(ImmutableString::from("")).is_truthy());
    }

    #[test]
    fn arithmetic_and_concatenation() {
        let three = Value::infix("+", &Value::Number(1.0), &Value::Number(2.0)).unwrap();
        assert_eq!(three, Value::Number(3.0));

        let greeting = Value::infix(
            "+",
            &Value::String(ImmutableString::from("foo")),
            &Value::String(ImmutableString::from("bar")),
        )
        .unwrap();
        assert_eq!(greeting, Value::String(ImmutableString::from("foobar")));

        let err = Value::infix("-", &Value::Nil, &Value::Number(1.0)).unwrap_err();
        assert_eq!(
            err,
            "Cannot apply operator '-' to values of type nil and number."
        );
    }

    #[test]
    fn equality_is_deep_for_lists() {
        let a = list(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = list(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(a, b);
        assert_ne!(a, list(vec![Value::Number(1.0)]));
    }

    #[test]
    fn list_indexing_bounds() {
        let values = list(vec![Value::Number(10.0), Value::Number(20.0)]);
        assert_eq!(
            values.get_index(&Value::Number(1.0)).unwrap(),
            Value::Number(20.0)
        );
        assert!(values.get_index(&Value::Number(2.0)).is_err());
        assert!(values.get_index(&Value::Number(-1.0)).is_err());
        assert!(values.get_index(&Value::Number(0.5)).is_err());
    }

    #[test]
    fn list_append_through_oper_index() {
        let values = list(vec![]);
        values.set_oper_index("+", Value::Number(1.0)).unwrap();
        values.set_oper_index("+", Value::Number(2.0)).unwrap();
        assert_eq!(
            values,
            list(vec![Value::Number(1.0), Value::Number(2.0)])
        );
        assert!(values.get_oper_index("+").is_err());
    }

    #[test]
    fn length_fields() {
        let values = list(vec![Value::Nil, Value::Nil, Value::Nil]);
        assert_eq!(values.get_field("length").unwrap(), Value::Number(3.0));
        let s = Value::String(ImmutableString::from("abcd"));
        assert_eq!(s.get_field("length").unwrap(), Value::Number(4.0));
        assert!(s.get_field("missing").is_err());
    }

    #[test]
    fn closed_capture_holds_value() {
        let cell = CaptureCell::closed(Value::Number(1.0));
        assert_eq!(cell.get(), Value::Number(1.0));
        cell.set(Value::Number(2.0));
        assert_eq!(cell.get(), Value::Number(2.0));
    }
}
