use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::vm::value::Value;

pub type CompiledModule = Rc<RefCell<Module>>;

/// A namespace of named values, consulted by the global load/store
/// instructions and attached to every closure compiled in it.
///
/// A sealed module rejects definitions of names it does not already
/// contain; assigning to an existing name is always allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    variables: Vec<Value>,
    symbols: FxHashMap<String, usize>,
    sealed: bool,
}

impl Module {
    pub fn new(name: &str) -> CompiledModule {
        Rc::new(RefCell::new(Module {
            name: name.to_string(),
            variables: Vec::new(),
            symbols: FxHashMap::default(),
            sealed: false,
        }))
    }

    pub fn empty() -> CompiledModule {
        Module::new("")
    }

    /// Seal this module; later definitions of unknown names will fail.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Define or assign `name`. Fails if the module is sealed and the
    /// name is not already defined.
    pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), String> {
        if let Some(&index) = self.symbols.get(name) {
            self.variables[index] = value;
            return Ok(());
        }
        if self.sealed {
            return Err(format!(
                "Cannot define '{}' in sealed module '{}'.",
                name, self.name
            ));
        }
        let index = self.variables.len();
        self.variables.push(value);
        self.symbols.insert(name.to_string(), index);
        Ok(())
    }

    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.symbols
            .get(name)
            .map(|&index| self.variables[index].clone())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<mod {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_read_back() {
        let module = Module::new("test");
        let mut module = module.borrow_mut();

        module.set_var("a", Value::Number(1.0)).unwrap();
        module.set_var("b", Value::Number(2.0)).unwrap();

        assert_eq!(module.get_var("a"), Some(Value::Number(1.0)));
        assert_eq!(module.get_var("b"), Some(Value::Number(2.0)));
        assert_eq!(module.get_var("c"), None);
    }

    #[test]
    fn reassignment_overwrites() {
        let module = Module::new("test");
        let mut module = module.borrow_mut();

        module.set_var("a", Value::Number(1.0)).unwrap();
        module.set_var("a", Value::Boolean(true)).unwrap();

        assert_eq!(module.get_var("a"), Some(Value::Boolean(true)));
    }

    #[test]
    fn sealed_module_rejects_unknown_names() {
        let module = Module::new("test");
        let mut module = module.borrow_mut();

        module.set_var("known", Value::Nil).unwrap();
        module.seal();

        assert!(module.set_var("known", Value::Number(3.0)).is_ok());
        assert!(module.set_var("unknown", Value::Nil).is_err());
    }
}
