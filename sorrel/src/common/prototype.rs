use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Where a capture descriptor's source value lives in the enclosing
/// function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureKind {
    /// Captured directly from the enclosing function's local slot.
    Local,
    /// Forwarded from the enclosing function's own capture array.
    Outer,
}

/// Compile-time description of one captured variable, consumed when a
/// closure is instantiated at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub name: String,
    pub kind: CaptureKind,
    pub index: u32,
}

/// The immutable output of compiling one function body.
///
/// Built exactly once by the compiler and shared read-only afterwards;
/// many closures may reference the same prototype.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionPrototype {
    /// Function name, empty for the top-level script.
    pub name: String,
    pub num_params: u32,
    /// Whether the final parameter collects excess arguments into a list.
    pub has_vargs: bool,
    pub code: Vec<u32>,
    /// One line number per instruction, for error reporting.
    pub lines: Vec<u32>,
    pub file_name: String,
    pub captures: Vec<CaptureInfo>,
    pub nested: Vec<Rc<FunctionPrototype>>,
    pub strings: Vec<String>,
    pub numbers: Vec<f64>,
    pub max_local_count: u32,
    pub max_stack_count: u32,
}

impl FunctionPrototype {
    pub fn format_name(&self) -> &str {
        if self.name.is_empty() {
            "script"
        } else {
            &self.name
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(src: &str) -> serde_json::Result<FunctionPrototype> {
        serde_json::from_str(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::insn::{self, Opcode};

    fn sample() -> FunctionPrototype {
        FunctionPrototype {
            name: "sample".to_string(),
            num_params: 2,
            has_vargs: true,
            code: vec![
                insn::build(Opcode::LoadLocal, 0),
                insn::build(Opcode::LoadNumber, 0),
                insn::build(Opcode::Infix, 0),
            ],
            lines: vec![1, 1, 1],
            file_name: "sample.json".to_string(),
            captures: vec![CaptureInfo {
                name: "x".to_string(),
                kind: CaptureKind::Local,
                index: 3,
            }],
            nested: vec![Rc::new(FunctionPrototype::default())],
            strings: vec!["+".to_string()],
            numbers: vec![1.5],
            max_local_count: 4,
            max_stack_count: 2,
        }
    }

    #[test]
    fn json_round_trip() {
        let proto = sample();
        let json = proto.to_json().unwrap();
        let back = FunctionPrototype::from_json(&json).unwrap();
        assert_eq!(proto, back);
    }

    #[test]
    fn script_name_formatting() {
        let proto = FunctionPrototype::default();
        assert_eq!(proto.format_name(), "script");
        assert_eq!(sample().format_name(), "sample");
    }
}
