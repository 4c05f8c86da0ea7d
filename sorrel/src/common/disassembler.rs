use crate::common::insn::{self, Opcode};
use crate::common::FunctionPrototype;

/// Prints a human-readable listing of a prototype and everything
/// nested inside it.
pub struct Disassembler<'a> {
    prototype: &'a FunctionPrototype,
}

impl<'a> Disassembler<'a> {
    pub fn new(prototype: &'a FunctionPrototype) -> Self {
        Disassembler { prototype }
    }

    pub fn disassemble(&self) {
        println!("==== {} ====", self.prototype.format_name());
        println!(
            "params: {}{}  locals: {}  stack: {}",
            self.prototype.num_params,
            if self.prototype.has_vargs { "+" } else { "" },
            self.prototype.max_local_count,
            self.prototype.max_stack_count,
        );

        if !self.prototype.strings.is_empty() {
            print!("strings:");
            for (i, s) in self.prototype.strings.iter().enumerate() {
                print!(" {}:\"{}\"", i, s);
            }
            println!();
        }
        if !self.prototype.numbers.is_empty() {
            print!("numbers:");
            for (i, n) in self.prototype.numbers.iter().enumerate() {
                print!(" {}:{}", i, n);
            }
            println!();
        }

        for offset in 0..self.prototype.code.len() {
            println!("{}", self.instruction(offset));
        }
        println!();

        for nested in self.prototype.nested.iter() {
            Disassembler::new(nested).disassemble();
        }
    }

    /// Format the instruction at `offset`, with its operands decoded
    /// the way the opcode reads them.
    pub fn instruction(&self, offset: usize) -> String {
        let word = self.prototype.code[offset];
        let op = insn::get_op(word);
        let line = self.prototype.lines.get(offset).copied().unwrap_or(0);
        let head = format!("{:04} [{:>4}] {:?}", offset, line, op);

        match op {
            Opcode::NoOp
            | Opcode::Pop
            | Opcode::Dup
            | Opcode::Not
            | Opcode::Nil
            | Opcode::True
            | Opcode::False
            | Opcode::Return
            | Opcode::Yield
            | Opcode::Resume
            | Opcode::Throw
            | Opcode::PopHandler => head,

            Opcode::LoadGlobal
            | Opcode::SaveGlobal
            | Opcode::LoadField
            | Opcode::SaveField
            | Opcode::LoadOperIndex
            | Opcode::SaveOperIndex
            | Opcode::Prefix
            | Opcode::Infix
            | Opcode::LoadString => {
                let index = insn::get_c(word) as usize;
                format!("{} \"{}\"", head, self.prototype.strings[index])
            }

            Opcode::LoadNumber => {
                let index = insn::get_c(word) as usize;
                format!("{} {}", head, self.prototype.numbers[index])
            }

            Opcode::BuildClosure | Opcode::CallMethod | Opcode::IterPrep
            | Opcode::IterLoop | Opcode::EachLoop | Opcode::IEachLoop => {
                format!("{} {} {}", head, insn::get_a(word), insn::get_b(word))
            }

            _ => format!("{} {}", head, insn::get_c(word)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_operands_per_opcode_shape() {
        let prototype = FunctionPrototype {
            code: vec![
                insn::build(Opcode::LoadString, 0),
                insn::build_ab(Opcode::IterLoop, 2, 9),
                insn::build(Opcode::Pop, 0),
            ],
            lines: vec![1, 2, 2],
            strings: vec!["hello".to_string()],
            ..FunctionPrototype::default()
        };
        let dis = Disassembler::new(&prototype);

        assert_eq!(dis.instruction(0), "0000 [   1] LoadString \"hello\"");
        assert_eq!(dis.instruction(1), "0001 [   2] IterLoop 2 9");
        assert_eq!(dis.instruction(2), "0002 [   2] Pop");
    }
}
