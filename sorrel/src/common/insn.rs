//! Instruction word encoding.
//!
//! Every instruction is a single `u32`. The low 8 bits hold the [`Opcode`];
//! the remaining 24 bits hold either one wide operand `C` or two narrow
//! operands `A` and `B`. `C` aliases the combined `A`/`B` bits, so decoding
//! `A`/`B` is only meaningful for opcodes defined to use the two-operand
//! form.

pub const POS_A: u32 = 8;
pub const POS_B: u32 = 20;
pub const POS_C: u32 = 8;

pub const MAX_OP: u32 = 0xFF;
pub const MAX_A: u32 = 0xFFF;
pub const MAX_B: u32 = 0xFFF;
pub const MAX_C: u32 = 0xFF_FFFF;

/// Build an instruction word from an opcode and a wide operand.
#[inline]
pub fn build(op: Opcode, c: u32) -> u32 {
    debug_assert!(c <= MAX_C, "operand C overflows 24 bits");
    op as u32 | (c << POS_C)
}

/// Build an instruction word from an opcode and two narrow operands.
#[inline]
pub fn build_ab(op: Opcode, a: u32, b: u32) -> u32 {
    debug_assert!(a <= MAX_A, "operand A overflows 12 bits");
    debug_assert!(b <= MAX_B, "operand B overflows 12 bits");
    op as u32 | (a << POS_A) | (b << POS_B)
}

#[inline]
pub fn get_op(word: u32) -> Opcode {
    Opcode::from((word & MAX_OP) as u8)
}

#[inline]
pub fn get_a(word: u32) -> u32 {
    (word >> POS_A) & MAX_A
}

#[inline]
pub fn get_b(word: u32) -> u32 {
    (word >> POS_B) & MAX_B
}

#[inline]
pub fn get_c(word: u32) -> u32 {
    word >> POS_C
}

/// Replace operand `B` of an already emitted word, keeping the opcode
/// and operand `A`. Used to back-patch forward jump targets.
#[inline]
pub fn patch_b(word: u32, b: u32) -> u32 {
    debug_assert!(b <= MAX_B, "operand B overflows 12 bits");
    (word & !(MAX_B << POS_B)) | (b << POS_B)
}

/// Replace operand `C` of an already emitted word, keeping the opcode.
#[inline]
pub fn patch_c(word: u32, c: u32) -> u32 {
    debug_assert!(c <= MAX_C, "operand C overflows 24 bits");
    (word & MAX_OP) | (c << POS_C)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    NoOp,
    Pop,
    Dup,

    /// Detach every open capture cell at or above local slot `C`.
    Close,

    Jump,
    JumpEq,
    JumpNeq,
    JumpTrue,
    JumpFalse,

    And,
    Or,
    Not,

    LoadLocal,
    SaveLocal,
    LoadCapture,
    SaveCapture,
    LoadGlobal,
    SaveGlobal,

    LoadIndex,
    SaveIndex,
    LoadField,
    SaveField,
    LoadOperIndex,
    SaveOperIndex,

    Prefix,
    Infix,

    Nil,
    True,
    False,
    LoadNumber,
    LoadString,

    BuildList,
    BuildClosure,
    BuildGenerator,

    Call,
    CallMethod,
    TailCall,
    Return,

    Yield,
    Resume,

    Throw,
    PushHandler,
    PopHandler,
    BeginHandler,
    SaveException,

    IterPrep,
    IterLoop,
    EachPrep,
    EachLoop,
    IEachPrep,
    IEachLoop,
}

impl From<u8> for Opcode {
    fn from(byte: u8) -> Opcode {
        match byte {
            0 => Opcode::NoOp,
            1 => Opcode::Pop,
            2 => Opcode::Dup,
            3 => Opcode::Close,
            4 => Opcode::Jump,
            5 => Opcode::JumpEq,
            6 => Opcode::JumpNeq,
            7 => Opcode::JumpTrue,
            8 => Opcode::JumpFalse,
            9 => Opcode::And,
            10 => Opcode::Or,
            11 => Opcode::Not,
            12 => Opcode::LoadLocal,
            13 => Opcode::SaveLocal,
            14 => Opcode::LoadCapture,
            15 => Opcode::SaveCapture,
            16 => Opcode::LoadGlobal,
            17 => Opcode::SaveGlobal,
            18 => Opcode::LoadIndex,
            19 => Opcode::SaveIndex,
            20 => Opcode::LoadField,
            21 => Opcode::SaveField,
            22 => Opcode::LoadOperIndex,
            23 => Opcode::SaveOperIndex,
            24 => Opcode::Prefix,
            25 => Opcode::Infix,
            26 => Opcode::Nil,
            27 => Opcode::True,
            28 => Opcode::False,
            29 => Opcode::LoadNumber,
            30 => Opcode::LoadString,
            31 => Opcode::BuildList,
            32 => Opcode::BuildClosure,
            33 => Opcode::BuildGenerator,
            34 => Opcode::Call,
            35 => Opcode::CallMethod,
            36 => Opcode::TailCall,
            37 => Opcode::Return,
            38 => Opcode::Yield,
            39 => Opcode::Resume,
            40 => Opcode::Throw,
            41 => Opcode::PushHandler,
            42 => Opcode::PopHandler,
            43 => Opcode::BeginHandler,
            44 => Opcode::SaveException,
            45 => Opcode::IterPrep,
            46 => Opcode::IterLoop,
            47 => Opcode::EachPrep,
            48 => Opcode::EachLoop,
            49 => Opcode::IEachPrep,
            50 => Opcode::IEachLoop,
            _ => panic!("invalid opcode: {}", byte),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wide_operand() {
        let word = build(Opcode::Jump, 0xABCDE);
        assert_eq!(get_op(word), Opcode::Jump);
        assert_eq!(get_c(word), 0xABCDE);
    }

    #[test]
    fn encode_narrow_operands() {
        let word = build_ab(Opcode::BuildClosure, 0x123, 0xFFF);
        assert_eq!(get_op(word), Opcode::BuildClosure);
        assert_eq!(get_a(word), 0x123);
        assert_eq!(get_b(word), 0xFFF);
    }

    #[test]
    fn wide_operand_aliases_narrow_pair() {
        let word = build_ab(Opcode::IterLoop, 2, 7);
        assert_eq!(get_c(word), 2 | (7 << 12));
    }

    #[test]
    fn patch_wide_operand() {
        let word = build(Opcode::Jump, 0);
        let patched = patch_c(word, 42);
        assert_eq!(get_op(patched), Opcode::Jump);
        assert_eq!(get_c(patched), 42);
    }

    #[test]
    fn patch_narrow_operand_keeps_a() {
        let word = build_ab(Opcode::IterLoop, 3, 0);
        let patched = patch_b(word, 99);
        assert_eq!(get_a(patched), 3);
        assert_eq!(get_b(patched), 99);
    }

    #[test]
    fn opcode_round_trips_through_byte() {
        for byte in 0..=50u8 {
            let op = Opcode::from(byte);
            assert_eq!(op as u8, byte);
        }
    }
}
