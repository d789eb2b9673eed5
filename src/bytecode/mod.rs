//! # Bytecode
//!
//! The opcode set, the flat per-function [`Chunk`] byte buffer it is
//! encoded into, and the jump back-patching / short-to-long opcode upgrade
//! machinery the code generator relies on.

pub mod disassemble;

/// Every opcode the VM understands. Declared so that every long jump/
/// constant variant immediately follows its short counterpart: by
/// construction, `long as u8 == short as u8 + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0,
    Constant = 1,
    ConstantLong = 2,
    True = 3,
    False = 4,
    Pop = 5,
    Equal = 6,
    NotEqual = 7,
    Greater = 8,
    GreaterEqual = 9,
    Less = 10,
    LessEqual = 11,
    Add = 12,
    AddBNum = 13,
    Subtract = 14,
    SubtractBNum = 15,
    Multiply = 16,
    Divide = 17,
    Power = 18,
    Blend = 19,
    Jump = 20,
    JumpLong = 21,
    JumpIfFalse = 22,
    JumpIfFalseLong = 23,
    JumpIfFalseNoPop = 24,
    JumpIfFalseNoPopLong = 25,
    JumpIfTrueNoPop = 26,
    JumpIfTrueNoPopLong = 27,
    Not = 28,
    Negate = 29,
    ToInt = 30,
    ToFloat = 31,
    ToBNum = 32,
    ToString = 33,
    Print = 34,
    ReadGlobal = 35,
    WriteGlobal = 36,
    ReadLocal = 37,
    WriteLocal = 38,
    Return = 39,
}

impl OpCode {
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        use OpCode::*;
        Some(match byte {
            0 => Nop,
            1 => Constant,
            2 => ConstantLong,
            3 => True,
            4 => False,
            5 => Pop,
            6 => Equal,
            7 => NotEqual,
            8 => Greater,
            9 => GreaterEqual,
            10 => Less,
            11 => LessEqual,
            12 => Add,
            13 => AddBNum,
            14 => Subtract,
            15 => SubtractBNum,
            16 => Multiply,
            17 => Divide,
            18 => Power,
            19 => Blend,
            20 => Jump,
            21 => JumpLong,
            22 => JumpIfFalse,
            23 => JumpIfFalseLong,
            24 => JumpIfFalseNoPop,
            25 => JumpIfFalseNoPopLong,
            26 => JumpIfTrueNoPop,
            27 => JumpIfTrueNoPopLong,
            28 => Not,
            29 => Negate,
            30 => ToInt,
            31 => ToFloat,
            32 => ToBNum,
            33 => ToString,
            34 => Print,
            35 => ReadGlobal,
            36 => WriteGlobal,
            37 => ReadLocal,
            38 => WriteLocal,
            39 => Return,
            _ => return None,
        })
    }

    /// Long variant's opcode byte is always the short variant's plus one.
    pub fn long(self) -> OpCode {
        OpCode::from_u8(self as u8 + 1).expect("every jump/constant short opcode has a long pair")
    }
}

/// A function's flat bytecode buffer. Owned by a `CompiledUnit`; constants
/// and globals live on the unit, not here, so identical values can be
/// shared and deduplicated across functions.
#[derive(Debug, Default, Clone)]
pub struct Chunk {
    pub code: Vec<u8>,
}

impl Chunk {
    pub fn new() -> Self {
        Chunk { code: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    pub fn write_op(&mut self, op: OpCode) {
        self.write_u8(op as u8);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn read_u8(&self, at: usize) -> u8 {
        self.code[at]
    }

    pub fn read_i8(&self, at: usize) -> i8 {
        self.code[at] as i8
    }

    pub fn read_u32_le(&self, at: usize) -> u32 {
        u32::from_le_bytes(self.code[at..at + 4].try_into().unwrap())
    }

    pub fn read_i32_le(&self, at: usize) -> i32 {
        i32::from_le_bytes(self.code[at..at + 4].try_into().unwrap())
    }

    /// Inserts `n` zero bytes at `at`, shifting everything after it. Used
    /// only by the short-to-long jump upgrade.
    pub fn insert_zeros(&mut self, at: usize, n: usize) {
        self.code.splice(at..at, std::iter::repeat(0u8).take(n));
    }
}

/// Patches the jump placeholder starting at `opcode_addr` (the address of
/// the opcode byte itself) so it jumps to `target`. If the short-form
/// offset doesn't fit in a signed byte, upgrades the opcode to its long
/// variant in place, widening the operand and inserting three zero bytes
/// (mirrored into `lines` so every byte keeps its debug-info line). Returns
/// the number of bytes inserted, which the caller must add to any
/// previously recorded address that lies after `opcode_addr`.
pub fn patch_jump(chunk: &mut Chunk, lines: &mut Vec<usize>, opcode_addr: usize, target: usize) -> usize {
    let operand_addr = opcode_addr + 1;
    // Offset is relative to the byte immediately following the (possibly
    // widened) operand, recomputed now rather than cached, per the
    // "recompute at patch time" rule.
    let short_offset = target as i64 - (operand_addr + 1) as i64;

    if let Ok(offset) = i8::try_from(short_offset) {
        chunk.patch_i8_code(operand_addr, offset);
        0
    } else {
        let op = OpCode::from_u8(chunk.read_u8(opcode_addr)).expect("valid opcode at jump site");
        chunk.code[opcode_addr] = op.long() as u8;
        chunk.insert_zeros(operand_addr, 3);
        lines.splice(operand_addr..operand_addr, std::iter::repeat(lines[opcode_addr]).take(3));
        // Widening the operand moves both the instruction end and a forward
        // target by the same 3 bytes, so the base-relative offset is the
        // short-form offset computed above, unaffected by the insertion.
        chunk.patch_i32_le(operand_addr, short_offset as i32);
        3
    }
}

impl Chunk {
    fn patch_i8_code(&mut self, at: usize, value: i8) {
        self.code[at] = value as u8;
    }

    fn patch_i32_le(&mut self, at: usize, value: i32) {
        self.code[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_opcode_is_short_plus_one() {
        assert_eq!(OpCode::Jump.long(), OpCode::JumpLong);
        assert_eq!(OpCode::Constant.long(), OpCode::ConstantLong);
        assert_eq!(OpCode::JumpIfFalseNoPop.long(), OpCode::JumpIfFalseNoPopLong);
    }

    #[test]
    fn short_jump_in_range_stays_short() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::JumpIfFalse);
        chunk.write_u8(0);
        let mut lines = vec![1, 1];
        // Target 2 bytes after the 2-byte instruction: offset 0.
        patch_jump(&mut chunk, &mut lines, 0, 2);
        assert_eq!(chunk.read_u8(0), OpCode::JumpIfFalse as u8);
        assert_eq!(chunk.read_i8(1), 0);
    }

    #[test]
    fn out_of_range_jump_upgrades_to_long() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump);
        chunk.write_u8(0);
        let mut lines = vec![1, 1];
        let target = 2 + 200; // forces an offset that doesn't fit in i8
        let inserted = patch_jump(&mut chunk, &mut lines, 0, target);
        assert_eq!(inserted, 3);
        assert_eq!(chunk.read_u8(0), OpCode::JumpLong as u8);
        assert_eq!(chunk.len(), 5);
        assert_eq!(lines.len(), 5);
        // Stored offset is base-relative (operand_addr + 1), invariant under
        // the 3-byte widening.
        assert_eq!(chunk.read_i32_le(1), target as i32 - 2);
    }

    #[test]
    fn long_jump_upgrade_preserves_forward_target_past_insertion_point() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::JumpIfFalse);
        chunk.write_u8(0);
        // Filler the forward target sits after, standing in for a long
        // `then`/`else` span.
        for _ in 0..200 {
            chunk.write_u8(0);
        }
        let mut lines = vec![1; chunk.len()];
        let pre_patch_len = chunk.len();
        let target = pre_patch_len; // jump to just past the filler
        let inserted = patch_jump(&mut chunk, &mut lines, 0, target);
        assert_eq!(inserted, 3);
        // The target address itself shifts by `inserted` once the operand
        // widens, since it lies after the insertion point.
        let shifted_target = target + inserted;
        let landing = 5 + chunk.read_i32_le(1) as usize;
        assert_eq!(landing, shifted_target);
    }
}
