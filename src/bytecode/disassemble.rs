//! # Disassembler
//!
//! A debug-only utility: walks a chunk's bytes alongside its debug-info
//! line table and renders one instruction per line, in the `simpleBLD`
//! textual style other bytecode interpreters in this corpus use for
//! their own dumps. Never called from the normal run path.

use super::{Chunk, OpCode};
use crate::value::CompiledUnit;

pub fn disassemble_chunk(unit: &CompiledUnit, chunk_index: u32) -> String {
    let chunk = unit.chunk(chunk_index);
    let name = &unit.debug.chunk_names[chunk_index as usize];
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(unit, chunk, chunk_index, offset, &mut out);
    }
    out
}

fn disassemble_instruction(
    unit: &CompiledUnit,
    chunk: &Chunk,
    chunk_index: u32,
    offset: usize,
    out: &mut String,
) -> usize {
    let line = unit.debug.line_at(chunk_index, offset);
    out.push_str(&format!("{offset:04} line {line:>4}  "));

    let byte = chunk.read_u8(offset);
    let op = match OpCode::from_u8(byte) {
        Some(op) => op,
        None => {
            out.push_str(&format!("unknown opcode {byte}\n"));
            return offset + 1;
        }
    };

    use OpCode::*;
    match op {
        Nop | True | False | Pop | Equal | NotEqual | Greater | GreaterEqual | Less
        | LessEqual | Add | AddBNum | Subtract | SubtractBNum | Multiply | Divide | Power
        | Blend | Not | Negate | ToInt | ToFloat | ToBNum | ToString | Print | Return => {
            out.push_str(&format!("{op:?}\n"));
            offset + 1
        }
        Constant => {
            let idx = chunk.read_u8(offset + 1);
            out.push_str(&format!("{op:?} #{idx} = {:?}\n", unit.constants[idx as usize]));
            offset + 2
        }
        ConstantLong => {
            let idx = chunk.read_u32_le(offset + 1);
            out.push_str(&format!("{op:?} #{idx} = {:?}\n", unit.constants[idx as usize]));
            offset + 5
        }
        ReadGlobal | WriteGlobal => {
            let idx = chunk.read_u8(offset + 1);
            let name = &unit.global_names[idx as usize];
            out.push_str(&format!("{op:?} #{idx} ({name})\n"));
            offset + 2
        }
        ReadLocal | WriteLocal => {
            let slot = chunk.read_u8(offset + 1);
            out.push_str(&format!("{op:?} slot {slot}\n"));
            offset + 2
        }
        Jump | JumpIfFalse | JumpIfFalseNoPop | JumpIfTrueNoPop => {
            let rel = chunk.read_i8(offset + 1);
            let target = (offset as i64 + 2 + rel as i64) as usize;
            out.push_str(&format!("{op:?} -> {target:04}\n"));
            offset + 2
        }
        JumpLong | JumpIfFalseLong | JumpIfFalseNoPopLong | JumpIfTrueNoPopLong => {
            let rel = chunk.read_i32_le(offset + 1);
            let target = (offset as i64 + 5 + rel as i64) as usize;
            out.push_str(&format!("{op:?} -> {target:04}\n"));
            offset + 5
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn disassembles_constant_and_return() {
        let mut unit = CompiledUnit::new();
        let chunk_idx = unit.add_chunk("main");
        let c = unit.add_constant(Value::Int(7)).unwrap();
        {
            let chunk = unit.chunk_mut(chunk_idx);
            chunk.write_op(OpCode::Constant);
            chunk.write_u8(c as u8);
            chunk.write_op(OpCode::Return);
        }
        let text = disassemble_chunk(&unit, chunk_idx);
        assert!(text.contains("Constant"));
        assert!(text.contains("Return"));
    }
}
