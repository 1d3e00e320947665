//! Human-readable chunk listings. Purely observational: nothing here is on
//! the execution path.

use std::fmt::{self, Write};

use super::chunk::{Chunk, OpCode};

pub fn disassemble_chunk_to_string(chunk: &Chunk, name: &str) -> String {
    let mut output = String::new();
    let _ = disassemble_chunk(chunk, name, &mut output);
    output
}

pub fn disassemble_chunk(chunk: &Chunk, name: &str, w: &mut impl Write) -> fmt::Result {
    writeln!(w, "== {} ==", name)?;

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, w)?;
    }

    if !chunk.constants.is_empty() {
        writeln!(w, "Constants ({}):", chunk.constants.len())?;
        for (i, constant) in chunk.constants.iter().enumerate() {
            writeln!(w, "  {}: {}", i, constant)?;
        }
    }

    Ok(())
}

/// Renders the instruction at `offset` and returns the offset of the next
/// one. The line column shows `|` while the line is unchanged.
pub fn disassemble_instruction(
    chunk: &Chunk,
    offset: usize,
    w: &mut impl Write,
) -> Result<usize, fmt::Error> {
    write!(w, "{:04} ", offset)?;
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        write!(w, "   | ")?;
    } else {
        write!(w, "{:4} ", chunk.lines[offset])?;
    }

    let Some(op) = OpCode::from_repr(chunk.code[offset]) else {
        writeln!(w, "Unknown opcode {}", chunk.code[offset])?;
        return Ok(offset + 1);
    };

    match op {
        OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal => {
            constant_instruction(chunk, op, offset, w)
        }
        OpCode::GetLocal | OpCode::SetLocal => byte_instruction(chunk, op, offset, w),
        _ => {
            writeln!(w, "{}", op)?;
            Ok(offset + 1)
        }
    }
}

fn constant_instruction(
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    w: &mut impl Write,
) -> Result<usize, fmt::Error> {
    match chunk.code.get(offset + 1) {
        Some(&index) => {
            match chunk.constants.get(index as usize) {
                Some(constant) => writeln!(w, "{:<16} {:4} '{}'", op, index, constant)?,
                None => writeln!(w, "{:<16} {:4} <bad constant>", op, index)?,
            }
            Ok(offset + 2)
        }
        None => {
            writeln!(w, "{:<16} <truncated>", op)?;
            Ok(offset + 1)
        }
    }
}

fn byte_instruction(
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    w: &mut impl Write,
) -> Result<usize, fmt::Error> {
    match chunk.code.get(offset + 1) {
        Some(&slot) => {
            writeln!(w, "{:<16} {:4}", op, slot)?;
            Ok(offset + 2)
        }
        None => {
            writeln!(w, "{:<16} <truncated>", op)?;
            Ok(offset + 1)
        }
    }
}
