//! Opcode definitions, operand widths, and instruction encoding/disassembly.
//!
//! Generalizes `rlox::chunk`'s two-opcode `Chunk`/`OpCode` pair (and `rlox::debug`'s
//! zero-padded-offset disassembly convention) to the full opcode set this language's compiler and
//! VM need, keyed through an [enum_map::EnumMap] rather than a bespoke `TryFrom<u8>` impl.

use enum_map::{enum_map, Enum, EnumMap};
use std::fmt;

/// A one-byte operation code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum OpCode {
    Constant,
    Add,
    Sub,
    Mul,
    Div,
    Pop,
    True,
    False,
    Null,
    Equal,
    NotEqual,
    GreaterThan,
    Minus,
    Bang,
    JumpNotTruthy,
    Jump,
    SetGlobal,
    GetGlobal,
    Array,
    Hash,
    Index,
    Call,
    ReturnValue,
    Return,
    SetLocal,
    GetLocal,
    GetBuiltin,
    Closure,
    GetFree,
    CurrentClosure,
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Each byte in [Definition::operand_widths] is the width, in bytes, of one operand; operands are
/// read in order and encoded big-endian unsigned.
#[derive(Debug, Clone, Copy)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [u8],
}

fn def(name: &'static str, operand_widths: &'static [u8]) -> Definition {
    Definition {
        name,
        operand_widths,
    }
}

/// Returns the [Definition] for every [OpCode], indexed by variant. A `Lazy`/`OnceLock` isn't
/// needed here since `enum_map!` builds the table as a `const`-friendly literal.
pub fn definitions() -> EnumMap<OpCode, Definition> {
    use OpCode::*;
    enum_map! {
        Constant => def("OpConstant", &[2]),
        Add => def("OpAdd", &[]),
        Sub => def("OpSub", &[]),
        Mul => def("OpMul", &[]),
        Div => def("OpDiv", &[]),
        Pop => def("OpPop", &[]),
        True => def("OpTrue", &[]),
        False => def("OpFalse", &[]),
        Null => def("OpNull", &[]),
        Equal => def("OpEqual", &[]),
        NotEqual => def("OpNotEqual", &[]),
        GreaterThan => def("OpGreaterThan", &[]),
        Minus => def("OpMinus", &[]),
        Bang => def("OpBang", &[]),
        JumpNotTruthy => def("OpJumpNotTruthy", &[2]),
        Jump => def("OpJump", &[2]),
        SetGlobal => def("OpSetGlobal", &[2]),
        GetGlobal => def("OpGetGlobal", &[2]),
        Array => def("OpArray", &[2]),
        Hash => def("OpHash", &[2]),
        Index => def("OpIndex", &[]),
        Call => def("OpCall", &[1]),
        ReturnValue => def("OpReturnValue", &[]),
        Return => def("OpReturn", &[]),
        SetLocal => def("OpSetLocal", &[1]),
        GetLocal => def("OpGetLocal", &[1]),
        GetBuiltin => def("OpGetBuiltin", &[1]),
        Closure => def("OpClosure", &[2, 1]),
        GetFree => def("OpGetFree", &[1]),
        CurrentClosure => def("OpCurrentClosure", &[]),
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        // `Enum::from_usize` panics out of range, so bounds-check first.
        if (byte as usize) < OpCode::LENGTH {
            Ok(OpCode::from_usize(byte as usize))
        } else {
            Err(())
        }
    }
}

/// Encodes `op` followed by `operands`, per [definitions]'s operand widths for `op`.
///
/// Returns an empty buffer if `operands` doesn't match the opcode's arity or a value overflows its
/// declared width — both indicate a bug in the caller, not a recoverable condition.
pub fn make(op: OpCode, operands: &[usize]) -> Vec<u8> {
    let def = definitions()[op];
    if def.operand_widths.len() != operands.len() {
        return Vec::new();
    }

    let instruction_len = 1 + def.operand_widths.iter().map(|&w| w as usize).sum::<usize>();
    let mut instruction = Vec::with_capacity(instruction_len);
    instruction.push(op as u8);

    for (&operand, &width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => {
                let Ok(v) = u16::try_from(operand) else {
                    return Vec::new();
                };
                instruction.extend_from_slice(&v.to_be_bytes());
            }
            1 => {
                let Ok(v) = u8::try_from(operand) else {
                    return Vec::new();
                };
                instruction.push(v);
            }
            _ => return Vec::new(),
        }
    }

    instruction
}

/// Decodes the operands of `def` starting at `bytes[0]`, returning the operand values and the
/// number of bytes consumed (excluding the opcode byte itself, which `bytes` must not include).
pub fn read_operands(def: &Definition, bytes: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for &width in def.operand_widths {
        match width {
            2 => {
                operands.push(read_u16(&bytes[offset..]) as usize);
                offset += 2;
            }
            1 => {
                operands.push(bytes[offset] as usize);
                offset += 1;
            }
            _ => unreachable!("no opcode declares an operand width other than 1 or 2"),
        }
    }

    (operands, offset)
}

pub fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Disassembles `instructions` into one line per instruction, prefixed with its zero-padded
/// 4-digit byte offset, e.g. `0000 OpConstant 0`.
pub fn disassemble(instructions: &[u8]) -> String {
    let defs = definitions();
    let mut out = String::new();
    let mut ip = 0;

    while ip < instructions.len() {
        let Ok(op) = OpCode::try_from(instructions[ip]) else {
            out.push_str(&format!("{ip:04} ERROR: unknown opcode {}\n", instructions[ip]));
            ip += 1;
            continue;
        };
        let def = defs[op];
        let (operands, read) = read_operands(&def, &instructions[ip + 1..]);

        let operand_str = operands
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        if operand_str.is_empty() {
            out.push_str(&format!("{ip:04} {}\n", def.name));
        } else {
            out.push_str(&format!("{ip:04} {} {operand_str}\n", def.name));
        }

        ip += 1 + read;
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn make_constant_encodes_big_endian_u16() {
        let instruction = make(OpCode::Constant, &[65534]);
        assert_eq!(vec![OpCode::Constant as u8, 255, 254], instruction);
    }

    #[test]
    fn make_call_encodes_single_byte_operand() {
        let instruction = make(OpCode::Call, &[255]);
        assert_eq!(vec![OpCode::Call as u8, 255], instruction);
    }

    #[test]
    fn make_no_operand_opcode() {
        let instruction = make(OpCode::Add, &[]);
        assert_eq!(vec![OpCode::Add as u8], instruction);
    }

    #[test]
    fn read_operands_round_trips_make() {
        let cases: Vec<(OpCode, Vec<usize>)> = vec![
            (OpCode::Constant, vec![65535]),
            (OpCode::GetLocal, vec![255]),
            (OpCode::Closure, vec![65535, 255]),
        ];

        for (op, operands) in cases {
            let instruction = make(op, &operands);
            let def = definitions()[op];
            let (decoded, read) = read_operands(&def, &instruction[1..]);
            assert_eq!(operands, decoded);
            assert_eq!(def.operand_widths.iter().map(|&w| w as usize).sum::<usize>(), read);
        }
    }

    #[test]
    fn disassemble_formats_offsets_and_operands() {
        let instructions = [
            make(OpCode::Add, &[]),
            make(OpCode::Constant, &[2]),
            make(OpCode::Constant, &[65535]),
            make(OpCode::Closure, &[65535, 255]),
        ]
        .concat();

        let expected = "0000 OpAdd\n\
                         0001 OpConstant 2\n\
                         0004 OpConstant 65535\n\
                         0007 OpClosure 65535 255\n";

        assert_eq!(expected, disassemble(&instructions));
    }

    #[test]
    fn opcode_round_trips_through_u8() {
        for i in 0..OpCode::LENGTH {
            let op = OpCode::from_usize(i);
            assert_eq!(op, OpCode::try_from(op as u8).unwrap());
        }
        assert!(OpCode::try_from(250).is_err());
    }
}
