// Tue Jan 13 2026 - Alex

use crate::bytecode::function::{Constant, Function};
use crate::bytecode::instruction::Instruction;
use crate::bytecode::opcode::{OpCode, OpType, UNRESOLVED_OPCODE_BITS};
use bytes::{BufMut, BytesMut};

/// `\x1bLua`, version 5.1, official format, little endian,
/// int 4, size_t 8, instruction 4, number 8, floating point numbers
pub const LUA51_HEADER: [u8; 12] = [0x1B, 0x4C, 0x75, 0x61, 0x51, 0, 1, 4, 8, 4, 8, 0];

pub const MAX_SBX: i32 = 131_071;

const TAG_NIL: u8 = 0;
const TAG_BOOLEAN: u8 = 1;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;

/// Writes a function tree as a standard Lua 5.1 chunk
pub struct Serializer {
    buf: BytesMut,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    pub fn serialize(mut self, function: &Function) -> Vec<u8> {
        self.buf.put_slice(&LUA51_HEADER);
        self.write_function(function);
        self.buf.to_vec()
    }

    fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        self.buf.put_u64_le(bytes.len() as u64 + 1);
        self.buf.put_slice(bytes);
        self.buf.put_u8(0);
    }

    fn write_function(&mut self, function: &Function) {
        self.write_string("");
        // line defined, last line defined
        self.buf.put_i32_le(0);
        self.buf.put_i32_le(0);
        self.buf.put_u8(function.num_upvalues);
        self.buf.put_u8(function.num_params);
        self.buf.put_u8(function.is_vararg);
        self.buf.put_u8(function.max_stack_size);

        self.buf.put_i32_le(function.instructions.len() as i32);
        for instruction in &function.instructions {
            self.buf.put_u32_le(encode_instruction(instruction));
        }

        self.buf.put_i32_le(function.constants.len() as i32);
        for constant in &function.constants {
            self.write_constant(constant);
        }

        self.buf.put_i32_le(function.functions.len() as i32);
        for child in &function.functions {
            self.write_function(child);
        }

        // line info, locals, upvalue names
        self.buf.put_i32_le(0);
        self.buf.put_i32_le(0);
        self.buf.put_i32_le(0);
    }

    fn write_constant(&mut self, constant: &Constant) {
        match constant {
            Constant::Nil => self.buf.put_u8(TAG_NIL),
            Constant::Boolean(b) => {
                self.buf.put_u8(TAG_BOOLEAN);
                self.buf.put_u8(*b as u8);
            }
            Constant::Number(n) => {
                self.buf.put_u8(TAG_NUMBER);
                self.buf.put_f64_le(*n);
            }
            Constant::String(s) => {
                self.buf.put_u8(TAG_STRING);
                self.write_string(s);
            }
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn serialize(function: &Function) -> Vec<u8> {
    Serializer::new().serialize(function)
}

fn mask(value: i32, bits: u32) -> u32 {
    (value as u32) & ((1u32 << bits) - 1)
}

/// Packs one instruction into a 32 bit word
pub fn encode_instruction(instruction: &Instruction) -> u32 {
    let op_bits = if instruction.opcode == OpCode::Unknown {
        log::warn!("Writing unresolved instruction {} as invalid opcode", instruction);
        UNRESOLVED_OPCODE_BITS
    } else {
        instruction.opcode as u32
    };

    let a = mask(instruction.a, 8) << 6;
    let b = mask(instruction.b, 9) << 23;
    let c = mask(instruction.c, 9) << 14;
    let bx = mask(instruction.b, 18) << 14;
    let sbx = mask(instruction.b.wrapping_add(MAX_SBX), 18) << 14;

    op_bits
        | match instruction.opcode.op_type() {
            OpType::A => a,
            OpType::AB => a | b,
            OpType::AC => a | c,
            OpType::ABC => a | b | c,
            OpType::ABx => a | bx,
            OpType::AsBx => a | sbx,
            OpType::SBx => sbx,
        }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_fields() {
        let loadk = Instruction::with_opcode(OpCode::LoadK, 1, 2, 0);
        assert_eq!(encode_instruction(&loadk), 1 | (1 << 6) | (2 << 14));

        let add = Instruction::with_opcode(OpCode::Add, 3, 256, 5);
        assert_eq!(encode_instruction(&add), 12 | (3 << 6) | (256 << 23) | (5 << 14));

        let jmp = Instruction::with_opcode(OpCode::Jmp, 0, -1, 0);
        assert_eq!(encode_instruction(&jmp), 22 | (131_070 << 14));

        let test = Instruction::with_opcode(OpCode::Test, 4, 9, 1);
        assert_eq!(encode_instruction(&test), 26 | (4 << 6) | (1 << 14));
    }

    #[test]
    fn test_unresolved_opcode_bits() {
        let unknown = Instruction::new(99, 0, 0, 0);
        assert_eq!(encode_instruction(&unknown) & 0x3F, UNRESOLVED_OPCODE_BITS);
    }

    #[test]
    fn test_minimal_chunk_layout() {
        let mut function = Function::new();
        function.max_stack_size = 2;
        function.is_vararg = 2;
        function
            .instructions
            .push(Instruction::with_opcode(OpCode::Return, 0, 1, 0));
        function.constants.push(Constant::String("hi".to_string()));

        let bytes = serialize(&function);
        assert_eq!(&bytes[..12], &LUA51_HEADER);
        // empty source name: length 1 then NUL
        assert_eq!(&bytes[12..21], &[1, 0, 0, 0, 0, 0, 0, 0, 0]);
        // nups, params, vararg, maxstack follow the two line ints
        assert_eq!(&bytes[29..33], &[0, 0, 2, 2]);
        assert_eq!(&bytes[33..37], &1i32.to_le_bytes());
        let expected_len = 12 + 9 + 8 + 4 + 4 + 4 + 4 + (1 + 8 + 3) + 4 + 12;
        assert_eq!(bytes.len(), expected_len);
    }
}
