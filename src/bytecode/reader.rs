// Tue Jan 13 2026 - Alex

use crate::bytecode::error::BytecodeError;
use crate::bytecode::function::{Constant, Function};
use crate::bytecode::instruction::Instruction;
use crate::bytecode::opcode::{OpCode, OpType};
use crate::bytecode::serializer::{LUA51_HEADER, MAX_SBX};
use crate::bytecode::stream::ByteStream;

/// Reads standard Lua 5.1 chunks (little endian, 4 byte int, 8 byte size_t)
pub struct ChunkReader<'a> {
    stream: ByteStream<'a>,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            stream: ByteStream::new(data),
        }
    }

    pub fn read(mut self) -> Result<Function, BytecodeError> {
        self.read_header()?;
        let mut function = self.read_function()?;
        function.assign_names();
        Ok(function)
    }

    fn read_header(&mut self) -> Result<(), BytecodeError> {
        let header = self.stream.read_bytes(LUA51_HEADER.len())?;
        if header[..4] != LUA51_HEADER[..4] {
            return Err(BytecodeError::InvalidHeader("missing \\27Lua signature".to_string()));
        }
        if header[4] != 0x51 {
            return Err(BytecodeError::InvalidHeader(format!("unsupported version 0x{:02x}", header[4])));
        }
        if header[5..] != LUA51_HEADER[5..] {
            return Err(BytecodeError::InvalidHeader(format!(
                "unsupported platform layout {:?}",
                &header[5..]
            )));
        }
        Ok(())
    }

    fn read_string(&mut self) -> Result<String, BytecodeError> {
        let len = self.stream.read_u64()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.stream.read_bytes(len)?;
        Ok(String::from_utf8_lossy(&bytes[..len - 1]).into_owned())
    }

    fn read_function(&mut self) -> Result<Function, BytecodeError> {
        let mut function = Function::new();

        let _source = self.read_string()?;
        let _line_defined = self.stream.read_i32()?;
        let _last_line_defined = self.stream.read_i32()?;
        function.num_upvalues = self.stream.read_u8()?;
        function.num_params = self.stream.read_u8()?;
        function.is_vararg = self.stream.read_u8()?;
        function.max_stack_size = self.stream.read_u8()?;

        let count = self.stream.read_count("instruction")?;
        for pc in 0..count {
            let word = self.stream.read_u32()?;
            function.instructions.push(decode_instruction(word)?.with_pc(pc as i32));
        }

        let count = self.stream.read_count("constant")?;
        for _ in 0..count {
            let tag = self.stream.read_u8()?;
            let constant = match tag {
                0 => Constant::Nil,
                1 => Constant::Boolean(self.stream.read_u8()? != 0),
                3 => Constant::Number(self.stream.read_f64()?),
                4 => Constant::String(self.read_string()?),
                other => return Err(BytecodeError::UnknownConstantTag(other)),
            };
            function.constants.push(constant);
        }

        let count = self.stream.read_count("prototype")?;
        for _ in 0..count {
            let child = self.read_function()?;
            function.functions.push(child);
        }

        // Debug sections are read and discarded
        let line_info = self.stream.read_count("line info")?;
        self.stream.read_bytes(line_info * 4)?;
        let locals = self.stream.read_count("local")?;
        for _ in 0..locals {
            self.read_string()?;
            self.stream.read_i32()?;
            self.stream.read_i32()?;
        }
        let upvalues = self.stream.read_count("upvalue name")?;
        for _ in 0..upvalues {
            self.read_string()?;
        }

        Ok(function)
    }
}

pub fn read_chunk(data: &[u8]) -> Result<Function, BytecodeError> {
    ChunkReader::new(data).read()
}

/// Unpacks a 32 bit instruction word using the opcode's operand layout
pub fn decode_instruction(word: u32) -> Result<Instruction, BytecodeError> {
    let op = word & 0x3F;
    let opcode = OpCode::from_u8(op as u8).ok_or(BytecodeError::UnknownOpcode(op))?;

    let a = ((word >> 6) & 0xFF) as i32;
    let c = ((word >> 14) & 0x1FF) as i32;
    let b = ((word >> 23) & 0x1FF) as i32;
    let bx = ((word >> 14) & 0x3FFFF) as i32;

    let (a, b, c) = match opcode.op_type() {
        OpType::A => (a, 0, 0),
        OpType::AB => (a, b, 0),
        OpType::AC => (a, 0, c),
        OpType::ABC => (a, b, c),
        OpType::ABx => (a, bx, 0),
        OpType::AsBx => (a, bx - MAX_SBX, 0),
        OpType::SBx => (0, bx - MAX_SBX, 0),
    };

    Ok(Instruction::with_opcode(opcode, a, b, c))
}

/// Human readable listing of a function tree
pub fn disassemble(function: &Function) -> String {
    let mut out = String::new();
    write_listing(&mut out, function, 0);
    out
}

fn write_listing(out: &mut String, function: &Function, depth: usize) {
    let pad = "  ".repeat(depth);
    out.push_str(&format!(
        "{}{} ({} params, {} upvalues, vararg {}, stack {})\n",
        pad,
        function.name,
        function.num_params,
        function.num_upvalues,
        function.is_vararg,
        function.max_stack_size
    ));

    for (i, instruction) in function.instructions.iter().enumerate() {
        out.push_str(&format!("{}  [{:>4}] {}\n", pad, i, instruction));
    }

    if !function.constants.is_empty() {
        out.push_str(&format!("{}  constants ({})\n", pad, function.constants.len()));
        for (i, constant) in function.constants.iter().enumerate() {
            out.push_str(&format!("{}    {:>4}: {}\n", pad, i, constant));
        }
    }

    for child in &function.functions {
        write_listing(out, child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::serializer::serialize;

    fn sample() -> Function {
        let mut child = Function::new();
        child.num_params = 1;
        child.max_stack_size = 2;
        child
            .instructions
            .push(Instruction::with_opcode(OpCode::Return, 0, 1, 0));

        let mut root = Function::new();
        root.is_vararg = 2;
        root.max_stack_size = 3;
        root.instructions = vec![
            Instruction::with_opcode(OpCode::LoadK, 0, 0, 0),
            Instruction::with_opcode(OpCode::Eq, 1, 0, 257),
            Instruction::with_opcode(OpCode::Jmp, 0, -3, 0),
            Instruction::with_opcode(OpCode::ForPrep, 1, 2, 0),
            Instruction::with_opcode(OpCode::Closure, 2, 0, 0),
            Instruction::with_opcode(OpCode::Return, 0, 1, 0),
        ];
        root.constants = vec![
            Constant::String("hi".to_string()),
            Constant::Number(2.5),
            Constant::Boolean(false),
            Constant::Nil,
        ];
        root.functions.push(child);
        root.assign_names();
        root
    }

    fn fields(function: &Function) -> Vec<(OpCode, i32, i32, i32)> {
        function
            .instructions
            .iter()
            .map(|i| (i.opcode, i.a, i.b, i.c))
            .collect()
    }

    #[test]
    fn test_serializer_roundtrip() {
        let original = sample();
        let parsed = read_chunk(&serialize(&original)).unwrap();

        assert_eq!(fields(&parsed), fields(&original));
        assert_eq!(parsed.constants, original.constants);
        assert_eq!(parsed.max_stack_size, 3);
        assert_eq!(parsed.is_vararg, 2);
        assert_eq!(parsed.functions.len(), 1);
        assert_eq!(parsed.functions[0].num_params, 1);
        assert_eq!(fields(&parsed.functions[0]), fields(&original.functions[0]));
    }

    #[test]
    fn test_rejects_bad_header() {
        let mut bytes = serialize(&sample());
        bytes[4] = 0x52;
        assert!(matches!(read_chunk(&bytes), Err(BytecodeError::InvalidHeader(_))));
        assert!(matches!(read_chunk(b"\x1bLu"), Err(BytecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        assert_eq!(decode_instruction(40).unwrap_err(), BytecodeError::UnknownOpcode(40));
    }

    #[test]
    fn test_disassemble_lists_every_function() {
        let listing = disassemble(&sample());
        assert!(listing.contains("func_00000000"));
        assert!(listing.contains("func_00000001"));
        assert!(listing.contains("LOADK"));
        assert!(listing.contains("\"hi\""));
    }
}
