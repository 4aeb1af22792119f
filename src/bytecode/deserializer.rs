// Tue Jan 13 2026 - Alex

use crate::bytecode::error::BytecodeError;
use crate::bytecode::format::{BytecodeFormat, ConstantKind, ProtoStep};
use crate::bytecode::function::{Constant, Function};
use crate::bytecode::instruction::{Instruction, InstructionFlags};
use crate::bytecode::stream::ByteStream;
use crate::transport::decode_constant;

const DESCRIPTOR_DEAD: u8 = 0b1;
const SIGNED_BIAS: i32 = 1 << 16;

/// Reads the packer's container format, driven by a recovered layout
pub struct Deserializer<'a> {
    stream: ByteStream<'a>,
    format: &'a BytecodeFormat,
}

impl<'a> Deserializer<'a> {
    pub fn new(data: &'a [u8], format: &'a BytecodeFormat) -> Self {
        Self {
            stream: ByteStream::new(data),
            format,
        }
    }

    pub fn deserialize(mut self) -> Result<Function, BytecodeError> {
        if self.format.steps.is_empty() {
            return Err(BytecodeError::EmptyFormat);
        }

        let mut function = self.read_function()?;
        function.assign_names();

        if self.stream.remaining() > 0 {
            log::debug!("{} trailing bytes after root prototype", self.stream.remaining());
        }

        Ok(function)
    }

    fn read_function(&mut self) -> Result<Function, BytecodeError> {
        let mut function = Function::new();

        for step in &self.format.steps {
            match step {
                ProtoStep::Instructions => function.instructions = self.read_instructions()?,
                ProtoStep::Constants => function.constants = self.read_constants()?,
                ProtoStep::Functions => function.functions = self.read_prototypes()?,
                ProtoStep::NumParams => function.num_params = self.stream.read_u8()?,
            }
        }

        Ok(function)
    }

    fn read_instructions(&mut self) -> Result<Vec<Instruction>, BytecodeError> {
        let count = self.stream.read_count("instruction")?;
        let mut instructions = Vec::with_capacity(count.min(self.stream.remaining()));

        for pc in 0..count {
            let descriptor = self.stream.read_u8()?;
            if descriptor & DESCRIPTOR_DEAD != 0 {
                continue;
            }

            let shape = (descriptor >> 1) & 0b11;
            let mask = (descriptor >> 3) & 0b111;

            let opnum = self.stream.read_i16()? as i32;
            let a = self.stream.read_i16()? as i32;
            let (b, c) = match shape {
                0 => {
                    let b = self.stream.read_i16()? as i32;
                    let c = self.stream.read_i16()? as i32;
                    (b, c)
                }
                1 => (self.stream.read_i32()?, 0),
                2 => (self.stream.read_i32()?.wrapping_sub(SIGNED_BIAS), 0),
                _ => {
                    let b = self.stream.read_i32()?.wrapping_sub(SIGNED_BIAS);
                    let c = self.stream.read_i16()? as i32;
                    (b, c)
                }
            };

            let mut flags = InstructionFlags::empty();
            if mask & 0b001 != 0 {
                flags |= InstructionFlags::KA;
            }
            if mask & 0b010 != 0 {
                flags |= InstructionFlags::KB;
            }
            if mask & 0b100 != 0 {
                flags |= InstructionFlags::KC;
            }

            instructions.push(
                Instruction::new(opnum, a, b, c)
                    .with_pc(pc as i32)
                    .with_flags(flags),
            );
        }

        Ok(instructions)
    }

    fn read_constants(&mut self) -> Result<Vec<Constant>, BytecodeError> {
        let count = self.stream.read_count("constant")?;
        let mut constants = Vec::with_capacity(count.min(self.stream.remaining()));

        for _ in 0..count {
            let tag = self.stream.read_u8()?;
            let constant = match self.format.constant_kind(tag) {
                Some(ConstantKind::Boolean) => Constant::Boolean(self.stream.read_u8()? != 0),
                Some(ConstantKind::Number) => Constant::Number(self.stream.read_f64()?),
                Some(ConstantKind::String) => {
                    let len = self.stream.read_count("string byte")?;
                    let bytes = self.stream.read_bytes(len)?;
                    Constant::String(decode_constant(self.format.constant_key, bytes))
                }
                None => {
                    log::debug!("Unknown constant tag {}, reading as nil", tag);
                    Constant::Nil
                }
            };
            constants.push(constant);
        }

        Ok(constants)
    }

    fn read_prototypes(&mut self) -> Result<Vec<Function>, BytecodeError> {
        let count = self.stream.read_count("prototype")?;
        let mut functions = Vec::with_capacity(count.min(self.stream.remaining()));
        for _ in 0..count {
            functions.push(self.read_function()?);
        }
        Ok(functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn format() -> BytecodeFormat {
        BytecodeFormat::new(vec![
            ProtoStep::Constants,
            ProtoStep::Instructions,
            ProtoStep::Functions,
            ProtoStep::NumParams,
        ])
        .with_constant_tag(3, ConstantKind::String)
        .with_constant_tag(7, ConstantKind::Number)
        .with_constant_tag(9, ConstantKind::Boolean)
    }

    fn record(buf: &mut Vec<u8>, descriptor: u8, op: i16, a: i16) {
        buf.put_u8(descriptor);
        buf.put_i16_le(op);
        buf.put_i16_le(a);
    }

    #[test]
    fn test_instruction_shapes_and_flags() {
        let mut data = Vec::new();
        data.put_i32_le(0);
        data.put_i32_le(5);
        // shape 0, KB
        record(&mut data, 0b10000, 4, 1);
        data.put_i16_le(2);
        data.put_i16_le(3);
        // dead record: nothing else follows
        data.put_u8(0b1);
        // shape 1, KA + KC
        record(&mut data, 0b101010, 5, 0);
        data.put_i32_le(70000);
        // shape 2
        record(&mut data, 0b100, 6, 0);
        data.put_i32_le(65530);
        // shape 3
        record(&mut data, 0b110, 7, 2);
        data.put_i32_le(65537);
        data.put_i16_le(9);
        data.put_i32_le(0);
        data.put_u8(2);

        let format = format();
        let function = Deserializer::new(&data, &format).deserialize().unwrap();
        let ins = &function.instructions;

        assert_eq!(ins.len(), 4);
        assert_eq!((ins[0].opnum, ins[0].a, ins[0].b, ins[0].c, ins[0].pc), (4, 1, 2, 3, 0));
        assert!(ins[0].is_kb() && !ins[0].is_ka());
        assert_eq!((ins[1].b, ins[1].pc), (70000, 2));
        assert!(ins[1].is_ka() && ins[1].is_kc() && !ins[1].is_kb());
        assert_eq!(ins[2].b, -6);
        assert_eq!((ins[3].b, ins[3].c), (1, 9));
        assert_eq!(function.num_params, 2);
        assert_eq!(function.name, "func_00000000");
    }

    #[test]
    fn test_constants_and_nested_prototypes() {
        let mut data = Vec::new();
        data.put_i32_le(4);
        data.put_u8(3);
        data.put_i32_le(3);
        data.put_slice(&[0x80, b'g', b'h']);
        data.put_u8(7);
        data.put_f64_le(1.5);
        data.put_u8(9);
        data.put_u8(1);
        data.put_u8(42);
        data.put_i32_le(0);
        data.put_i32_le(1);
        // child prototype
        data.put_i32_le(0);
        data.put_i32_le(0);
        data.put_i32_le(0);
        data.put_u8(1);
        data.put_u8(0);

        let format = format().with_constant_key(1);
        let function = Deserializer::new(&data, &format).deserialize().unwrap();

        assert_eq!(
            function.constants,
            vec![
                Constant::String("hi".to_string()),
                Constant::Number(1.5),
                Constant::Boolean(true),
                Constant::Nil
            ]
        );
        assert_eq!(function.functions.len(), 1);
        assert_eq!(function.functions[0].num_params, 1);
        assert_eq!(function.functions[0].name, "func_00000001");
    }

    #[test]
    fn test_truncated_input() {
        let mut data = Vec::new();
        data.put_i32_le(0);
        data.put_i32_le(1);
        data.put_u8(0);

        let format = format();
        assert!(matches!(
            Deserializer::new(&data, &format).deserialize(),
            Err(BytecodeError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_empty_format() {
        let format = BytecodeFormat::default();
        assert_eq!(Deserializer::new(&[], &format).deserialize(), Err(BytecodeError::EmptyFormat));
    }
}
