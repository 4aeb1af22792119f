// Tue Jan 13 2026 - Alex

pub mod deserializer;
pub mod error;
pub mod format;
pub mod function;
pub mod instruction;
pub mod opcode;
pub mod reader;
pub mod serializer;
pub mod stream;

pub use deserializer::Deserializer;
pub use error::BytecodeError;
pub use format::{BytecodeFormat, ConstantKind, ProtoStep};
pub use function::{Constant, Function};
pub use instruction::{Instruction, InstructionFlags, InstructionId};
pub use opcode::{OpCode, OpType};
pub use reader::{disassemble, read_chunk, ChunkReader};
pub use serializer::{serialize, Serializer};
