// Tue Jan 13 2026 - Alex

use crate::bytecode::opcode::OpCode;
use bitflags::bitflags;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstructionFlags: u8 {
        /// A is a constant reference
        const KA = 0b0001;
        const KB = 0b0010;
        const KC = 0b0100;
        /// Dispatch padding, removed during control flow cleanup
        const DEAD = 0b1000;
    }
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Identity handle that survives reordering and deletion of neighbours
pub type InstructionId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub id: InstructionId,
    /// Packer opcode number before resolution
    pub opnum: i32,
    pub opcode: OpCode,
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub flags: InstructionFlags,
    /// Record index in the packed stream
    pub pc: i32,
}

impl Instruction {
    pub fn new(opnum: i32, a: i32, b: i32, c: i32) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            opnum,
            opcode: OpCode::Unknown,
            a,
            b,
            c,
            flags: InstructionFlags::empty(),
            pc: 0,
        }
    }

    /// Instruction with a known opcode, used for synthesized and standard-format code
    pub fn with_opcode(opcode: OpCode, a: i32, b: i32, c: i32) -> Self {
        let mut instruction = Self::new(-1, a, b, c);
        instruction.opcode = opcode;
        instruction
    }

    pub fn with_pc(mut self, pc: i32) -> Self {
        self.pc = pc;
        self
    }

    pub fn with_flags(mut self, flags: InstructionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_ka(&self) -> bool {
        self.flags.contains(InstructionFlags::KA)
    }

    pub fn is_kb(&self) -> bool {
        self.flags.contains(InstructionFlags::KB)
    }

    pub fn is_kc(&self) -> bool {
        self.flags.contains(InstructionFlags::KC)
    }

    pub fn is_dead(&self) -> bool {
        self.flags.contains(InstructionFlags::DEAD)
    }

    pub fn mark_dead(&mut self) {
        self.flags.insert(InstructionFlags::DEAD);
    }

    pub fn is_resolved(&self) -> bool {
        self.opcode != OpCode::Unknown
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_resolved() {
            write!(f, "{:>12}\t| {:>4} | {:>4} | {:>4} |", self.opcode, self.a, self.b, self.c)
        } else if self.is_dead() {
            write!(f, "{:>12}\t| {:>4} | {:>4} | {:>4} |", "DEAD", "-", "-", "-")
        } else {
            write!(f, "{:>12}\t| {:>4} | {:>4} | {:>4} |", self.opnum, self.a, self.b, self.c)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Instruction::new(0, 0, 0, 0);
        let b = a.clone();
        let c = Instruction::new(0, 0, 0, 0);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_flags() {
        let mut instruction = Instruction::new(3, 0, 1, 2).with_flags(InstructionFlags::KB);
        assert!(instruction.is_kb());
        assert!(!instruction.is_ka() && !instruction.is_kc());
        instruction.mark_dead();
        assert!(instruction.is_dead());
    }

    #[test]
    fn test_display() {
        let mut instruction = Instruction::new(7, 1, 2, 3);
        assert!(instruction.to_string().trim_start().starts_with('7'));
        instruction.opcode = OpCode::Move;
        assert!(instruction.to_string().contains("MOVE"));
    }
}
