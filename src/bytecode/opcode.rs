// Tue Jan 13 2026 - Alex

use std::fmt;

/// Lua 5.1 opcodes in loader order, plus `Unknown` for unresolved handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK = 1,
    LoadBool = 2,
    LoadNil = 3,
    GetUpval = 4,
    GetGlobal = 5,
    GetTable = 6,
    SetGlobal = 7,
    SetUpval = 8,
    SetTable = 9,
    NewTable = 10,
    Self_ = 11,
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Mod = 16,
    Pow = 17,
    Unm = 18,
    Not = 19,
    Len = 20,
    Concat = 21,
    Jmp = 22,
    Eq = 23,
    Lt = 24,
    Le = 25,
    Test = 26,
    TestSet = 27,
    Call = 28,
    TailCall = 29,
    Return = 30,
    ForLoop = 31,
    ForPrep = 32,
    TForLoop = 33,
    SetList = 34,
    Close = 35,
    Closure = 36,
    VarArg = 37,
    Unknown = 38,
}

/// Operand layout of an encoded instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    A,
    AB,
    AC,
    ABC,
    ABx,
    AsBx,
    SBx,
}

/// Opcode field written for instructions that were never resolved
pub const UNRESOLVED_OPCODE_BITS: u32 = 0x3F;

const ALL: [OpCode; 38] = [
    OpCode::Move,
    OpCode::LoadK,
    OpCode::LoadBool,
    OpCode::LoadNil,
    OpCode::GetUpval,
    OpCode::GetGlobal,
    OpCode::GetTable,
    OpCode::SetGlobal,
    OpCode::SetUpval,
    OpCode::SetTable,
    OpCode::NewTable,
    OpCode::Self_,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Mod,
    OpCode::Pow,
    OpCode::Unm,
    OpCode::Not,
    OpCode::Len,
    OpCode::Concat,
    OpCode::Jmp,
    OpCode::Eq,
    OpCode::Lt,
    OpCode::Le,
    OpCode::Test,
    OpCode::TestSet,
    OpCode::Call,
    OpCode::TailCall,
    OpCode::Return,
    OpCode::ForLoop,
    OpCode::ForPrep,
    OpCode::TForLoop,
    OpCode::SetList,
    OpCode::Close,
    OpCode::Closure,
    OpCode::VarArg,
];

impl OpCode {
    pub fn from_u8(value: u8) -> Option<OpCode> {
        ALL.get(value as usize).copied()
    }

    pub fn op_type(&self) -> OpType {
        match self {
            OpCode::Move
            | OpCode::LoadNil
            | OpCode::GetUpval
            | OpCode::SetUpval
            | OpCode::Unm
            | OpCode::Not
            | OpCode::Len
            | OpCode::Return
            | OpCode::VarArg => OpType::AB,
            OpCode::LoadK | OpCode::GetGlobal | OpCode::SetGlobal | OpCode::Closure => OpType::ABx,
            OpCode::Jmp => OpType::SBx,
            OpCode::Test | OpCode::TForLoop => OpType::AC,
            OpCode::ForPrep | OpCode::ForLoop => OpType::AsBx,
            OpCode::Close => OpType::A,
            _ => OpType::ABC,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, OpCode::Eq | OpCode::Lt | OpCode::Le)
    }

    /// Instructions whose B operand is a relative jump
    pub fn is_jump(&self) -> bool {
        matches!(self, OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Move => "MOVE",
            OpCode::LoadK => "LOADK",
            OpCode::LoadBool => "LOADBOOL",
            OpCode::LoadNil => "LOADNIL",
            OpCode::GetUpval => "GETUPVAL",
            OpCode::GetGlobal => "GETGLOBAL",
            OpCode::GetTable => "GETTABLE",
            OpCode::SetGlobal => "SETGLOBAL",
            OpCode::SetUpval => "SETUPVAL",
            OpCode::SetTable => "SETTABLE",
            OpCode::NewTable => "NEWTABLE",
            OpCode::Self_ => "SELF",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Unm => "UNM",
            OpCode::Not => "NOT",
            OpCode::Len => "LEN",
            OpCode::Concat => "CONCAT",
            OpCode::Jmp => "JMP",
            OpCode::Eq => "EQ",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Test => "TEST",
            OpCode::TestSet => "TESTSET",
            OpCode::Call => "CALL",
            OpCode::TailCall => "TAILCALL",
            OpCode::Return => "RETURN",
            OpCode::ForLoop => "FORLOOP",
            OpCode::ForPrep => "FORPREP",
            OpCode::TForLoop => "TFORLOOP",
            OpCode::SetList => "SETLIST",
            OpCode::Close => "CLOSE",
            OpCode::Closure => "CLOSURE",
            OpCode::VarArg => "VARARG",
            OpCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_matches_discriminant() {
        for (i, op) in ALL.iter().enumerate() {
            assert_eq!(*op as u8, i as u8);
            assert_eq!(OpCode::from_u8(i as u8), Some(*op));
        }
        assert_eq!(OpCode::from_u8(38), None);
    }

    #[test]
    fn test_op_types() {
        assert_eq!(OpCode::LoadK.op_type(), OpType::ABx);
        assert_eq!(OpCode::Jmp.op_type(), OpType::SBx);
        assert_eq!(OpCode::ForPrep.op_type(), OpType::AsBx);
        assert_eq!(OpCode::Test.op_type(), OpType::AC);
        assert_eq!(OpCode::Close.op_type(), OpType::A);
        assert_eq!(OpCode::Self_.op_type(), OpType::ABC);
        assert_eq!(OpCode::Return.op_type(), OpType::AB);
    }
}
