// Tue Jan 13 2026 - Alex

use crate::bytecode::{Instruction, OpCode};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Operand fix-up applied after a handler is identified
pub type Correction = fn(&mut Instruction);

/// What a known handler fingerprint stands for
#[derive(Clone, Copy)]
pub struct Resolution {
    pub opcode: OpCode,
    pub correction: Option<Correction>,
}

impl Resolution {
    pub fn apply(&self, instruction: &mut Instruction) {
        instruction.opcode = self.opcode;
        if let Some(correction) = self.correction {
            correction(instruction);
        }
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("opcode", &self.opcode)
            .field("corrected", &self.correction.is_some())
            .finish()
    }
}

/// Fingerprint to opcode lookup
#[derive(Debug, Clone, Default)]
pub struct FingerprintTable {
    entries: HashMap<String, Resolution>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Handlers emitted by MoonSec V3
    pub fn standard() -> &'static FingerprintTable {
        &STANDARD
    }

    pub fn insert(&mut self, fingerprint: impl Into<String>, opcode: OpCode, correction: Option<Correction>) {
        self.entries
            .insert(fingerprint.into(), Resolution { opcode, correction });
    }

    pub fn with(mut self, fingerprint: impl Into<String>, opcode: OpCode, correction: Option<Correction>) -> Self {
        self.insert(fingerprint, opcode, correction);
        self
    }

    pub fn lookup(&self, fingerprint: &str) -> Option<&Resolution> {
        self.entries.get(fingerprint)
    }

    /// Sets the opcode and applies the correction; false when the fingerprint is unknown
    pub fn resolve(&self, fingerprint: &str, instruction: &mut Instruction) -> bool {
        match self.lookup(fingerprint) {
            Some(resolution) => {
                resolution.apply(instruction);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn dec_b(i: &mut Instruction) {
    i.b = i.b.wrapping_sub(1);
}

fn const_b(i: &mut Instruction) {
    i.b = i.b.wrapping_add(255);
}

fn const_c(i: &mut Instruction) {
    i.c = i.c.wrapping_add(255);
}

fn const_bc(i: &mut Instruction) {
    const_b(i);
    const_c(i);
}

fn skip_next(i: &mut Instruction) {
    i.c = 1;
}

/// Absolute target to offset from the next instruction
fn relative_jump(i: &mut Instruction) {
    i.b = i.b.wrapping_sub(i.pc.wrapping_add(1));
}

fn relative_prep(i: &mut Instruction) {
    i.b = i.b.wrapping_sub(i.pc.wrapping_add(2));
}

/// Comparison handlers keep the left operand in A and branch on `expect`
fn compare(i: &mut Instruction, expect: i32, left_constant: bool, right_constant: bool) {
    i.b = if left_constant { i.a.wrapping_add(255) } else { i.a };
    i.a = expect;
    if right_constant {
        const_c(i);
    }
}

fn expect_false(i: &mut Instruction) {
    compare(i, 0, false, false);
}

fn expect_false_kc(i: &mut Instruction) {
    compare(i, 0, false, true);
}

fn expect_false_kb(i: &mut Instruction) {
    compare(i, 0, true, false);
}

fn expect_false_kbc(i: &mut Instruction) {
    compare(i, 0, true, true);
}

fn expect_true(i: &mut Instruction) {
    compare(i, 1, false, false);
}

fn expect_true_kc(i: &mut Instruction) {
    compare(i, 1, false, true);
}

fn expect_true_kb(i: &mut Instruction) {
    compare(i, 1, true, false);
}

fn expect_true_kbc(i: &mut Instruction) {
    compare(i, 1, true, true);
}

fn test_false(i: &mut Instruction) {
    i.b = 0;
    i.c = 0;
}

fn test_true(i: &mut Instruction) {
    i.b = 0;
    i.c = 1;
}

fn test_set_false(i: &mut Instruction) {
    i.b = i.c;
    i.c = 0;
}

fn test_set_true(i: &mut Instruction) {
    i.b = i.c;
    i.c = 1;
}

/// Top-relative argument count
fn call_args(i: &mut Instruction) {
    i.b = i.b.wrapping_sub(i.a.wrapping_sub(1));
}

/// Top-relative result count
fn call_results(i: &mut Instruction) {
    i.c = i.c.wrapping_sub(i.a.wrapping_sub(2));
}

fn call_args_results(i: &mut Instruction) {
    call_args(i);
    call_results(i);
}

fn return_multiple(i: &mut Instruction) {
    i.b = i.b.wrapping_add(2);
}

fn clear_b(i: &mut Instruction) {
    i.b = 0;
}

fn set_list_count(i: &mut Instruction) {
    i.b = i.b.wrapping_sub(i.a);
}

static STANDARD: Lazy<FingerprintTable> = Lazy::new(|| {
    use OpCode::*;

    let entries: &[(&str, OpCode, Option<Correction>)] = &[
        ("91909190", Move, None),
        ("1419090", LoadK, Some(dec_b)),
        ("91902690", LoadBool, None),
        ("91902690291529", LoadBool, Some(skip_next)),
        ("13909091", LoadNil, None),
        ("91909290", GetUpval, None),
        ("91909390", GetGlobal, Some(dec_b)),
        ("9190991909190", GetTable, None),
        ("91909919090", GetTable, Some(const_c)),
        ("93909190", SetGlobal, Some(dec_b)),
        ("92909190", SetUpval, None),
        ("9919091909190", SetTable, None),
        ("99190919090", SetTable, Some(const_c)),
        ("99190909190", SetTable, Some(const_b)),
        ("991909090", SetTable, Some(const_bc)),
        ("919033", NewTable, None),
        ("909190911591990", Self_, Some(const_c)),
        ("90919091159199190", Self_, None),
        ("91901591909190", Add, None),
        ("919015919090", Add, Some(const_c)),
        ("919015909190", Add, Some(const_b)),
        ("9190159090", Add, Some(const_bc)),
        ("91901691909190", Sub, None),
        ("919016919090", Sub, Some(const_c)),
        ("919016909190", Sub, Some(const_b)),
        ("9190169090", Sub, Some(const_bc)),
        ("91901791909190", Mul, None),
        ("919017919090", Mul, Some(const_c)),
        ("919017909190", Mul, Some(const_b)),
        ("9190179090", Mul, Some(const_bc)),
        ("91901891909190", Div, None),
        ("919018919090", Div, Some(const_c)),
        ("919018909190", Div, Some(const_b)),
        ("9190189090", Div, Some(const_bc)),
        ("91901991909190", Mod, None),
        ("919019919090", Mod, Some(const_c)),
        ("919019909190", Mod, Some(const_b)),
        ("9190199090", Mod, Some(const_bc)),
        ("91902091909190", Pow, None),
        ("919020919090", Pow, Some(const_c)),
        ("919020909190", Pow, Some(const_b)),
        ("9190209090", Pow, Some(const_bc)),
        ("9190319190", Unm, None),
        ("9190349190", Not, None),
        ("9190289190", Len, None),
        ("909113159032919190", Concat, None),
        ("2990", Jmp, Some(relative_jump)),
        ("101225919091902915292990", Eq, Some(expect_false)),
        ("1012259190902915292990", Eq, Some(expect_false_kc)),
        ("1012259091902915292990", Eq, Some(expect_false_kb)),
        ("10122590902915292990", Eq, Some(expect_false_kbc)),
        ("101226919091902915292990", Eq, Some(expect_true)),
        ("1012269190902915292990", Eq, Some(expect_true_kc)),
        ("1012269091902915292990", Eq, Some(expect_true_kb)),
        ("10122690902915292990", Eq, Some(expect_true_kbc)),
        ("2936352591909190901529", Eq, Some(expect_true)),
        ("101221919091902915292990", Lt, Some(expect_false)),
        ("1012219091902915292990", Lt, Some(expect_false_kb)),
        ("1012219190902915292990", Lt, Some(expect_false_kc)),
        ("10122190902915292990", Lt, Some(expect_false_kbc)),
        ("101221919091902990291529", Lt, Some(expect_true)),
        ("1012219091902990291529", Lt, Some(expect_true_kb)),
        ("1012219190902990291529", Lt, Some(expect_true_kc)),
        ("10122190902990291529", Lt, Some(expect_true_kbc)),
        ("101223919091902915292990", Le, Some(expect_false)),
        ("1012239091902915292990", Le, Some(expect_false_kb)),
        ("1012239190902915292990", Le, Some(expect_false_kc)),
        ("10122390902915292990", Le, Some(expect_false_kbc)),
        ("101223919091902990291529", Le, Some(expect_true)),
        ("1012239190902990291529", Le, Some(expect_true_kc)),
        ("1012239091902990291529", Le, Some(expect_true_kb)),
        ("10122390902990291529", Le, Some(expect_true_kbc)),
        ("101291902915292990", Test, Some(test_false)),
        ("10123491902915292990", Test, Some(test_true)),
        ("9190101229152991902990", TestSet, Some(test_set_false)),
        ("919010123429152991902990", TestSet, Some(test_set_true)),
        ("149190", Call, None),
        ("909114919115", Call, None),
        ("9091149114511590", Call, Some(call_args)),
        ("9014919115", Call, None),
        ("90149114511590", Call, Some(call_args)),
        ("9091149114511530", Call, None),
        ("903314919115139015919", Call, Some(call_results)),
        ("90911491", Call, None),
        ("90141491301615133015919", Call, None),
        ("901414919115301615133015919", Call, Some(call_args)),
        ("9014149114511590301615133015919", Call, Some(call_args)),
        ("90149114511530", Call, None),
        ("9033149114511590139015919", Call, Some(call_args_results)),
        ("9033149114511530139015919", Call, Some(call_results)),
        ("90331491901315919", Call, Some(call_results)),
        ("9014149114511530301615133015919", Call, None),
        ("9027149114511590", TailCall, Some(call_args)),
        ("9027149114511530", TailCall, None),
        ("27149190", TailCall, None),
        ("27", Return, None),
        ("279190", Return, None),
        ("9027145130", Return, None),
        ("902714511590", Return, Some(return_multiple)),
        ("9027919115", Return, None),
        ("909115159191101122102391152990911524911529909115", ForLoop, Some(relative_jump)),
        ("909191151011122210122291152990911521911529909115", ForPrep, Some(relative_prep)),
        ("909015331491911591139115991012912990291529", TForLoop, Some(clear_b)),
        ("909113153014691", SetList, None),
        ("909113159014691", SetList, Some(set_list_count)),
        ("3313289132899910352512490999", Close, None),
        (
            "990331473333927999999913902915299291012259916331991633299152891901483",
            Closure,
            None,
        ),
        ("91901489903", Closure, None),
        ("903016151330941691", VarArg, None),
        ("909013919416", VarArg, Some(call_args)),
    ];

    let mut table = FingerprintTable::new();
    for (fingerprint, opcode, correction) in entries {
        table.insert(*fingerprint, *opcode, *correction);
    }
    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_complete() {
        let table = FingerprintTable::standard();
        assert_eq!(table.len(), 110);
        assert_eq!(table.lookup("91909190").map(|r| r.opcode), Some(OpCode::Move));
        assert!(table.lookup("0000").is_none());
    }

    #[test]
    fn test_arithmetic_constant_correction() {
        let mut instruction = Instruction::new(12, 1, 2, 3);
        assert!(FingerprintTable::standard().resolve("9190159090", &mut instruction));
        assert_eq!(instruction.opcode, OpCode::Add);
        assert_eq!((instruction.a, instruction.b, instruction.c), (1, 257, 258));
    }

    #[test]
    fn test_comparison_correction() {
        let mut instruction = Instruction::new(4, 3, 0, 5);
        FingerprintTable::standard().resolve("1012269091902915292990", &mut instruction);
        assert_eq!(instruction.opcode, OpCode::Eq);
        assert_eq!((instruction.a, instruction.b, instruction.c), (1, 258, 5));
    }

    #[test]
    fn test_jump_correction_uses_pc() {
        let mut instruction = Instruction::new(9, 0, 10, 0).with_pc(4);
        FingerprintTable::standard().resolve("2990", &mut instruction);
        assert_eq!((instruction.opcode, instruction.b), (OpCode::Jmp, 5));
    }

    #[test]
    fn test_corrupt_operands_wrap() {
        let table = FingerprintTable::standard();

        let mut jump = Instruction::new(9, 0, i32::MIN, 0).with_pc(4);
        assert!(table.resolve("2990", &mut jump));
        assert_eq!(jump.b, i32::MIN.wrapping_sub(5));

        let mut add = Instruction::new(12, 1, i32::MAX, i32::MAX);
        assert!(table.resolve("9190159090", &mut add));
        assert_eq!((add.b, add.c), (i32::MAX.wrapping_add(255), i32::MAX.wrapping_add(255)));

        let mut call = Instruction::new(1, i32::MIN, i32::MAX, 0);
        assert!(table.resolve("9033149114511590139015919", &mut call));
        assert_eq!(call.b, i32::MAX.wrapping_sub(i32::MIN.wrapping_sub(1)));
    }

    #[test]
    fn test_call_corrections() {
        let mut instruction = Instruction::new(1, 2, 5, 6);
        FingerprintTable::standard().resolve("9033149114511590139015919", &mut instruction);
        assert_eq!((instruction.b, instruction.c), (4, 6));
    }

    #[test]
    fn test_custom_table() {
        let table = FingerprintTable::new().with("1", OpCode::Close, None);
        let mut instruction = Instruction::new(0, 0, 0, 0);
        assert!(table.resolve("1", &mut instruction));
        assert_eq!(instruction.opcode, OpCode::Close);
        assert!(!table.resolve("2", &mut instruction));
    }
}
