// Tue Jan 13 2026 - Alex

use crate::bytecode::{BytecodeError, Constant, Function, Instruction, InstructionId, OpCode};
use crate::deobfuscation::analyzer::STATE_ROLE;
use crate::deobfuscation::error::{DeobfuscationError, Result};
use crate::deobfuscation::fingerprint::{fingerprint, handler_windows};
use crate::deobfuscation::matcher::FingerprintTable;
use crate::deobfuscation::rewriter::HandlerRewriter;
use crate::deobfuscation::solver::RangeTreeSolver;
use crate::lua::{print_block, Block, Statement};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_ENTRY_MARKER: &str = "This file was protected with MoonSec V3";

/// One simplified micro-operation of an opcode handler
#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub body: Block,
    pub fingerprint: String,
}

impl Handler {
    pub fn new(body: Block) -> Self {
        let fingerprint = fingerprint(&body);
        Self { body, fingerprint }
    }
}

/// Packer opcode number -> handler windows in execution order
pub type HandlerMapping = HashMap<i32, Vec<Handler>>;

/// Solves the dispatch tree and fingerprints every handler window
pub fn create_handler_mapping(vm_tree: &Statement, rewriter: &HandlerRewriter) -> Result<HandlerMapping> {
    let solved = RangeTreeSolver::new(STATE_ROLE).solve(vm_tree)?;
    let mut mapping = HandlerMapping::with_capacity(solved.len());

    for (state, body) in solved {
        let opnum = i32::try_from(state)
            .map_err(|_| DeobfuscationError::UnsupportedVariant(format!("opcode number {} out of range", state)))?;

        let handlers: Vec<Handler> = handler_windows(&body)
            .into_iter()
            .map(|mut window| {
                rewriter.rewrite(&mut window);
                Handler::new(window)
            })
            .collect();
        log::debug!("Opcode {} has {} handler window(s)", opnum, handlers.len());
        mapping.insert(opnum, handlers);
    }

    Ok(mapping)
}

/// Turns a packed function tree back into standard Lua 5.1 instructions
pub struct Devirtualizer<'t> {
    handlers: HandlerMapping,
    table: &'t FingerprintTable,
    entry_marker: String,
}

impl<'t> Devirtualizer<'t> {
    pub fn new(handlers: HandlerMapping, table: &'t FingerprintTable) -> Self {
        Self {
            handlers,
            table,
            entry_marker: DEFAULT_ENTRY_MARKER.to_string(),
        }
    }

    pub fn with_entry_marker(mut self, marker: impl Into<String>) -> Self {
        self.entry_marker = marker.into();
        self
    }

    pub fn devirtualize(&self, mut root: Function) -> Result<Function> {
        self.resolve_opcodes(&mut root);
        restore_control_flow(&mut root)?;
        trim_program_entry(&mut root, &self.entry_marker);
        rebuild_constant_pool(&mut root)?;
        set_flags(&mut root);
        root.is_vararg = 2;

        let unresolved = root.unresolved_count();
        if unresolved > 0 {
            log::warn!("{} instruction(s) left unresolved", unresolved);
        }
        Ok(root)
    }

    pub fn resolve_opcodes(&self, function: &mut Function) {
        let instructions = &mut function.instructions;
        let count = instructions.len();
        let mut jump_targets: HashSet<usize> = HashSet::new();
        let mut i = 0;

        while i < count {
            let opnum = instructions[i].opnum;
            let Some(handlers) = self.handlers.get(&opnum) else {
                log::warn!("No handler for opcode number {} at {}", opnum, i);
                i += 1;
                continue;
            };

            for (h, handler) in handlers.iter().enumerate() {
                let instruction = &mut instructions[i];
                self.resolve(instruction, handler);

                if instruction.opcode == OpCode::Jmp {
                    if let Ok(target) = usize::try_from(i as i64 + instruction.b as i64 + 1) {
                        jump_targets.insert(target);
                    }
                }
                if matches!(instruction.opcode, OpCode::Return | OpCode::TailCall) {
                    i = mark_dead_code(instructions, &jump_targets, i);
                    break;
                }
                if h + 1 < handlers.len() && i + 1 < count {
                    i += 1;
                }
            }
            i += 1;
        }

        for child in &mut function.functions {
            self.resolve_opcodes(child);
        }
    }

    fn resolve(&self, instruction: &mut Instruction, handler: &Handler) {
        if !self.table.resolve(&handler.fingerprint, instruction) {
            log::warn!(
                "Could not identify handler {}:\n{}",
                handler.fingerprint,
                print_block(&handler.body)
            );
        }
    }
}

/// Marks the dispatch padding after a return as dead, stopping right
/// before the next known jump target. Returns the index to resume from.
fn mark_dead_code(instructions: &mut [Instruction], jump_targets: &HashSet<usize>, from: usize) -> usize {
    let mut i = from + 1;
    while i < instructions.len() {
        if jump_targets.contains(&i) {
            return i - 1;
        }
        instructions[i].mark_dead();
        i += 1;
    }
    i
}

type JumpReferences = HashMap<InstructionId, InstructionId>;

pub fn restore_control_flow(function: &mut Function) -> Result<()> {
    let mut references = jump_references(&function.instructions)?;
    remove_dead_code(&mut function.instructions, &mut references);
    remove_test_flips(&mut function.instructions, &mut references);
    fix_tail_calls(&mut function.instructions);
    fix_jump_offsets(&mut function.instructions, &references);

    for child in &mut function.functions {
        restore_control_flow(child)?;
    }
    Ok(())
}

fn is_relative_jump(opcode: OpCode) -> bool {
    matches!(opcode, OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep)
}

fn jump_references(instructions: &[Instruction]) -> Result<JumpReferences> {
    let mut references = JumpReferences::new();
    for (i, instruction) in instructions.iter().enumerate() {
        if instruction.is_dead() || !is_relative_jump(instruction.opcode) {
            continue;
        }
        let target = i as i64 + instruction.b as i64 + 1;
        let destination = usize::try_from(target)
            .ok()
            .and_then(|t| instructions.get(t))
            .ok_or(BytecodeError::JumpOutOfRange { pc: i, target })?;
        references.insert(instruction.id, destination.id);
    }
    Ok(references)
}

fn remove_dead_code(instructions: &mut Vec<Instruction>, references: &mut JumpReferences) {
    // jumps into removed code land on the next live instruction
    let mut successor = HashMap::new();
    let mut next_live = None;
    for instruction in instructions.iter().rev() {
        if instruction.is_dead() {
            if let Some(next) = next_live {
                successor.insert(instruction.id, next);
            }
        } else {
            next_live = Some(instruction.id);
        }
    }

    for target in references.values_mut() {
        if let Some(next) = successor.get(target) {
            *target = *next;
        }
    }

    let before = instructions.len();
    instructions.retain(|instruction| !instruction.is_dead());
    if instructions.len() != before {
        log::debug!("Removed {} dead instruction(s)", before - instructions.len());
    }
}

/// `cmp; jmp; jmp` is a negated branch: flip the test and drop the first jump
fn remove_test_flips(instructions: &mut Vec<Instruction>, references: &mut JumpReferences) {
    let mut i = 0;
    while i + 2 < instructions.len() {
        let opcode = instructions[i].opcode;
        let flip = matches!(opcode, OpCode::Eq | OpCode::Lt | OpCode::Le | OpCode::Test)
            && instructions[i + 1].opcode == OpCode::Jmp
            && instructions[i + 2].opcode == OpCode::Jmp;

        if flip {
            let instruction = &mut instructions[i];
            if opcode == OpCode::Test {
                instruction.c = if instruction.c == 1 { 0 } else { 1 };
            } else {
                instruction.a = if instruction.a == 1 { 0 } else { 1 };
            }

            let removed = instructions.remove(i + 1);
            let next = instructions[i + 1].id;
            references.remove(&removed.id);
            for target in references.values_mut() {
                if *target == removed.id {
                    *target = next;
                }
            }
        }
        i += 1;
    }
}

fn fix_tail_calls(instructions: &mut Vec<Instruction>) {
    let mut i = 0;
    while i < instructions.len() {
        if instructions[i].opcode == OpCode::TailCall
            && instructions.get(i + 1).map(|next| next.opcode) != Some(OpCode::Return)
        {
            let a = instructions[i].a;
            instructions.insert(i + 1, Instruction::with_opcode(OpCode::Return, a, 0, 0));
        }
        i += 1;
    }
}

fn fix_jump_offsets(instructions: &mut [Instruction], references: &JumpReferences) {
    let positions: HashMap<InstructionId, usize> = instructions
        .iter()
        .enumerate()
        .map(|(i, instruction)| (instruction.id, i))
        .collect();

    for (i, instruction) in instructions.iter_mut().enumerate() {
        let Some(target) = references.get(&instruction.id) else {
            continue;
        };
        match positions.get(target) {
            Some(position) => instruction.b = *position as i32 - (i as i32 + 1),
            None => log::warn!("Jump at {} lost its target, offset left as {}", i, instruction.b),
        }
    }
}

/// Drops the packer's self-check preamble from the main chunk along with
/// the prototypes only it referenced
pub fn trim_program_entry(root: &mut Function, marker: &str) {
    let check = root.instructions.iter().position(|instruction| {
        instruction.opcode == OpCode::Eq
            && instruction.c > 255
            && root
                .constant(instruction.c - 256)
                .and_then(Constant::as_str)
                .is_some_and(|s| s.starts_with(marker))
    });
    let Some(check) = check else {
        return;
    };

    if let Some(end) = root.instructions[check..]
        .iter()
        .position(|instruction| instruction.opcode == OpCode::Return)
    {
        root.instructions.drain(..=check + end);
        log::debug!("Trimmed {} preamble instruction(s)", check + end + 1);
    }
    remove_unused_functions(root);
}

fn remove_unused_functions(root: &mut Function) {
    let referenced: HashSet<usize> = root
        .instructions
        .iter()
        .filter(|instruction| instruction.opcode == OpCode::Closure)
        .filter_map(|instruction| usize::try_from(instruction.b).ok())
        .collect();

    let mut renumbered = HashMap::new();
    let children = std::mem::take(&mut root.functions);
    for (index, child) in children.into_iter().enumerate() {
        if referenced.contains(&index) {
            renumbered.insert(index, root.functions.len() as i32);
            root.functions.push(child);
        }
    }

    for instruction in &mut root.instructions {
        if instruction.opcode != OpCode::Closure {
            continue;
        }
        if let Some(index) = usize::try_from(instruction.b).ok().and_then(|b| renumbered.get(&b)) {
            instruction.b = *index;
        }
    }
}

struct ConstantRemapper {
    old: Vec<Constant>,
    remapped: HashMap<i32, i32>,
    order: Vec<Constant>,
}

impl ConstantRemapper {
    fn index(&mut self, index: i32) -> Result<i32> {
        if let Some(new) = self.remapped.get(&index) {
            return Ok(*new);
        }
        let constant = usize::try_from(index)
            .ok()
            .and_then(|i| self.old.get(i))
            .ok_or(BytecodeError::ConstantOutOfRange {
                index,
                len: self.old.len(),
            })?;

        let new = self.order.len() as i32;
        self.order.push(constant.clone());
        self.remapped.insert(index, new);
        Ok(new)
    }

    /// Register-or-constant operand, constants biased by 256
    fn rk(&mut self, operand: i32) -> Result<i32> {
        if operand >= 256 {
            Ok(self.index(operand - 256)? + 256)
        } else {
            Ok(operand)
        }
    }
}

/// Renumbers constants densely in first-use order, dropping unused ones
pub fn rebuild_constant_pool(function: &mut Function) -> Result<()> {
    let mut remapper = ConstantRemapper {
        old: std::mem::take(&mut function.constants),
        remapped: HashMap::new(),
        order: Vec::new(),
    };

    for instruction in &mut function.instructions {
        match instruction.opcode {
            OpCode::LoadK | OpCode::GetGlobal | OpCode::SetGlobal => {
                instruction.b = remapper.index(instruction.b)?;
            }
            OpCode::SetTable
            | OpCode::Eq
            | OpCode::Lt
            | OpCode::Le
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow => {
                instruction.b = remapper.rk(instruction.b)?;
                instruction.c = remapper.rk(instruction.c)?;
            }
            OpCode::GetTable | OpCode::Self_ => {
                instruction.c = remapper.rk(instruction.c)?;
            }
            _ => {}
        }
    }
    function.constants = remapper.order;

    for child in &mut function.functions {
        rebuild_constant_pool(child)?;
    }
    Ok(())
}

/// Recomputes the vararg flag, stack size and closure upvalue counts
pub fn set_flags(function: &mut Function) {
    function.is_vararg = 0;
    let mut max_a = 0;

    for instruction in &function.instructions {
        max_a = max_a.max(instruction.a);
        match instruction.opcode {
            OpCode::Closure => {
                let child = usize::try_from(instruction.b)
                    .ok()
                    .and_then(|b| function.functions.get_mut(b));
                match child {
                    Some(child) => child.num_upvalues = instruction.c.clamp(0, 255) as u8,
                    None => log::warn!("Closure references missing prototype {}", instruction.b),
                }
            }
            OpCode::VarArg => function.is_vararg = 2,
            _ => {}
        }
    }
    function.max_stack_size = (max_a + 1).clamp(0, 255) as u8;

    for child in &mut function.functions {
        set_flags(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::parse;

    fn op(opcode: OpCode, a: i32, b: i32, c: i32) -> Instruction {
        Instruction::with_opcode(opcode, a, b, c)
    }

    fn opcodes(function: &Function) -> Vec<OpCode> {
        function.instructions.iter().map(|i| i.opcode).collect()
    }

    fn handler(source: &str) -> Handler {
        Handler::new(parse(source).unwrap())
    }

    fn packed(records: &[(i32, i32, i32, i32)]) -> Function {
        let mut function = Function::new();
        function.instructions = records
            .iter()
            .enumerate()
            .map(|(pc, (opnum, a, b, c))| Instruction::new(*opnum, *a, *b, *c).with_pc(pc as i32))
            .collect();
        function
    }

    #[test]
    fn test_handler_mapping_from_vm_tree() {
        let tree = parse(
            r#"
            if enum <= 1 then
                if enum == 0 then
                    stk[inst[OP_A]] = stk[inst[OP_B]]
                else
                    pc = inst[OP_B]
                end
            else
                return
            end
            "#,
        )
        .unwrap();
        let mapping = create_handler_mapping(&tree.statements[0], &HandlerRewriter::new()).unwrap();

        let prints = |opnum: i32| -> Vec<String> { mapping[&opnum].iter().map(|h| h.fingerprint.clone()).collect() };
        assert_eq!(prints(0), vec!["91909190"]);
        assert_eq!(prints(1), vec!["2990"]);
        assert_eq!(prints(2), vec!["27"]);
    }

    #[test]
    fn test_resolves_and_marks_padding_dead() {
        let mapping = HandlerMapping::from([
            (3, vec![handler("stk[inst[OP_A]] = stk[inst[OP_B]]")]),
            (4, vec![handler("pc = inst[OP_B]")]),
            (5, vec![handler("return")]),
        ]);
        let devirtualizer = Devirtualizer::new(mapping, FingerprintTable::standard());

        // jmp over the return lands on 4; 3 is padding
        let mut function = packed(&[(4, 0, 4, 0), (3, 0, 1, 0), (5, 0, 0, 0), (3, 1, 1, 0), (3, 2, 0, 0)]);
        devirtualizer.resolve_opcodes(&mut function);

        assert_eq!(function.instructions[0].b, 3);
        let dead: Vec<bool> = function.instructions.iter().map(Instruction::is_dead).collect();
        assert_eq!(dead, vec![false, false, false, true, false]);
        assert_eq!(function.instructions[4].opcode, OpCode::Move);
    }

    #[test]
    fn test_multi_window_handlers_consume_instructions() {
        let mapping = HandlerMapping::from([(
            7,
            vec![handler("stk[inst[OP_A]] = stk[inst[OP_B]]"), handler("return")],
        )]);
        let devirtualizer = Devirtualizer::new(mapping, FingerprintTable::standard());

        let mut function = packed(&[(7, 0, 1, 0), (7, 0, 0, 0), (7, 3, 3, 0)]);
        devirtualizer.resolve_opcodes(&mut function);
        assert_eq!(opcodes(&function)[..2], [OpCode::Move, OpCode::Return]);
        assert!(function.instructions[2].is_dead());
    }

    #[test]
    fn test_unknown_handlers_stay_unresolved() {
        let mapping = HandlerMapping::from([(1, vec![handler("weird()")])]);
        let devirtualizer = Devirtualizer::new(mapping, FingerprintTable::standard());
        let mut function = packed(&[(1, 0, 0, 0), (9, 0, 0, 0)]);
        devirtualizer.resolve_opcodes(&mut function);
        assert_eq!(function.unresolved_count(), 2);
    }

    #[test]
    fn test_test_flip_is_normalized() {
        let mut function = Function::new();
        function.instructions = vec![
            op(OpCode::Eq, 1, 0, 1),
            op(OpCode::Jmp, 0, 1, 0),
            op(OpCode::Jmp, 0, 1, 0),
            op(OpCode::Move, 0, 1, 0),
            op(OpCode::Return, 0, 1, 0),
        ];
        restore_control_flow(&mut function).unwrap();

        assert_eq!(opcodes(&function), vec![OpCode::Eq, OpCode::Jmp, OpCode::Move, OpCode::Return]);
        assert_eq!(function.instructions[0].a, 0);
        // the surviving jump still lands on the return
        assert_eq!(function.instructions[1].b, 1);
    }

    #[test]
    fn test_test_flip_on_test_flips_c() {
        let mut function = Function::new();
        function.instructions = vec![
            op(OpCode::Test, 0, 0, 1),
            op(OpCode::Jmp, 0, 0, 0),
            op(OpCode::Jmp, 0, 0, 0),
            op(OpCode::Return, 0, 1, 0),
        ];
        restore_control_flow(&mut function).unwrap();
        assert_eq!(function.instructions[0].c, 0);
        assert_eq!(function.instructions.len(), 3);
    }

    #[test]
    fn test_dead_code_removal_retargets_jumps() {
        let mut function = Function::new();
        let mut dead = op(OpCode::Move, 5, 5, 0);
        dead.mark_dead();
        function.instructions = vec![
            op(OpCode::Jmp, 0, 1, 0),
            op(OpCode::LoadNil, 0, 0, 0),
            dead,
            op(OpCode::Return, 0, 1, 0),
        ];
        restore_control_flow(&mut function).unwrap();

        assert_eq!(opcodes(&function), vec![OpCode::Jmp, OpCode::LoadNil, OpCode::Return]);
        assert_eq!(function.instructions[0].b, 1);
    }

    #[test]
    fn test_jump_out_of_range_is_an_error() {
        let mut function = Function::new();
        function.instructions = vec![op(OpCode::Jmp, 0, 5, 0)];
        assert!(matches!(
            restore_control_flow(&mut function),
            Err(DeobfuscationError::Bytecode(BytecodeError::JumpOutOfRange { pc: 0, target: 6 }))
        ));
    }

    #[test]
    fn test_tail_call_gets_a_return() {
        let mut function = Function::new();
        function.instructions = vec![op(OpCode::TailCall, 2, 1, 0), op(OpCode::Move, 0, 1, 0)];
        restore_control_flow(&mut function).unwrap();
        assert_eq!(opcodes(&function), vec![OpCode::TailCall, OpCode::Return, OpCode::Move]);
        assert_eq!(function.instructions[1].a, 2);
    }

    #[test]
    fn test_constant_pool_rebuild() {
        let mut function = Function::new();
        function.constants = vec![
            Constant::String("unused".into()),
            Constant::String("print".into()),
            Constant::Number(2.0),
        ];
        function.instructions = vec![
            op(OpCode::GetGlobal, 0, 1, 0),
            op(OpCode::Add, 1, 0, 258),
            op(OpCode::LoadK, 2, 2, 0),
        ];
        rebuild_constant_pool(&mut function).unwrap();

        assert_eq!(
            function.constants,
            vec![Constant::String("print".into()), Constant::Number(2.0)]
        );
        assert_eq!(function.instructions[0].b, 0);
        assert_eq!((function.instructions[1].b, function.instructions[1].c), (0, 257));
        assert_eq!(function.instructions[2].b, 1);

        let before = function.clone();
        rebuild_constant_pool(&mut function).unwrap();
        assert_eq!(function, before);
    }

    #[test]
    fn test_constant_out_of_range() {
        let mut function = Function::new();
        function.instructions = vec![op(OpCode::LoadK, 0, 3, 0)];
        assert!(rebuild_constant_pool(&mut function).is_err());
    }

    #[test]
    fn test_flags() {
        let mut function = Function::new();
        function.functions.push(Function::new());
        function.instructions = vec![
            op(OpCode::Closure, 4, 0, 2),
            op(OpCode::VarArg, 1, 0, 0),
            op(OpCode::Return, 0, 1, 0),
        ];
        set_flags(&mut function);
        assert_eq!(function.max_stack_size, 5);
        assert_eq!(function.is_vararg, 2);
        assert_eq!(function.functions[0].num_upvalues, 2);
        assert_eq!(function.functions[0].max_stack_size, 1);
    }

    #[test]
    fn test_program_entry_trim() {
        let mut root = Function::new();
        root.constants = vec![Constant::String(format!("{} - check", DEFAULT_ENTRY_MARKER))];
        root.functions = vec![Function::new(), Function::new()];
        root.functions[1].num_params = 3;
        root.instructions = vec![
            op(OpCode::Closure, 0, 0, 0),
            op(OpCode::Eq, 0, 0, 256),
            op(OpCode::Return, 0, 1, 0),
            op(OpCode::Closure, 0, 1, 0),
            op(OpCode::Return, 0, 1, 0),
        ];
        trim_program_entry(&mut root, DEFAULT_ENTRY_MARKER);

        assert_eq!(opcodes(&root), vec![OpCode::Closure, OpCode::Return]);
        assert_eq!(root.functions.len(), 1);
        assert_eq!(root.functions[0].num_params, 3);
        assert_eq!(root.instructions[0].b, 0);
    }

    #[test]
    fn test_program_entry_without_marker_is_untouched() {
        let mut root = Function::new();
        root.functions = vec![Function::new()];
        root.instructions = vec![op(OpCode::Return, 0, 1, 0)];
        trim_program_entry(&mut root, DEFAULT_ENTRY_MARKER);
        assert_eq!(root.instructions.len(), 1);
        assert_eq!(root.functions.len(), 1);
    }
}
