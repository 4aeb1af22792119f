// Tue Jan 13 2026 - Alex

use crate::lua::visit::{walk_expression, walk_statement, Visitor};
use crate::lua::{BinaryOp, Block, Expression, Statement, UnaryOp};

/// Abstract operations recorded by the fingerprinter. The discriminant is
/// the digit string written for each tag, so the order is part of the
/// fingerprint format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpTag {
    InstRef = 0,
    StkRef = 1,
    UpvRef = 2,
    EnvRef = 3,
    VarArgRef = 4,
    UnpackRef = 5,
    InsertRef = 6,
    SetMetatableRef = 7,
    WrapProtoRef = 8,
    Access = 9,
    If = 10,
    ElseIf = 11,
    Else = 12,
    For = 13,
    Call = 14,
    Add = 15,
    Sub = 16,
    Mul = 17,
    Div = 18,
    Mod = 19,
    Pow = 20,
    Lt = 21,
    Gt = 22,
    Le = 23,
    Ge = 24,
    Eq = 25,
    Ne = 26,
    Return = 27,
    Len = 28,
    PcRef = 29,
    TopRef = 30,
    Negate = 31,
    Concat = 32,
    Table = 33,
    Not = 34,
    And = 35,
    Or = 36,
}

impl OpTag {
    /// Tag for a reference to one of the VM's internal variables
    pub fn for_role(name: &str) -> Option<OpTag> {
        Some(match name {
            "stk" => OpTag::StkRef,
            "env" => OpTag::EnvRef,
            "upv" => OpTag::UpvRef,
            "inst" => OpTag::InstRef,
            "vararg" => OpTag::VarArgRef,
            "unpack" => OpTag::UnpackRef,
            "setmetatable" => OpTag::SetMetatableRef,
            "pc" => OpTag::PcRef,
            "top" => OpTag::TopRef,
            "wrap_proto" => OpTag::WrapProtoRef,
            _ => return None,
        })
    }

    pub fn for_binary(op: BinaryOp) -> OpTag {
        match op {
            BinaryOp::Add => OpTag::Add,
            BinaryOp::Sub => OpTag::Sub,
            BinaryOp::Mul => OpTag::Mul,
            BinaryOp::Div => OpTag::Div,
            BinaryOp::Mod => OpTag::Mod,
            BinaryOp::Pow => OpTag::Pow,
            BinaryOp::Concat => OpTag::Concat,
            BinaryOp::Eq => OpTag::Eq,
            BinaryOp::Ne => OpTag::Ne,
            BinaryOp::Lt => OpTag::Lt,
            BinaryOp::Le => OpTag::Le,
            BinaryOp::Gt => OpTag::Gt,
            BinaryOp::Ge => OpTag::Ge,
            BinaryOp::And => OpTag::And,
            BinaryOp::Or => OpTag::Or,
        }
    }

    pub fn for_unary(op: UnaryOp) -> OpTag {
        match op {
            UnaryOp::Length => OpTag::Len,
            UnaryOp::Negate => OpTag::Negate,
            UnaryOp::Not => OpTag::Not,
        }
    }
}

/// Depth-first structural signature of a handler body
#[derive(Debug, Default)]
pub struct FingerprintGenerator {
    tags: Vec<OpTag>,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self { tags: Vec::new() }
    }

    pub fn tags(mut self, block: &Block) -> Vec<OpTag> {
        self.visit_block(block);
        self.tags
    }

    pub fn generate(self, block: &Block) -> String {
        self.tags(block).iter().map(|tag| (*tag as u8).to_string()).collect()
    }
}

impl Visitor for FingerprintGenerator {
    fn visit_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::If {
                else_ifs, else_body, ..
            } => {
                self.tags.push(OpTag::If);
                self.tags.extend(else_ifs.iter().map(|_| OpTag::ElseIf));
                if else_body.is_some() {
                    self.tags.push(OpTag::Else);
                }
            }
            Statement::NumericFor { .. } => self.tags.push(OpTag::For),
            Statement::Return(_) => self.tags.push(OpTag::Return),
            _ => {}
        }
        walk_statement(self, stmt);
    }

    fn visit_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Name(name) => {
                if let Some(tag) = OpTag::for_role(name) {
                    self.tags.push(tag);
                }
            }
            Expression::Member { table, key } => {
                if table.is_name("table") && key == "insert" {
                    self.tags.push(OpTag::InsertRef);
                } else {
                    self.tags.push(OpTag::Access);
                }
            }
            Expression::Index { .. } => self.tags.push(OpTag::Access),
            Expression::Call { .. } | Expression::MethodCall { .. } => self.tags.push(OpTag::Call),
            Expression::Binary { op, .. } => self.tags.push(OpTag::for_binary(*op)),
            Expression::Unary { op, .. } => self.tags.push(OpTag::for_unary(*op)),
            Expression::Table(_) => self.tags.push(OpTag::Table),
            _ => {}
        }
        walk_expression(self, expr);
    }
}

pub fn fingerprint(block: &Block) -> String {
    FingerprintGenerator::new().generate(block)
}

/// `pc = pc + k` or `pc = k + pc`
pub fn is_pc_increment(stmt: &Statement) -> bool {
    let Statement::Assign { targets, values } = stmt else {
        return false;
    };
    let counter_or_literal = |e: &Expression| e.is_name("pc") || matches!(e, Expression::Number(_));
    match (targets.as_slice(), values.as_slice()) {
        (
            [target],
            [Expression::Binary {
                op: BinaryOp::Add,
                left,
                right,
            }],
        ) => target.is_name("pc") && counter_or_literal(left) && counter_or_literal(right),
        _ => false,
    }
}

/// `inst = insts[...]`
pub fn is_inst_fetch(stmt: &Statement) -> bool {
    let Statement::Assign { targets, values } = stmt else {
        return false;
    };
    match (targets.as_slice(), values.as_slice()) {
        ([target], [Expression::Index { table, .. }]) => target.is_name("inst") && table.is_name("insts"),
        _ => false,
    }
}

/// Splits a sequence wherever `boundary(previous, current)` holds. The
/// boundary pair itself is dropped: `previous` is cut from the emitted
/// window and `current` does not start the next one. Empty windows are
/// not emitted.
pub fn split_windows<T, F>(items: &[T], boundary: F) -> Vec<Vec<T>>
where
    T: Clone,
    F: Fn(&T, &T) -> bool,
{
    let mut windows = Vec::new();
    let Some((first, rest)) = items.split_first() else {
        return windows;
    };

    let mut window = vec![first.clone()];
    let mut previous = Some(first);

    for current in rest {
        if previous.is_some_and(|p| boundary(p, current)) {
            window.pop();
            if !window.is_empty() {
                windows.push(std::mem::take(&mut window));
            }
            previous = None;
            continue;
        }
        window.push(current.clone());
        previous = Some(current);
    }

    if !window.is_empty() {
        windows.push(window);
    }
    windows
}

/// Micro-handler windows of one solved opcode body
pub fn handler_windows(body: &Block) -> Vec<Block> {
    split_windows(&body.statements, |a, b| is_pc_increment(a) && is_inst_fetch(b))
        .into_iter()
        .map(Block::from_statements)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::parse;

    fn fp(source: &str) -> String {
        fingerprint(&parse(source).unwrap())
    }

    #[test]
    fn test_move_handler() {
        assert_eq!(fp("stk[inst[_L1]] = stk[inst[_L2]]"), "91909190");
    }

    #[test]
    fn test_jump_and_return() {
        assert_eq!(fp("pc = inst[_L2]"), "2990");
        assert_eq!(fp("return"), "27");
        assert_eq!(fp("return stk[inst[_L1]]"), "279190");
    }

    #[test]
    fn test_arithmetic_with_constant() {
        assert_eq!(fp("stk[inst[_L1]] = stk[inst[_L2]] + inst[_L3]"), "919015919090");
    }

    #[test]
    fn test_if_tags_and_insert() {
        assert_eq!(fp("if a then elseif b then else end"), "101112");
        assert_eq!(fp("table.insert(x, 1)"), "146");
        assert_eq!(fp("local t = {}"), "33");
    }

    #[test]
    fn test_unknown_names_are_silent() {
        assert_eq!(fp("x = y"), "");
        assert_eq!(fp("setmetatable(wrap_proto, vararg)"), "14784");
    }

    #[test]
    fn test_matching_predicates() {
        let block = parse("pc = pc + 1\npc = 1 + pc\npc = pc - 1\ninst = insts[pc]\ninst = other[pc]").unwrap();
        let s = &block.statements;
        assert!(is_pc_increment(&s[0]));
        assert!(is_pc_increment(&s[1]));
        assert!(!is_pc_increment(&s[2]));
        assert!(is_inst_fetch(&s[3]));
        assert!(!is_inst_fetch(&s[4]));
    }

    #[test]
    fn test_split_windows() {
        let items = [1, 2, 9, 0, 3, 9, 0, 4];
        let pairs = split_windows(&items, |a, b| *a == 9 && *b == 0);
        assert_eq!(pairs, vec![vec![1, 2], vec![3], vec![4]]);

        // boundary right at the start leaves an empty window behind
        let pairs = split_windows(&[9, 0, 5], |a, b| *a == 9 && *b == 0);
        assert_eq!(pairs, vec![vec![5]]);

        // the element after a boundary cannot open another boundary
        let pairs = split_windows(&[9, 0, 0, 7], |a, b| *a == 9 && *b == 0);
        assert_eq!(pairs, vec![vec![0, 7]]);

        assert!(split_windows::<i32, _>(&[], |_, _| true).is_empty());
    }

    #[test]
    fn test_handler_windows() {
        let body = parse(
            "stk[inst[_L1]] = stk[inst[_L2]]\npc = pc + 1\ninst = insts[pc]\npc = inst[_L2]",
        )
        .unwrap();
        let windows = handler_windows(&body);
        assert_eq!(windows.len(), 2);
        assert_eq!(fingerprint(&windows[0]), "91909190");
        assert_eq!(fingerprint(&windows[1]), "2990");
    }
}
