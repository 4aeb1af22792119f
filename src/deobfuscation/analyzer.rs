// Tue Jan 13 2026 - Alex

use crate::bytecode::{ConstantKind, ProtoStep};
use crate::deobfuscation::context::{Context, ContextBuilder};
use crate::deobfuscation::error::{DeobfuscationError, Result};
use crate::lua::visit::{walk_expression, walk_statement, walk_statement_mut, Visitor, VisitorMut};
use crate::lua::{expression_to_string, BinaryOp, Block, Expression, FunctionBody, Statement, SymbolTable};

/// Name the dispatch state variable gets once roles are applied
pub const STATE_ROLE: &str = "enum";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionRole {
    /// Reads one prototype; its statements spell out the record layout
    ProtoFormat,
    /// `wrap_proto(proto, upv, env)`
    WrapProto,
    /// Interpreter loop holding the VM state locals
    Wrapper,
}

/// Local functions by pre-order declaration ordinal
const FUNCTION_ROLES: &[(usize, FunctionRole)] = &[
    (8, FunctionRole::ProtoFormat),
    (10, FunctionRole::WrapProto),
    (11, FunctionRole::Wrapper),
];

const WRAP_PROTO_ROLE: &str = "wrap_proto";
const WRAP_PROTO_PARAMS: &[&str] = &["proto", "upv", "env"];

/// Positions in the flattened top-level locals of the wrapper
const WRAPPER_LOCALS: &[(usize, &str)] = &[
    (0, "insts"),
    (1, "protos"),
    (2, "params"),
    (4, "_R"),
    (5, "pc"),
    (6, "top"),
    (7, "vararg"),
    (9, "args"),
    (10, "pcount"),
    (11, "lupv"),
    (12, "stk"),
    (14, "varargz"),
    (15, "inst"),
    (16, STATE_ROLE),
];

/// `local x = <n>` operand field selectors
const OPERAND_FIELDS: &[(i64, &str)] = &[(1, "OP_ENUM"), (2, "OP_A"), (3, "OP_B"), (4, "OP_C")];

/// Equality tests inside the constant loop, in encounter order
const CONSTANT_TAG_KINDS: &[ConstantKind] = &[ConstantKind::Boolean, ConstantKind::Number, ConstantKind::String];

/// Loop body sizes inside the layout function
fn loop_step(body_len: usize) -> Option<ProtoStep> {
    match body_len {
        1 => Some(ProtoStep::Functions),
        2 => Some(ProtoStep::Instructions),
        4 => Some(ProtoStep::Constants),
        _ => None,
    }
}

/// Single pass over the loader script recovering the bytecode layout, the
/// VM's variable roles, the payload string and the key expressions.
pub struct Analyzer {
    builder: ContextBuilder,
    symbols: SymbolTable,
    functions: usize,
    error: Option<DeobfuscationError>,
}

impl Analyzer {
    pub fn new(builder: ContextBuilder) -> Self {
        Self {
            builder,
            symbols: SymbolTable::new(),
            functions: 0,
            error: None,
        }
    }

    pub fn analyze(mut self, root: &Block) -> Result<Context> {
        self.symbols = SymbolTable::collect(root);
        self.visit_block(root);
        if let Some(error) = self.error {
            return Err(error);
        }

        log::debug!(
            "Analyzer saw {} local functions and {} key expressions",
            self.functions,
            self.builder.key_expression_count()
        );
        self.builder.build()
    }

    fn local_function(&mut self, name: &str, function: &FunctionBody) -> Result<()> {
        let ordinal = self.functions;
        self.functions += 1;

        let role = FUNCTION_ROLES
            .iter()
            .find(|(index, _)| *index == ordinal)
            .map(|(_, role)| *role);

        match role {
            Some(FunctionRole::ProtoFormat) => self.read_proto_format(&function.body),
            Some(FunctionRole::WrapProto) => self.identify_wrap_proto(name, function),
            Some(FunctionRole::Wrapper) => self.identify_wrapper(function, ordinal),
            None => Ok(()),
        }
    }

    fn read_proto_format(&mut self, body: &Block) -> Result<()> {
        for stmt in &body.statements {
            let step = match stmt {
                Statement::Assign { .. } => ProtoStep::NumParams,
                Statement::NumericFor { body, .. } => match loop_step(body.len()) {
                    Some(ProtoStep::Constants) => {
                        self.read_constant_tags(body)?;
                        ProtoStep::Constants
                    }
                    Some(step) => step,
                    None => continue,
                },
                _ => continue,
            };
            self.builder.proto_step(step);
        }
        Ok(())
    }

    fn read_constant_tags(&mut self, body: &Block) -> Result<()> {
        let mut finder = EqualityLiterals::default();
        finder.visit_block(body);
        if let Some(error) = finder.error {
            return Err(error);
        }

        if finder.values.len() < CONSTANT_TAG_KINDS.len() {
            return Err(DeobfuscationError::UnsupportedVariant(format!(
                "constant loop compares against {} type tags, expected {}",
                finder.values.len(),
                CONSTANT_TAG_KINDS.len()
            )));
        }

        for (tag, kind) in finder.values.iter().zip(CONSTANT_TAG_KINDS) {
            self.builder.constant_tag(*tag, *kind);
        }
        Ok(())
    }

    fn identify_wrap_proto(&mut self, name: &str, function: &FunctionBody) -> Result<()> {
        if function.params.len() < WRAP_PROTO_PARAMS.len() {
            return Err(DeobfuscationError::UnsupportedVariant(format!(
                "prototype wrapper takes {} parameters, expected {}",
                function.params.len(),
                WRAP_PROTO_PARAMS.len()
            )));
        }

        self.builder.identify(name, WRAP_PROTO_ROLE);
        for (param, role) in function.params.iter().zip(WRAP_PROTO_PARAMS) {
            self.builder.identify(param.as_str(), *role);
        }
        Ok(())
    }

    fn identify_wrapper(&mut self, function: &FunctionBody, ordinal: usize) -> Result<()> {
        let names: Vec<&str> = function
            .body
            .statements
            .iter()
            .filter_map(|stmt| match stmt {
                Statement::Local { names, .. } => Some(names),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect();

        let mut state = None;
        for (index, role) in WRAPPER_LOCALS {
            let name = names.get(*index).ok_or_else(|| {
                DeobfuscationError::UnsupportedVariant(format!(
                    "VM wrapper declares {} locals, no slot {} for '{}'",
                    names.len(),
                    index,
                    role
                ))
            })?;
            self.builder.identify(*name, *role);
            if *role == STATE_ROLE {
                state = Some(*name);
            }
        }

        let state = state.ok_or(DeobfuscationError::Missing("dispatch state variable"))?;
        if find_dispatch_tree(&function.body, state).is_none() {
            return Err(DeobfuscationError::Missing("VM dispatch tree"));
        }

        self.builder.wrapper(ordinal);
        Ok(())
    }

    fn operand_field(&mut self, name: &str, value: &Expression) {
        match value {
            Expression::Number(n) => {
                let n = n.trunc() as i64;
                if let Some((_, role)) = OPERAND_FIELDS.iter().find(|(value, _)| *value == n) {
                    self.builder.identify(name, *role);
                }
            }
            Expression::Binary { left, .. } if left.is_name("unpack") => {
                self.builder.identify(name, "unpack");
            }
            _ => {}
        }
    }

    fn fail(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }
}

impl Visitor for Analyzer {
    fn visit_statement(&mut self, stmt: &Statement) {
        if self.error.is_some() {
            return;
        }

        match stmt {
            Statement::LocalFunction { name, function } => {
                let result = self.local_function(name, function);
                self.fail(result);
            }
            Statement::Local { names, values } if names.len() == 1 && values.len() == 1 => {
                let reassigned = self.symbols.get(&names[0]).map_or(true, |info| info.assignments != 0);
                if reassigned {
                    return;
                }
                self.operand_field(&names[0], &values[0]);
            }
            _ => {}
        }
        walk_statement(self, stmt);
    }

    fn visit_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Call { args, .. } => {
                if let [Expression::Name(_), Expression::String(payload)] = args.as_slice() {
                    self.builder.bytecode_string(payload.raw.trim_matches('"'));
                }
            }
            Expression::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } if right.is_call() => {
                self.builder.key_expression(expr.clone());
                return;
            }
            _ => {}
        }
        walk_expression(self, expr);
    }
}

/// Right-hand type tags of `x == <n>` tests, pre-order
#[derive(Default)]
struct EqualityLiterals {
    values: Vec<u8>,
    error: Option<DeobfuscationError>,
}

impl Visitor for EqualityLiterals {
    fn visit_expression(&mut self, expr: &Expression) {
        if let Expression::Binary {
            op: BinaryOp::Eq,
            right,
            ..
        } = expr
        {
            match right.as_number() {
                Some(n) => self.values.push(n as u8),
                None => {
                    self.error.get_or_insert_with(|| {
                        DeobfuscationError::UnsupportedVariant(format!(
                            "constant type test against `{}` instead of a number",
                            expression_to_string(right)
                        ))
                    });
                }
            }
        }
        walk_expression(self, expr);
    }
}

/// First `if <state> <op> ...` anywhere under `block`, pre-order
pub fn find_dispatch_tree(block: &Block, state: &str) -> Option<Statement> {
    let mut finder = DispatchFinder { state, found: None };
    finder.visit_block(block);
    finder.found
}

struct DispatchFinder<'s> {
    state: &'s str,
    found: Option<Statement>,
}

impl Visitor for DispatchFinder<'_> {
    fn visit_statement(&mut self, stmt: &Statement) {
        if self.found.is_some() {
            return;
        }
        if let Statement::If { clause, .. } = stmt {
            if let Expression::Binary { left, .. } = &clause.condition {
                if left.is_name(self.state) {
                    self.found = Some(stmt.clone());
                    return;
                }
            }
        }
        walk_statement(self, stmt);
    }
}

/// Runs `action` on the local function with the given pre-order ordinal
pub fn with_local_function<R>(
    root: &mut Block,
    ordinal: usize,
    action: impl FnOnce(&mut FunctionBody) -> R,
) -> Option<R> {
    let mut locator = LocalFunctionLocator {
        target: ordinal,
        seen: 0,
        action: Some(action),
        result: None,
    };
    locator.visit_block_mut(root);
    locator.result
}

struct LocalFunctionLocator<F, R> {
    target: usize,
    seen: usize,
    action: Option<F>,
    result: Option<R>,
}

impl<F, R> VisitorMut for LocalFunctionLocator<F, R>
where
    F: FnOnce(&mut FunctionBody) -> R,
{
    fn visit_statement_mut(&mut self, stmt: &mut Statement) {
        if self.action.is_none() {
            return;
        }
        if let Statement::LocalFunction { function, .. } = stmt {
            let ordinal = self.seen;
            self.seen += 1;
            if ordinal == self.target {
                if let Some(action) = self.action.take() {
                    self.result = Some(action(function));
                }
                return;
            }
        }
        walk_statement_mut(self, stmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::{parse, print_block};

    const LAYOUT: &str = r#"
local function layout()
    local proto = {}
    for i = 1, n() do
        local a = g()
        proto[i] = a
    end
    for i = 1, n() do
        local t = g()
        local c
        if t == 3 then c = true elseif t == 7 then c = g() elseif t == 9 then c = h() end
        k[i] = c
    end
    for i = 1, n() do p[i] = layout() end
    np = g()
    return proto
end
"#;

    fn script(wrapper_locals: usize, state_test: bool) -> String {
        let mut source = String::new();
        for i in 0..8 {
            source.push_str(&format!("local function f{}() end\n", i));
        }
        source.push_str(LAYOUT);
        source.push_str("local function f9() end\n");
        source.push_str("local function wrap(a, b, c) return a end\n");

        let names: Vec<String> = (0..wrapper_locals).map(|i| format!("l{}", i)).collect();
        source.push_str(&format!("local function run(x)\n    local {}\n", names.join(", ")));
        let state = names.last().cloned().unwrap_or_default();
        if state_test {
            source.push_str(&format!("    while true do if {} <= 3 then x() else x(1) end end\n", state));
        }
        source.push_str("end\n");

        source.push_str("local OA = 2\nlocal R = unpack or table.unpack\n");
        source.push_str("local key = 5 + f(1)\nload(env, \"PAYLOAD\")\n");
        source
    }

    fn analyze(source: &str) -> Result<Context> {
        Analyzer::new(ContextBuilder::new()).analyze(&parse(source).unwrap())
    }

    #[test]
    fn test_recovers_layout_and_tags() {
        let ctx = analyze(&script(17, true)).unwrap();
        assert_eq!(
            ctx.format.steps,
            vec![
                ProtoStep::Instructions,
                ProtoStep::Constants,
                ProtoStep::Functions,
                ProtoStep::NumParams
            ]
        );
        assert_eq!(ctx.format.constant_kind(3), Some(ConstantKind::Boolean));
        assert_eq!(ctx.format.constant_kind(7), Some(ConstantKind::Number));
        assert_eq!(ctx.format.constant_kind(9), Some(ConstantKind::String));
        assert_eq!(ctx.bytecode_string, "PAYLOAD");
        assert_eq!(ctx.wrapper, 11);
    }

    #[test]
    fn test_identifies_roles() {
        let ctx = analyze(&script(17, true)).unwrap();
        let role = |name: &str| ctx.identified_names.get(name).map(String::as_str);
        assert_eq!(role("wrap"), Some("wrap_proto"));
        assert_eq!(role("c"), Some("env"));
        assert_eq!(role("l0"), Some("insts"));
        assert_eq!(role("l3"), None);
        assert_eq!(role("l12"), Some("stk"));
        assert_eq!(role("l16"), Some("enum"));
        assert_eq!(role("OA"), Some("OP_A"));
        assert_eq!(role("R"), Some("unpack"));
    }

    #[test]
    fn test_key_expressions() {
        let ctx = analyze(&script(17, true)).unwrap();
        assert_eq!(ctx.key_expressions.len(), 1);
        let printed = print_block(&Block::from_statements(vec![Statement::Return(ctx.key_expressions)]));
        assert_eq!(printed, "return 5 + f(1)\n");
    }

    #[test]
    fn test_reassigned_locals_are_not_operand_fields() {
        let mut source = script(17, true);
        source.push_str("OA = 3\n");
        let ctx = analyze(&source).unwrap();
        assert!(!ctx.identified_names.contains_key("OA"));
    }

    #[test]
    fn test_shape_mismatches() {
        assert!(matches!(
            analyze(&script(10, true)),
            Err(DeobfuscationError::UnsupportedVariant(_))
        ));
        assert!(matches!(
            analyze(&script(17, false)),
            Err(DeobfuscationError::Missing("VM dispatch tree"))
        ));
        assert!(matches!(
            analyze("local x = 1"),
            Err(DeobfuscationError::Missing(_))
        ));
    }

    #[test]
    fn test_locate_wrapper_and_tree() {
        let mut root = parse(&script(17, true)).unwrap();
        let params = with_local_function(&mut root, 11, |f| f.params.clone());
        assert_eq!(params, Some(vec!["x".to_string()]));
        assert!(with_local_function(&mut root, 40, |_| ()).is_none());

        let tree = with_local_function(&mut root, 11, |f| find_dispatch_tree(&f.body, "l16")).flatten();
        assert!(matches!(tree, Some(Statement::If { .. })));
    }
}
