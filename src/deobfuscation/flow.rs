// Tue Jan 13 2026 - Alex

use crate::deobfuscation::error::SolverError;
use crate::deobfuscation::solver::RangeTreeSolver;
use crate::lua::visit::{walk_block_mut, walk_statement_mut, VisitorMut};
use crate::lua::{Block, Expression, Statement};

/// Removes the packer's control-flow flattening from a function body.
///
/// Dispatch loops over a state variable are solved into straight-line code,
/// single-shot loops become plain `if/else`, and anything after a block
/// terminator is dropped. Runs post-order.
#[derive(Debug, Default)]
pub struct ControlFlowSolver {
    error: Option<SolverError>,
    state_machines: usize,
}

impl ControlFlowSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of state machines removed
    pub fn solve(mut self, block: &mut Block) -> Result<usize, SolverError> {
        self.visit_block_mut(block);
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.state_machines),
        }
    }

    fn remove_state_machines(&mut self, block: &mut Block) -> Result<(), SolverError> {
        let mut i = 0;
        while i < block.statements.len() {
            let Some((state, tree)) = state_machine(&block.statements[i]) else {
                i += 1;
                continue;
            };

            let solved = RangeTreeSolver::new(state).solve(tree)?;
            log::debug!("Solved state machine over '{}' into {} states", state, solved.len());

            let statements: Vec<Statement> = solved.into_values().flat_map(|b| b.statements).collect();
            let inserted = statements.len();
            block.statements.splice(i..=i, statements);
            self.state_machines += 1;
            i += inserted;
        }
        Ok(())
    }
}

impl VisitorMut for ControlFlowSolver {
    fn visit_block_mut(&mut self, block: &mut Block) {
        walk_block_mut(self, block);
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.remove_state_machines(block) {
            self.error = Some(e);
            return;
        }
        remove_unreachable(block);
    }

    fn visit_statement_mut(&mut self, stmt: &mut Statement) {
        walk_statement_mut(self, stmt);

        let body = match stmt {
            Statement::Repeat {
                body,
                condition: Expression::Boolean(true),
            } => Some(&*body),
            Statement::NumericFor { body, .. } if is_single_shot(body) => Some(&*body),
            Statement::If { clause, .. } if is_guarded_jump(&clause.body) => Some(&clause.body),
            _ => None,
        };

        if let Some(replacement) = body.and_then(create_replacement) {
            *stmt = replacement;
        }
    }
}

fn is_terminator(stmt: &Statement) -> bool {
    matches!(stmt, Statement::Break | Statement::Do(_))
}

fn is_jump(stmt: &Statement) -> bool {
    matches!(stmt, Statement::Break | Statement::Label(_) | Statement::Goto(_))
}

/// `for ... do if c then ... break end ... end` or a body ending in break/do
fn is_single_shot(body: &Block) -> bool {
    if let Some(Statement::If { clause, .. }) = body.statements.first() {
        if clause.body.statements.last().is_some_and(is_terminator) {
            return true;
        }
    }
    body.statements.last().is_some_and(is_terminator)
}

/// `if c then if ... end ... ::label:: end`
fn is_guarded_jump(body: &Block) -> bool {
    matches!(
        body.statements.as_slice(),
        [Statement::If { .. }, .., Statement::Label(_)]
    )
}

/// Rebuilds `[if c then A <jump> end, B..., <jump>]` as `if c then A else B end`
fn create_replacement(block: &Block) -> Option<Statement> {
    let (first, rest) = block.statements.split_first()?;
    let Statement::If { clause, .. } = first else {
        return None;
    };

    let then_body: Vec<Statement> = clause
        .body
        .statements
        .iter()
        .take_while(|s| !is_jump(s))
        .cloned()
        .collect();
    let else_body: Vec<Statement> = rest.iter().take_while(|s| !is_jump(s)).cloned().collect();

    Some(Statement::if_else(
        clause.condition.clone(),
        Block::from_statements(then_body),
        Block::from_statements(else_body),
    ))
}

fn remove_unreachable(block: &mut Block) {
    if let Some(idx) = block
        .statements
        .iter()
        .position(|s| matches!(s, Statement::Do(_) | Statement::Return(_) | Statement::Break))
    {
        block.statements.truncate(idx + 1);
    }
}

/// State variable and decision tree of a dispatch loop
fn state_machine(stmt: &Statement) -> Option<(&str, &Statement)> {
    match stmt {
        Statement::While {
            condition: Expression::Binary { left, right, .. },
            body,
        } if right.as_number() == Some(-1.0) => {
            let state = left.as_name()?;
            Some((state, body.statements.first()?))
        }
        Statement::NumericFor {
            var,
            start: Expression::Number(_),
            limit: Expression::Number(_),
            body,
            ..
        } => match body.statements.as_slice() {
            [tree @ Statement::If { .. }] => Some((var.as_str(), tree)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deobfuscation::folder::fold_constants;
    use crate::lua::{parse, print_block};

    fn solve(source: &str) -> String {
        let mut block = parse(source).unwrap();
        fold_constants(&mut block);
        ControlFlowSolver::new().solve(&mut block).unwrap();
        print_block(&block)
    }

    #[test]
    fn test_while_state_machine() {
        let out = solve(
            r#"
            local s = 0
            while s ~= -1 do
                if s == 0 then
                    f("a")
                    s = 1
                else
                    f("b")
                    s = -1
                end
            end
            g()
            "#,
        );
        assert_eq!(out, "local s = 0\nf(\"a\")\ns = 1\nf(\"b\")\ns = -1\ng()\n");
    }

    #[test]
    fn test_numeric_for_state_machine() {
        let out = solve(
            r#"
            for s = 1, 3 do
                if s == 1 then f("a") elseif s == 2 then f("b") else f("c") end
            end
            "#,
        );
        assert_eq!(out, "f(\"a\")\nf(\"b\")\nf(\"c\")\n");
    }

    #[test]
    fn test_repeat_until_true() {
        let out = solve(
            r#"
            repeat
                if x then f("a") break end
                f("b")
                break
            until true
            "#,
        );
        assert_eq!(out, "if x then\n    f(\"a\")\nelse\n    f(\"b\")\nend\n");
    }

    #[test]
    fn test_if_with_trailing_label() {
        let out = solve(
            r#"
            if c then
                if y then f("a") goto done end
                f("b")
                ::done::
            end
            "#,
        );
        assert_eq!(out, "if y then\n    f(\"a\")\nelse\n    f(\"b\")\nend\n");
    }

    #[test]
    fn test_single_shot_for() {
        let out = solve("for i = 1, 1 do if x then f() do end end g() break end");
        assert_eq!(out, "if x then\n    f()\n    do\n    end\nelse\n    g()\nend\n");
    }

    #[test]
    fn test_unreachable_after_return() {
        // the parser never produces statements after a return, rewrites can
        let call = |name: &str| Statement::Call(Expression::call(Expression::name(name), vec![]));
        let mut block = Block::from_statements(vec![
            call("f"),
            Statement::Return(vec![Expression::Number(1.0)]),
            call("g"),
        ]);
        ControlFlowSolver::new().solve(&mut block).unwrap();
        assert_eq!(block.statements.len(), 2);
        assert_eq!(print_block(&block), "f()\nreturn 1\n");

        assert_eq!(solve("do end\ng()"), "do\nend\n");
    }

    #[test]
    fn test_solver_error_surfaces() {
        let mut block = parse("while s ~= -1 do if s == t then f() end end").unwrap();
        fold_constants(&mut block);
        assert!(matches!(
            ControlFlowSolver::new().solve(&mut block),
            Err(SolverError::UnexpectedCondition(_))
        ));
    }
}
