// Tue Jan 13 2026 - Alex

use crate::deobfuscation::error::SolverError;
use crate::lua::{expression_to_string, BinaryOp, Block, Expression, IfClause, Statement};
use std::collections::BTreeMap;

pub type VertexId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Then,
    Else,
}

#[derive(Debug, Clone)]
enum VertexKind {
    Branch {
        op: BinaryOp,
        constant: i64,
        then_child: Option<VertexId>,
        else_child: Option<VertexId>,
    },
    Leaf {
        body: Block,
        range: Option<(i64, i64)>,
    },
}

#[derive(Debug, Clone)]
struct Vertex {
    kind: VertexKind,
    parent: Option<(VertexId, Edge)>,
}

/// Binary decision tree over a single state variable, stored as an arena.
/// Branches compare the state against a constant, leaves carry the code
/// executed for the states that reach them.
#[derive(Debug, Clone, Default)]
pub struct RangeGraph {
    vertices: Vec<Vertex>,
}

impl RangeGraph {
    pub fn new() -> Self {
        Self { vertices: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn add_branch(&mut self, parent: Option<(VertexId, Edge)>, op: BinaryOp, constant: i64) -> VertexId {
        self.push(
            parent,
            VertexKind::Branch {
                op,
                constant,
                then_child: None,
                else_child: None,
            },
        )
    }

    pub fn add_leaf(&mut self, parent: (VertexId, Edge), body: Block) -> VertexId {
        self.push(Some(parent), VertexKind::Leaf { body, range: None })
    }

    fn push(&mut self, parent: Option<(VertexId, Edge)>, kind: VertexKind) -> VertexId {
        let id = self.vertices.len();
        self.vertices.push(Vertex { kind, parent });

        if let Some((parent_id, edge)) = parent {
            if let Some(VertexKind::Branch {
                then_child,
                else_child,
                ..
            }) = self.vertices.get_mut(parent_id).map(|v| &mut v.kind)
            {
                match edge {
                    Edge::Then => *then_child = Some(id),
                    Edge::Else => *else_child = Some(id),
                }
            }
        }

        id
    }

    /// Maps every reachable state value to the body executed for it
    pub fn solve(mut self) -> Result<BTreeMap<i64, Block>, SolverError> {
        self.assign_ranges()?;

        let leaves: Vec<VertexId> = (0..self.vertices.len())
            .filter(|&id| matches!(self.vertices[id].kind, VertexKind::Leaf { .. }))
            .collect();

        let mut resolved = Vec::with_capacity(leaves.len());
        for &leaf in &leaves {
            let (min, max) = match &self.vertices[leaf].kind {
                VertexKind::Leaf { range: Some(range), .. } => *range,
                _ => continue,
            };
            if min > max {
                return Err(SolverError::UnresolvedRange { min, max });
            }
            let state = (min..=max).find(|&value| self.has_valid_path(leaf, value));
            resolved.push((leaf, state));
        }

        let mut result = BTreeMap::new();
        for (leaf, state) in resolved {
            let Some(state) = state else {
                log::trace!("Dropping unreachable handler vertex {}", leaf);
                continue;
            };
            if let VertexKind::Leaf { body, .. } = &mut self.vertices[leaf].kind {
                if result.insert(state, std::mem::take(body)).is_some() {
                    log::debug!("State {} reached by more than one handler, keeping the last", state);
                }
            }
        }

        Ok(result)
    }

    fn assign_ranges(&mut self) -> Result<(), SolverError> {
        for id in 0..self.vertices.len() {
            let (op, constant, then_child, else_child) = match &self.vertices[id].kind {
                VertexKind::Branch {
                    op,
                    constant,
                    then_child,
                    else_child,
                } => (*op, *constant, *then_child, *else_child),
                VertexKind::Leaf { .. } => continue,
            };

            let (then_range, else_range) = branch_ranges(op, constant)?;
            self.set_leaf_range(then_child, then_range);
            self.set_leaf_range(else_child, else_range);
        }
        Ok(())
    }

    fn set_leaf_range(&mut self, child: Option<VertexId>, value: (i64, i64)) {
        if let Some(VertexKind::Leaf { range, .. }) = child.and_then(|id| self.vertices.get_mut(id)).map(|v| &mut v.kind) {
            *range = Some(value);
        }
    }

    /// True when `state` takes every edge on the way from the root to `vertex`
    fn has_valid_path(&self, vertex: VertexId, state: i64) -> bool {
        let mut current = vertex;
        while let Some((parent, edge)) = self.vertices[current].parent {
            let VertexKind::Branch { op, constant, .. } = self.vertices[parent].kind else {
                return false;
            };
            if (edge == Edge::Then) != compare(op, state, constant) {
                return false;
            }
            current = parent;
        }
        true
    }
}

fn compare(op: BinaryOp, state: i64, constant: i64) -> bool {
    match op {
        BinaryOp::Eq => state == constant,
        BinaryOp::Ne => state != constant,
        BinaryOp::Lt => state < constant,
        BinaryOp::Gt => state > constant,
        BinaryOp::Le => state <= constant,
        BinaryOp::Ge => state >= constant,
        _ => false,
    }
}

/// Candidate state ranges for the then and else children of a comparison
fn branch_ranges(op: BinaryOp, c: i64) -> Result<((i64, i64), (i64, i64)), SolverError> {
    let below = c.saturating_sub(1).max(0);
    let above = c.saturating_add(1);
    let point = |v: i64| (v, v);
    Ok(match op {
        BinaryOp::Eq => (point(c), (below, above)),
        BinaryOp::Ne => ((below, above), point(c)),
        BinaryOp::Lt => (point(below), point(c)),
        BinaryOp::Gt => (point(above), point(c)),
        BinaryOp::Le => (point(c), point(above)),
        BinaryOp::Ge => (point(c), point(below)),
        other => return Err(SolverError::UnsupportedOperator(other.symbol().to_string())),
    })
}

/// Builds a [`RangeGraph`] from nested `if <state> <op> <n>` statements and solves it
pub struct RangeTreeSolver<'a> {
    state: &'a str,
    graph: RangeGraph,
}

impl<'a> RangeTreeSolver<'a> {
    pub fn new(state: &'a str) -> Self {
        Self {
            state,
            graph: RangeGraph::new(),
        }
    }

    pub fn solve(mut self, tree: &Statement) -> Result<BTreeMap<i64, Block>, SolverError> {
        let Statement::If {
            clause,
            else_ifs,
            else_body,
        } = tree
        else {
            return Err(SolverError::NotABranch(tree.kind_name().to_string()));
        };

        self.add_branch(None, clause, else_ifs, else_body.as_ref())?;
        log::debug!("Range tree for '{}' has {} vertices", self.state, self.graph.len());
        self.graph.solve()
    }

    fn add_branch(
        &mut self,
        parent: Option<(VertexId, Edge)>,
        clause: &IfClause,
        else_ifs: &[IfClause],
        else_body: Option<&Block>,
    ) -> Result<(), SolverError> {
        let (op, constant) = split_condition(&clause.condition)?;
        let id = self.graph.add_branch(parent, op, constant);

        self.add_child((id, Edge::Then), &clause.body)?;

        // `elseif` chains are an else branch holding the next comparison
        match else_ifs.split_first() {
            Some((next, rest)) => self.add_branch(Some((id, Edge::Else)), next, rest, else_body),
            None => {
                let empty = Block::new();
                self.add_child((id, Edge::Else), else_body.unwrap_or(&empty))
            }
        }
    }

    fn add_child(&mut self, parent: (VertexId, Edge), body: &Block) -> Result<(), SolverError> {
        if let [Statement::If {
            clause,
            else_ifs,
            else_body,
        }] = body.statements.as_slice()
        {
            if self.tests_state(&clause.condition) {
                return self.add_branch(Some(parent), clause, else_ifs, else_body.as_ref());
            }
        }
        self.graph.add_leaf(parent, body.clone());
        Ok(())
    }

    fn tests_state(&self, condition: &Expression) -> bool {
        matches!(condition, Expression::Binary { left, .. } if left.is_name(self.state))
    }
}

fn split_condition(condition: &Expression) -> Result<(BinaryOp, i64), SolverError> {
    match condition {
        Expression::Binary { op, right, .. } => match right.as_number() {
            Some(n) => Ok((*op, n as i64)),
            None => Err(SolverError::UnexpectedCondition(expression_to_string(condition))),
        },
        _ => Err(SolverError::UnexpectedCondition(expression_to_string(condition))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::parse;

    fn solve_source(source: &str) -> Result<BTreeMap<i64, Block>, SolverError> {
        let block = parse(source).unwrap();
        RangeTreeSolver::new("s").solve(&block.statements[0])
    }

    fn marker(block: &Block) -> String {
        match &block.statements[0] {
            Statement::Call(Expression::Call { args, .. }) => match &args[0] {
                Expression::String(s) => s.value(),
                _ => String::new(),
            },
            _ => String::new(),
        }
    }

    #[test]
    fn test_binary_search_tree() {
        let states = solve_source(
            r#"
            if s <= 1 then
                if s == 0 then f("a") else f("b") end
            else
                if s > 2 then f("d") else f("c") end
            end
            "#,
        )
        .unwrap();

        let resolved: Vec<(i64, String)> = states.iter().map(|(k, v)| (*k, marker(v))).collect();
        assert_eq!(
            resolved,
            vec![
                (0, "a".to_string()),
                (1, "b".to_string()),
                (2, "c".to_string()),
                (3, "d".to_string())
            ]
        );
    }

    #[test]
    fn test_equality_cascade() {
        let states = solve_source(
            r#"
            if s == 0 then f("0")
            elseif s == 1 then f("1")
            elseif s == 2 then f("2")
            else f("3") end
            "#,
        )
        .unwrap();

        assert_eq!(states.len(), 4);
        for (state, body) in &states {
            assert_eq!(marker(body), state.to_string());
        }
    }

    #[test]
    fn test_unreachable_leaf_is_dropped() {
        let states = solve_source(
            r#"
            if s == 0 then f("a")
            else
                if s == 0 then f("x") else f("b") end
            end
            "#,
        )
        .unwrap();

        assert_eq!(states.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(marker(&states[&0]), "a");
        assert_eq!(marker(&states[&1]), "b");
    }

    #[test]
    fn test_missing_else_is_empty_state() {
        let states = solve_source("if s < 1 then f('a') end").unwrap();
        assert_eq!(marker(&states[&0]), "a");
        assert!(states[&1].is_empty());
    }

    #[test]
    fn test_non_state_condition_is_leaf() {
        let states = solve_source("if s == 4 then if x == 1 then f('a') end end").unwrap();
        assert!(matches!(states[&4].statements[0], Statement::If { .. }));
    }

    #[test]
    fn test_rejects_non_numeric_condition() {
        assert!(matches!(
            solve_source("if s == y then f('a') end"),
            Err(SolverError::UnexpectedCondition(_))
        ));
        assert!(matches!(
            RangeTreeSolver::new("s").solve(&Statement::Break),
            Err(SolverError::NotABranch(_))
        ));
    }

    #[test]
    fn test_synthetic_graph() {
        let mut graph = RangeGraph::new();
        let root = graph.add_branch(None, BinaryOp::Ge, 5);
        graph.add_leaf((root, Edge::Then), Block::new());
        let low = graph.add_branch(Some((root, Edge::Else)), BinaryOp::Ne, 3);
        graph.add_leaf((low, Edge::Then), Block::new());
        graph.add_leaf((low, Edge::Else), Block::new());

        let states = graph.solve().unwrap();
        assert_eq!(states.keys().copied().collect::<Vec<_>>(), vec![2, 3, 5]);
    }

    #[test]
    fn test_extreme_constants_saturate() {
        let mut graph = RangeGraph::new();
        let root = graph.add_branch(None, BinaryOp::Eq, i64::MAX);
        graph.add_leaf((root, Edge::Then), Block::new());
        graph.add_leaf((root, Edge::Else), Block::new());
        let states = graph.solve().unwrap();
        assert_eq!(states.keys().copied().collect::<Vec<_>>(), vec![i64::MAX - 1, i64::MAX]);

        // nothing is greater than i64::MAX, so the then leaf is unreachable
        let mut graph = RangeGraph::new();
        let root = graph.add_branch(None, BinaryOp::Gt, i64::MAX);
        graph.add_leaf((root, Edge::Then), Block::new());
        graph.add_leaf((root, Edge::Else), Block::new());
        let states = graph.solve().unwrap();
        assert_eq!(states.keys().copied().collect::<Vec<_>>(), vec![i64::MAX]);
    }

    #[test]
    fn test_rejects_logical_operator() {
        let mut graph = RangeGraph::new();
        let root = graph.add_branch(None, BinaryOp::And, 1);
        graph.add_leaf((root, Edge::Then), Block::new());
        assert_eq!(graph.solve().unwrap_err(), SolverError::UnsupportedOperator("and".to_string()));
    }
}
