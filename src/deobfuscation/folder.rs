// Tue Jan 13 2026 - Alex

use crate::lua::visit::{walk_expression_mut, VisitorMut};
use crate::lua::{Block, Expression, TableField, UnaryOp};

/// Post-order literal folding.
///
/// `#{1, 2, 3}` becomes `3`, `-5` becomes a negative literal, and
/// comparisons with a number on the left are flipped so the number ends
/// up on the right (`1 < x` is `x > 1`).
#[derive(Debug, Default)]
pub struct ConstantFolder {
    folded: usize,
}

impl ConstantFolder {
    pub fn new() -> Self {
        Self { folded: 0 }
    }

    /// Returns the number of rewritten expressions
    pub fn fold(mut self, block: &mut Block) -> usize {
        self.visit_block_mut(block);
        self.folded
    }
}

impl VisitorMut for ConstantFolder {
    fn visit_expression_mut(&mut self, expr: &mut Expression) {
        walk_expression_mut(self, expr);

        let replacement = match expr {
            Expression::Unary {
                op: UnaryOp::Length,
                operand,
            } => match operand.as_ref() {
                Expression::Table(fields) if fields.iter().all(is_constant_entry) => {
                    Some(Expression::Number(fields.len() as f64))
                }
                _ => None,
            },
            Expression::Unary {
                op: UnaryOp::Negate,
                operand,
            } => operand.as_number().map(|n| Expression::Number(-n)),
            Expression::Binary { op, left, right } if op.is_comparison() => {
                if left.as_number().is_some() && right.as_number().is_none() {
                    *op = op.mirrored();
                    std::mem::swap(left, right);
                    self.folded += 1;
                }
                None
            }
            _ => None,
        };

        if let Some(replacement) = replacement {
            *expr = replacement;
            self.folded += 1;
        }
    }
}

fn is_constant_entry(field: &TableField) -> bool {
    matches!(field, TableField::Positional(value) if value.is_literal() && *value != Expression::Nil)
}

pub fn fold_constants(block: &mut Block) -> usize {
    ConstantFolder::new().fold(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::{parse, print_block};

    fn fold(source: &str) -> String {
        let mut block = parse(source).unwrap();
        fold_constants(&mut block);
        print_block(&block)
    }

    #[test]
    fn test_table_length() {
        assert_eq!(fold("x = #{1, 'a', true}"), "x = 3\n");
        assert_eq!(fold("x = #{1, nil}"), "x = #{1, nil}\n");
        assert_eq!(fold("x = #{a = 1}"), "x = #{a = 1}\n");
        assert_eq!(fold("x = #{y}"), "x = #{y}\n");
    }

    #[test]
    fn test_negation() {
        let mut block = parse("x = -5").unwrap();
        assert_eq!(fold_constants(&mut block), 1);
        assert_eq!(print_block(&block), "x = -5\n");
        assert!(matches!(
            &block.statements[0],
            crate::lua::Statement::Assign { values, .. } if values[0] == Expression::Number(-5.0)
        ));
    }

    #[test]
    fn test_comparison_normalization() {
        assert_eq!(fold("if 1 < x then end"), "if x > 1 then\nend\n");
        assert_eq!(fold("if 3 >= x then end"), "if x <= 3 then\nend\n");
        assert_eq!(fold("if 2 == x then end"), "if x == 2 then\nend\n");
        assert_eq!(fold("if 1 < 2 then end"), "if 1 < 2 then\nend\n");
        assert_eq!(fold("x = 1 - y"), "x = 1 - y\n");
    }

    #[test]
    fn test_folds_bottom_up() {
        assert_eq!(fold("if -1 ~= s then end"), "if s ~= -1 then\nend\n");
    }
}
