// Tue Jan 13 2026 - Alex

use crate::deobfuscation::renamer::is_synthetic;
use crate::lua::visit::{walk_block_mut, walk_expression_mut, walk_statement_mut, VisitorMut};
use crate::lua::{Block, Expression, Statement, SymbolInfo, SymbolTable};

pub const DEFAULT_MAX_PASSES: usize = 64;

/// Normalizes a handler window so equivalent handlers produce the same
/// fingerprint: single-use synthetic locals are inlined into their use
/// site, first writes become local declarations and declarations nobody
/// reads are dropped. Runs post-order passes until nothing changes.
#[derive(Debug, Clone)]
pub struct HandlerRewriter {
    max_passes: usize,
}

impl HandlerRewriter {
    pub fn new() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Rewrites in place and returns the number of passes that changed something
    pub fn rewrite(&self, block: &mut Block) -> usize {
        for pass in 0..self.max_passes {
            let symbols = SymbolTable::collect(block);
            let mut rewrite = RewritePass {
                symbols: &symbols,
                ordinal: 0,
                changes: 0,
            };
            rewrite.visit_block_mut(block);

            if rewrite.changes == 0 {
                return pass;
            }
        }

        log::debug!("Handler simplification stopped after {} passes", self.max_passes);
        self.max_passes
    }
}

impl Default for HandlerRewriter {
    fn default() -> Self {
        Self::new()
    }
}

struct RewritePass<'a> {
    symbols: &'a SymbolTable,
    ordinal: usize,
    changes: usize,
}

impl RewritePass<'_> {
    fn synthetic(&self, expr: &Expression) -> Option<&SymbolInfo> {
        match expr {
            Expression::Name(name) if is_synthetic(name) => self.symbols.get(name),
            _ => None,
        }
    }

    /// Alias of another name
    fn name_value(&self, expr: &Expression) -> Option<Expression> {
        let info = self.synthetic(expr)?;
        match &info.value {
            Some(value @ Expression::Name(_)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Single-use alias of `a[b]`
    fn element_value(&self, expr: &Expression) -> Option<Expression> {
        let info = self.synthetic(expr)?;
        match &info.value {
            Some(value @ Expression::Index { table, key })
                if info.reads == 1 && table.as_name().is_some() && key.as_name().is_some() =>
            {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Single-use, never reassigned alias of a binary expression
    fn binary_value(&self, expr: &Expression) -> Option<Expression> {
        let info = self.synthetic(expr)?;
        match &info.value {
            Some(value @ Expression::Binary { .. }) if info.reads == 1 && info.assignments == 0 => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    fn replace_each<F>(&mut self, exprs: &mut [&mut Expression], lookup: F) -> bool
    where
        F: Fn(&Self, &Expression) -> Option<Expression>,
    {
        let replacements: Vec<Option<Expression>> = exprs.iter().map(|e| lookup(&*self, &**e)).collect();
        let mut changed = false;
        for (expr, replacement) in exprs.iter_mut().zip(replacements) {
            if let Some(replacement) = replacement {
                **expr = replacement;
                changed = true;
            }
        }
        if changed {
            self.changes += 1;
        }
        changed
    }

    fn is_unused_declaration(&self, stmt: &Statement) -> bool {
        match stmt {
            Statement::Local { names, values } => {
                values.is_empty() || names.iter().all(|name| self.symbols.reads(name) == 0)
            }
            _ => false,
        }
    }

    fn should_localize(&self, targets: &[Expression], ordinal: usize) -> bool {
        targets.iter().all(|target| match target {
            Expression::Name(name) if is_synthetic(name) => {
                self.symbols.get(name).and_then(|info| info.declaration) == Some(ordinal)
            }
            _ => false,
        })
    }

    fn rewrite_assign(&mut self, stmt: &mut Statement, ordinal: usize) {
        let Statement::Assign { targets, values } = stmt else {
            return;
        };

        if self.should_localize(targets, ordinal) {
            let names = targets
                .iter()
                .filter_map(|t| t.as_name().map(str::to_string))
                .collect();
            let values = std::mem::take(values);
            *stmt = Statement::Local { names, values };
            self.changes += 1;
            return;
        }

        match (targets.as_slice(), values.as_mut_slice()) {
            ([Expression::Index { .. }], [value @ Expression::Name(_)]) => {
                self.replace_each(&mut [value], Self::element_value);
            }
            ([Expression::Name(_)], [value @ Expression::Name(_)]) => {
                self.replace_each(&mut [value], Self::binary_value);
            }
            _ => {}
        }
    }
}

impl VisitorMut for RewritePass<'_> {
    fn visit_block_mut(&mut self, block: &mut Block) {
        walk_block_mut(self, block);

        let before = block.statements.len();
        block.statements.retain(|stmt| !self.is_unused_declaration(stmt));
        if block.statements.len() != before {
            self.changes += 1;
        }
    }

    fn visit_statement_mut(&mut self, stmt: &mut Statement) {
        let ordinal = self.ordinal;
        self.ordinal += 1;

        walk_statement_mut(self, stmt);

        if matches!(stmt, Statement::Assign { .. }) {
            self.rewrite_assign(stmt, ordinal);
        }
    }

    fn visit_expression_mut(&mut self, expr: &mut Expression) {
        walk_expression_mut(self, expr);

        match expr {
            Expression::Call { function, args } if function.is_name("stk") => {
                if let [first @ Expression::Name(_), second @ Expression::Name(_)] = args.as_mut_slice() {
                    self.replace_each(&mut [first, second], Self::element_value);
                }
            }
            Expression::Index { table, key } => {
                if !self.replace_each(&mut [&mut **table, &mut **key], Self::name_value) {
                    self.replace_each(&mut [&mut **key], Self::element_value);
                }
            }
            Expression::Binary { left, right, .. } => {
                if !self.replace_each(&mut [&mut **left, &mut **right], Self::element_value) {
                    self.replace_each(&mut [&mut **left, &mut **right], Self::name_value);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deobfuscation::fingerprint::fingerprint;
    use crate::lua::{parse, print_block};

    fn simplify(source: &str) -> String {
        let mut block = parse(source).unwrap();
        HandlerRewriter::new().rewrite(&mut block);
        print_block(&block)
    }

    #[test]
    fn test_inlines_element_aliases() {
        let out = simplify("local _L1 = inst[_L9]\nlocal _L2 = stk[_L1]\nstk[inst[_L8]] = _L2");
        assert_eq!(out, "stk[inst[_L8]] = stk[inst[_L9]]\n");
        assert_eq!(fingerprint(&parse(&out).unwrap()), "91909190");
    }

    #[test]
    fn test_inlines_binary_alias() {
        assert_eq!(simplify("local _L1 = _L5 + _L6\ntop = _L1"), "top = _L5 + _L6\n");
        // first writes are localized instead
        assert_eq!(
            simplify("local _L1 = _L5 + _L6\n_L7 = _L1\nf(_L7)"),
            "local _L1 = _L5 + _L6\nlocal _L7 = _L1\nf(_L7)\n"
        );
    }

    #[test]
    fn test_name_alias_in_index() {
        let out = simplify("local _L1 = stk\nlocal _L2 = _L1[x]\ng(_L2, _L2)");
        assert_eq!(out, "local _L2 = stk[x]\ng(_L2, _L2)\n");
    }

    #[test]
    fn test_stk_call_arguments() {
        let out = simplify("local _L1 = inst[_L3]\nlocal _L2 = inst[_L4]\nstk(_L1, _L2)");
        assert_eq!(out, "stk(inst[_L3], inst[_L4])\n");
    }

    #[test]
    fn test_removes_unread_declarations() {
        assert_eq!(simplify("local _L1\nlocal _L2 = 5\nf()"), "f()\n");
        assert_eq!(simplify("local _L1 = 5\nf(_L1)"), "local _L1 = 5\nf(_L1)\n");
    }

    #[test]
    fn test_leaves_role_names_alone() {
        let source = "pc = inst[_L1]\n";
        assert_eq!(simplify(source), source);
    }

    #[test]
    fn test_reports_passes() {
        let mut block = parse("f()").unwrap();
        assert_eq!(HandlerRewriter::new().rewrite(&mut block), 0);

        let mut block = parse("local _L1 = 1\nf()").unwrap();
        assert_eq!(HandlerRewriter::new().with_max_passes(1).rewrite(&mut block), 1);
    }
}
