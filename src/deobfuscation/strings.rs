// Tue Jan 13 2026 - Alex

use crate::deobfuscation::error::Result;
use crate::lua::visit::{walk_expression, walk_expression_mut, Visitor, VisitorMut};
use crate::lua::{Block, Expression, StringDelimiter};
use crate::transport::{decode, decode_constants, decode_escape, ConstantTable};

const ESCAPED_TABLE_PREFIX: &str = "\\4\\8";

/// An encoded constant-table string found in the script
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedTable {
    /// `f(key, "...")`: substitution encoded with a numeric key
    Keyed(i64, String),
    /// `"\4\8..."`: plain decimal escapes
    Escaped(String),
}

impl EncodedTable {
    pub fn decode(&self) -> Result<ConstantTable> {
        let bytes = match self {
            EncodedTable::Keyed(key, data) => decode(data, *key)?,
            EncodedTable::Escaped(data) => decode_escape(data)?,
        };
        Ok(decode_constants(&bytes)?)
    }
}

/// Finds every encoded constant table in source order
#[derive(Debug, Default)]
pub struct StringCollector {
    found: Vec<EncodedTable>,
}

impl StringCollector {
    pub fn collect(block: &Block) -> Vec<EncodedTable> {
        let mut collector = Self::default();
        collector.visit_block(block);
        collector.found
    }
}

impl Visitor for StringCollector {
    fn visit_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Call { args, .. } => {
                if let [Expression::Number(key), Expression::String(data)] = args.as_slice() {
                    self.found.push(EncodedTable::Keyed(*key as i64, data.raw.clone()));
                }
            }
            Expression::String(literal)
                if !matches!(literal.delimiter, StringDelimiter::Long(_))
                    && literal.raw.starts_with(ESCAPED_TABLE_PREFIX) =>
            {
                self.found.push(EncodedTable::Escaped(literal.raw.clone()));
            }
            _ => {}
        }
        walk_expression(self, expr);
    }
}

/// Decodes and merges every constant table in the script. Candidates
/// that fail to decode are ordinary calls and get skipped.
pub fn decode_string_constants(block: &Block) -> ConstantTable {
    let mut merged = ConstantTable::new();
    for table in StringCollector::collect(block) {
        match table.decode() {
            Ok(decoded) => {
                log::debug!("Decoded constant table with {} entries", decoded.len());
                merged.extend(decoded);
            }
            Err(e) => log::debug!("Skipping constant table candidate: {}", e),
        }
    }
    merged
}

/// Replaces `obj.KEY` lookups into the decoded constant table with the
/// number or dotted global path they stand for
pub struct ConstantReplacer<'a> {
    constants: &'a ConstantTable,
    replaced: usize,
}

impl<'a> ConstantReplacer<'a> {
    pub fn new(constants: &'a ConstantTable) -> Self {
        Self { constants, replaced: 0 }
    }

    pub fn replace(mut self, block: &mut Block) -> usize {
        self.visit_block_mut(block);
        self.replaced
    }
}

impl VisitorMut for ConstantReplacer<'_> {
    fn visit_expression_mut(&mut self, expr: &mut Expression) {
        if let Expression::Member { key, .. } = expr {
            if let Some(replacement) = self.constants.get(key.as_str()).and_then(|v| replacement(v)) {
                *expr = replacement;
                self.replaced += 1;
            }
        }
        walk_expression_mut(self, expr);
    }
}

fn replacement(values: &[String]) -> Option<Expression> {
    let (first, rest) = values.split_first()?;
    if let Ok(number) = first.parse::<i32>() {
        return Some(Expression::Number(number as f64));
    }
    Some(
        rest.iter()
            .fold(Expression::name(first.as_str()), |acc, key| Expression::member(acc, key.as_str())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::{parse, print_block};
    use crate::transport::decoder::encode;

    fn table_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        // control 0: two strings
        data.extend_from_slice(&[0, 6]);
        data.extend_from_slice(b"string");
        data.push(4);
        data.extend_from_slice(b"char");
        data.extend_from_slice(b"AAAAAAAA");
        // control 2: one string
        data.extend_from_slice(&[2, 2]);
        data.extend_from_slice(b"42");
        data.extend_from_slice(b"BBBBBBBB");
        data.push(5);
        data
    }

    #[test]
    fn test_collects_both_encodings() {
        let escaped: String = [4u8, 8, 1].iter().map(|b| format!("\\{}", b)).collect();
        let source = format!("local t = f(3, \"abc\")\nlocal u = \"{}\"\nlocal v = \"\\4x\"", escaped);
        let found = StringCollector::collect(&parse(&source).unwrap());
        assert_eq!(
            found,
            vec![EncodedTable::Keyed(3, "abc".to_string()), EncodedTable::Escaped(escaped)]
        );
    }

    #[test]
    fn test_decode_and_replace() {
        let encoded = encode(&table_bytes(), 9, "ghijklmnopqrstuv");
        let source = format!(
            "local c = f(9, \"{}\")\nlocal x = c.AAAAAAAA(c.BBBBBBBB)\nlocal y = c.CCCCCCCC\n",
            encoded
        );
        let mut block = parse(&source).unwrap();

        let constants = decode_string_constants(&block);
        assert_eq!(constants.len(), 2);

        let replaced = ConstantReplacer::new(&constants).replace(&mut block);
        assert_eq!(replaced, 2);
        let printed = print_block(&block);
        assert!(printed.contains("local x = string.char(42)"));
        assert!(printed.contains("local y = c.CCCCCCCC"));
    }

    #[test]
    fn test_undecodable_candidates_are_skipped() {
        let block = parse("print(1, \"short\")").unwrap();
        assert!(decode_string_constants(&block).is_empty());
    }

    #[test]
    fn test_escaped_table() {
        let escaped: String = table_bytes().iter().map(|b| format!("\\{}", b)).collect();
        let table = EncodedTable::Escaped(escaped).decode().unwrap();
        assert_eq!(table["AAAAAAAA"], vec!["string".to_string(), "char".to_string()]);
    }
}
