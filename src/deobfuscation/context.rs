// Tue Jan 13 2026 - Alex

use crate::bytecode::{BytecodeFormat, ConstantKind, ProtoStep};
use crate::deobfuscation::error::{DeobfuscationError, Result};
use crate::lua::Expression;
use std::collections::HashMap;

/// Everything recovered from the loader script that later stages need.
///
/// Built once per run by the analyzer through [`ContextBuilder`], then
/// handed by value from stage to stage.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: BytecodeFormat,
    pub bytecode_key: i64,
    /// Original (synthetic) name -> role name
    pub identified_names: HashMap<String, String>,
    /// `x + f(...)` expressions in source order
    pub key_expressions: Vec<Expression>,
    pub bytecode_string: String,
    /// Pre-order ordinal of the VM wrapper among local functions
    pub wrapper: usize,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn constant_key(&self) -> i64 {
        self.format.constant_key
    }

    pub fn with_keys(mut self, constant_key: i64, bytecode_key: i64) -> Self {
        self.format.constant_key = constant_key;
        self.bytecode_key = bytecode_key;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    steps: Vec<ProtoStep>,
    constant_tags: HashMap<u8, ConstantKind>,
    identified_names: HashMap<String, String>,
    key_expressions: Vec<Expression>,
    bytecode_string: Option<String>,
    /// Payload carried over from an outer layer, never overwritten
    preset_payload: bool,
    wrapper: Option<usize>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder with a payload recovered from an outer layer
    pub fn with_payload(mut self, bytecode_string: impl Into<String>) -> Self {
        self.bytecode_string = Some(bytecode_string.into());
        self.preset_payload = true;
        self
    }

    pub fn has_payload(&self) -> bool {
        self.bytecode_string.is_some()
    }

    pub fn proto_step(&mut self, step: ProtoStep) {
        self.steps.push(step);
    }

    pub fn constant_tag(&mut self, tag: u8, kind: ConstantKind) {
        self.constant_tags.insert(tag, kind);
    }

    pub fn identify(&mut self, name: impl Into<String>, role: impl Into<String>) {
        self.identified_names.insert(name.into(), role.into());
    }

    pub fn key_expression(&mut self, expr: Expression) {
        self.key_expressions.push(expr);
    }

    /// Later payloads replace earlier ones unless one was preset
    pub fn bytecode_string(&mut self, payload: impl Into<String>) {
        if !self.preset_payload {
            self.bytecode_string = Some(payload.into());
        }
    }

    pub fn wrapper(&mut self, ordinal: usize) {
        self.wrapper = Some(ordinal);
    }

    pub fn role_of(&self, name: &str) -> Option<&str> {
        self.identified_names.get(name).map(String::as_str)
    }

    pub fn key_expression_count(&self) -> usize {
        self.key_expressions.len()
    }

    pub fn build(self) -> Result<Context> {
        if self.steps.is_empty() {
            return Err(DeobfuscationError::Missing("bytecode layout function"));
        }
        let wrapper = self.wrapper.ok_or(DeobfuscationError::Missing("VM wrapper function"))?;
        let bytecode_string = self
            .bytecode_string
            .ok_or(DeobfuscationError::Missing("bytecode payload"))?;
        if self.key_expressions.is_empty() {
            return Err(DeobfuscationError::Missing("bytecode key expression"));
        }

        let mut format = BytecodeFormat::new(self.steps);
        format.constant_tags = self.constant_tags;

        Ok(Context {
            format,
            bytecode_key: 0,
            identified_names: self.identified_names,
            key_expressions: self.key_expressions,
            bytecode_string,
            wrapper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ContextBuilder {
        let mut builder = ContextBuilder::new();
        builder.proto_step(ProtoStep::Instructions);
        builder.wrapper(11);
        builder.key_expression(Expression::Number(1.0));
        builder
    }

    #[test]
    fn test_build_requires_every_part() {
        assert!(matches!(
            ContextBuilder::new().build(),
            Err(DeobfuscationError::Missing(_))
        ));
        assert!(matches!(complete().build(), Err(DeobfuscationError::Missing("bytecode payload"))));

        let mut builder = complete();
        builder.bytecode_string("abc");
        builder.constant_tag(7, ConstantKind::String);
        let ctx = builder.build().unwrap();
        assert_eq!(ctx.bytecode_string, "abc");
        assert_eq!(ctx.wrapper, 11);
        assert_eq!(ctx.format.constant_kind(7), Some(ConstantKind::String));
    }

    #[test]
    fn test_last_payload_wins_unless_preset() {
        let mut builder = complete();
        builder.bytecode_string("first");
        builder.bytecode_string("second");
        assert_eq!(builder.build().unwrap().bytecode_string, "second");

        let mut builder = ContextBuilder::new().with_payload("outer");
        assert!(builder.has_payload());
        builder.proto_step(ProtoStep::Instructions);
        builder.wrapper(11);
        builder.key_expression(Expression::Number(1.0));
        builder.bytecode_string("inner");
        assert_eq!(builder.build().unwrap().bytecode_string, "outer");
    }

    #[test]
    fn test_with_keys() {
        let mut builder = complete();
        builder.bytecode_string("x");
        let ctx = builder.build().unwrap().with_keys(3, 9);
        assert_eq!(ctx.constant_key(), 3);
        assert_eq!(ctx.bytecode_key, 9);
    }
}
