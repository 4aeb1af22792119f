// Tue Jan 13 2026 - Alex

use std::collections::HashMap;

/// One field group of a packed prototype record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtoStep {
    Instructions,
    Constants,
    Functions,
    NumParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    Boolean,
    Number,
    String,
}

/// Container layout recovered from the loader script
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BytecodeFormat {
    /// Field order of every prototype record
    pub steps: Vec<ProtoStep>,
    /// Constant type tag byte -> kind
    pub constant_tags: HashMap<u8, ConstantKind>,
    /// Shift applied to marked string constants
    pub constant_key: i64,
}

impl BytecodeFormat {
    pub fn new(steps: Vec<ProtoStep>) -> Self {
        Self {
            steps,
            constant_tags: HashMap::new(),
            constant_key: 0,
        }
    }

    pub fn with_constant_tag(mut self, tag: u8, kind: ConstantKind) -> Self {
        self.constant_tags.insert(tag, kind);
        self
    }

    pub fn with_constant_key(mut self, key: i64) -> Self {
        self.constant_key = key;
        self
    }

    pub fn constant_kind(&self, tag: u8) -> Option<ConstantKind> {
        self.constant_tags.get(&tag).copied()
    }
}
