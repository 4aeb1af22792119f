// Tue Jan 13 2026 - Alex

pub mod analyzer;
pub mod context;
pub mod devirtualizer;
pub mod error;
pub mod fingerprint;
pub mod flow;
pub mod folder;
pub mod matcher;
pub mod pipeline;
pub mod renamer;
pub mod rewriter;
pub mod solver;
pub mod strings;

pub use analyzer::{find_dispatch_tree, with_local_function, Analyzer, STATE_ROLE};
pub use context::{Context, ContextBuilder};
pub use devirtualizer::{create_handler_mapping, Devirtualizer, Handler, HandlerMapping, DEFAULT_ENTRY_MARKER};
pub use error::{DeobfuscationError, SolverError};
pub use fingerprint::{fingerprint, handler_windows, FingerprintGenerator, OpTag};
pub use flow::ControlFlowSolver;
pub use folder::{fold_constants, ConstantFolder};
pub use matcher::{Correction, FingerprintTable, Resolution};
pub use pipeline::Deobfuscator;
pub use renamer::Renamer;
pub use rewriter::HandlerRewriter;
pub use solver::{RangeGraph, RangeTreeSolver};
pub use strings::{decode_string_constants, ConstantReplacer, StringCollector};
