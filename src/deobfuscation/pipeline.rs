// Tue Jan 13 2026 - Alex

use crate::bytecode::{Constant, Deserializer, Function};
use crate::config::Config;
use crate::deobfuscation::analyzer::{find_dispatch_tree, with_local_function, Analyzer, STATE_ROLE};
use crate::deobfuscation::context::{Context, ContextBuilder};
use crate::deobfuscation::devirtualizer::{create_handler_mapping, Devirtualizer};
use crate::deobfuscation::error::{DeobfuscationError, Result};
use crate::deobfuscation::flow::ControlFlowSolver;
use crate::deobfuscation::folder::fold_constants;
use crate::deobfuscation::matcher::FingerprintTable;
use crate::deobfuscation::renamer::Renamer;
use crate::deobfuscation::rewriter::HandlerRewriter;
use crate::deobfuscation::strings::{decode_string_constants, ConstantReplacer};
use crate::lua::{expression_to_string, parse, Block, Expression, LiteralEvaluator, Statement};
use crate::transport::decode;
use crate::utils::logging::ScopedTimer;

/// Root statements past which the script is treated as an anti-tamper shell
const ANTI_TAMPER_STATEMENTS: usize = 3;
const ANTI_TAMPER_PAYLOAD: usize = 2;
const ANTI_TAMPER_SCRIPT: usize = 3;

type StageObserver<'t> = Box<dyn Fn(&str) + 't>;

/// Drives a whole run: loader script in, devirtualized function tree out
pub struct Deobfuscator<'t> {
    config: Config,
    table: &'t FingerprintTable,
    observer: Option<StageObserver<'t>>,
}

impl Deobfuscator<'static> {
    pub fn new(config: Config) -> Self {
        Self::with_table(config, FingerprintTable::standard())
    }
}

impl<'t> Deobfuscator<'t> {
    pub fn with_table(config: Config, table: &'t FingerprintTable) -> Self {
        Self {
            config,
            table,
            observer: None,
        }
    }

    /// Called with a short label as each stage starts
    pub fn on_stage<'o>(self, observer: impl Fn(&str) + 'o) -> Deobfuscator<'o>
    where
        't: 'o,
    {
        Deobfuscator {
            config: self.config,
            table: self.table,
            observer: Some(Box::new(observer)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn deobfuscate(&self, source: &str) -> Result<Function> {
        self.run(source, ContextBuilder::new(), false)
    }

    fn stage(&self, label: &str) -> ScopedTimer {
        if let Some(observer) = &self.observer {
            observer(label);
        }
        ScopedTimer::new(label)
    }

    fn run(&self, source: &str, builder: ContextBuilder, retried: bool) -> Result<Function> {
        let (mut root, ctx) = {
            let _timer = self.stage("Analyzing script");
            let mut root = parse(source)?;
            self.normalize(&mut root);
            let ctx = Analyzer::new(builder).analyze(&root)?;
            (root, ctx)
        };

        if !retried && self.config.anti_tamper && root.statements.len() > ANTI_TAMPER_STATEMENTS {
            let _timer = self.stage("Unwrapping anti-tamper layer");
            let (payload, script) = self.unwrap_anti_tamper(&root, ctx)?;
            log::info!("Anti-tamper layer found, retrying against the inner script");
            return self.run(&script, ContextBuilder::new().with_payload(payload), true);
        }

        let ctx = solve_keys(ctx)?;
        log::debug!("Keys: constant {}, bytecode {}", ctx.constant_key(), ctx.bytecode_key);

        let tree = {
            let _timer = self.stage("Solving control flow");
            let solved = with_local_function(&mut root, ctx.wrapper, |f| ControlFlowSolver::new().solve(&mut f.body))
                .ok_or(DeobfuscationError::Missing("VM wrapper function"))??;
            log::debug!("Removed {} state machine(s) from the VM wrapper", solved);

            Renamer::with_names(ctx.identified_names.clone()).rename(&mut root);
            with_local_function(&mut root, ctx.wrapper, |f| find_dispatch_tree(&f.body, STATE_ROLE))
                .flatten()
                .ok_or(DeobfuscationError::Missing("VM dispatch tree"))?
        };

        let function = {
            let _timer = self.stage("Deserializing bytecode");
            deserialize(&ctx)?
        };
        log::info!(
            "Deserialized {} prototype(s), {} instruction(s)",
            function.function_count(),
            function.total_instructions()
        );

        let _timer = self.stage("Devirtualizing");
        let rewriter = HandlerRewriter::new().with_max_passes(self.config.max_rewrite_passes);
        let mapping = create_handler_mapping(&tree, &rewriter)?;
        log::info!("Mapped {} opcode handler(s)", mapping.len());

        Devirtualizer::new(mapping, self.table)
            .with_entry_marker(self.config.entry_marker.as_str())
            .devirtualize(function)
    }

    /// Renaming, string table inlining and folding shared by both layers
    fn normalize(&self, root: &mut Block) {
        let declared = Renamer::new().rename(root);
        let constants = decode_string_constants(root);
        let replaced = ConstantReplacer::new(&constants).replace(root);
        let folded = fold_constants(root);
        log::debug!(
            "Renamed {} locals, inlined {} of {} table constants, folded {} expressions",
            declared,
            replaced,
            constants.len(),
            folded
        );
    }

    /// Recovers the inner payload and script of an anti-tamper shell
    fn unwrap_anti_tamper(&self, root: &Block, ctx: Context) -> Result<(String, String)> {
        let ctx = solve_keys(ctx)?;
        let outer = deserialize(&ctx)?;

        let candidates: Vec<_> = outer
            .instructions
            .iter()
            .filter(|i| !i.is_ka() && i.is_kb() && !i.is_kc())
            .collect();
        let carrier = candidates
            .len()
            .checked_sub(2)
            .and_then(|index| candidates.get(index))
            .ok_or_else(|| {
                DeobfuscationError::UnsupportedVariant(format!(
                    "anti-tamper layer has {} constant-B instruction(s), expected at least 2",
                    candidates.len()
                ))
            })?;
        let key = outer
            .constant(carrier.b - 1)
            .and_then(Constant::as_number)
            .ok_or_else(|| {
                DeobfuscationError::UnsupportedVariant(format!(
                    "anti-tamper key constant {} is not a number",
                    carrier.b - 1
                ))
            })?;

        let payload = string_assignment(root, ANTI_TAMPER_PAYLOAD)?;
        let script = string_assignment(root, ANTI_TAMPER_SCRIPT)?;
        let script = decode(&script, key.round() as i64)?;
        Ok((payload, String::from_utf8_lossy(&script).into_owned()))
    }
}

/// The last key expression decodes the payload; with exactly two, the
/// first decodes string constants
fn solve_keys(ctx: Context) -> Result<Context> {
    let evaluator = LiteralEvaluator::new();
    let evaluate = |expr: &Expression| -> Result<i64> {
        let value = evaluator.evaluate_source(&format!("return {}", expression_to_string(expr)))?;
        Ok(value.round() as i64)
    };

    let bytecode_key = ctx
        .key_expressions
        .last()
        .ok_or(DeobfuscationError::Missing("bytecode key expression"))
        .and_then(|expr| evaluate(expr))?;

    let constant_key = match ctx.key_expressions.as_slice() {
        [constant, _] => evaluate(constant)?,
        expressions => {
            log::debug!("{} key expressions, constant key left at default", expressions.len());
            ctx.constant_key()
        }
    };

    Ok(ctx.with_keys(constant_key, bytecode_key))
}

fn deserialize(ctx: &Context) -> Result<Function> {
    let data = decode(&ctx.bytecode_string, ctx.bytecode_key)?;
    Ok(Deserializer::new(&data, &ctx.format).deserialize()?)
}

fn string_assignment(root: &Block, index: usize) -> Result<String> {
    let value = match root.statements.get(index) {
        Some(Statement::Assign { values, .. }) | Some(Statement::Local { values, .. }) => values.first(),
        _ => None,
    };
    match value {
        Some(Expression::String(literal)) => Ok(literal.raw.clone()),
        _ => Err(DeobfuscationError::UnsupportedVariant(format!(
            "anti-tamper statement {} is not a string assignment",
            index + 1
        ))),
    }
}
