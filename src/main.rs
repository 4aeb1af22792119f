// Tue Jan 13 2026 - Alex

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use lua_devirt::{serialize, utils::init_logger, Config, Deobfuscator, Function, PseudocodeGenerator};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Devirtualizer for MoonSec V3 protected Lua scripts", long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["bytecode", "pseudocode"])))]
struct Args {
    /// Write a Lua 5.1 bytecode chunk
    #[arg(long)]
    bytecode: bool,

    /// Write best-effort Lua pseudocode
    #[arg(long)]
    pseudocode: bool,

    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,

    /// JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    no_progress: bool,
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    println!("{}", "lua-devirt: MoonSec V3 devirtualizer".cyan().bold());
    println!("{}", "=".repeat(50).cyan());
    println!();

    if let Err(e) = run(&args) {
        eprintln!("{} {:#}", "[!]".red(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if !args.input.is_file() {
        bail!("Input file not found: {}", args.input.display());
    }

    let config = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => Config::default(),
    };

    let start_time = Instant::now();
    println!("{} Reading script: {}", "[*]".blue(), args.input.display());
    let bytes = fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    let source = String::from_utf8_lossy(&bytes);

    let spinner = if args.no_progress { None } else { Some(spinner()?) };
    let result = Deobfuscator::new(config.clone())
        .on_stage(|stage| {
            if let Some(pb) = &spinner {
                pb.set_message(format!("{}...", stage));
            }
        })
        .deobfuscate(&source);

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let function = result.context("Deobfuscation failed")?;
    print_summary(&function);

    if args.bytecode {
        let chunk = serialize(&function);
        fs::write(&args.output, &chunk).with_context(|| format!("Failed to write {}", args.output.display()))?;
        println!("{} Bytecode ({} bytes) saved to: {}", "[+]".green(), chunk.len(), args.output.display());
    } else {
        let source = PseudocodeGenerator::from_config(&config).generate(&function);
        fs::write(&args.output, source).with_context(|| format!("Failed to write {}", args.output.display()))?;
        println!("{} Pseudocode saved to: {}", "[+]".green(), args.output.display());
    }

    println!();
    println!(
        "{} Devirtualization complete in {:.2}s",
        "[+]".green(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Starting...");
    Ok(pb)
}

fn print_summary(function: &Function) {
    println!(
        "{} Recovered {} function(s), {} instruction(s)",
        "[+]".green(),
        function.function_count(),
        function.total_instructions()
    );

    let unresolved = function.unresolved_count();
    if unresolved > 0 {
        println!(
            "{} {} instruction(s) could not be identified, output for them is unreliable",
            "[!]".yellow(),
            unresolved
        );
    }
}
