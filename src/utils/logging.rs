// Tue Jan 13 2026 - Alex

use colored::*;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::time::Instant;

const CRATE_TARGET: &str = "lua_devirt::";

pub struct LoggingUtils;

impl LoggingUtils {
    pub fn init_logger(level: LevelFilter) {
        let logger = Box::new(ColoredLogger::new(level));
        // a second init (tests, embedding) keeps the first logger
        if log::set_boxed_logger(logger).is_ok() {
            log::set_max_level(level);
        }
    }

    pub fn level_from_verbosity(verbose: bool) -> LevelFilter {
        if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

/// Colored stderr logger, one line per record: `LEVEL [module] message`
pub struct ColoredLogger {
    level: LevelFilter,
    use_color: bool,
}

impl ColoredLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            use_color: colored::control::SHOULD_COLORIZE.should_colorize(),
        }
    }

    fn format_level(&self, level: Level) -> String {
        if !self.use_color {
            return format!("{:5}", level);
        }
        match level {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => "WARN ".yellow().bold(),
            Level::Info => "INFO ".green().bold(),
            Level::Debug => "DEBUG".blue().bold(),
            Level::Trace => "TRACE".magenta().bold(),
        }
        .to_string()
    }

    /// `lua_devirt::deobfuscation::matcher` -> `deobfuscation::matcher`
    fn short_target<'a>(&self, target: &'a str) -> &'a str {
        target.strip_prefix(CRATE_TARGET).unwrap_or(target)
    }

    fn format(&self, record: &Record) -> String {
        let target = self.short_target(record.target());
        if target.is_empty() {
            return format!("{} {}", self.format_level(record.level()), record.args());
        }

        let target = format!("[{}]", target);
        let target = if self.use_color {
            target.dimmed().to_string()
        } else {
            target
        };
        format!("{} {} {}", self.format_level(record.level()), target, record.args())
    }
}

impl Log for ColoredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", self.format(record));
        }
    }

    fn flush(&self) {}
}

/// Logs how long a pipeline stage took when dropped
pub struct ScopedTimer {
    name: String,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(name: &str) -> Self {
        log::debug!("[TIMER] {} started", name);
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        log::debug!("[TIMER] {} took {:.2}ms", self.name, elapsed.as_secs_f64() * 1000.0);
    }
}

pub fn init_logger(verbose: bool) {
    LoggingUtils::init_logger(LoggingUtils::level_from_verbosity(verbose));
}

/// `RUST_LOG` driven alternative to [`init_logger`]
pub fn init_from_env() {
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(level: LevelFilter) -> ColoredLogger {
        ColoredLogger {
            level,
            use_color: false,
        }
    }

    #[test]
    fn test_level_filtering() {
        let logger = plain(LevelFilter::Info);
        let warn = Metadata::builder().level(Level::Warn).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&debug));
        assert_eq!(LoggingUtils::level_from_verbosity(true), LevelFilter::Debug);
    }

    #[test]
    fn test_plain_format_strips_crate_prefix() {
        let logger = plain(LevelFilter::Trace);
        let line = logger.format(
            &Record::builder()
                .level(Level::Warn)
                .target("lua_devirt::deobfuscation::matcher")
                .args(format_args!("unknown handler"))
                .build(),
        );
        assert_eq!(line, "WARN  [deobfuscation::matcher] unknown handler");
    }
}
