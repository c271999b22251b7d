//! Console logger for the `log` facade

use alloc::sync::Arc;
use core::fmt::Write;
use core::sync::atomic::{AtomicUsize, Ordering};

use lk_api::error::invalid_state;
use lk_api::{Console, Result};
use log::{LevelFilter, Log, Metadata, Record};

/// Longest formatted record; longer ones are cut
pub const LINE_MAX: usize = 256;

const TRUNCATED: &str = "...\n";

/// Writes `[L target] message` lines to a [`Console`]
pub struct KernelLogger {
    console: Arc<dyn Console>,
    level: AtomicUsize,
}

fn level_to_usize(level: LevelFilter) -> usize {
    level as usize
}

fn usize_to_level(value: usize) -> LevelFilter {
    match value {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl KernelLogger {
    pub fn new(console: Arc<dyn Console>, level: LevelFilter) -> Self {
        Self {
            console,
            level: AtomicUsize::new(level_to_usize(level)),
        }
    }

    pub fn level(&self) -> LevelFilter {
        usize_to_level(self.level.load(Ordering::Relaxed))
    }

    /// Changes the threshold of this logger and of the facade
    pub fn set_level(&self, level: LevelFilter) {
        self.level.store(level_to_usize(level), Ordering::Relaxed);
        log::set_max_level(level);
    }

    /// Formats `record` into a fixed buffer, cutting it at [`LINE_MAX`]
    pub fn format(record: &Record<'_>) -> heapless::String<LINE_MAX> {
        let mut line = heapless::String::new();
        let tag = match record.level() {
            log::Level::Error => 'E',
            log::Level::Warn => 'W',
            log::Level::Info => 'I',
            log::Level::Debug => 'D',
            log::Level::Trace => 'T',
        };
        let mut out = Clipped {
            line: &mut line,
            cut: false,
        };
        let _ = write!(out, "[{} {}] {}\n", tag, record.target(), record.args());
        if out.cut {
            while line.len() > LINE_MAX - TRUNCATED.len() {
                line.pop();
            }
            let _ = line.push_str(TRUNCATED);
        }
        line
    }
}

/// Keeps whatever fits instead of dropping the whole chunk
struct Clipped<'a> {
    line: &'a mut heapless::String<LINE_MAX>,
    cut: bool,
}

impl Write for Clipped<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.line.push(c).is_err() {
                self.cut = true;
                return Err(core::fmt::Error);
            }
        }
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.console.write_str(&Self::format(record));
        }
    }

    fn flush(&self) {}
}

static LOGGER: spin::Once<KernelLogger> = spin::Once::new();

/// Installs the global logger on `console`.
///
/// Only the first call installs anything; later calls fail with
/// `InvalidState` but still apply `level`.
pub fn init(console: Arc<dyn Console>, level: LevelFilter) -> Result<&'static KernelLogger> {
    let mut fresh = false;
    let logger = LOGGER.call_once(|| {
        fresh = true;
        KernelLogger::new(console, level)
    });
    logger.set_level(level);
    if !fresh {
        return Err(invalid_state("kernel logger already installed"));
    }
    log::set_logger(logger)
        .map_err(|_| invalid_state("another logger is installed"))?;
    Ok(logger)
}

/// The installed logger, if any
pub fn logger() -> Option<&'static KernelLogger> {
    LOGGER.get()
}
