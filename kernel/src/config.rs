//! Boot command line configuration
//!
//! The bootloader passes a whitespace-separated list of `key=value` tokens.
//! Unknown keys are logged and skipped; a known key with a bad value fails
//! the parse.

use alloc::format;
use alloc::string::ToString;

use lk_api::{Error, Pid, Result};
use lk_syscalls::DriveMap;
use log::LevelFilter;

/// Largest process table the kernel accepts
pub const MAX_NPROC: usize = 1024;

pub const DEFAULT_NPROC: usize = 64;
pub const DEFAULT_MAX_PID: Pid = 65535;
pub const DEFAULT_RING: usize = 64;

/// Settings fixed at boot
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    pub log_level: LevelFilter,
    /// Trace every completed dispatch
    pub sci_trace: bool,
    pub drives: DriveMap,
    /// Process table capacity
    pub nproc: usize,
    /// Largest PID handed out before reaped PIDs are recycled
    pub max_pid: Pid,
    /// Events kept by the in-memory dispatch log
    pub ring: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            sci_trace: false,
            drives: DriveMap::new(),
            nproc: DEFAULT_NPROC,
            max_pid: DEFAULT_MAX_PID,
            ring: DEFAULT_RING,
        }
    }
}

fn bad_value(key: &str, value: &str) -> Error {
    Error::ConfigError(format!("bad value {:?} for {}", value, key))
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    Some(match value.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return None,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "on" | "true" => Some(true),
        "0" | "off" | "false" => Some(false),
        _ => None,
    }
}

impl KernelConfig {
    /// Parses a boot command line on top of the defaults
    pub fn parse(cmdline: &str) -> Result<Self> {
        let mut config = Self::default();
        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                log::warn!("config: ignoring bare token {:?}", token);
                continue;
            };
            config.apply(key, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies one `key=value` setting
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "loglevel" => {
                self.log_level = parse_level(value).ok_or_else(|| bad_value(key, value))?;
            }
            "sci.trace" => {
                self.sci_trace = parse_bool(value).ok_or_else(|| bad_value(key, value))?;
            }
            "nproc" => {
                self.nproc = value.parse().map_err(|_| bad_value(key, value))?;
            }
            "maxpid" => {
                self.max_pid = value.parse().map_err(|_| bad_value(key, value))?;
            }
            "ring" => {
                self.ring = value.parse().map_err(|_| bad_value(key, value))?;
            }
            _ => match key.strip_prefix("drive.") {
                Some(letter) => self.apply_drive(letter, value)?,
                None => log::warn!("config: unknown key {:?}", key),
            },
        }
        Ok(())
    }

    fn apply_drive(&mut self, letter: &str, root: &str) -> Result<()> {
        let mut chars = letter.chars();
        let (Some(l), None) = (chars.next(), chars.next()) else {
            return Err(Error::ConfigError(format!("bad drive letter {:?}", letter)));
        };
        self.drives
            .set(l, root)
            .map_err(|e| Error::ConfigError(format!("drive.{}: {}", letter, e)))
    }

    /// Checks cross-field limits; `parse` runs this for you
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_NPROC).contains(&self.nproc) {
            return Err(Error::ConfigError(format!(
                "nproc must be within 1..={}",
                MAX_NPROC
            )));
        }
        if (self.max_pid as usize) < self.nproc {
            return Err(Error::ConfigError("maxpid is smaller than nproc".to_string()));
        }
        if self.ring == 0 {
            return Err(Error::ConfigError("ring must be at least 1".to_string()));
        }
        Ok(())
    }
}
