//! Multi-ABI kernel core
//!
//! This crate wires the system call multiplexer into a kernel: it owns the
//! process table, decodes traps, routes executables to their loaders and
//! boots the whole thing from a command line.
//!
//! # Architecture
//!
//! - **Trap** (`trap`): i386 register frame, per-ABI register conventions
//!   and the `lk_trap_entry` gateway
//! - **Process** (`process`): PID pool and the descriptor arena
//! - **Loader** (`loader`): executable classification and loader routing
//! - **Kernel** (`kernel`): the `Kernel` context built at boot
//! - **Config / Log**: boot command line and the console logger
//!
//! # Usage
//!
//! ```no_run
//! use lk_kernel::{KernelConfig, TrapFrame};
//!
//! let config = KernelConfig::parse("loglevel=debug drive.d=/cdrom").unwrap();
//! assert_eq!(config.nproc, 64);
//! let _frame = TrapFrame::default();
//! ```
//!
//! # Features
//!
//! - `baremetal`: real `cli`/`sti` and an unmangled `lk_trap_entry`
//! - `std`: build the dependencies with `std`

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod kernel;
pub mod loader;
pub mod log;
pub mod process;
pub mod trap;

pub use crate::config::KernelConfig;
pub use crate::kernel::{install, kernel, start, Kernel, Platform};
pub use crate::loader::{detect, detect_image, ExecOutcome, ImageLoader, LoadedImage, LoaderRouter};
pub use crate::log::KernelLogger;
pub use crate::process::{PidPool, ProcessDescriptor, ProcessSpec, ProcessSummary, ProcessTable};
pub use crate::trap::{handle_trap, lk_trap_entry, RegisterConvention, TrapFrame};
