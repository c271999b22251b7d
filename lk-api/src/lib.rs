//! Core types shared by every layer of the multi-ABI kernel core
//!
//! This crate holds the vocabulary the trap gateway, the process table, the
//! ABI registry and the per-ABI syscall tables use to talk to each other,
//! plus the interfaces of the collaborators that live outside the core.
//!
//! # Architecture
//!
//! - **Core**: `AbiTag`, `AbiFlags`, `AbiContext` and process state
//! - **Error**: the kernel `Error` enum and `Result`
//! - **Syscall**: the six-word argument block and the failure sentinel
//! - **Process**: process access and scheduler interfaces
//! - **Interfaces**: console, filesystem and user-memory collaborators
//!
//! # Usage
//!
//! ```rust
//! use lk_api::{AbiContext, AbiTag};
//!
//! let ctx = AbiContext::new(AbiTag::Linux);
//! assert_eq!(ctx.tag, AbiTag::Linux);
//! assert!(ctx.private.is_empty());
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod core;
pub mod error;
pub mod interfaces;
pub mod process;
pub mod syscall;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::core::context::{AbiContext, AbiPrivate};
pub use crate::core::types::*;
pub use crate::error::{Error, Result};
pub use crate::interfaces::{Console, FileHandle, FileSystem, OpenMode, UserMemory};
pub use crate::process::interface::{BlockReason, CurrentProcess, ProcessAccess, Scheduler};
pub use crate::syscall::types::{SyscallArgs, SyscallNumber, SYSCALL_FAILURE};
