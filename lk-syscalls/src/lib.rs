//! System call multiplexer
//!
//! Every process carries an [`AbiTag`](lk_api::AbiTag). A trap hands the
//! multiplexer that tag, a raw number and six argument words; the
//! multiplexer picks the tag's [`SyscallTable`] out of the [`AbiRegistry`],
//! bounds-checks the number and calls the handler in that slot.
//!
//! # Architecture
//!
//! - **Core**: tables, the registry, the dispatcher and its diagnostics
//! - **Path**: DOS drive mapping and DOS/POSIX path translation
//! - **ABI**: one module per binary ecosystem, each exposing `build_table()`
//!
//! # Usage
//!
//! ```rust
//! use lk_api::{AbiTag, SyscallArgs};
//! use lk_syscalls::{AbiRegistry, SyscallTable, Caller};
//!
//! fn answer(_: &Caller<'_>, _: SyscallArgs) -> i32 {
//!     42
//! }
//!
//! let table = SyscallTable::builder(8)
//!     .handler(3, "answer", answer)
//!     .build()
//!     .unwrap();
//! let registry = AbiRegistry::new();
//! registry.register(AbiTag::Native, table).unwrap();
//! registry.initialize();
//! assert!(registry.lookup(AbiTag::Native).is_some());
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[macro_use]
pub mod logging;

pub mod abi;
pub mod core;
pub mod path;

pub use crate::core::dispatcher::{DispatchStats, Multiplexer};
pub use crate::core::env::{Caller, SyscallEnv};
pub use crate::core::error::{DispatchError, DispatchEvent};
pub use crate::core::logger::{LogSink, NullLogger, RingLogger};
pub use crate::core::registry::AbiRegistry;
pub use crate::core::table::{CleanupFn, SyscallHandler, SyscallTable, SyscallTableBuilder};
pub use crate::core::traits::SyscallLogger;
pub use crate::path::{dos_to_posix, is_valid_dos_path, posix_to_dos, DriveMap, MAX_DOS_PATH};
