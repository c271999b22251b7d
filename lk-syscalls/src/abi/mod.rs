//! Per-ABI syscall tables
//!
//! Each submodule owns one binary ecosystem and exposes a single
//! `build_table()`; the rest of the kernel never calls into an ABI module
//! any other way.

use alloc::vec::Vec;

use lk_api::{AbiTag, Result};

use crate::core::table::SyscallTable;

pub mod dos;
pub mod linux;
pub mod native;

/// Largest user string a handler will copy in
pub(crate) const MAX_USER_STRING: usize = 4096;

/// Builds every table the kernel ships with, paired with its tag
pub fn builtin_tables() -> Result<Vec<(AbiTag, SyscallTable)>> {
    Ok(alloc::vec![
        (AbiTag::DosInterrupt, dos::int21::build_table()?),
        (AbiTag::DosSyscall, dos::kpi::build_table()?),
        (AbiTag::Linux, linux::build_table()?),
        (AbiTag::Native, native::build_table()?),
    ])
}

/// Table builder for `tag`
pub fn build_table(tag: AbiTag) -> Option<Result<SyscallTable>> {
    match tag {
        AbiTag::Unknown => None,
        AbiTag::DosInterrupt => Some(dos::int21::build_table()),
        AbiTag::DosSyscall => Some(dos::kpi::build_table()),
        AbiTag::Linux => Some(linux::build_table()),
        AbiTag::Native => Some(native::build_table()),
    }
}
