//! Native table
//!
//! The kernel's own small ABI. Arguments arrive like the Linux ones;
//! failures are `-errno` using the Linux values.

use lk_api::{Result, SyscallArgs};

use super::linux::errno;
use crate::core::env::Caller;
use crate::core::table::SyscallTable;

pub const TABLE_SIZE: u32 = 16;

pub mod nr {
    pub const EXIT: u32 = 0;
    pub const WRITE: u32 = 1;
    pub const GETPID: u32 = 2;
    pub const YIELD: u32 = 3;
    pub const GET_ABI: u32 = 4;
    pub const GETPPID: u32 = 5;
}

/// Longest console write accepted in one call
const MAX_WRITE: u32 = 64 * 1024;

fn sys_exit(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    match caller.exit(args.a1 as i32) {
        Ok(()) => 0,
        Err(_) => -errno::ESRCH,
    }
}

/// `write(fd, buf, len)`; only the console descriptors 1 and 2 exist
fn sys_write(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    if !matches!(args.a1, 1 | 2) {
        return -errno::EBADF;
    }
    if args.a3 > MAX_WRITE {
        return -errno::EINVAL;
    }
    let mut data = alloc::vec![0u8; args.a3 as usize];
    if caller.memory().read(args.a2, &mut data).is_err() {
        return -errno::EFAULT;
    }
    caller.console().write_bytes(&data);
    data.len() as i32
}

fn sys_getpid(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.pid() as i32
}

fn sys_yield(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.scheduler().yield_now();
    0
}

/// Tag the caller runs under, as its numeric value
fn sys_get_abi(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.tag() as i32
}

fn sys_getppid(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.parent_pid().map_or(0, |p| p as i32)
}

/// Builds the native table
pub fn build_table() -> Result<SyscallTable> {
    SyscallTable::builder(TABLE_SIZE)
        .handler(nr::EXIT, "exit", sys_exit)
        .handler(nr::WRITE, "write", sys_write)
        .handler(nr::GETPID, "getpid", sys_getpid)
        .handler(nr::YIELD, "yield", sys_yield)
        .handler(nr::GET_ABI, "get_abi", sys_get_abi)
        .handler(nr::GETPPID, "getppid", sys_getppid)
        .build()
}
