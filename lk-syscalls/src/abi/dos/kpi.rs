//! DOS KPI v2 table
//!
//! Syscall-instruction DOS programs. They issue numbers from
//! [`DOS_KPI_BASE`] upward; the trap gateway subtracts the base, so the
//! table is indexed by offset. Arguments arrive in order in `a1..a6` and
//! failures come back as negated DOS error codes, like INT 21h.

use lk_api::{OpenMode, Result, SyscallArgs};

use super::{
    access_mode, chdir, close, finish, mkdir, open, read, rmdir, unlink, write, DosError,
    DosResult, DosState,
};
use crate::core::env::Caller;
use crate::core::table::SyscallTable;

/// First raw syscall number of the KPI
pub const DOS_KPI_BASE: u32 = 4000;

/// Slots reserved for the KPI
pub const TABLE_SIZE: u32 = 100;

/// KPI offsets from [`DOS_KPI_BASE`]
pub mod nr {
    pub const EXIT: u32 = 0;
    pub const READ: u32 = 1;
    pub const WRITE: u32 = 2;
    pub const OPEN: u32 = 3;
    pub const CLOSE: u32 = 4;
    pub const CREAT: u32 = 5;
    pub const UNLINK: u32 = 6;
    pub const EXEC: u32 = 7;
    pub const FORK: u32 = 8;
    pub const WAIT: u32 = 9;
    pub const GETPID: u32 = 10;
    pub const KILL: u32 = 11;
    pub const STAT: u32 = 12;
    pub const FSTAT: u32 = 13;
    pub const LSEEK: u32 = 14;
    pub const CHDIR: u32 = 15;
    pub const GETCWD: u32 = 16;
    pub const MKDIR: u32 = 17;
    pub const RMDIR: u32 = 18;
    pub const RENAME: u32 = 19;
    pub const GETTIMEOFDAY: u32 = 51;
}

/// Labels of the KPI offsets, in order
const NAMES: [&str; 52] = [
    "exit", "read", "write", "open", "close", "creat", "unlink", "exec", "fork", "wait",
    "getpid", "kill", "stat", "fstat", "lseek", "chdir", "getcwd", "mkdir", "rmdir", "rename",
    "access", "chmod", "chown", "utime", "pipe", "dup", "dup2", "symlink", "readlink",
    "truncate", "ftruncate", "getdents", "mmap", "munmap", "brk", "sbrk", "mprotect", "msync",
    "mincore", "madvise", "mlock", "munlock", "mlockall", "munlockall", "mount", "umount",
    "umount2", "statfs", "fstatfs", "ustat", "uname", "gettimeofday",
];

/// Maps a raw trap number to a table offset; numbers below the base map
/// past the end of every table.
pub const fn offset_of(raw: u32) -> u32 {
    match raw.checked_sub(DOS_KPI_BASE) {
        Some(offset) => offset,
        None => u32::MAX,
    }
}

fn sys_exit(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(caller.exit(args.a1 as i32).map(|_| 0).map_err(DosError::from))
}

fn sys_read(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(read(caller, args.a1 as u16, args.a2, args.a3))
}

fn sys_write(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(write(caller, args.a1 as u16, args.a2, args.a3))
}

/// `open(path, access, _mode)`; access uses the INT 21h codes
fn sys_open(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(access_mode(args.a2).and_then(|mode| open(caller, args.a1, mode)))
}

fn sys_close(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(close(caller, args.a1 as u16))
}

fn sys_creat(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    let mode = OpenMode::READ | OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE;
    finish(open(caller, args.a1, mode))
}

fn sys_unlink(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(unlink(caller, args.a1))
}

fn sys_getpid(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.pid() as i32
}

fn sys_chdir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(chdir(caller, args.a1))
}

/// Writes the absolute current directory (`C:\DIR`) into `buf`
fn copy_full_cwd(caller: &Caller<'_>, buf: u32, size: u32) -> DosResult {
    let dir = caller.with_state(|s: &mut DosState| s.resolve("."))?;
    let mut bytes = dir.into_bytes();
    bytes.push(0);
    if bytes.len() > size as usize {
        return Err(DosError::INSUFFICIENT_MEMORY);
    }
    caller.memory().write(buf, &bytes)?;
    Ok(bytes.len() as i32 - 1)
}

fn sys_getcwd(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(copy_full_cwd(caller, args.a1, args.a2))
}

fn sys_mkdir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(mkdir(caller, args.a1))
}

fn sys_rmdir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(rmdir(caller, args.a1))
}

/// Builds the KPI v2 table
pub fn build_table() -> Result<SyscallTable> {
    let named = NAMES
        .iter()
        .enumerate()
        .fold(SyscallTable::builder(TABLE_SIZE), |b, (offset, name)| {
            b.name(offset as u32, *name)
        });
    named
        .handler(nr::EXIT, NAMES[nr::EXIT as usize], sys_exit)
        .handler(nr::READ, NAMES[nr::READ as usize], sys_read)
        .handler(nr::WRITE, NAMES[nr::WRITE as usize], sys_write)
        .handler(nr::OPEN, NAMES[nr::OPEN as usize], sys_open)
        .handler(nr::CLOSE, NAMES[nr::CLOSE as usize], sys_close)
        .handler(nr::CREAT, NAMES[nr::CREAT as usize], sys_creat)
        .handler(nr::UNLINK, NAMES[nr::UNLINK as usize], sys_unlink)
        .handler(nr::GETPID, NAMES[nr::GETPID as usize], sys_getpid)
        .handler(nr::CHDIR, NAMES[nr::CHDIR as usize], sys_chdir)
        .handler(nr::GETCWD, NAMES[nr::GETCWD as usize], sys_getcwd)
        .handler(nr::MKDIR, NAMES[nr::MKDIR as usize], sys_mkdir)
        .handler(nr::RMDIR, NAMES[nr::RMDIR as usize], sys_rmdir)
        .cleanup(super::cleanup)
        .build()
}
