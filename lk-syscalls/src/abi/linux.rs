//! Linux i386 table
//!
//! `INT 0x80` with the number in EAX and arguments in EBX, ECX, EDX, ESI,
//! EDI, EBP. Numbers follow the i386 syscall list. Failures come back as
//! `-errno`.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use lk_api::{AbiPrivate, Error, FileHandle, OpenMode, Result, SyscallArgs};

use crate::abi::MAX_USER_STRING;
use crate::core::env::{Caller, SyscallEnv};
use crate::core::table::SyscallTable;

/// i386 table length
pub const TABLE_SIZE: u32 = 334;

/// Highest file descriptor a process may hold, exclusive
pub const MAX_FDS: i32 = 256;

/// Largest single read or write
pub const MAX_IO: u32 = 1 << 20;

/// i386 syscall numbers
pub mod nr {
    pub const EXIT: u32 = 1;
    pub const FORK: u32 = 2;
    pub const READ: u32 = 3;
    pub const WRITE: u32 = 4;
    pub const OPEN: u32 = 5;
    pub const CLOSE: u32 = 6;
    pub const WAITPID: u32 = 7;
    pub const CREAT: u32 = 8;
    pub const UNLINK: u32 = 10;
    pub const EXECVE: u32 = 11;
    pub const CHDIR: u32 = 12;
    pub const TIME: u32 = 13;
    pub const LSEEK: u32 = 19;
    pub const GETPID: u32 = 20;
    pub const GETUID: u32 = 24;
    pub const ACCESS: u32 = 33;
    pub const KILL: u32 = 37;
    pub const MKDIR: u32 = 39;
    pub const RMDIR: u32 = 40;
    pub const DUP: u32 = 41;
    pub const PIPE: u32 = 42;
    pub const BRK: u32 = 45;
    pub const GETGID: u32 = 47;
    pub const IOCTL: u32 = 54;
    pub const DUP2: u32 = 63;
    pub const GETPPID: u32 = 64;
    pub const MMAP: u32 = 90;
    pub const MUNMAP: u32 = 91;
    pub const STAT: u32 = 106;
    pub const WAIT4: u32 = 114;
    pub const CLONE: u32 = 120;
    pub const UNAME: u32 = 122;
    pub const MPROTECT: u32 = 125;
    pub const LLSEEK: u32 = 140;
    pub const WRITEV: u32 = 146;
    pub const SCHED_YIELD: u32 = 158;
    pub const NANOSLEEP: u32 = 162;
    pub const RT_SIGACTION: u32 = 174;
    pub const RT_SIGPROCMASK: u32 = 175;
    pub const GETCWD: u32 = 183;
    pub const MMAP2: u32 = 192;
    pub const STAT64: u32 = 195;
    pub const FSTAT64: u32 = 197;
    pub const GETTID: u32 = 224;
    pub const SET_THREAD_AREA: u32 = 243;
    pub const EXIT_GROUP: u32 = 252;
    pub const SET_TID_ADDRESS: u32 = 258;
    pub const CLOCK_GETTIME: u32 = 265;
    pub const OPENAT: u32 = 295;
}

/// The errno values these handlers produce
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EIO: i32 = 5;
    pub const EBADF: i32 = 9;
    pub const ENOMEM: i32 = 12;
    pub const EACCES: i32 = 13;
    pub const EFAULT: i32 = 14;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const EMFILE: i32 = 24;
    pub const ERANGE: i32 = 34;
    pub const ENAMETOOLONG: i32 = 36;
}

/// Open flag bits as the i386 ABI encodes them
mod oflag {
    pub const ACCMODE: u32 = 0o3;
    pub const WRONLY: u32 = 0o1;
    pub const RDWR: u32 = 0o2;
    pub const CREAT: u32 = 0o100;
    pub const EXCL: u32 = 0o200;
    pub const TRUNC: u32 = 0o1000;
    pub const APPEND: u32 = 0o2000;
}

/// A positive errno; negated on the way out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(pub i32);

impl From<Error> for Errno {
    fn from(err: Error) -> Self {
        Errno(match err {
            Error::NotFound(_) => errno::ENOENT,
            Error::NoSuchProcess(_) => errno::ESRCH,
            Error::AlreadyExists(_) => errno::EEXIST,
            Error::PermissionDenied(_) => errno::EACCES,
            Error::BadHandle(_) => errno::EBADF,
            Error::TooManyOpenFiles => errno::EMFILE,
            Error::OutOfMemory | Error::OutOfPids => errno::ENOMEM,
            Error::BadAddress(_) => errno::EFAULT,
            Error::PathTooLong { .. } => errno::ENAMETOOLONG,
            Error::InvalidArgument(_) | Error::InvalidPath(_) => errno::EINVAL,
            Error::InvalidState(_) => errno::EPERM,
            _ => errno::EIO,
        })
    }
}

type SysResult = ::core::result::Result<i32, Errno>;

fn finish(result: SysResult) -> i32 {
    result.unwrap_or_else(|Errno(e)| -e)
}

/// Per-process Linux state
#[derive(Debug, Clone)]
pub struct LinuxState {
    cwd: String,
    fds: BTreeMap<i32, FileHandle>,
}

impl Default for LinuxState {
    fn default() -> Self {
        Self {
            cwd: "/".to_string(),
            fds: BTreeMap::new(),
        }
    }
}

impl LinuxState {
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Makes `path` absolute against the cwd, folding `.` and `..`
    pub fn resolve(&self, path: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !path.starts_with('/') {
            parts.extend(self.cwd.split('/').filter(|p| !p.is_empty()));
        }
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                name => parts.push(name),
            }
        }
        format!("/{}", parts.join("/"))
    }

    fn alloc_fd(&mut self, file: FileHandle) -> ::core::result::Result<i32, Errno> {
        let fd = (3..MAX_FDS)
            .find(|fd| !self.fds.contains_key(fd))
            .ok_or(Errno(errno::EMFILE))?;
        self.fds.insert(fd, file);
        Ok(fd)
    }

    fn file(&self, fd: i32) -> Option<FileHandle> {
        self.fds.get(&fd).copied()
    }
}

fn user_path(caller: &Caller<'_>, addr: u32) -> ::core::result::Result<String, Errno> {
    let raw = caller.memory().read_cstr(addr, MAX_USER_STRING)?;
    if raw.is_empty() {
        return Err(Errno(errno::ENOENT));
    }
    caller
        .with_state(|s: &mut LinuxState| s.resolve(&raw))
        .map_err(Errno::from)
}

fn open_mode(flags: u32) -> OpenMode {
    let mut mode = match flags & oflag::ACCMODE {
        oflag::WRONLY => OpenMode::WRITE,
        oflag::RDWR => OpenMode::READ | OpenMode::WRITE,
        _ => OpenMode::READ,
    };
    mode.set(OpenMode::CREATE, flags & oflag::CREAT != 0);
    mode.set(OpenMode::EXCLUSIVE, flags & oflag::EXCL != 0);
    mode.set(OpenMode::TRUNCATE, flags & oflag::TRUNC != 0);
    mode.set(OpenMode::APPEND, flags & oflag::APPEND != 0);
    mode
}

fn do_open(caller: &Caller<'_>, addr: u32, flags: u32) -> SysResult {
    let path = user_path(caller, addr)?;
    let file = caller.fs().open(&path, open_mode(flags))?;
    match caller.with_state(|s: &mut LinuxState| s.alloc_fd(file))? {
        Ok(fd) => Ok(fd),
        Err(e) => {
            let _ = caller.fs().close(file);
            Err(e)
        }
    }
}

fn do_read(caller: &Caller<'_>, fd: i32, buf: u32, count: u32) -> SysResult {
    let mut data = vec![0u8; count.min(MAX_IO) as usize];
    let n = match fd {
        0 => {
            let mut n = 0;
            while n < data.len() {
                match caller.console().read_byte() {
                    Some(b) => {
                        data[n] = b;
                        n += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                    None => break,
                }
            }
            n
        }
        1 | 2 => return Err(Errno(errno::EBADF)),
        _ => {
            let file = caller
                .with_state(|s: &mut LinuxState| s.file(fd))?
                .ok_or(Errno(errno::EBADF))?;
            caller.fs().read(file, &mut data)?
        }
    };
    caller.memory().write(buf, &data[..n])?;
    Ok(n as i32)
}

fn do_write(caller: &Caller<'_>, fd: i32, buf: u32, count: u32) -> SysResult {
    let mut data = vec![0u8; count.min(MAX_IO) as usize];
    caller.memory().read(buf, &mut data)?;
    match fd {
        1 | 2 => {
            caller.console().write_bytes(&data);
            Ok(data.len() as i32)
        }
        0 => Err(Errno(errno::EBADF)),
        _ => {
            let file = caller
                .with_state(|s: &mut LinuxState| s.file(fd))?
                .ok_or(Errno(errno::EBADF))?;
            Ok(caller.fs().write(file, &data)? as i32)
        }
    }
}

fn do_close(caller: &Caller<'_>, fd: i32) -> SysResult {
    if (0..3).contains(&fd) {
        return Ok(0);
    }
    let file = caller
        .with_state(|s: &mut LinuxState| s.fds.remove(&fd))?
        .ok_or(Errno(errno::EBADF))?;
    caller.fs().close(file)?;
    Ok(0)
}

fn do_chdir(caller: &Caller<'_>, addr: u32) -> SysResult {
    let path = user_path(caller, addr)?;
    if !caller.fs().is_dir(&path) {
        return Err(Errno(errno::ENOENT));
    }
    caller.with_state(|s: &mut LinuxState| s.cwd = path)?;
    Ok(0)
}

fn do_getcwd(caller: &Caller<'_>, buf: u32, size: u32) -> SysResult {
    let mut cwd = caller.with_state(|s: &mut LinuxState| s.cwd.clone())?.into_bytes();
    cwd.push(0);
    if cwd.len() > size as usize {
        return Err(Errno(errno::ERANGE));
    }
    caller.memory().write(buf, &cwd)?;
    Ok(cwd.len() as i32)
}

fn sys_exit(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(caller.exit(args.a1 as i32).map(|_| 0).map_err(Errno::from))
}

fn sys_read(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(do_read(caller, args.a1 as i32, args.a2, args.a3))
}

fn sys_write(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(do_write(caller, args.a1 as i32, args.a2, args.a3))
}

fn sys_open(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(do_open(caller, args.a1, args.a2))
}

fn sys_creat(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(do_open(caller, args.a1, oflag::WRONLY | oflag::CREAT | oflag::TRUNC))
}

fn sys_close(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(do_close(caller, args.a1 as i32))
}

fn sys_unlink(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(user_path(caller, args.a1).and_then(|p| {
        caller.fs().unlink(&p).map(|_| 0).map_err(Errno::from)
    }))
}

fn sys_chdir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(do_chdir(caller, args.a1))
}

fn sys_mkdir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(user_path(caller, args.a1).and_then(|p| {
        caller.fs().mkdir(&p).map(|_| 0).map_err(Errno::from)
    }))
}

fn sys_rmdir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(user_path(caller, args.a1).and_then(|p| {
        caller.fs().rmdir(&p).map(|_| 0).map_err(Errno::from)
    }))
}

fn sys_getpid(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.pid() as i32
}

fn sys_getuid(_caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    0
}

fn sys_getppid(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.parent_pid().map_or(0, |p| p as i32)
}

fn sys_sched_yield(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.scheduler().yield_now();
    0
}

fn sys_getcwd(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(do_getcwd(caller, args.a1, args.a2))
}

/// Builds the Linux i386 table
pub fn build_table() -> Result<SyscallTable> {
    SyscallTable::builder(TABLE_SIZE)
        .handler(nr::EXIT, "exit", sys_exit)
        .name(nr::FORK, "fork")
        .handler(nr::READ, "read", sys_read)
        .handler(nr::WRITE, "write", sys_write)
        .handler(nr::OPEN, "open", sys_open)
        .handler(nr::CLOSE, "close", sys_close)
        .name(nr::WAITPID, "waitpid")
        .handler(nr::CREAT, "creat", sys_creat)
        .handler(nr::UNLINK, "unlink", sys_unlink)
        .name(nr::EXECVE, "execve")
        .handler(nr::CHDIR, "chdir", sys_chdir)
        .name(nr::TIME, "time")
        .name(nr::LSEEK, "lseek")
        .handler(nr::GETPID, "getpid", sys_getpid)
        .handler(nr::GETUID, "getuid", sys_getuid)
        .name(nr::ACCESS, "access")
        .name(nr::KILL, "kill")
        .handler(nr::MKDIR, "mkdir", sys_mkdir)
        .handler(nr::RMDIR, "rmdir", sys_rmdir)
        .name(nr::DUP, "dup")
        .name(nr::PIPE, "pipe")
        .name(nr::BRK, "brk")
        .handler(nr::GETGID, "getgid", sys_getuid)
        .name(nr::IOCTL, "ioctl")
        .name(nr::DUP2, "dup2")
        .handler(nr::GETPPID, "getppid", sys_getppid)
        .name(nr::MMAP, "mmap")
        .name(nr::MUNMAP, "munmap")
        .name(nr::STAT, "stat")
        .name(nr::WAIT4, "wait4")
        .name(nr::CLONE, "clone")
        .name(nr::UNAME, "uname")
        .name(nr::MPROTECT, "mprotect")
        .name(nr::LLSEEK, "_llseek")
        .name(nr::WRITEV, "writev")
        .handler(nr::SCHED_YIELD, "sched_yield", sys_sched_yield)
        .name(nr::NANOSLEEP, "nanosleep")
        .name(nr::RT_SIGACTION, "rt_sigaction")
        .name(nr::RT_SIGPROCMASK, "rt_sigprocmask")
        .handler(nr::GETCWD, "getcwd", sys_getcwd)
        .name(nr::MMAP2, "mmap2")
        .name(nr::STAT64, "stat64")
        .name(nr::FSTAT64, "fstat64")
        .handler(nr::GETTID, "gettid", sys_getpid)
        .name(nr::SET_THREAD_AREA, "set_thread_area")
        .handler(nr::EXIT_GROUP, "exit_group", sys_exit)
        .name(nr::SET_TID_ADDRESS, "set_tid_address")
        .name(nr::CLOCK_GETTIME, "clock_gettime")
        .name(nr::OPENAT, "openat")
        .cleanup(cleanup)
        .build()
}

/// Closes every descriptor a Linux process left open
pub fn cleanup(env: &SyscallEnv, mut blob: AbiPrivate) {
    if let Some(state) = blob.get_mut::<LinuxState>() {
        for (_, file) in ::core::mem::take(&mut state.fds) {
            let _ = env.fs.close(file);
        }
    }
}
