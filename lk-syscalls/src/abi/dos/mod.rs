//! State and file operations shared by both DOS flavours
//!
//! INT 21h programs and KPI v2 programs see the same world: a current drive,
//! a current directory per drive, a DTA and a small handle table where
//! handles 0-4 are the standard devices. That state lives in the process's
//! private blob as a [`DosState`].

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use lk_api::{AbiPrivate, Error, FileHandle, OpenMode};

use crate::core::env::{Caller, SyscallEnv};
use crate::path::{is_valid_dos_path, split_drive, MAX_DOS_PATH};

pub mod int21;
pub mod kpi;

/// First handle number given to files; 0-4 are the standard devices
pub const FIRST_FILE_HANDLE: u16 = 5;
/// Handle table size (the classic `FILES=20`)
pub const MAX_HANDLES: u16 = 20;
/// Number of drive letters
pub const DRIVE_COUNT: u8 = 26;
/// Offset of the default DTA inside the PSP
pub const DEFAULT_DTA: u32 = 0x80;
/// Longest current directory `get_cwd` hands back
pub const MAX_CWD: usize = 64;
/// Largest single read or write, one real-mode segment
pub const MAX_TRANSFER: u32 = 0x1_0000;

/// A DOS error code, returned to the program negated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosError(pub u16);

impl DosError {
    pub const INVALID_FUNCTION: DosError = DosError(1);
    pub const FILE_NOT_FOUND: DosError = DosError(2);
    pub const PATH_NOT_FOUND: DosError = DosError(3);
    pub const TOO_MANY_OPEN_FILES: DosError = DosError(4);
    pub const ACCESS_DENIED: DosError = DosError(5);
    pub const INVALID_HANDLE: DosError = DosError(6);
    pub const INSUFFICIENT_MEMORY: DosError = DosError(8);
    pub const INVALID_MEMORY_BLOCK: DosError = DosError(9);
    pub const INVALID_ACCESS: DosError = DosError(12);
    pub const INVALID_DATA: DosError = DosError(13);
    pub const INVALID_DRIVE: DosError = DosError(15);
    pub const CURRENT_DIRECTORY: DosError = DosError(16);
    pub const NO_MORE_FILES: DosError = DosError(18);
    pub const GENERAL_FAILURE: DosError = DosError(31);

    pub const fn as_return(self) -> i32 {
        -(self.0 as i32)
    }
}

impl From<Error> for DosError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => DosError::FILE_NOT_FOUND,
            Error::InvalidPath(_) | Error::PathTooLong { .. } => DosError::PATH_NOT_FOUND,
            Error::TooManyOpenFiles => DosError::TOO_MANY_OPEN_FILES,
            Error::PermissionDenied(_) | Error::AlreadyExists(_) => DosError::ACCESS_DENIED,
            Error::BadHandle(_) => DosError::INVALID_HANDLE,
            Error::OutOfMemory | Error::OutOfPids => DosError::INSUFFICIENT_MEMORY,
            Error::BadAddress(_) => DosError::INVALID_MEMORY_BLOCK,
            Error::InvalidArgument(_) => DosError::INVALID_DATA,
            _ => DosError::GENERAL_FAILURE,
        }
    }
}

/// Maps "not found" to the directory flavour of the error
fn path_error(err: Error) -> DosError {
    match err {
        Error::NotFound(_) => DosError::PATH_NOT_FOUND,
        other => other.into(),
    }
}

pub type DosResult = Result<i32, DosError>;

/// Folds a handler result into the register value
pub fn finish(result: DosResult) -> i32 {
    result.unwrap_or_else(DosError::as_return)
}

/// Per-process DOS state
#[derive(Debug, Clone)]
pub struct DosState {
    /// Current drive, 0 = A:
    pub drive: u8,
    /// Disk transfer area address
    pub dta: u32,
    /// Current directory per drive, without drive or leading backslash
    cwd: BTreeMap<u8, String>,
    handles: BTreeMap<u16, FileHandle>,
}

impl Default for DosState {
    fn default() -> Self {
        Self {
            drive: 2,
            dta: DEFAULT_DTA,
            cwd: BTreeMap::new(),
            handles: BTreeMap::new(),
        }
    }
}

fn drive_number(letter: char) -> u8 {
    letter.to_ascii_uppercase() as u8 - b'A'
}

impl DosState {
    /// Current directory of `drive` (0 = A:)
    pub fn cwd(&self, drive: u8) -> &str {
        self.cwd.get(&drive).map_or("", String::as_str)
    }

    pub fn set_cwd(&mut self, drive: u8, dir: &str) {
        if dir.is_empty() {
            self.cwd.remove(&drive);
        } else {
            self.cwd.insert(drive, dir.to_string());
        }
    }

    /// Expands `path` to an absolute `X:\dir\file` form against the current
    /// drive and directory, folding `.` and `..`.
    pub fn resolve(&self, path: &str) -> String {
        let bytes = path.as_bytes();
        let (drive, rest, rooted) = if let Some((letter, rest)) = split_drive(path) {
            (drive_number(letter), rest, true)
        } else if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            (drive_number(bytes[0] as char), &path[2..], false)
        } else {
            (self.drive, path, false)
        };
        let rooted = rooted || rest.starts_with('\\');

        let mut parts: Vec<&str> = Vec::new();
        if !rooted {
            parts.extend(self.cwd(drive).split('\\').filter(|p| !p.is_empty()));
        }
        for part in rest.split('\\') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                name => parts.push(name),
            }
        }
        format!("{}:\\{}", (b'A' + drive) as char, parts.join("\\"))
    }

    /// Lowest free file handle, bound to `file`
    pub fn alloc_handle(&mut self, file: FileHandle) -> Result<u16, DosError> {
        let handle = (FIRST_FILE_HANDLE..MAX_HANDLES)
            .find(|h| !self.handles.contains_key(h))
            .ok_or(DosError::TOO_MANY_OPEN_FILES)?;
        self.handles.insert(handle, file);
        Ok(handle)
    }

    pub fn file(&self, handle: u16) -> Option<FileHandle> {
        self.handles.get(&handle).copied()
    }

    pub fn release(&mut self, handle: u16) -> Option<FileHandle> {
        self.handles.remove(&handle)
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

/// Whether a handle names one of the standard devices
pub const fn is_device(handle: u16) -> bool {
    handle < FIRST_FILE_HANDLE
}

/// Reads a NUL-terminated DOS path from user memory and turns it into a
/// POSIX path, returning the absolute DOS form too.
pub(crate) fn user_path(caller: &Caller<'_>, addr: u32) -> Result<(String, String), DosError> {
    let raw = caller
        .memory()
        .read_cstr(addr, MAX_DOS_PATH + 1)
        .map_err(|_| DosError::PATH_NOT_FOUND)?;
    if !is_valid_dos_path(&raw) {
        return Err(DosError::PATH_NOT_FOUND);
    }
    let dos = caller.with_state(|s: &mut DosState| s.resolve(&raw))?;
    let posix = caller.drives().dos_to_posix(&dos).map_err(path_error)?;
    Ok((dos, posix))
}

/// Opens the file at user address `addr`, returning a DOS handle
pub(crate) fn open(caller: &Caller<'_>, addr: u32, mode: OpenMode) -> DosResult {
    let (_, posix) = user_path(caller, addr)?;
    let file = caller.fs().open(&posix, mode)?;
    match caller.with_state(|s: &mut DosState| s.alloc_handle(file))? {
        Ok(handle) => Ok(handle as i32),
        Err(err) => {
            let _ = caller.fs().close(file);
            Err(err)
        }
    }
}

/// Maps a DOS access code (0 read, 1 write, 2 read/write) to an open mode
pub(crate) fn access_mode(code: u32) -> Result<OpenMode, DosError> {
    match code & 0x7 {
        0 => Ok(OpenMode::READ),
        1 => Ok(OpenMode::WRITE),
        2 => Ok(OpenMode::READ | OpenMode::WRITE),
        _ => Err(DosError::INVALID_ACCESS),
    }
}

pub(crate) fn close(caller: &Caller<'_>, handle: u16) -> DosResult {
    if is_device(handle) {
        return Ok(0);
    }
    let file = caller
        .with_state(|s: &mut DosState| s.release(handle))?
        .ok_or(DosError::INVALID_HANDLE)?;
    caller.fs().close(file)?;
    Ok(0)
}

/// Reads up to `count` bytes from `handle` into user memory at `buf`
pub(crate) fn read(caller: &Caller<'_>, handle: u16, buf: u32, count: u32) -> DosResult {
    let mut data = vec![0u8; count.min(MAX_TRANSFER) as usize];
    let n = if is_device(handle) {
        if handle != 0 {
            return Err(DosError::ACCESS_DENIED);
        }
        read_console_line(caller, &mut data)
    } else {
        let file = caller
            .with_state(|s: &mut DosState| s.file(handle))?
            .ok_or(DosError::INVALID_HANDLE)?;
        caller.fs().read(file, &mut data)?
    };
    caller.memory().write(buf, &data[..n])?;
    Ok(n as i32)
}

/// Pulls pending console bytes into `out`, stopping after a newline
fn read_console_line(caller: &Caller<'_>, out: &mut [u8]) -> usize {
    let mut n = 0;
    while n < out.len() {
        let Some(byte) = caller.console().read_byte() else {
            break;
        };
        out[n] = byte;
        n += 1;
        if byte == b'\n' {
            break;
        }
    }
    n
}

/// Writes `count` bytes from user memory at `buf` to `handle`
pub(crate) fn write(caller: &Caller<'_>, handle: u16, buf: u32, count: u32) -> DosResult {
    let mut data = vec![0u8; count.min(MAX_TRANSFER) as usize];
    caller.memory().read(buf, &mut data)?;
    if is_device(handle) {
        caller.console().write_bytes(&data);
        return Ok(data.len() as i32);
    }
    let file = caller
        .with_state(|s: &mut DosState| s.file(handle))?
        .ok_or(DosError::INVALID_HANDLE)?;
    Ok(caller.fs().write(file, &data)? as i32)
}

pub(crate) fn unlink(caller: &Caller<'_>, addr: u32) -> DosResult {
    let (_, posix) = user_path(caller, addr)?;
    caller.fs().unlink(&posix)?;
    Ok(0)
}

pub(crate) fn mkdir(caller: &Caller<'_>, addr: u32) -> DosResult {
    let (_, posix) = user_path(caller, addr)?;
    caller.fs().mkdir(&posix).map_err(path_error)?;
    Ok(0)
}

pub(crate) fn rmdir(caller: &Caller<'_>, addr: u32) -> DosResult {
    let (dos, posix) = user_path(caller, addr)?;
    let is_current = caller.with_state(|s: &mut DosState| s.resolve(".") == dos)?;
    if is_current {
        return Err(DosError::CURRENT_DIRECTORY);
    }
    caller.fs().rmdir(&posix).map_err(path_error)?;
    Ok(0)
}

pub(crate) fn chdir(caller: &Caller<'_>, addr: u32) -> DosResult {
    let (dos, posix) = user_path(caller, addr)?;
    if !caller.fs().is_dir(&posix) {
        return Err(DosError::PATH_NOT_FOUND);
    }
    let drive = dos.as_bytes()[0] - b'A';
    let dir = &dos[3..];
    caller.with_state(|s: &mut DosState| s.set_cwd(drive, dir))?;
    Ok(0)
}

/// Closes every file a DOS process left open
pub fn cleanup(env: &SyscallEnv, mut blob: AbiPrivate) {
    let Some(state) = blob.get_mut::<DosState>() else {
        return;
    };
    let handles: Vec<u16> = state.handles.keys().copied().collect();
    for handle in handles {
        if let Some(file) = state.release(handle) {
            let _ = env.fs.close(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_rooted() {
        let mut state = DosState::default();
        state.set_cwd(2, "GAMES");
        assert_eq!(state.resolve("Q.EXE"), "C:\\GAMES\\Q.EXE");
        assert_eq!(state.resolve("\\DOS\\EDIT.COM"), "C:\\DOS\\EDIT.COM");
        assert_eq!(state.resolve("..\\AUTOEXEC.BAT"), "C:\\AUTOEXEC.BAT");
        assert_eq!(state.resolve("A:\\X\\.\\Y"), "A:\\X\\Y");
        assert_eq!(state.resolve("a:FILE"), "A:\\FILE");
        assert_eq!(state.resolve("."), "C:\\GAMES");
    }

    #[test]
    fn test_handle_table_limits() {
        let mut state = DosState::default();
        for expected in FIRST_FILE_HANDLE..MAX_HANDLES {
            assert_eq!(state.alloc_handle(expected as u32 + 100), Ok(expected));
        }
        assert_eq!(state.alloc_handle(1), Err(DosError::TOO_MANY_OPEN_FILES));
        assert_eq!(state.release(7), Some(107));
        assert_eq!(state.alloc_handle(9), Ok(7));
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(DosError::from(Error::NotFound("x".into())), DosError::FILE_NOT_FOUND);
        assert_eq!(path_error(Error::NotFound("x".into())), DosError::PATH_NOT_FOUND);
        assert_eq!(finish(Err(DosError::INVALID_HANDLE)), -6);
        assert_eq!(finish(Ok(3)), 3);
    }
}
