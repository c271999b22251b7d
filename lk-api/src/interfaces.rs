//! Interfaces of the collaborators outside the kernel core
//!
//! The console, the VFS and user-space memory are black boxes here; only
//! per-ABI syscall handlers call into them.

use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::error::{invalid_argument, Error, Result};

/// Handle issued by the filesystem for an open file
pub type FileHandle = u32;

bitflags! {
    /// How a file is opened
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenMode: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// Create the file if it is missing
        const CREATE = 1 << 2;
        /// Truncate to zero length on open
        const TRUNCATE = 1 << 3;
        const APPEND = 1 << 4;
        /// Fail if the file already exists (with `CREATE`)
        const EXCLUSIVE = 1 << 5;
    }
}

/// Character console
pub trait Console: Send + Sync {
    /// Writes raw bytes to the screen or serial line
    fn write_bytes(&self, bytes: &[u8]);

    /// Takes one pending input byte, if any
    fn read_byte(&self) -> Option<u8>;

    fn write_str(&self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

/// Virtual filesystem, addressed with POSIX paths
pub trait FileSystem: Send + Sync {
    fn open(&self, path: &str, mode: OpenMode) -> Result<FileHandle>;

    fn close(&self, handle: FileHandle) -> Result<()>;

    fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize>;

    fn write(&self, handle: FileHandle, buf: &[u8]) -> Result<usize>;

    fn unlink(&self, path: &str) -> Result<()>;

    fn mkdir(&self, path: &str) -> Result<()>;

    fn rmdir(&self, path: &str) -> Result<()>;

    /// Whether `path` names an existing directory
    fn is_dir(&self, path: &str) -> bool;
}

/// Access to the calling process's address space
pub trait UserMemory: Send + Sync {
    /// Copies `buf.len()` bytes starting at `addr`
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Copies `data` to `addr`
    fn write(&self, addr: u32, data: &[u8]) -> Result<()>;

    /// Reads bytes from `addr` up to (not including) `terminator`.
    ///
    /// Fails with `InvalidArgument` when no terminator shows up within
    /// `max` bytes.
    fn read_until(&self, addr: u32, terminator: u8, max: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        for offset in 0..max {
            let at = addr
                .checked_add(offset as u32)
                .ok_or(Error::BadAddress(addr))?;
            self.read(at, &mut byte)?;
            if byte[0] == terminator {
                return Ok(out);
            }
            out.push(byte[0]);
        }
        Err(invalid_argument("unterminated user string"))
    }

    /// Reads a NUL-terminated string of at most `max` bytes
    fn read_cstr(&self, addr: u32, max: usize) -> Result<String> {
        let bytes = self.read_until(addr, 0, max)?;
        String::from_utf8(bytes).map_err(|_| invalid_argument("string is not UTF-8"))
    }
}
