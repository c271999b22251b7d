//! In-memory collaborators for tests
//!
//! These stand in for the console driver, the VFS, user memory and the
//! scheduler so the syscall path can be driven end to end on the host.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use ::core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use spin::Mutex;

use crate::error::{not_found, Error, Result};
use crate::interfaces::{Console, FileHandle, FileSystem, OpenMode, UserMemory};
use crate::core::context::{AbiContext, AbiPrivate};
use crate::core::types::{AbiFlags, AbiTag, Pid, ProcessState};
use crate::process::interface::{BlockReason, ProcessAccess, Scheduler};

/// Console that records output and replays queued input
#[derive(Default)]
pub struct BufferConsole {
    output: Mutex<Vec<u8>>,
    input: Mutex<VecDeque<u8>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for later `read_byte` calls
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Everything written so far
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }
}

impl Console for BufferConsole {
    fn write_bytes(&self, bytes: &[u8]) {
        self.output.lock().extend_from_slice(bytes);
    }

    fn read_byte(&self) -> Option<u8> {
        self.input.lock().pop_front()
    }
}

/// Flat user address space starting at address zero
pub struct FlatMemory {
    bytes: Mutex<Vec<u8>>,
}

impl FlatMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size]),
        }
    }

    /// Writes `data` at `addr`, panicking on overflow (test setup only)
    pub fn poke(&self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        self.bytes.lock()[start..start + data.len()].copy_from_slice(data);
    }

    /// Reads `len` bytes at `addr`
    pub fn peek(&self, addr: u32, len: usize) -> Vec<u8> {
        let start = addr as usize;
        self.bytes.lock()[start..start + len].to_vec()
    }

    fn range(&self, addr: u32, len: usize) -> Result<::core::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(Error::BadAddress(addr))?;
        if end > self.bytes.lock().len() {
            return Err(Error::BadAddress(addr));
        }
        Ok(start..end)
    }
}

impl UserMemory for FlatMemory {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes.lock()[range]);
        Ok(())
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len())?;
        self.bytes.lock()[range].copy_from_slice(data);
        Ok(())
    }
}

struct OpenFile {
    path: String,
    pos: usize,
    mode: OpenMode,
}

#[derive(Default)]
struct FsState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    open: BTreeMap<FileHandle, OpenFile>,
    next_handle: FileHandle,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

impl FsState {
    fn dir_exists(&self, path: &str) -> bool {
        path == "/" || self.dirs.contains(path)
    }
}

/// Tiny in-memory VFS
#[derive(Default)]
pub struct MemFs {
    state: Mutex<FsState>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates every directory along `path`
    pub fn with_dirs(self, paths: &[&str]) -> Self {
        {
            let mut state = self.state.lock();
            for path in paths {
                let mut prefix = String::new();
                for part in path.split('/').filter(|p| !p.is_empty()) {
                    prefix.push('/');
                    prefix.push_str(part);
                    state.dirs.insert(prefix.clone());
                }
            }
        }
        self
    }

    /// Installs a file with the given contents
    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.state.lock().files.insert(path.to_string(), contents.to_vec());
        self
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn is_open(&self, handle: FileHandle) -> bool {
        self.state.lock().open.contains_key(&handle)
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }
}

impl FileSystem for MemFs {
    fn open(&self, path: &str, mode: OpenMode) -> Result<FileHandle> {
        let mut state = self.state.lock();
        if state.dirs.contains(path) {
            return Err(Error::PermissionDenied(path.to_string()));
        }
        let exists = state.files.contains_key(path);
        if exists && mode.contains(OpenMode::CREATE | OpenMode::EXCLUSIVE) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        if !exists {
            if !mode.contains(OpenMode::CREATE) {
                return Err(not_found(path));
            }
            if !state.dir_exists(parent_of(path)) {
                return Err(not_found(parent_of(path)));
            }
            state.files.insert(path.to_string(), Vec::new());
        }
        if mode.contains(OpenMode::TRUNCATE) {
            if let Some(data) = state.files.get_mut(path) {
                data.clear();
            }
        }
        let pos = if mode.contains(OpenMode::APPEND) {
            state.files.get(path).map_or(0, Vec::len)
        } else {
            0
        };
        state.next_handle += 1;
        let handle = state.next_handle;
        state.open.insert(
            handle,
            OpenFile {
                path: path.to_string(),
                pos,
                mode,
            },
        );
        Ok(handle)
    }

    fn close(&self, handle: FileHandle) -> Result<()> {
        self.state
            .lock()
            .open
            .remove(&handle)
            .map(|_| ())
            .ok_or(Error::BadHandle(handle))
    }

    fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let FsState { files, open, .. } = &mut *state;
        let file = open.get_mut(&handle).ok_or(Error::BadHandle(handle))?;
        if !file.mode.contains(OpenMode::READ) {
            return Err(Error::PermissionDenied(file.path.clone()));
        }
        let data = files.get(&file.path).ok_or_else(|| not_found(&file.path))?;
        let start = file.pos.min(data.len());
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        file.pos = start + n;
        Ok(n)
    }

    fn write(&self, handle: FileHandle, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let FsState { files, open, .. } = &mut *state;
        let file = open.get_mut(&handle).ok_or(Error::BadHandle(handle))?;
        if !file.mode.contains(OpenMode::WRITE) {
            return Err(Error::PermissionDenied(file.path.clone()));
        }
        let data = files
            .get_mut(&file.path)
            .ok_or_else(|| not_found(&file.path))?;
        let end = file.pos + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[file.pos..end].copy_from_slice(buf);
        file.pos = end;
        Ok(buf.len())
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.state
            .lock()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.dir_exists(path) || state.files.contains_key(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        if !state.dir_exists(parent_of(path)) {
            return Err(not_found(parent_of(path)));
        }
        state.dirs.insert(path.to_string());
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }
        let busy = state.dirs.iter().any(|d| parent_of(d) == path && d != path)
            || state.files.keys().any(|f| parent_of(f) == path);
        if busy {
            return Err(Error::PermissionDenied(path.to_string()));
        }
        state.dirs.remove(path);
        Ok(())
    }

    fn is_dir(&self, path: &str) -> bool {
        self.state.lock().dir_exists(path)
    }
}

/// Scheduler that only counts what it is asked to do
#[derive(Default)]
pub struct NoopScheduler {
    yields: AtomicUsize,
    blocked: Mutex<Vec<(Pid, BlockReason)>>,
}

impl NoopScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn yields(&self) -> usize {
        self.yields.load(Ordering::Relaxed)
    }

    pub fn blocked(&self) -> Vec<(Pid, BlockReason)> {
        self.blocked.lock().clone()
    }
}

impl Scheduler for NoopScheduler {
    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }

    fn block_on(&self, pid: Pid, reason: BlockReason) -> Result<()> {
        self.blocked.lock().push((pid, reason));
        Ok(())
    }

    fn unblock(&self, pid: Pid) -> Result<()> {
        let mut blocked = self.blocked.lock();
        let before = blocked.len();
        blocked.retain(|(p, _)| *p != pid);
        if blocked.len() == before {
            return Err(Error::NoSuchProcess(pid));
        }
        Ok(())
    }

    fn schedule(&self) -> Option<Pid> {
        None
    }
}

struct FakeProcess {
    parent: Option<Pid>,
    state: ProcessState,
    abi: AbiContext,
    exit_status: Option<i32>,
}

/// Hand-populated process set implementing [`ProcessAccess`]
#[derive(Default)]
pub struct StaticProcesses {
    procs: Mutex<BTreeMap<Pid, FakeProcess>>,
    current: AtomicU32,
}

impl StaticProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `Ready` process tagged `tag`
    pub fn insert(&self, pid: Pid, parent: Option<Pid>, tag: AbiTag) {
        self.procs.lock().insert(
            pid,
            FakeProcess {
                parent,
                state: ProcessState::Ready,
                abi: AbiContext::new(tag),
                exit_status: None,
            },
        );
    }

    /// Makes `pid` the current process; zero clears it
    pub fn set_current(&self, pid: Pid) {
        self.current.store(pid, Ordering::Relaxed);
        if let Some(p) = self.procs.lock().get_mut(&pid) {
            p.state = ProcessState::Running;
        }
    }

    pub fn set_tag(&self, pid: Pid, tag: AbiTag) {
        if let Some(p) = self.procs.lock().get_mut(&pid) {
            p.abi.retag(tag);
        }
    }

    pub fn exit_status(&self, pid: Pid) -> Option<i32> {
        self.procs.lock().get(&pid).and_then(|p| p.exit_status)
    }

    /// Removes `pid`, handing back its private blob
    pub fn remove(&self, pid: Pid) -> Option<AbiPrivate> {
        self.procs.lock().remove(&pid).map(|mut p| p.abi.private.take())
    }
}

impl ProcessAccess for StaticProcesses {
    fn current_pid(&self) -> Option<Pid> {
        match self.current.load(Ordering::Relaxed) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn abi_tag(&self, pid: Pid) -> Option<AbiTag> {
        self.procs.lock().get(&pid).map(|p| p.abi.tag)
    }

    fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.procs.lock().get(&pid).map(|p| p.state)
    }

    fn parent_pid(&self, pid: Pid) -> Option<Pid> {
        self.procs.lock().get(&pid).and_then(|p| p.parent)
    }

    fn abi_flags(&self, pid: Pid) -> Option<AbiFlags> {
        self.procs.lock().get(&pid).map(|p| p.abi.flags)
    }

    fn set_abi_flags(&self, pid: Pid, flags: AbiFlags) -> Result<()> {
        let mut procs = self.procs.lock();
        let p = procs.get_mut(&pid).ok_or(Error::NoSuchProcess(pid))?;
        p.abi.flags = flags;
        Ok(())
    }

    fn with_private(&self, pid: Pid, f: &mut dyn FnMut(&mut AbiPrivate)) -> Result<()> {
        let mut procs = self.procs.lock();
        let p = procs.get_mut(&pid).ok_or(Error::NoSuchProcess(pid))?;
        f(&mut p.abi.private);
        Ok(())
    }

    fn terminate(&self, pid: Pid, status: i32) -> Result<()> {
        let mut procs = self.procs.lock();
        let p = procs.get_mut(&pid).ok_or(Error::NoSuchProcess(pid))?;
        p.state = ProcessState::Zombie;
        p.exit_status = Some(status);
        Ok(())
    }
}
