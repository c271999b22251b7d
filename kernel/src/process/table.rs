//! Process table
//!
//! Descriptors live in a fixed-capacity slot arena; PIDs are handles into
//! it, resolved through a PID to slot index map. All writes go through one
//! spinlock held only for the length of a field update. The PID, tag, state
//! and flags of the current process are mirrored into atomics so the trap
//! path can read them without locking.

use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use hashbrown::HashMap;
use lk_api::{
    AbiContext, AbiFlags, AbiPrivate, AbiTag, CurrentProcess, Error, Pid, ProcessAccess,
    ProcessState, Result,
};
use log::debug;
use spin::Mutex;

use super::pid::PidPool;
use crate::trap::TrapFrame;

/// Everything the core keeps about one process
#[derive(Debug)]
pub struct ProcessDescriptor {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub state: ProcessState,
    /// Image the process was loaded from
    pub name: String,
    pub entry: u32,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
    /// Saved user registers while not running
    pub frame: TrapFrame,
    pub abi: AbiContext,
    pub exit_status: Option<i32>,
    /// Creation order, never reused
    pub seq: u64,
}

/// Parameters of [`ProcessTable::create`]
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub name: String,
    pub entry: u32,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
    pub tag: AbiTag,
    pub parent: Option<Pid>,
}

impl ProcessSpec {
    pub fn new(name: &str, entry: u32) -> Self {
        Self {
            name: name.into(),
            entry,
            ..Self::default()
        }
    }

    pub fn args(mut self, argv: &[String]) -> Self {
        self.argv = argv.to_vec();
        self
    }

    pub fn env(mut self, envp: &[String]) -> Self {
        self.envp = envp.to_vec();
        self
    }

    pub fn abi(mut self, tag: AbiTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn parent(mut self, parent: Option<Pid>) -> Self {
        self.parent = parent;
        self
    }
}

/// Point-in-time view of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub state: ProcessState,
    pub tag: AbiTag,
    pub name: String,
    pub exit_status: Option<i32>,
}

impl From<&ProcessDescriptor> for ProcessSummary {
    fn from(d: &ProcessDescriptor) -> Self {
        Self {
            pid: d.pid,
            parent: d.parent,
            state: d.state,
            tag: d.abi.tag,
            name: d.name.clone(),
            exit_status: d.exit_status,
        }
    }
}

struct Inner {
    slots: Vec<Option<ProcessDescriptor>>,
    free: Vec<usize>,
    pid_to_index: HashMap<Pid, usize>,
    parent_to_children: HashMap<Pid, Vec<Pid>>,
    pids: PidPool,
    seq: u64,
}

impl Inner {
    fn get(&self, pid: Pid) -> Option<&ProcessDescriptor> {
        let idx = *self.pid_to_index.get(&pid)?;
        self.slots[idx].as_ref()
    }

    fn get_mut(&mut self, pid: Pid) -> Result<&mut ProcessDescriptor> {
        let idx = *self.pid_to_index.get(&pid).ok_or(Error::NoSuchProcess(pid))?;
        self.slots[idx].as_mut().ok_or(Error::NoSuchProcess(pid))
    }
}

const fn state_code(state: ProcessState) -> u64 {
    match state {
        ProcessState::Ready => 0,
        ProcessState::Running => 1,
        ProcessState::Blocked => 2,
        ProcessState::Zombie => 3,
    }
}

const fn state_from_code(code: u64) -> ProcessState {
    match code {
        0 => ProcessState::Ready,
        1 => ProcessState::Running,
        2 => ProcessState::Blocked,
        _ => ProcessState::Zombie,
    }
}

/// Lock-free view of the current process.
///
/// Word layout: PID in bits 0..32, tag in 32..40, state in 40..48. A zero
/// PID means nothing is current. Only written with the table lock held.
struct CurrentSlot {
    word: AtomicU64,
    flags: AtomicU32,
}

impl CurrentSlot {
    const fn new() -> Self {
        Self { word: AtomicU64::new(0), flags: AtomicU32::new(0) }
    }

    fn pack(pid: Pid, tag: AbiTag, state: ProcessState) -> u64 {
        u64::from(pid) | (tag.index() as u64) << 32 | state_code(state) << 40
    }

    fn pid(&self) -> Option<Pid> {
        match self.word.load(Ordering::Acquire) as u32 {
            0 => None,
            pid => Some(pid),
        }
    }

    fn load(&self) -> Option<CurrentProcess> {
        // Flags are stored before the word, so reading the word first sees them.
        let word = self.word.load(Ordering::Acquire);
        let pid = word as u32;
        if pid == 0 {
            return None;
        }
        let flags = AbiFlags::from_bits_retain(self.flags.load(Ordering::Acquire));
        Some(CurrentProcess {
            pid,
            tag: AbiTag::from_raw((word >> 32) as u32 & 0xff).unwrap_or(AbiTag::Unknown),
            state: state_from_code(word >> 40 & 0xff),
            flags,
        })
    }

    fn store(&self, proc: &ProcessDescriptor) {
        self.flags.store(proc.abi.flags.bits(), Ordering::Release);
        self.word
            .store(Self::pack(proc.pid, proc.abi.tag, proc.state), Ordering::Release);
    }

    /// Refreshes the mirror if `proc` is the current process
    fn refresh(&self, proc: &ProcessDescriptor) {
        if self.pid() == Some(proc.pid) {
            self.store(proc);
        }
    }

    fn clear_if(&self, pid: Pid) {
        if self.pid() == Some(pid) {
            self.word.store(0, Ordering::Release);
            self.flags.store(0, Ordering::Release);
        }
    }
}

/// Owner of every process descriptor
pub struct ProcessTable {
    inner: Mutex<Inner>,
    current: CurrentSlot,
    capacity: usize,
}

impl ProcessTable {
    /// Table with room for `capacity` processes issuing PIDs up to `max_pid`
    pub fn new(capacity: usize, max_pid: Pid) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        let mut pid_to_index = HashMap::new();
        pid_to_index.reserve(capacity);
        Self {
            inner: Mutex::new(Inner {
                slots,
                // Popped from the back, so slot 0 goes first.
                free: (0..capacity).rev().collect(),
                pid_to_index,
                parent_to_children: HashMap::new(),
                pids: PidPool::new(max_pid),
                seq: 0,
            }),
            current: CurrentSlot::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live descriptors, zombies included
    pub fn len(&self) -> usize {
        self.inner.lock().pid_to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a `Ready` process with an empty private blob
    pub fn create(&self, spec: ProcessSpec) -> Result<Pid> {
        let mut inner = self.inner.lock();
        if let Some(parent) = spec.parent {
            if inner.get(parent).is_none() {
                return Err(Error::NoSuchProcess(parent));
            }
        }
        let idx = inner.free.pop().ok_or(Error::OutOfMemory)?;
        let Some(pid) = inner.pids.alloc() else {
            inner.free.push(idx);
            return Err(Error::OutOfPids);
        };

        inner.seq += 1;
        let seq = inner.seq;
        inner.slots[idx] = Some(ProcessDescriptor {
            pid,
            parent: spec.parent,
            state: ProcessState::Ready,
            name: spec.name,
            entry: spec.entry,
            argv: spec.argv,
            envp: spec.envp,
            frame: TrapFrame::for_entry(spec.entry),
            abi: AbiContext::new(spec.tag),
            exit_status: None,
            seq,
        });
        inner.pid_to_index.insert(pid, idx);
        if let Some(parent) = spec.parent {
            inner.parent_to_children.entry(parent).or_default().push(pid);
        }
        debug!("proc: created pid {} ({}) under {}", pid, spec.tag, spec.parent.unwrap_or(0));
        Ok(pid)
    }

    /// Sets the ABI of `pid`.
    ///
    /// When the tag changes the old private blob is detached and returned
    /// with the old tag so the caller can run that ABI's cleanup.
    pub fn set_abi(&self, pid: Pid, tag: AbiTag) -> Result<Option<(AbiTag, AbiPrivate)>> {
        let mut inner = self.inner.lock();
        let proc = inner.get_mut(pid)?;
        if proc.state == ProcessState::Zombie {
            return Err(Error::InvalidState(alloc::format!("pid {} has exited", pid)));
        }
        let old = proc.abi.retag(tag);
        self.current.refresh(proc);
        if let Some((from, _)) = &old {
            debug!("proc: pid {} abi {} -> {}", pid, from, tag);
        }
        Ok(old)
    }

    /// Replaces the image of `pid` in place, as `exec` does
    pub fn replace_image(&self, pid: Pid, name: &str, entry: u32, argv: &[String], envp: &[String]) -> Result<()> {
        let mut inner = self.inner.lock();
        let proc = inner.get_mut(pid)?;
        if proc.state == ProcessState::Zombie {
            return Err(Error::InvalidState(alloc::format!("pid {} has exited", pid)));
        }
        proc.name = name.into();
        proc.entry = entry;
        proc.argv = argv.to_vec();
        proc.envp = envp.to_vec();
        proc.frame = TrapFrame::for_entry(entry);
        Ok(())
    }

    /// PID whose registers are loaded, read without locking
    pub fn current(&self) -> Option<Pid> {
        self.current.pid()
    }

    /// Context switch hook: makes `pid` Running and demotes the previous
    /// Running process to Ready. Returns the previous current PID.
    pub fn switch_to(&self, pid: Pid) -> Result<Option<Pid>> {
        let mut inner = self.inner.lock();
        let previous = self.current();
        let state = inner.get_mut(pid)?.state;
        match state {
            ProcessState::Ready => {}
            ProcessState::Running if previous == Some(pid) => return Ok(previous),
            other => {
                return Err(Error::InvalidState(alloc::format!(
                    "cannot switch to pid {} in state {}",
                    pid, other
                )));
            }
        }
        if let Some(prev) = previous {
            if let Ok(p) = inner.get_mut(prev) {
                if p.state == ProcessState::Running {
                    p.state = ProcessState::Ready;
                }
            }
        }
        let next = inner.get_mut(pid)?;
        next.state = ProcessState::Running;
        self.current.store(next);
        Ok(previous)
    }

    /// Marks a Ready or Running process as Blocked
    pub fn block(&self, pid: Pid) -> Result<()> {
        let mut inner = self.inner.lock();
        let proc = inner.get_mut(pid)?;
        match proc.state {
            ProcessState::Ready | ProcessState::Running => {
                proc.state = ProcessState::Blocked;
                self.current.refresh(proc);
                Ok(())
            }
            other => Err(Error::InvalidState(alloc::format!(
                "cannot block pid {} in state {}",
                pid, other
            ))),
        }
    }

    /// Returns a Blocked process to Ready
    pub fn unblock(&self, pid: Pid) -> Result<()> {
        let mut inner = self.inner.lock();
        let proc = inner.get_mut(pid)?;
        if proc.state != ProcessState::Blocked {
            return Err(Error::InvalidState(alloc::format!("pid {} is not blocked", pid)));
        }
        proc.state = ProcessState::Ready;
        self.current.refresh(proc);
        Ok(())
    }

    /// Turns `pid` into a Zombie. The first exit status sticks.
    pub fn terminate(&self, pid: Pid, status: i32) -> Result<()> {
        let mut inner = self.inner.lock();
        let proc = inner.get_mut(pid)?;
        if proc.state != ProcessState::Zombie {
            proc.state = ProcessState::Zombie;
            proc.exit_status = Some(status);
            self.current.refresh(proc);
            debug!("proc: pid {} exited with {}", pid, status);
        }
        Ok(())
    }

    /// Removes a Zombie and hands back its descriptor; the PID returns to
    /// the pool and any children lose their parent link.
    pub fn reap(&self, pid: Pid) -> Result<ProcessDescriptor> {
        let mut inner = self.inner.lock();
        if inner.get_mut(pid)?.state != ProcessState::Zombie {
            return Err(Error::InvalidState(alloc::format!("pid {} has not exited", pid)));
        }
        let idx = inner.pid_to_index.remove(&pid).ok_or(Error::NoSuchProcess(pid))?;
        let proc = inner.slots[idx].take().ok_or(Error::NoSuchProcess(pid))?;
        inner.free.push(idx);
        inner.pids.release(pid);

        if let Some(parent) = proc.parent {
            if let Some(siblings) = inner.parent_to_children.get_mut(&parent) {
                siblings.retain(|&c| c != pid);
            }
        }
        for child in inner.parent_to_children.remove(&pid).unwrap_or_default() {
            if let Ok(c) = inner.get_mut(child) {
                c.parent = None;
            }
        }
        self.current.clear_if(pid);
        debug!("proc: reaped pid {}", pid);
        Ok(proc)
    }

    /// Runs `f` on the descriptor of `pid`
    pub fn with_process<R>(&self, pid: Pid, f: impl FnOnce(&ProcessDescriptor) -> R) -> Option<R> {
        self.inner.lock().get(pid).map(f)
    }

    /// Runs `f` on the ABI context of `pid`; present from create to reap
    pub fn abi_context_of<R>(&self, pid: Pid, f: impl FnOnce(&AbiContext) -> R) -> Option<R> {
        self.with_process(pid, |p| f(&p.abi))
    }

    pub fn summary(&self, pid: Pid) -> Option<ProcessSummary> {
        self.with_process(pid, |p| ProcessSummary::from(p))
    }

    /// Every live process in creation order
    pub fn processes(&self) -> Vec<ProcessSummary> {
        let inner = self.inner.lock();
        let mut procs: Vec<&ProcessDescriptor> = inner.slots.iter().flatten().collect();
        procs.sort_by_key(|p| p.seq);
        procs.into_iter().map(ProcessSummary::from).collect()
    }

    pub fn children(&self, pid: Pid) -> Vec<Pid> {
        self.inner
            .lock()
            .parent_to_children
            .get(&pid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn frame(&self, pid: Pid) -> Option<TrapFrame> {
        self.with_process(pid, |p| p.frame)
    }
}

impl ProcessAccess for ProcessTable {
    fn current_pid(&self) -> Option<Pid> {
        self.current()
    }

    fn current_process(&self) -> Option<CurrentProcess> {
        self.current.load()
    }

    fn abi_tag(&self, pid: Pid) -> Option<AbiTag> {
        self.abi_context_of(pid, |ctx| ctx.tag)
    }

    fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.with_process(pid, |p| p.state)
    }

    fn parent_pid(&self, pid: Pid) -> Option<Pid> {
        self.with_process(pid, |p| p.parent).flatten()
    }

    fn abi_flags(&self, pid: Pid) -> Option<AbiFlags> {
        self.abi_context_of(pid, |ctx| ctx.flags)
    }

    fn set_abi_flags(&self, pid: Pid, flags: AbiFlags) -> Result<()> {
        let mut inner = self.inner.lock();
        let proc = inner.get_mut(pid)?;
        proc.abi.flags = flags;
        self.current.refresh(proc);
        Ok(())
    }

    fn with_private(&self, pid: Pid, f: &mut dyn FnMut(&mut AbiPrivate)) -> Result<()> {
        let mut inner = self.inner.lock();
        f(&mut inner.get_mut(pid)?.abi.private);
        Ok(())
    }

    fn terminate(&self, pid: Pid, status: i32) -> Result<()> {
        ProcessTable::terminate(self, pid, status)
    }
}
