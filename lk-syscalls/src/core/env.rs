//! What a syscall handler can reach
//!
//! Handlers are plain function references, so everything they touch comes in
//! through [`Caller`]: the calling PID and tag, and the [`SyscallEnv`] of
//! external collaborators.

use alloc::sync::Arc;

use lk_api::error::invalid_state;
use lk_api::{
    AbiFlags, AbiPrivate, AbiTag, Console, FileSystem, Pid, ProcessAccess, Result,
    Scheduler, UserMemory,
};

use crate::path::DriveMap;

/// External collaborators shared by every handler
#[derive(Clone)]
pub struct SyscallEnv {
    pub processes: Arc<dyn ProcessAccess>,
    pub drives: Arc<DriveMap>,
    pub console: Arc<dyn Console>,
    pub fs: Arc<dyn FileSystem>,
    pub memory: Arc<dyn UserMemory>,
    pub scheduler: Arc<dyn Scheduler>,
}

/// The process on whose behalf a handler runs
pub struct Caller<'a> {
    pid: Pid,
    tag: AbiTag,
    env: &'a SyscallEnv,
}

impl<'a> Caller<'a> {
    pub fn new(pid: Pid, tag: AbiTag, env: &'a SyscallEnv) -> Self {
        Self { pid, tag, env }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn tag(&self) -> AbiTag {
        self.tag
    }

    pub fn env(&self) -> &'a SyscallEnv {
        self.env
    }

    pub fn processes(&self) -> &'a dyn ProcessAccess {
        &*self.env.processes
    }

    pub fn drives(&self) -> &'a DriveMap {
        &self.env.drives
    }

    pub fn console(&self) -> &'a dyn Console {
        &*self.env.console
    }

    pub fn fs(&self) -> &'a dyn FileSystem {
        &*self.env.fs
    }

    pub fn memory(&self) -> &'a dyn UserMemory {
        &*self.env.memory
    }

    pub fn scheduler(&self) -> &'a dyn Scheduler {
        &*self.env.scheduler
    }

    pub fn parent_pid(&self) -> Option<Pid> {
        self.processes().parent_pid(self.pid)
    }

    pub fn flags(&self) -> AbiFlags {
        self.processes().abi_flags(self.pid).unwrap_or_default()
    }

    pub fn set_flags(&self, flags: AbiFlags) -> Result<()> {
        self.processes().set_abi_flags(self.pid, flags)
    }

    /// Runs `f` on the caller's ABI state of type `S`, creating a default
    /// one on first use.
    ///
    /// The descriptor stays locked while `f` runs; do collaborator I/O
    /// outside of it.
    pub fn with_state<S, R, F>(&self, f: F) -> Result<R>
    where
        S: Default + Send + 'static,
        F: FnOnce(&mut S) -> R,
    {
        let mut f = Some(f);
        let mut out = None;
        self.processes()
            .with_private(self.pid, &mut |blob: &mut AbiPrivate| {
                if let (Some(f), Some(state)) = (f.take(), blob.get_or_insert_with(S::default)) {
                    out = Some(f(state));
                }
            })?;
        out.ok_or_else(|| invalid_state("ABI state unavailable"))
    }

    /// Terminates the caller with exit `status`
    pub fn exit(&self, status: i32) -> Result<()> {
        self.processes().terminate(self.pid, status)
    }
}
