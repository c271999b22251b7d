//! Process management interface
//!
//! Syscall handlers never see the process table itself. They reach the
//! calling process through [`ProcessAccess`] and the scheduler through
//! [`Scheduler`], both implemented outside this crate.

use crate::core::context::AbiPrivate;
use crate::core::types::{AbiFlags, AbiTag, Pid, ProcessState};
use crate::error::Result;

/// The process whose frame is in the CPU, as the dispatcher sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentProcess {
    pub pid: Pid,
    pub tag: AbiTag,
    pub state: ProcessState,
    pub flags: AbiFlags,
}

/// Read and narrow write access to process descriptors
pub trait ProcessAccess: Send + Sync {
    /// PID of the process whose frame is in the CPU, if any
    fn current_pid(&self) -> Option<Pid>;

    /// Pid, tag, state and flags of the current process.
    ///
    /// The trap path calls this with interrupts off, so implementations
    /// backing a real kernel must answer without taking a lock.
    fn current_process(&self) -> Option<CurrentProcess> {
        let pid = self.current_pid()?;
        Some(CurrentProcess {
            pid,
            tag: self.abi_tag(pid)?,
            state: self.state(pid)?,
            flags: self.abi_flags(pid).unwrap_or_default(),
        })
    }

    /// ABI tag of `pid`
    fn abi_tag(&self, pid: Pid) -> Option<AbiTag>;

    /// Lifecycle state of `pid`
    fn state(&self, pid: Pid) -> Option<ProcessState>;

    /// Parent of `pid`; `None` for the first process
    fn parent_pid(&self, pid: Pid) -> Option<Pid>;

    /// ABI flag word of `pid`
    fn abi_flags(&self, pid: Pid) -> Option<AbiFlags>;

    /// Replaces the ABI flag word of `pid`
    fn set_abi_flags(&self, pid: Pid, flags: AbiFlags) -> Result<()>;

    /// Runs `f` on the private blob of `pid`.
    ///
    /// The descriptor is locked while `f` runs, so `f` must not call back
    /// into this trait.
    fn with_private(&self, pid: Pid, f: &mut dyn FnMut(&mut AbiPrivate)) -> Result<()>;

    /// Marks `pid` as a zombie with exit `status`
    fn terminate(&self, pid: Pid, status: i32) -> Result<()>;
}

/// Why a process is blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Waiting for console input
    ConsoleInput,
    /// Waiting for a child to exit
    Child(Pid),
    /// Waiting on a timer
    Sleep,
}

/// Scheduler entry points used by syscall handlers
pub trait Scheduler: Send + Sync {
    /// Gives up the CPU voluntarily
    fn yield_now(&self);

    /// Blocks `pid` until [`Scheduler::unblock`] is called for it
    fn block_on(&self, pid: Pid, reason: BlockReason) -> Result<()>;

    /// Makes a blocked process runnable again
    fn unblock(&self, pid: Pid) -> Result<()>;

    /// Picks the next process to run
    fn schedule(&self) -> Option<Pid>;
}
