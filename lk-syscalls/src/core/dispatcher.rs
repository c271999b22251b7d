//! System call dispatcher
//!
//! [`Multiplexer::try_dispatch_as`] is the whole algorithm: validate the tag,
//! look up the table, bounds-check the number, reject null slots, run the
//! handler. Every rejection is counted, reported to the logger and, on the
//! `i32` entry points, folded into `-1`. Nothing on this path panics and no
//! lock is held while the handler runs.

use alloc::sync::Arc;
use ::core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use lk_api::{AbiFlags, AbiTag, Pid, SyscallArgs, SyscallNumber, MAX_ABI, SYSCALL_FAILURE};

use super::env::{Caller, SyscallEnv};
use super::error::{DispatchError, DispatchEvent};
use super::registry::AbiRegistry;
use super::traits::SyscallLogger;

/// Snapshot of dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Every dispatch attempt
    pub total_calls: u64,
    /// Attempts that reached a handler
    pub completed: u64,
    pub bad_abi: u64,
    pub no_table: u64,
    pub out_of_range: u64,
    pub unimplemented: u64,
    pub terminated: u64,
    /// Completed calls per tag, indexed by `AbiTag::index`
    pub calls_by_abi: [u64; MAX_ABI],
}

impl DispatchStats {
    /// Number of rejected dispatches
    pub fn error_count(&self) -> u64 {
        self.bad_abi + self.no_table + self.out_of_range + self.unimplemented + self.terminated
    }

    pub fn calls_for(&self, tag: AbiTag) -> u64 {
        self.calls_by_abi[tag.index()]
    }
}

#[derive(Default)]
struct Counters {
    total_calls: AtomicU64,
    completed: AtomicU64,
    bad_abi: AtomicU64,
    no_table: AtomicU64,
    out_of_range: AtomicU64,
    unimplemented: AtomicU64,
    terminated: AtomicU64,
    calls_by_abi: [AtomicU64; MAX_ABI],
}

impl Counters {
    fn record_error(&self, err: &DispatchError) {
        let counter = match err {
            DispatchError::NoAbi { .. } => &self.bad_abi,
            DispatchError::NoTable { .. } => &self.no_table,
            DispatchError::OutOfRange { .. } => &self.out_of_range,
            DispatchError::Unimplemented { .. } => &self.unimplemented,
            DispatchError::Terminated { .. } => &self.terminated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DispatchStats {
            total_calls: load(&self.total_calls),
            completed: load(&self.completed),
            bad_abi: load(&self.bad_abi),
            no_table: load(&self.no_table),
            out_of_range: load(&self.out_of_range),
            unimplemented: load(&self.unimplemented),
            terminated: load(&self.terminated),
            calls_by_abi: ::core::array::from_fn(|i| load(&self.calls_by_abi[i])),
        }
    }
}

/// The SCI multiplexer
pub struct Multiplexer {
    registry: Arc<AbiRegistry>,
    env: SyscallEnv,
    logger: Arc<dyn SyscallLogger>,
    counters: Counters,
    trace: AtomicBool,
}

impl Multiplexer {
    pub fn new(registry: Arc<AbiRegistry>, env: SyscallEnv, logger: Arc<dyn SyscallLogger>) -> Self {
        Self {
            registry,
            env,
            logger,
            counters: Counters::default(),
            trace: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<AbiRegistry> {
        &self.registry
    }

    pub fn env(&self) -> &SyscallEnv {
        &self.env
    }

    pub fn logger(&self) -> &Arc<dyn SyscallLogger> {
        &self.logger
    }

    /// Turns per-dispatch trace events on or off for every process
    pub fn set_trace(&self, on: bool) {
        self.trace.store(on, Ordering::Relaxed);
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Dispatches on behalf of the current process under an explicit tag
    pub fn dispatch(&self, tag: AbiTag, number: SyscallNumber, args: SyscallArgs) -> i32 {
        self.try_dispatch(tag, number, args).unwrap_or(SYSCALL_FAILURE)
    }

    /// Like [`dispatch`](Self::dispatch) but takes the tag as a raw word,
    /// rejecting values past the last ABI
    pub fn dispatch_raw(&self, raw_tag: u32, number: SyscallNumber, args: SyscallArgs) -> i32 {
        match AbiTag::from_raw(raw_tag) {
            Some(tag) => self.dispatch(tag, number, args),
            None => {
                self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
                let pid = self.env.processes.current_pid();
                self.reject(DispatchError::NoAbi { pid });
                SYSCALL_FAILURE
            }
        }
    }

    /// Dispatches for the current process using its own tag
    pub fn dispatch_current(&self, number: SyscallNumber, args: SyscallArgs) -> i32 {
        self.try_dispatch_current(number, args).unwrap_or(SYSCALL_FAILURE)
    }

    pub fn try_dispatch(
        &self,
        tag: AbiTag,
        number: SyscallNumber,
        args: SyscallArgs,
    ) -> Result<i32, DispatchError> {
        let pid = self.env.processes.current_pid().unwrap_or(0);
        self.try_dispatch_as(pid, tag, number, args)
    }

    /// Resolves the current process and its tag, rejecting zombies, then
    /// dispatches. The process is read through one lock-free snapshot.
    pub fn try_dispatch_current(
        &self,
        number: SyscallNumber,
        args: SyscallArgs,
    ) -> Result<i32, DispatchError> {
        let Some(current) = self.env.processes.current_process() else {
            self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
            return Err(self.reject(DispatchError::NoAbi { pid: None }));
        };
        if !current.state.is_alive() {
            self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
            return Err(self.reject(DispatchError::Terminated { pid: current.pid }));
        }
        self.dispatch_with(current.pid, current.tag, Some(current.flags), number, args)
    }

    /// Dispatches syscall `number` of ABI `tag` on behalf of `pid`
    pub fn try_dispatch_as(
        &self,
        pid: Pid,
        tag: AbiTag,
        number: SyscallNumber,
        args: SyscallArgs,
    ) -> Result<i32, DispatchError> {
        self.dispatch_with(pid, tag, None, number, args)
    }

    /// `flags` is the caller's flag word when already known
    fn dispatch_with(
        &self,
        pid: Pid,
        tag: AbiTag,
        flags: Option<AbiFlags>,
        number: SyscallNumber,
        args: SyscallArgs,
    ) -> Result<i32, DispatchError> {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);

        if !tag.is_dispatchable() {
            let pid = (pid != 0).then_some(pid);
            return Err(self.reject(DispatchError::NoAbi { pid }));
        }

        // The Arc keeps the table alive even if it is replaced mid-call.
        let Some(table) = self.registry.lookup(tag) else {
            return Err(self.reject(DispatchError::NoTable { tag }));
        };

        let max = table.max_syscall_num();
        if number >= max {
            return Err(self.reject(DispatchError::OutOfRange { tag, number, max }));
        }

        let Some(handler) = table.handler(number) else {
            let name = table.name(number).cloned();
            return Err(self.reject(DispatchError::Unimplemented { tag, number, name }));
        };

        let caller = Caller::new(pid, tag, &self.env);
        let result = handler(&caller, args);

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.counters.calls_by_abi[tag.index()].fetch_add(1, Ordering::Relaxed);

        if self.should_trace(pid, flags) {
            self.logger.log(&DispatchEvent::Completed {
                pid,
                tag,
                number,
                name: table.name(number).cloned(),
                result,
            });
        }
        Ok(result)
    }

    fn should_trace(&self, pid: Pid, flags: Option<AbiFlags>) -> bool {
        self.trace_enabled()
            || flags
                .or_else(|| self.env.processes.abi_flags(pid))
                .is_some_and(|f| f.contains(AbiFlags::TRACE))
    }

    fn reject(&self, err: DispatchError) -> DispatchError {
        self.counters.record_error(&err);
        self.logger.log(&DispatchEvent::Rejected(err.clone()));
        err
    }
}
