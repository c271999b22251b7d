//! Kernel context
//!
//! One [`Kernel`] value owns every piece of the multi-ABI core. It is built
//! once by [`Kernel::boot`] and, on real hardware, parked in a global slot
//! that the assembly trap stubs reach through [`kernel`].

use alloc::string::String;
use alloc::sync::Arc;

use lk_api::error::invalid_state;
use lk_api::{
    AbiPrivate, AbiTag, Console, Error, FileSystem, Pid, Result, Scheduler, UserMemory,
};
use lk_syscalls::abi::{build_table, builtin_tables};
use lk_syscalls::{
    AbiRegistry, DispatchStats, Multiplexer, RingLogger, SyscallEnv, SyscallTable,
};
use log::info;

use crate::arch;
use crate::config::KernelConfig;
use crate::loader::{ImageLoader, LoaderRouter};
use crate::process::{ProcessSummary, ProcessTable};
use crate::trap::{self, TrapFrame};

/// Collaborators supplied by the platform at boot
#[derive(Clone)]
pub struct Platform {
    pub console: Arc<dyn Console>,
    pub fs: Arc<dyn FileSystem>,
    pub memory: Arc<dyn UserMemory>,
    pub scheduler: Arc<dyn Scheduler>,
    pub loader: Arc<dyn ImageLoader>,
}

pub struct Kernel {
    config: KernelConfig,
    processes: Arc<ProcessTable>,
    registry: Arc<AbiRegistry>,
    mux: Multiplexer,
    router: LoaderRouter,
    dispatch_log: Arc<RingLogger>,
}

impl Kernel {
    /// Installs the built-in ABI tables and wires the core together.
    ///
    /// A table that fails to build aborts the boot.
    pub fn boot(config: KernelConfig, platform: Platform) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(AbiRegistry::new());
        for (tag, table) in builtin_tables()? {
            registry.register(tag, table)?;
        }
        registry.initialize();

        let processes = Arc::new(ProcessTable::new(config.nproc, config.max_pid));
        let env = SyscallEnv {
            processes: processes.clone(),
            drives: Arc::new(config.drives.clone()),
            console: platform.console,
            fs: platform.fs,
            memory: platform.memory,
            scheduler: platform.scheduler,
        };
        let dispatch_log = Arc::new(RingLogger::forwarding(config.ring));
        let mux = Multiplexer::new(registry.clone(), env, dispatch_log.clone());
        mux.set_trace(config.sci_trace);
        let router = LoaderRouter::new(platform.loader, processes.clone());

        info!(
            "kernel: booted with {} ABIs, {} process slots",
            registry.registered().len(),
            config.nproc
        );
        Ok(Self {
            config,
            processes,
            registry,
            mux,
            router,
            dispatch_log,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn processes(&self) -> &Arc<ProcessTable> {
        &self.processes
    }

    pub fn registry(&self) -> &Arc<AbiRegistry> {
        &self.registry
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    pub fn router(&self) -> &LoaderRouter {
        &self.router
    }

    /// Recent dispatch failures, plus completions when tracing is on
    pub fn dispatch_log(&self) -> &RingLogger {
        &self.dispatch_log
    }

    pub fn stats(&self) -> DispatchStats {
        self.mux.stats()
    }

    /// Services one trap for the current process
    pub fn handle_trap(&self, frame: &mut TrapFrame) {
        trap::handle_trap(&self.mux, frame);
    }

    /// Loads `filename` as a new process tagged with its detected ABI
    pub fn load(&self, filename: &str, argv: &[String], envp: &[String], parent: Option<Pid>) -> Result<Pid> {
        self.router.load(filename, argv, envp, parent)
    }

    /// Replaces the image of `pid`, switching ABI when the new image needs it
    pub fn exec(&self, pid: Pid, filename: &str, argv: &[String], envp: &[String]) -> Result<AbiTag> {
        let outcome = self.router.exec(pid, filename, argv, envp)?;
        if let Some((old, blob)) = outcome.previous {
            self.run_cleanup(old, blob);
        }
        Ok(outcome.tag)
    }

    /// Moves `pid` to `tag`, tearing down the old ABI's private state
    pub fn set_abi(&self, pid: Pid, tag: AbiTag) -> Result<()> {
        if let Some((old, blob)) = self.processes.set_abi(pid, tag)? {
            self.run_cleanup(old, blob);
        }
        Ok(())
    }

    pub fn terminate(&self, pid: Pid, status: i32) -> Result<()> {
        self.processes.terminate(pid, status)
    }

    /// Frees a Zombie after giving its ABI a chance to release the blob
    pub fn reap(&self, pid: Pid) -> Result<ProcessSummary> {
        let proc = self.processes.reap(pid)?;
        let summary = ProcessSummary::from(&proc);
        self.run_cleanup(proc.abi.tag, proc.abi.private);
        Ok(summary)
    }

    /// Context switch hook; returns the previously current PID
    pub fn switch_to(&self, pid: Pid) -> Result<Option<Pid>> {
        arch::without_interrupts(|| self.processes.switch_to(pid))
    }

    /// Rebuilds the built-in table for `tag` and swaps it in
    pub fn reload_abi(&self, tag: AbiTag) -> Result<()> {
        let table = build_table(tag)
            .ok_or_else(|| Error::InvalidArgument(alloc::format!("no built-in table for {}", tag)))??;
        self.install_table(tag, table)
    }

    /// Installs `table` for `tag`, replacing what was there
    pub fn install_table(&self, tag: AbiTag, table: SyscallTable) -> Result<()> {
        arch::without_interrupts(|| self.registry.register(tag, table))?;
        Ok(())
    }

    fn run_cleanup(&self, tag: AbiTag, blob: AbiPrivate) {
        if let Some(cleanup) = self.registry.cleanup_for(tag) {
            cleanup(self.mux.env(), blob);
        }
    }
}

static KERNEL: spin::Once<Kernel> = spin::Once::new();

/// Parks `kernel` in the global slot used by the trap entry point.
///
/// Only the first call installs; later calls fail with `InvalidState`.
pub fn install(kernel: Kernel) -> Result<&'static Kernel> {
    let mut fresh = false;
    let installed = KERNEL.call_once(|| {
        fresh = true;
        kernel
    });
    if !fresh {
        return Err(invalid_state("kernel already installed"));
    }
    Ok(installed)
}

/// The installed kernel, if boot has finished
pub fn kernel() -> Option<&'static Kernel> {
    KERNEL.get()
}

/// Full boot path: parses `cmdline`, brings up logging on the console,
/// boots and installs the kernel.
pub fn start(cmdline: &str, platform: Platform) -> Result<&'static Kernel> {
    let config = KernelConfig::parse(cmdline)?;
    crate::log::init(platform.console.clone(), config.log_level)?;
    install(Kernel::boot(config, platform)?)
}
