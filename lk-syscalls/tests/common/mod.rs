//! Shared fixture for the multiplexer integration tests
#![allow(dead_code)]

use std::sync::Arc;

use lk_api::testing::{BufferConsole, FlatMemory, MemFs, NoopScheduler, StaticProcesses};
use lk_api::{AbiTag, Pid};
use lk_syscalls::abi::builtin_tables;
use lk_syscalls::{AbiRegistry, DriveMap, Multiplexer, RingLogger, SyscallEnv};

pub const MEMORY_SIZE: usize = 0x1_0000;

pub struct Rig {
    pub mux: Multiplexer,
    pub registry: Arc<AbiRegistry>,
    pub processes: Arc<StaticProcesses>,
    pub console: Arc<BufferConsole>,
    pub fs: Arc<MemFs>,
    pub memory: Arc<FlatMemory>,
    pub scheduler: Arc<NoopScheduler>,
    pub ring: Arc<RingLogger>,
}

impl Rig {
    /// Initialized registry with no tables
    pub fn empty() -> Self {
        Self::with_drives(DriveMap::new())
    }

    pub fn with_drives(drives: DriveMap) -> Self {
        let processes = Arc::new(StaticProcesses::new());
        let console = Arc::new(BufferConsole::new());
        let fs = Arc::new(MemFs::new().with_dirs(&["/HardDisk", "/A", "/tmp"]));
        let memory = Arc::new(FlatMemory::new(MEMORY_SIZE));
        let scheduler = Arc::new(NoopScheduler::new());
        let ring = Arc::new(RingLogger::new(64));
        let registry = Arc::new(AbiRegistry::new());
        registry.initialize();

        let env = SyscallEnv {
            processes: processes.clone(),
            drives: Arc::new(drives),
            console: console.clone(),
            fs: fs.clone(),
            memory: memory.clone(),
            scheduler: scheduler.clone(),
        };
        let mux = Multiplexer::new(registry.clone(), env, ring.clone());
        Self {
            mux,
            registry,
            processes,
            console,
            fs,
            memory,
            scheduler,
            ring,
        }
    }

    /// Registry loaded with every built-in table
    pub fn builtin() -> Self {
        let rig = Self::empty();
        for (tag, table) in builtin_tables().unwrap() {
            rig.registry.register(tag, table).unwrap();
        }
        rig
    }

    /// Adds `pid` under `tag` and makes it current
    pub fn spawn(&self, pid: Pid, tag: AbiTag) {
        self.processes.insert(pid, None, tag);
        self.processes.set_current(pid);
    }

    /// Places a NUL-terminated string at `addr`
    pub fn cstr(&self, addr: u32, s: &str) -> u32 {
        self.memory.poke(addr, s.as_bytes());
        self.memory.poke(addr + s.len() as u32, &[0]);
        addr
    }
}
