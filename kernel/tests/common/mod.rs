//! Shared fixtures for the kernel integration tests
#![allow(dead_code)]

use std::sync::Arc;

use lk_api::testing::{BufferConsole, FlatMemory, MemFs, NoopScheduler};
use lk_api::Result;
use lk_kernel::{ImageLoader, Kernel, KernelConfig, LoadedImage, Platform, TrapFrame};
use mockall::mock;

pub const MEMORY_SIZE: usize = 0x1_0000;
pub const DOS_ENTRY: u32 = 0x100;
pub const LINUX_ENTRY: u32 = 0x0804_8000;
pub const NATIVE_ENTRY: u32 = 0x4000;

mock! {
    pub Loader {}

    impl ImageLoader for Loader {
        fn peek_header(&self, filename: &str) -> Option<Vec<u8>>;
        fn load_dos_exe(&self, filename: &str, argv: &[String], envp: &[String]) -> Result<LoadedImage>;
        fn load_linux_exe(&self, filename: &str, argv: &[String], envp: &[String]) -> Result<LoadedImage>;
        fn load_native_exe(&self, filename: &str, argv: &[String], envp: &[String]) -> Result<LoadedImage>;
    }
}

/// Loader that accepts every image and has no headers to show
pub fn permissive_loader() -> MockLoader {
    let mut loader = MockLoader::new();
    loader.expect_peek_header().returning(|_| None);
    loader
        .expect_load_dos_exe()
        .returning(|_, _, _| Ok(LoadedImage { entry: DOS_ENTRY }));
    loader
        .expect_load_linux_exe()
        .returning(|_, _, _| Ok(LoadedImage { entry: LINUX_ENTRY }));
    loader
        .expect_load_native_exe()
        .returning(|_, _, _| Ok(LoadedImage { entry: NATIVE_ENTRY }));
    loader
}

pub struct Machine {
    pub kernel: Kernel,
    pub console: Arc<BufferConsole>,
    pub fs: Arc<MemFs>,
    pub memory: Arc<FlatMemory>,
    pub scheduler: Arc<NoopScheduler>,
}

pub fn platform(loader: MockLoader) -> (Platform, Arc<BufferConsole>, Arc<MemFs>, Arc<FlatMemory>, Arc<NoopScheduler>) {
    let console = Arc::new(BufferConsole::new());
    let fs = Arc::new(MemFs::new().with_dirs(&["/HardDisk", "/A", "/tmp"]));
    let memory = Arc::new(FlatMemory::new(MEMORY_SIZE));
    let scheduler = Arc::new(NoopScheduler::new());
    let platform = Platform {
        console: console.clone(),
        fs: fs.clone(),
        memory: memory.clone(),
        scheduler: scheduler.clone(),
        loader: Arc::new(loader),
    };
    (platform, console, fs, memory, scheduler)
}

impl Machine {
    pub fn boot(cmdline: &str, loader: MockLoader) -> Self {
        let config = KernelConfig::parse(cmdline).unwrap();
        let (platform, console, fs, memory, scheduler) = platform(loader);
        let kernel = Kernel::boot(config, platform).unwrap();
        Self {
            kernel,
            console,
            fs,
            memory,
            scheduler,
        }
    }

    pub fn standard() -> Self {
        Self::boot("", permissive_loader())
    }

    /// Loads `filename` and makes it the running process
    pub fn run(&self, filename: &str) -> u32 {
        let pid = self.kernel.load(filename, &[], &[], None).unwrap();
        self.kernel.switch_to(pid).unwrap();
        pid
    }

    /// Raises a trap with `eax`, `ebx`, `ecx`, `edx` and returns EAX afterwards
    pub fn trap(&self, eax: u32, ebx: u32, ecx: u32, edx: u32) -> i32 {
        let mut frame = TrapFrame {
            eax,
            ebx,
            ecx,
            edx,
            ..TrapFrame::default()
        };
        self.kernel.handle_trap(&mut frame);
        frame.result()
    }

    pub fn cstr(&self, addr: u32, s: &str) -> u32 {
        self.memory.poke(addr, s.as_bytes());
        self.memory.poke(addr + s.len() as u32, &[0]);
        addr
    }
}
