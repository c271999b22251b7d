//! End-to-end tests: boot a kernel on in-memory collaborators and drive it
//! through the trap gateway.

mod common;

use std::sync::{mpsc, Arc};
use std::thread;

use common::{permissive_loader, Machine, MockLoader, DOS_ENTRY, LINUX_ENTRY};
use lk_api::{AbiPrivate, AbiTag, Error, Pid, ProcessAccess, ProcessState, MAX_ABI, SYSCALL_FAILURE};
use lk_kernel::loader::{KPI_MARKER, KPI_MARKER_OFFSET};
use lk_kernel::{detect, detect_image, lk_trap_entry, Kernel, LoadedImage, ProcessSpec, ProcessTable, TrapFrame};
use lk_syscalls::abi::dos::int21;
use lk_syscalls::abi::dos::kpi::{self, DOS_KPI_BASE};
use lk_syscalls::abi::{linux, native};
use lk_syscalls::{DispatchError, DispatchEvent};
use proptest::prelude::*;

const PATH: u32 = 0x100;

fn ah(function: u32) -> u32 {
    function << 8
}

#[test]
fn test_boot_installs_every_builtin_abi() {
    let m = Machine::standard();
    assert!(m.kernel.registry().is_initialized());
    assert_eq!(
        m.kernel.registry().registered(),
        [AbiTag::DosInterrupt, AbiTag::DosSyscall, AbiTag::Linux, AbiTag::Native]
    );
    assert_eq!(m.kernel.processes().capacity(), 64);
}

#[test]
fn test_boot_rejects_bad_config() {
    let (platform, ..) = common::platform(permissive_loader());
    let config = lk_kernel::KernelConfig {
        nproc: 0,
        ..Default::default()
    };
    assert!(matches!(Kernel::boot(config, platform), Err(Error::ConfigError(_))));
}

#[test]
fn test_router_selects_abi_by_name() {
    let m = Machine::standard();
    let elf = m.kernel.load("prog.elf", &[], &[], None).unwrap();
    let exe = m.kernel.load("PROG.EXE", &[], &[], None).unwrap();
    let tool = m.kernel.load("tool", &[], &[], None).unwrap();

    let procs = m.kernel.processes();
    assert_eq!(procs.abi_tag(elf), Some(AbiTag::Linux));
    assert_eq!(procs.abi_tag(exe), Some(AbiTag::DosInterrupt));
    assert_eq!(procs.abi_tag(tool), Some(AbiTag::Native));
    assert_eq!(procs.frame(elf).map(|f| f.eip), Some(LINUX_ENTRY));
    assert_eq!(procs.state(tool), Some(ProcessState::Ready));
}

#[test]
fn test_dos_char_out_through_trap() {
    let m = Machine::standard();
    m.run("HELLO.EXE");
    assert_eq!(m.trap(ah(int21::nr::CHAR_OUTPUT), 0, 0, u32::from(b'H')), 0);
    assert_eq!(m.console.output(), b"H");
}

#[test]
fn test_linux_getpid_through_trap() {
    let m = Machine::standard();
    m.run("first.elf");
    let pid = m.run("second.elf");
    assert_eq!(m.trap(linux::nr::GETPID, 0, 0, 0), pid as i32);
}

#[test]
fn test_out_of_range_is_logged() {
    let m = Machine::standard();
    m.run("a.out");
    assert_eq!(m.trap(500, 0, 0, 0), SYSCALL_FAILURE);
    assert_eq!(
        m.kernel.dispatch_log().last(),
        Some(DispatchEvent::Rejected(DispatchError::OutOfRange {
            tag: AbiTag::Linux,
            number: 500,
            max: linux::TABLE_SIZE,
        }))
    );
    assert_eq!(m.kernel.stats().out_of_range, 1);
    assert_eq!(m.kernel.stats().completed, 0);
}

#[test]
fn test_missing_table_reports_no_table() {
    let m = Machine::standard();
    m.kernel.registry().unregister(AbiTag::DosSyscall);
    let pid = m.run("kpi.exe");
    m.kernel.set_abi(pid, AbiTag::DosSyscall).unwrap();

    assert_eq!(m.trap(DOS_KPI_BASE + kpi::nr::GETPID, 0, 0, 0), SYSCALL_FAILURE);
    assert_eq!(
        m.kernel.dispatch_log().last(),
        Some(DispatchEvent::Rejected(DispatchError::NoTable { tag: AbiTag::DosSyscall }))
    );
}

#[test]
fn test_kpi_trap_subtracts_base() {
    let m = Machine::standard();
    let pid = m.run("kpi.exe");
    m.kernel.set_abi(pid, AbiTag::DosSyscall).unwrap();
    assert_eq!(m.trap(DOS_KPI_BASE + kpi::nr::GETPID, 0, 0, 0), pid as i32);
    // Below the base wraps past the end of the table
    assert_eq!(m.trap(kpi::nr::GETPID, 0, 0, 0), SYSCALL_FAILURE);
}

#[test]
fn test_trap_without_current_process() {
    let m = Machine::standard();
    assert_eq!(m.trap(linux::nr::GETPID, 0, 0, 0), SYSCALL_FAILURE);
    assert_eq!(
        m.kernel.dispatch_log().last(),
        Some(DispatchEvent::Rejected(DispatchError::NoAbi { pid: None }))
    );
}

#[test]
fn test_untagged_process_reports_no_abi() {
    let m = Machine::standard();
    let pid = m.kernel.processes().create(ProcessSpec::new("raw", 0)).unwrap();
    m.kernel.switch_to(pid).unwrap();
    assert_eq!(m.trap(0, 0, 0, 0), SYSCALL_FAILURE);
    assert_eq!(
        m.kernel.dispatch_log().last(),
        Some(DispatchEvent::Rejected(DispatchError::NoAbi { pid: Some(pid) }))
    );
}

#[test]
fn test_exit_then_zombie_is_rejected_and_reaped() {
    let m = Machine::standard();
    let pid = m.run("a.out");
    assert_eq!(m.trap(linux::nr::EXIT, 5, 0, 0), 0);
    assert_eq!(m.kernel.processes().state(pid), Some(ProcessState::Zombie));

    assert_eq!(m.trap(linux::nr::GETPID, 0, 0, 0), SYSCALL_FAILURE);
    assert_eq!(m.kernel.stats().terminated, 1);

    let summary = m.kernel.reap(pid).unwrap();
    assert_eq!(summary.exit_status, Some(5));
    assert_eq!(summary.tag, AbiTag::Linux);
    assert!(m.kernel.processes().is_empty());
    assert_eq!(m.kernel.processes().current(), None);
}

#[test]
fn test_trap_completes_while_another_cpu_holds_the_table() {
    let m = Machine::standard();
    let pid = m.run("busy.elf");
    let table = m.kernel.processes().clone();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        s.spawn(move || {
            table
                .with_private(pid, &mut |_: &mut AbiPrivate| {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .unwrap();
        });
        entered_rx.recv().unwrap();

        let result = m.trap(linux::nr::GETPID, 0, 0, 0);
        release_tx.send(()).unwrap();
        assert_eq!(result, pid as i32);
    });
}

#[test]
fn test_reap_runs_abi_cleanup() {
    let m = Machine::standard();
    let pid = m.run("EDIT.COM");
    m.cstr(PATH, "C:\\NOTES.TXT");
    let handle = m.trap(ah(int21::nr::CREATE), 0, 0, PATH);
    assert!(handle >= 5, "create returned {}", handle);
    assert_eq!(m.fs.open_count(), 1);

    m.kernel.terminate(pid, 0).unwrap();
    m.kernel.reap(pid).unwrap();
    assert_eq!(m.fs.open_count(), 0);
    assert!(m.fs.contents("/HardDisk/NOTES.TXT").is_some());
}

#[test]
fn test_exec_switches_abi_and_releases_old_state() {
    let m = Machine::standard();
    let pid = m.run("SETUP.EXE");
    m.cstr(PATH, "C:\\SETUP.LOG");
    assert!(m.trap(ah(int21::nr::CREATE), 0, 0, PATH) >= 5);
    assert_eq!(m.fs.open_count(), 1);

    let tag = m.kernel.exec(pid, "install.elf", &["install.elf".into()], &[]).unwrap();
    assert_eq!(tag, AbiTag::Linux);
    assert_eq!(m.fs.open_count(), 0);

    let procs = m.kernel.processes();
    assert_eq!(procs.abi_tag(pid), Some(AbiTag::Linux));
    assert_eq!(procs.frame(pid).map(|f| f.eip), Some(LINUX_ENTRY));
    assert_eq!(procs.with_process(pid, |p| p.argv.clone()), Some(vec!["install.elf".to_string()]));
    assert_eq!(m.trap(linux::nr::GETPID, 0, 0, 0), pid as i32);
}

#[test]
fn test_exec_unknown_pid() {
    let m = Machine::standard();
    assert_eq!(m.kernel.exec(9, "x.elf", &[], &[]), Err(Error::NoSuchProcess(9)));
}

#[test]
fn test_kpi_marker_and_inheritance() {
    let mut loader = MockLoader::new();
    loader.expect_peek_header().returning(|name| {
        (name == "kpi.exe").then(|| {
            let mut header = vec![0u8; 0x20];
            header[..2].copy_from_slice(b"MZ");
            header[KPI_MARKER_OFFSET..KPI_MARKER_OFFSET + 4].copy_from_slice(KPI_MARKER);
            header
        })
    });
    loader
        .expect_load_dos_exe()
        .returning(|_, _, _| Ok(LoadedImage { entry: DOS_ENTRY }));
    let m = Machine::boot("", loader);

    let shell = m.kernel.load("kpi.exe", &[], &[], None).unwrap();
    let child = m.kernel.load("child.exe", &[], &[], Some(shell)).unwrap();
    let orphan = m.kernel.load("child.exe", &[], &[], None).unwrap();

    let procs = m.kernel.processes();
    assert_eq!(procs.abi_tag(shell), Some(AbiTag::DosSyscall));
    assert_eq!(procs.abi_tag(child), Some(AbiTag::DosSyscall));
    assert_eq!(procs.parent_pid(child), Some(shell));
    assert_eq!(procs.abi_tag(orphan), Some(AbiTag::DosInterrupt));
}

#[test]
fn test_load_failure_creates_nothing() {
    let mut loader = MockLoader::new();
    loader.expect_peek_header().returning(|_| None);
    loader
        .expect_load_linux_exe()
        .returning(|_, _, _| Err(Error::LoadFailed("truncated program header".into())));
    let m = Machine::boot("", loader);

    assert!(matches!(
        m.kernel.load("broken.elf", &[], &[], None),
        Err(Error::LoadFailed(_))
    ));
    assert!(m.kernel.processes().is_empty());
}

#[test]
fn test_process_table_full() {
    let m = Machine::boot("nproc=2 maxpid=10", permissive_loader());
    m.kernel.load("a", &[], &[], None).unwrap();
    m.kernel.load("b", &[], &[], None).unwrap();
    assert_eq!(m.kernel.load("c", &[], &[], None), Err(Error::OutOfMemory));
}

#[test]
fn test_reload_abi_keeps_dispatch_working() {
    let m = Machine::standard();
    let pid = m.run("daemon");
    m.kernel.reload_abi(AbiTag::Native).unwrap();
    assert_eq!(m.trap(native::nr::GETPID, 0, 0, 0), pid as i32);
    assert!(matches!(
        m.kernel.reload_abi(AbiTag::Unknown),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_trace_flag_records_completions() {
    let m = Machine::boot("sci.trace=1 loglevel=off", permissive_loader());
    let pid = m.run("daemon");
    m.trap(native::nr::GET_ABI, 0, 0, 0);
    assert!(matches!(
        m.kernel.dispatch_log().last(),
        Some(DispatchEvent::Completed { pid: p, tag: AbiTag::Native, .. }) if p == pid
    ));
}

#[test]
fn test_custom_drive_from_cmdline() {
    let m = Machine::boot("drive.d=/tmp", permissive_loader());
    m.run("SAVE.EXE");
    m.cstr(PATH, "D:\\GAME.SAV");
    assert!(m.trap(ah(int21::nr::CREATE), 0, 0, PATH) >= 5);
    assert!(m.fs.contents("/tmp/GAME.SAV").is_some());
}

#[test]
fn test_trap_entry_uses_installed_kernel() {
    let (platform, ..) = common::platform(permissive_loader());
    let kernel = lk_kernel::start("loglevel=warn nproc=8", platform).unwrap();
    assert!(std::ptr::eq(kernel, lk_kernel::kernel().unwrap()));

    let pid = kernel.load("init", &[], &[], None).unwrap();
    kernel.switch_to(pid).unwrap();
    let mut frame = TrapFrame {
        eax: native::nr::GETPID,
        ..TrapFrame::default()
    };
    unsafe { lk_trap_entry(&mut frame) };
    assert_eq!(frame.result(), pid as i32);
    unsafe { lk_trap_entry(std::ptr::null_mut()) };

    let (platform, ..) = common::platform(permissive_loader());
    let second = Kernel::boot(Default::default(), platform).unwrap();
    assert!(matches!(lk_kernel::install(second), Err(Error::InvalidState(_))));
}

#[test]
fn test_switch_keeps_dispatch_on_the_right_process() {
    let m = Machine::standard();
    let dos = m.run("A.EXE");
    let elf = m.run("b.elf");
    assert_eq!(m.kernel.processes().state(dos), Some(ProcessState::Ready));
    assert_eq!(m.trap(linux::nr::GETPID, 0, 0, 0), elf as i32);

    m.kernel.switch_to(dos).unwrap();
    assert_eq!(m.trap(ah(int21::nr::CHAR_OUTPUT), 0, 0, u32::from(b'!')), 0);
    assert_eq!(m.console.output_string(), "!");
    assert_eq!(m.kernel.stats().calls_for(AbiTag::DosInterrupt), 1);
    assert_eq!(m.kernel.stats().calls_for(AbiTag::Linux), 1);
}

#[test]
fn test_shared_process_table_is_the_dispatch_view() {
    let m = Machine::standard();
    let pid = m.run("tool");
    let table: Arc<ProcessTable> = m.kernel.processes().clone();
    assert_eq!(table.current_pid(), Some(pid));
    assert_eq!(m.kernel.multiplexer().env().processes.current_pid(), Some(pid));
}

proptest! {
    #[test]
    fn prop_abi_context_lives_until_reap(ops in prop::collection::vec((0u8..5, 0usize..16), 1..40)) {
        let table = ProcessTable::new(8, 64);
        let mut live: Vec<Pid> = Vec::new();
        let mut reaped: Vec<Pid> = Vec::new();

        for (op, pick) in ops {
            match op {
                0 | 1 => {
                    let tag = AbiTag::ALL[pick % MAX_ABI];
                    if let Ok(pid) = table.create(ProcessSpec::new("p", 0).abi(tag)) {
                        live.push(pid);
                    }
                }
                2 if !live.is_empty() => {
                    let pid = live[pick % live.len()];
                    let _ = table.set_abi(pid, AbiTag::ALL[pick % MAX_ABI]);
                }
                3 if !live.is_empty() => {
                    let pid = live[pick % live.len()];
                    table.terminate(pid, 0).unwrap();
                }
                4 if !live.is_empty() => {
                    let pid = live.swap_remove(pick % live.len());
                    table.terminate(pid, 0).unwrap();
                    table.reap(pid).unwrap();
                    reaped.push(pid);
                }
                _ => {}
            }
            for &pid in &live {
                prop_assert!(table.abi_context_of(pid, |_| ()).is_some());
            }
            for &pid in &reaped {
                prop_assert!(table.abi_context_of(pid, |_| ()).is_none());
            }
        }
    }

    #[test]
    fn prop_detect_is_total(name in ".*") {
        let tag = detect(&name);
        prop_assert!(matches!(tag, AbiTag::DosInterrupt | AbiTag::Linux | AbiTag::Native));
    }

    #[test]
    fn prop_detect_image_never_unknown(name in ".{0,12}", header in prop::collection::vec(any::<u8>(), 0..40)) {
        prop_assert_ne!(detect_image(&name, Some(&header)), AbiTag::Unknown);
    }
}
