//! Dispatch behaviour of the multiplexer

mod common;

use common::Rig;
use lk_api::{AbiTag, SyscallArgs};
use lk_syscalls::{Caller, DispatchError, DispatchEvent, SyscallTable};
use proptest::prelude::*;

fn capture_low_byte(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    caller.console().write_bytes(&[args.a1 as u8]);
    0
}

fn current_pid(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.pid() as i32
}

fn mark_a(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.console().write_bytes(b"a");
    100
}

fn mark_b(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.console().write_bytes(b"b");
    200
}

fn mark_c(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    caller.console().write_bytes(b"c");
    300
}

const TABLE_LEN: u32 = 48;

/// Slots cycle through three handlers and a null: n % 4 == 3 is empty
fn patterned_table(len: u32) -> SyscallTable {
    (0..len)
        .fold(SyscallTable::builder(len), |b, n| match n % 4 {
            0 => b.unnamed(n, mark_a),
            1 => b.unnamed(n, mark_b),
            2 => b.unnamed(n, mark_c),
            _ => b,
        })
        .build()
        .unwrap()
}

fn expected(n: u32) -> i32 {
    match n % 4 {
        0 => 100,
        1 => 200,
        2 => 300,
        _ => -1,
    }
}

fn linux_rig(max: u32) -> Rig {
    let rig = Rig::empty();
    let table = SyscallTable::builder(max)
        .handler(20, "getpid", current_pid)
        .build()
        .unwrap();
    rig.registry.register(AbiTag::Linux, table).unwrap();
    rig
}

#[test]
fn test_dos_char_out_writes_capture_buffer() {
    let rig = Rig::empty();
    let table = SyscallTable::builder(0x100)
        .handler(0x02, "char_output", capture_low_byte)
        .build()
        .unwrap();
    rig.registry.register(AbiTag::DosInterrupt, table).unwrap();
    rig.spawn(1, AbiTag::DosInterrupt);

    let r = rig
        .mux
        .dispatch(AbiTag::DosInterrupt, 0x02, SyscallArgs::with1(u32::from(b'H')));
    assert_eq!(r, 0);
    assert_eq!(rig.console.output(), b"H");
}

#[test]
fn test_linux_getpid_passthrough() {
    let rig = linux_rig(334);
    rig.spawn(7, AbiTag::Linux);
    assert_eq!(rig.mux.dispatch(AbiTag::Linux, 20, SyscallArgs::empty()), 7);
}

#[test]
fn test_out_of_range_is_logged_with_bounds() {
    let rig = linux_rig(334);
    rig.spawn(7, AbiTag::Linux);

    assert_eq!(rig.mux.dispatch(AbiTag::Linux, 500, SyscallArgs::empty()), -1);
    assert_eq!(
        rig.ring.last(),
        Some(DispatchEvent::Rejected(DispatchError::OutOfRange {
            tag: AbiTag::Linux,
            number: 500,
            max: 334,
        }))
    );
    let stats = rig.mux.stats();
    assert_eq!(stats.out_of_range, 1);
    assert_eq!(stats.completed, 0);
}

#[test]
fn test_unregistered_abi_reports_no_table() {
    let rig = linux_rig(334);
    rig.spawn(3, AbiTag::DosSyscall);

    for number in [0, 1, 99, 4000] {
        assert_eq!(rig.mux.dispatch_current(number, SyscallArgs::empty()), -1);
        assert_eq!(
            rig.ring.last(),
            Some(DispatchEvent::Rejected(DispatchError::NoTable {
                tag: AbiTag::DosSyscall,
            }))
        );
    }
    assert_eq!(rig.mux.stats().no_table, 4);
}

#[test]
fn test_unknown_tag_logs_pid() {
    let rig = linux_rig(334);
    rig.spawn(9, AbiTag::Unknown);
    assert_eq!(rig.mux.dispatch_current(20, SyscallArgs::empty()), -1);
    assert_eq!(
        rig.mux.try_dispatch(AbiTag::Unknown, 20, SyscallArgs::empty()),
        Err(DispatchError::NoAbi { pid: Some(9) })
    );
    assert_eq!(rig.mux.stats().bad_abi, 2);
}

#[test]
fn test_replacement_keeps_in_flight_table() {
    let rig = linux_rig(334);
    rig.spawn(7, AbiTag::Linux);
    let held = rig.registry.lookup(AbiTag::Linux).unwrap();
    rig.registry
        .register(AbiTag::Linux, SyscallTable::builder(10).build().unwrap())
        .unwrap();

    assert_eq!(held.max_syscall_num(), 334);
    assert_eq!(rig.mux.dispatch(AbiTag::Linux, 20, SyscallArgs::empty()), -1);
}

proptest! {
    #[test]
    fn prop_dispatch_is_deterministic(history in prop::collection::vec(0u32..TABLE_LEN, 1..40)) {
        let rig = Rig::empty();
        rig.registry.register(AbiTag::Native, patterned_table(TABLE_LEN)).unwrap();
        rig.spawn(1, AbiTag::Native);

        for n in history {
            let r = rig.mux.dispatch(AbiTag::Native, n, SyscallArgs::empty());
            prop_assert_eq!(r, expected(n));
        }
    }

    #[test]
    fn prop_replacing_one_abi_leaves_others(n in 0u32..TABLE_LEN, other_len in 1u32..600) {
        let rig = Rig::empty();
        rig.registry.register(AbiTag::Native, patterned_table(TABLE_LEN)).unwrap();
        rig.registry.register(AbiTag::Linux, patterned_table(TABLE_LEN)).unwrap();
        rig.spawn(1, AbiTag::Native);

        let before = rig.mux.dispatch(AbiTag::Native, n, SyscallArgs::empty());
        rig.registry
            .register(AbiTag::Linux, SyscallTable::builder(other_len).build().unwrap())
            .unwrap();
        let after = rig.mux.dispatch(AbiTag::Native, n, SyscallArgs::empty());
        prop_assert_eq!(before, after);
    }

    #[test]
    fn prop_out_of_range_runs_nothing(n in TABLE_LEN..u32::MAX, args in any::<[u32; 6]>()) {
        let rig = Rig::empty();
        rig.registry.register(AbiTag::Native, patterned_table(TABLE_LEN)).unwrap();
        rig.spawn(1, AbiTag::Native);

        let r = rig.mux.dispatch(AbiTag::Native, n, SyscallArgs::from_array(args));
        prop_assert_eq!(r, -1);
        prop_assert!(rig.console.output().is_empty());
    }

    #[test]
    fn prop_null_slot_runs_nothing(k in 0u32..(TABLE_LEN / 4), args in any::<[u32; 6]>()) {
        let rig = Rig::empty();
        rig.registry.register(AbiTag::Native, patterned_table(TABLE_LEN)).unwrap();
        rig.spawn(1, AbiTag::Native);

        let n = k * 4 + 3;
        let r = rig.mux.dispatch(AbiTag::Native, n, SyscallArgs::from_array(args));
        prop_assert_eq!(r, -1);
        prop_assert!(rig.console.output().is_empty());
        let is_unimplemented = matches!(
            rig.ring.last(),
            Some(DispatchEvent::Rejected(DispatchError::Unimplemented { .. }))
        );
        prop_assert!(is_unimplemented);
    }
}
