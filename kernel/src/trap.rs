//! Trap gateway
//!
//! The assembly stubs push an i386 [`TrapFrame`] and call
//! [`lk_trap_entry`]. The gateway picks the register convention of the
//! current process's ABI, decodes the syscall number and six argument words,
//! dispatches, and writes the result back into EAX. Nothing here can fail
//! outward: every problem ends up as `-1` in the frame.

use lk_api::{AbiTag, SyscallArgs, SyscallNumber};
use lk_syscalls::abi::dos::kpi::offset_of;
use lk_syscalls::Multiplexer;
use static_assertions::const_assert_eq;

use crate::arch;

/// Software interrupt vector of DOS INT 21h
pub const DOS_VECTOR: u32 = 0x21;
/// Software interrupt vector of Linux i386 syscalls
pub const LINUX_VECTOR: u32 = 0x80;

/// Saved user registers, in the order the entry stub pushes them
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    // pushad
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub int_no: u32,
    pub err_code: u32,
    // pushed by the CPU
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

const_assert_eq!(core::mem::size_of::<TrapFrame>(), 19 * 4);

/// Interrupt flag in EFLAGS
pub const EFLAGS_IF: u32 = 1 << 9;
/// Bit 1 of EFLAGS always reads as one
pub const EFLAGS_RESERVED: u32 = 1 << 1;

impl TrapFrame {
    pub const fn new() -> Self {
        Self {
            gs: 0,
            fs: 0,
            es: 0,
            ds: 0,
            edi: 0,
            esi: 0,
            ebp: 0,
            esp: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            int_no: 0,
            err_code: 0,
            eip: 0,
            cs: 0,
            eflags: 0,
            useresp: 0,
            ss: 0,
        }
    }

    /// Initial user frame starting at `entry` with interrupts enabled
    pub const fn for_entry(entry: u32) -> Self {
        let mut frame = Self::new();
        frame.eip = entry;
        frame.eflags = EFLAGS_IF | EFLAGS_RESERVED;
        frame
    }

    /// Stores a syscall result in the accumulator
    #[inline]
    pub fn set_result(&mut self, result: i32) {
        self.eax = result as u32;
    }

    #[inline]
    pub fn result(&self) -> i32 {
        self.eax as i32
    }
}

/// Where an ABI keeps its syscall number and arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterConvention {
    /// INT 21h: AH selects the function; DX, CX, BX, AL, SI, DI
    DosInt21,
    /// KPI v2: EAX holds `4000 + n`; EBX, ECX, EDX, ESI, EDI, EBP
    DosKpi,
    /// i386 `int 0x80`: EAX; EBX, ECX, EDX, ESI, EDI, EBP
    I386,
}

impl RegisterConvention {
    pub const fn for_abi(tag: AbiTag) -> Self {
        match tag {
            AbiTag::DosInterrupt => Self::DosInt21,
            AbiTag::DosSyscall => Self::DosKpi,
            AbiTag::Linux | AbiTag::Native | AbiTag::Unknown => Self::I386,
        }
    }

    /// Extracts the table index and argument words from `frame`
    pub fn decode(self, frame: &TrapFrame) -> (SyscallNumber, SyscallArgs) {
        let i386_args = SyscallArgs::new(
            frame.ebx, frame.ecx, frame.edx, frame.esi, frame.edi, frame.ebp,
        );
        match self {
            Self::DosInt21 => (
                (frame.eax >> 8) & 0xFF,
                SyscallArgs::new(
                    frame.edx,
                    frame.ecx,
                    frame.ebx,
                    frame.eax & 0xFF,
                    frame.esi,
                    frame.edi,
                ),
            ),
            Self::DosKpi => (offset_of(frame.eax), i386_args),
            Self::I386 => (frame.eax, i386_args),
        }
    }
}

/// Decodes `frame` for the current process, dispatches, and stores the
/// result. Runs with interrupts off until the dispatcher returns.
pub fn handle_trap(mux: &Multiplexer, frame: &mut TrapFrame) {
    arch::without_interrupts(|| {
        let processes = &mux.env().processes;
        let tag = processes.current_process().map_or(AbiTag::Unknown, |c| c.tag);
        let (number, args) = RegisterConvention::for_abi(tag).decode(frame);
        let result = mux.dispatch_current(number, args);
        frame.set_result(result);
    });
}

/// Entry point for the assembly trap stubs.
///
/// # Safety
///
/// `frame` must be null or point to a valid, exclusively owned
/// [`TrapFrame`] for the duration of the call.
#[cfg_attr(feature = "baremetal", unsafe(no_mangle))]
pub unsafe extern "C" fn lk_trap_entry(frame: *mut TrapFrame) {
    // SAFETY: the caller guarantees `frame` is valid or null.
    let Some(frame) = (unsafe { frame.as_mut() }) else {
        return;
    };
    match crate::kernel::kernel() {
        Some(kernel) => kernel.handle_trap(frame),
        None => frame.set_result(lk_api::SYSCALL_FAILURE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int21_decoding() {
        let frame = TrapFrame {
            eax: 0x0941,
            edx: 0x0100,
            ecx: 7,
            ebx: 5,
            esi: 0x11,
            edi: 0x22,
            ..TrapFrame::new()
        };
        let (number, args) = RegisterConvention::DosInt21.decode(&frame);
        assert_eq!(number, 0x09);
        assert_eq!(args, SyscallArgs::new(0x0100, 7, 5, 0x41, 0x11, 0x22));
    }

    #[test]
    fn test_kpi_decoding_subtracts_base() {
        let frame = TrapFrame {
            eax: 4010,
            ebx: 1,
            ..TrapFrame::new()
        };
        assert_eq!(RegisterConvention::DosKpi.decode(&frame).0, 10);

        let low = TrapFrame { eax: 3, ..frame };
        assert_eq!(RegisterConvention::DosKpi.decode(&low).0, u32::MAX);
    }

    #[test]
    fn test_i386_decoding() {
        let frame = TrapFrame {
            eax: 4,
            ebx: 1,
            ecx: 0x2000,
            edx: 12,
            esi: 3,
            edi: 4,
            ebp: 5,
            ..TrapFrame::new()
        };
        let (number, args) = RegisterConvention::for_abi(AbiTag::Linux).decode(&frame);
        assert_eq!(number, 4);
        assert_eq!(args.as_array(), [1, 0x2000, 12, 3, 4, 5]);
        assert_eq!(RegisterConvention::for_abi(AbiTag::Native), RegisterConvention::I386);
    }

    #[test]
    fn test_result_is_stored_in_eax() {
        let mut frame = TrapFrame::new();
        frame.set_result(-1);
        assert_eq!(frame.eax, u32::MAX);
        assert_eq!(frame.result(), -1);
    }

    #[test]
    fn test_null_frame_is_ignored() {
        unsafe { lk_trap_entry(core::ptr::null_mut()) };
    }

    #[test]
    fn test_entry_frame() {
        let frame = TrapFrame::for_entry(0x1000);
        assert_eq!(frame.eip, 0x1000);
        assert_ne!(frame.eflags & EFLAGS_IF, 0);
    }
}
