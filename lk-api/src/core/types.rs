//! Core types used throughout the kernel core

use ::core::fmt;

use bitflags::bitflags;

/// Process identifier type
pub type Pid = u32;

/// Number of real ABI tags; sizes per-tag arrays.
pub const MAX_ABI: usize = 5;

/// Binary ecosystem a process was loaded from
///
/// The set is closed. `Unknown` marks a process that has not been tagged
/// yet and can never be dispatched.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AbiTag {
    /// Not tagged yet
    #[default]
    Unknown = 0,
    /// Legacy DOS programs issuing INT 21h
    DosInterrupt = 1,
    /// DOS programs using the v2 kernel programming interface
    DosSyscall = 2,
    /// Linux i386 ELF binaries
    Linux = 3,
    /// Native executables
    Native = 4,
}

static_assertions::const_assert_eq!(AbiTag::Native as usize + 1, MAX_ABI);

impl AbiTag {
    /// Every tag in numeric order, `Unknown` included
    pub const ALL: [AbiTag; MAX_ABI] = [
        AbiTag::Unknown,
        AbiTag::DosInterrupt,
        AbiTag::DosSyscall,
        AbiTag::Linux,
        AbiTag::Native,
    ];

    /// Decodes a raw tag value. Anything at or past `MAX_ABI` is rejected.
    pub const fn from_raw(raw: u32) -> Option<AbiTag> {
        match raw {
            0 => Some(AbiTag::Unknown),
            1 => Some(AbiTag::DosInterrupt),
            2 => Some(AbiTag::DosSyscall),
            3 => Some(AbiTag::Linux),
            4 => Some(AbiTag::Native),
            _ => None,
        }
    }

    /// Slot index in per-tag arrays
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether a process with this tag may be dispatched
    pub const fn is_dispatchable(self) -> bool {
        !matches!(self, AbiTag::Unknown)
    }

    /// Whether this is one of the DOS flavours
    pub const fn is_dos(self) -> bool {
        matches!(self, AbiTag::DosInterrupt | AbiTag::DosSyscall)
    }

    /// Short stable name used in log lines
    pub const fn name(self) -> &'static str {
        match self {
            AbiTag::Unknown => "unknown",
            AbiTag::DosInterrupt => "dos-int21",
            AbiTag::DosSyscall => "dos-kpi2",
            AbiTag::Linux => "linux",
            AbiTag::Native => "native",
        }
    }
}

impl fmt::Display for AbiTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Per-process ABI flag word
    ///
    /// The core carries it around untouched; only the owning ABI module
    /// gives the bits meaning.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AbiFlags: u32 {
        /// DOS write-verify switch (INT 21h 2Eh/54h)
        const VERIFY = 1 << 0;
        /// DOS Ctrl-Break checking (INT 21h 33h)
        const BREAK_CHECK = 1 << 1;
        /// Trace every dispatch of this process
        const TRACE = 1 << 2;

        const _ = !0;
    }
}

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Runnable, waiting for the CPU
    Ready,
    /// Owns the CPU
    Running,
    /// Waiting on an event
    Blocked,
    /// Terminated, waiting to be reaped
    Zombie,
}

impl ProcessState {
    /// Whether the process can still issue system calls
    pub const fn is_alive(self) -> bool {
        !matches!(self, ProcessState::Zombie)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Blocked => "blocked",
            ProcessState::Zombie => "zombie",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_matches_discriminants() {
        for tag in AbiTag::ALL {
            assert_eq!(AbiTag::from_raw(tag as u32), Some(tag));
            assert_eq!(tag.index(), tag as usize);
        }
        assert_eq!(AbiTag::from_raw(MAX_ABI as u32), None);
        assert_eq!(AbiTag::from_raw(u32::MAX), None);
    }

    #[test]
    fn test_only_unknown_is_not_dispatchable() {
        let blocked: Vec<_> = AbiTag::ALL
            .iter()
            .filter(|t| !t.is_dispatchable())
            .collect();
        assert_eq!(blocked, [&AbiTag::Unknown]);
        assert!(AbiTag::DosSyscall.is_dos());
        assert!(!AbiTag::Linux.is_dos());
    }

    #[test]
    fn test_flags_keep_unknown_bits() {
        let raw = AbiFlags::from_bits_retain(0x8000_0001);
        assert!(raw.contains(AbiFlags::VERIFY));
        assert_eq!(raw.bits(), 0x8000_0001);
    }
}
