//! Dispatch failures and diagnostic events

use ::core::fmt;

use lk_api::{AbiTag, Pid, SyscallNumber};

use super::table::SlotName;

/// Why a dispatch was rejected before any handler ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The caller is untagged, the tag is out of range, or there is no caller
    NoAbi { pid: Option<Pid> },
    /// No table is registered for the tag
    NoTable { tag: AbiTag },
    /// The number is past the table's end
    OutOfRange {
        tag: AbiTag,
        number: SyscallNumber,
        max: SyscallNumber,
    },
    /// The slot exists but holds no handler
    Unimplemented {
        tag: AbiTag,
        number: SyscallNumber,
        name: Option<SlotName>,
    },
    /// The caller already terminated
    Terminated { pid: Pid },
}

impl DispatchError {
    /// Short stable label for counters and log lines
    pub const fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoAbi { .. } => "NoAbi",
            DispatchError::NoTable { .. } => "NoTable",
            DispatchError::OutOfRange { .. } => "OutOfRange",
            DispatchError::Unimplemented { .. } => "Unimplemented",
            DispatchError::Terminated { .. } => "Terminated",
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoAbi { pid: Some(pid) } => write!(f, "NoAbi: pid {} has no ABI", pid),
            DispatchError::NoAbi { pid: None } => write!(f, "NoAbi: no current process"),
            DispatchError::NoTable { tag } => write!(f, "NoTable: no table for {}", tag),
            DispatchError::OutOfRange { tag, number, max } => {
                write!(f, "OutOfRange: {} syscall {} >= {}", tag, number, max)
            }
            DispatchError::Unimplemented { tag, number, name: Some(name) } => {
                write!(f, "Unimplemented: {} syscall {} ({})", tag, number, name)
            }
            DispatchError::Unimplemented { tag, number, name: None } => {
                write!(f, "Unimplemented: {} syscall {}", tag, number)
            }
            DispatchError::Terminated { pid } => {
                write!(f, "Terminated: pid {} is a zombie", pid)
            }
        }
    }
}

/// What a [`SyscallLogger`](super::traits::SyscallLogger) is told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// Dispatch failed before a handler ran
    Rejected(DispatchError),
    /// A handler ran with tracing on
    Completed {
        pid: Pid,
        tag: AbiTag,
        number: SyscallNumber,
        name: Option<SlotName>,
        result: i32,
    },
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchEvent::Rejected(err) => write!(f, "{}", err),
            DispatchEvent::Completed { pid, tag, name: Some(name), result, .. } => {
                write!(f, "[{}] {} {}() = {}", pid, tag, name, result)
            }
            DispatchEvent::Completed { pid, tag, number, name: None, result } => {
                write!(f, "[{}] {} #{} = {}", pid, tag, number, result)
            }
        }
    }
}
