//! System call types

/// Raw system call number as read from the trap frame
pub type SyscallNumber = u32;

/// Value every dispatch-layer failure is folded into
pub const SYSCALL_FAILURE: i32 = -1;

/// The six register-sized argument words of one system call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyscallArgs {
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub a4: u32,
    pub a5: u32,
    pub a6: u32,
}

impl SyscallArgs {
    /// Creates new system call arguments
    pub const fn new(a1: u32, a2: u32, a3: u32, a4: u32, a5: u32, a6: u32) -> Self {
        Self { a1, a2, a3, a4, a5, a6 }
    }

    /// Creates empty system call arguments
    pub const fn empty() -> Self {
        Self::new(0, 0, 0, 0, 0, 0)
    }

    /// Creates system call arguments with one argument
    pub const fn with1(a1: u32) -> Self {
        Self::new(a1, 0, 0, 0, 0, 0)
    }

    /// Creates system call arguments with two arguments
    pub const fn with2(a1: u32, a2: u32) -> Self {
        Self::new(a1, a2, 0, 0, 0, 0)
    }

    /// Creates system call arguments with three arguments
    pub const fn with3(a1: u32, a2: u32, a3: u32) -> Self {
        Self::new(a1, a2, a3, 0, 0, 0)
    }

    /// Builds arguments from an array in `a1..a6` order
    pub const fn from_array(words: [u32; 6]) -> Self {
        Self::new(words[0], words[1], words[2], words[3], words[4], words[5])
    }

    pub const fn as_array(&self) -> [u32; 6] {
        [self.a1, self.a2, self.a3, self.a4, self.a5, self.a6]
    }
}
