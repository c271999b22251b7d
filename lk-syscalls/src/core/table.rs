//! Per-ABI syscall tables
//!
//! A table is a fixed-length array of optional handler references, indexed
//! by syscall number, plus optional labels and a teardown hook for the
//! ABI's private blob. Once built it never changes length.

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use ::core::fmt;

use lk_api::error::invalid_argument;
use lk_api::{AbiPrivate, Error, Result, SyscallArgs, SyscallNumber};

use super::env::{Caller, SyscallEnv};

/// A syscall handler: the caller plus six argument words in, one signed word out
pub type SyscallHandler = fn(&Caller<'_>, SyscallArgs) -> i32;

/// Tears down an ABI's private blob when its process goes away
pub type CleanupFn = fn(&SyscallEnv, AbiPrivate);

/// Label of one slot
pub type SlotName = Cow<'static, str>;

/// Handler array of one ABI
pub struct SyscallTable {
    handlers: Box<[Option<SyscallHandler>]>,
    names: Option<Box<[Option<SlotName>]>>,
    cleanup: Option<CleanupFn>,
}

impl SyscallTable {
    /// Starts a table with `max_syscall_num` empty slots
    pub fn builder(max_syscall_num: SyscallNumber) -> SyscallTableBuilder {
        SyscallTableBuilder::new(max_syscall_num)
    }

    /// Builds a table from raw slot vectors.
    ///
    /// `names`, when given, must have exactly one entry per handler slot.
    pub fn from_parts(
        handlers: Vec<Option<SyscallHandler>>,
        names: Option<Vec<Option<SlotName>>>,
    ) -> Result<Self> {
        if handlers.is_empty() {
            return Err(invalid_argument("syscall table has no slots"));
        }
        if u32::try_from(handlers.len()).is_err() {
            return Err(invalid_argument("syscall table too large"));
        }
        if let Some(names) = &names {
            if names.len() != handlers.len() {
                return Err(Error::InvalidArgument(format!(
                    "names has {} entries, table has {} slots",
                    names.len(),
                    handlers.len()
                )));
            }
        }
        Ok(Self {
            handlers: handlers.into_boxed_slice(),
            names: names.map(Vec::into_boxed_slice),
            cleanup: None,
        })
    }

    /// Attaches the private-blob teardown hook
    pub fn with_cleanup(mut self, cleanup: CleanupFn) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    /// Exclusive upper bound of valid syscall numbers
    pub fn max_syscall_num(&self) -> SyscallNumber {
        self.handlers.len() as SyscallNumber
    }

    /// Handler in slot `number`; `None` when out of range or unimplemented
    pub fn handler(&self, number: SyscallNumber) -> Option<SyscallHandler> {
        self.handlers.get(number as usize).copied().flatten()
    }

    /// Label of slot `number`, if the table carries names
    pub fn name(&self, number: SyscallNumber) -> Option<&SlotName> {
        self.names
            .as_ref()
            .and_then(|names| names.get(number as usize))
            .and_then(Option::as_ref)
    }

    pub fn has_names(&self) -> bool {
        self.names.is_some()
    }

    pub fn cleanup(&self) -> Option<CleanupFn> {
        self.cleanup
    }

    /// Number of non-null slots
    pub fn implemented(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    /// Iterates the numbers of non-null slots
    pub fn implemented_numbers(&self) -> impl Iterator<Item = SyscallNumber> + '_ {
        self.handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_some())
            .map(|(n, _)| n as SyscallNumber)
    }
}

impl fmt::Debug for SyscallTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyscallTable")
            .field("max_syscall_num", &self.max_syscall_num())
            .field("implemented", &self.implemented())
            .field("has_names", &self.has_names())
            .field("has_cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Incremental [`SyscallTable`] construction
///
/// Slot errors are remembered and reported once by [`build`](Self::build),
/// so a whole ABI table reads as one chained expression.
pub struct SyscallTableBuilder {
    handlers: Vec<Option<SyscallHandler>>,
    names: Option<Vec<Option<SlotName>>>,
    cleanup: Option<CleanupFn>,
    error: Option<Error>,
}

impl SyscallTableBuilder {
    fn new(max_syscall_num: SyscallNumber) -> Self {
        let error = (max_syscall_num == 0)
            .then(|| invalid_argument("syscall table has no slots"));
        Self {
            handlers: vec![None; max_syscall_num as usize],
            names: None,
            cleanup: None,
            error,
        }
    }

    fn check(&mut self, number: SyscallNumber) -> bool {
        if (number as usize) < self.handlers.len() {
            return true;
        }
        if self.error.is_none() {
            self.error = Some(Error::InvalidArgument(format!(
                "slot {} outside table of {}",
                number,
                self.handlers.len()
            )));
        }
        false
    }

    fn set_name(&mut self, number: SyscallNumber, name: SlotName) {
        let len = self.handlers.len();
        let names = self.names.get_or_insert_with(|| vec![None; len]);
        names[number as usize] = Some(name);
    }

    /// Installs `handler` in slot `number` under `name`
    pub fn handler(
        mut self,
        number: SyscallNumber,
        name: impl Into<SlotName>,
        handler: SyscallHandler,
    ) -> Self {
        if self.check(number) {
            self.handlers[number as usize] = Some(handler);
            self.set_name(number, name.into());
        }
        self
    }

    /// Installs `handler` without a label
    pub fn unnamed(mut self, number: SyscallNumber, handler: SyscallHandler) -> Self {
        if self.check(number) {
            self.handlers[number as usize] = Some(handler);
        }
        self
    }

    /// Labels slot `number` while leaving it unimplemented
    pub fn name(mut self, number: SyscallNumber, name: impl Into<SlotName>) -> Self {
        if self.check(number) {
            self.set_name(number, name.into());
        }
        self
    }

    pub fn cleanup(mut self, cleanup: CleanupFn) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn build(self) -> Result<SyscallTable> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let table = SyscallTable::from_parts(self.handlers, self.names)?;
        Ok(match self.cleanup {
            Some(cleanup) => table.with_cleanup(cleanup),
            None => table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seven(_: &Caller<'_>, _: SyscallArgs) -> i32 {
        7
    }

    #[test]
    fn test_builder_fixes_length() {
        let table = SyscallTable::builder(10)
            .handler(2, "two", seven)
            .name(3, "three")
            .build()
            .unwrap();
        assert_eq!(table.max_syscall_num(), 10);
        assert_eq!(table.implemented(), 1);
        assert!(table.handler(2).is_some());
        assert!(table.handler(3).is_none());
        assert!(table.handler(10).is_none());
        assert_eq!(table.name(3).map(|n| n.as_ref()), Some("three"));
        assert_eq!(table.name(4), None);
        assert_eq!(table.implemented_numbers().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_builder_rejects_out_of_range_slot() {
        let err = SyscallTable::builder(4).handler(4, "x", seven).build().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(SyscallTable::builder(0).build().is_err());
    }

    #[test]
    fn test_unnamed_table_has_no_names() {
        let table = SyscallTable::builder(3).unnamed(0, seven).build().unwrap();
        assert!(!table.has_names());
        assert_eq!(table.name(0), None);
    }

    #[test]
    fn test_from_parts_checks_names_length() {
        let handlers = vec![None, Some(seven as SyscallHandler)];
        assert!(SyscallTable::from_parts(handlers.clone(), Some(vec![None])).is_err());
        let table = SyscallTable::from_parts(
            handlers,
            Some(vec![None, Some(Cow::Owned(String::from("seven")))]),
        )
        .unwrap();
        assert_eq!(table.name(1).map(|n| n.as_ref()), Some("seven"));
    }
}
