//! ABI registry
//!
//! One table slot per [`AbiTag`]. Slots hold `Arc`s: a lookup clones the
//! pointer under a short read lock and drops the lock before the caller
//! touches a handler, so replacing a table never waits on a running
//! syscall and a dispatch sees either the old table or the new one.

use alloc::sync::Arc;
use alloc::vec::Vec;
use ::core::sync::atomic::{AtomicBool, Ordering};

use lk_api::error::invalid_argument;
use lk_api::{AbiTag, Result, MAX_ABI};
use spin::RwLock;

use super::table::{CleanupFn, SyscallTable};

/// Maps each ABI tag to its syscall table
pub struct AbiRegistry {
    slots: RwLock<[Option<Arc<SyscallTable>>; MAX_ABI]>,
    initialized: AtomicBool,
}

impl AbiRegistry {
    /// Create an empty, uninitialized registry
    pub const fn new() -> Self {
        Self {
            slots: RwLock::new([const { None }; MAX_ABI]),
            initialized: AtomicBool::new(false),
        }
    }

    /// Installs `table` for `tag`, replacing and returning any previous one.
    ///
    /// `Unknown` can never own a table.
    pub fn register(&self, tag: AbiTag, table: SyscallTable) -> Result<Option<Arc<SyscallTable>>> {
        if !tag.is_dispatchable() {
            return Err(invalid_argument("cannot register a table for the unknown ABI"));
        }
        let max = table.max_syscall_num();
        let implemented = table.implemented();
        let previous = self.slots.write()[tag.index()].replace(Arc::new(table));
        if previous.is_some() {
            sys_info!("sci: replaced {} table ({} slots, {} implemented)", tag, max, implemented);
        } else {
            sys_info!("sci: registered {} table ({} slots, {} implemented)", tag, max, implemented);
        }
        mark_used!(max, implemented);
        Ok(previous)
    }

    /// Removes the table for `tag`
    pub fn unregister(&self, tag: AbiTag) -> Option<Arc<SyscallTable>> {
        self.slots.write().get_mut(tag.index()).and_then(Option::take)
    }

    /// Table for `tag`; always `None` until [`initialize`](Self::initialize)
    pub fn lookup(&self, tag: AbiTag) -> Option<Arc<SyscallTable>> {
        if !self.is_initialized() {
            return None;
        }
        self.slots.read().get(tag.index()).cloned().flatten()
    }

    /// Teardown hook of the table registered for `tag`, ignoring lifecycle
    pub fn cleanup_for(&self, tag: AbiTag) -> Option<CleanupFn> {
        self.slots
            .read()
            .get(tag.index())
            .and_then(|slot| slot.as_ref())
            .and_then(|table| table.cleanup())
    }

    /// Tags that currently have a table
    pub fn registered(&self) -> Vec<AbiTag> {
        let slots = self.slots.read();
        AbiTag::ALL
            .into_iter()
            .filter(|tag| slots[tag.index()].is_some())
            .collect()
    }

    /// Moves the registry to `Initialized`. One-way; repeated calls are no-ops.
    pub fn initialize(&self) {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            sys_info!("sci: registry initialized with {} ABIs", self.registered().len());
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

impl Default for AbiRegistry {
    fn default() -> Self {
        Self::new()
    }
}
