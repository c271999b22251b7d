//! Per-process ABI context
//!
//! Every live process owns exactly one [`AbiContext`]. The private blob
//! inside it belongs to the ABI module named by the tag; the core creates,
//! swaps and drops it without ever looking inside.

use ::core::any::Any;
use ::core::fmt;

use alloc::boxed::Box;

use super::types::{AbiFlags, AbiTag};

/// Opaque per-process state owned by one ABI module
#[derive(Default)]
pub struct AbiPrivate {
    blob: Option<Box<dyn Any + Send>>,
}

impl AbiPrivate {
    /// The zero-sized blob every fresh context starts with
    pub const fn empty() -> Self {
        Self { blob: None }
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_none()
    }

    /// Borrows the blob as `T` if that is what it holds
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.blob.as_deref().and_then(|b| b.downcast_ref::<T>())
    }

    /// Mutably borrows the blob as `T` if that is what it holds
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.blob.as_deref_mut().and_then(|b| b.downcast_mut::<T>())
    }

    /// Returns the blob as `T`, installing `init()` first when it is empty or
    /// holds another type.
    pub fn get_or_insert_with<T, F>(&mut self, init: F) -> Option<&mut T>
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        let fits = self.blob.as_deref().is_some_and(|b| b.is::<T>());
        if !fits {
            self.blob = Some(Box::new(init()));
        }
        self.get_mut::<T>()
    }

    /// Stores `value`, dropping whatever was there before
    pub fn set<T: Any + Send>(&mut self, value: T) {
        self.blob = Some(Box::new(value));
    }

    /// Moves the blob out, leaving this one empty
    pub fn take(&mut self) -> AbiPrivate {
        AbiPrivate {
            blob: self.blob.take(),
        }
    }

    pub fn clear(&mut self) {
        self.blob = None;
    }
}

impl fmt::Debug for AbiPrivate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.blob {
            Some(_) => f.write_str("AbiPrivate(<opaque>)"),
            None => f.write_str("AbiPrivate(empty)"),
        }
    }
}

/// ABI tag, flags and private blob of one process
#[derive(Debug, Default)]
pub struct AbiContext {
    pub tag: AbiTag,
    pub flags: AbiFlags,
    pub private: AbiPrivate,
}

impl AbiContext {
    /// Creates a context for `tag` with no flags and an empty blob
    pub const fn new(tag: AbiTag) -> Self {
        Self {
            tag,
            flags: AbiFlags::empty(),
            private: AbiPrivate::empty(),
        }
    }

    /// Switches to `tag`.
    ///
    /// When the tag actually changes the flags are cleared and the old blob
    /// is handed back so its owner can tear it down; a fresh empty blob takes
    /// its place. Re-tagging with the same tag keeps everything and returns
    /// `None`.
    pub fn retag(&mut self, tag: AbiTag) -> Option<(AbiTag, AbiPrivate)> {
        if self.tag == tag {
            return None;
        }
        let old_tag = ::core::mem::replace(&mut self.tag, tag);
        self.flags = AbiFlags::empty();
        Some((old_tag, self.private.take()))
    }
}
