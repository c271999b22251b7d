//! Dispatch loggers

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use spin::Mutex;

use super::error::{DispatchError, DispatchEvent};
use super::traits::SyscallLogger;

/// Forwards events to the `log` facade
///
/// Rejections go out at warn level except `Unimplemented`, which is only
/// debug noise from programs probing for optional calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SyscallLogger for LogSink {
    fn log(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Rejected(err @ DispatchError::Unimplemented { .. }) => {
                sys_debug!("sci: {}", err);
                mark_used!(err);
            }
            DispatchEvent::Rejected(err) => {
                sys_warn!("sci: {}", err);
                mark_used!(err);
            }
            DispatchEvent::Completed { .. } => {
                sys_trace!("sci: {}", event);
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl SyscallLogger for NullLogger {
    fn log(&self, _event: &DispatchEvent) {}

    fn name(&self) -> &str {
        "null"
    }
}

/// Keeps the most recent events in a bounded ring
pub struct RingLogger {
    entries: Mutex<VecDeque<DispatchEvent>>,
    capacity: usize,
    forward: bool,
}

impl RingLogger {
    /// Creates a ring holding up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            forward: false,
        }
    }

    /// Like [`RingLogger::new`], but also passes every event to [`LogSink`]
    pub fn forwarding(capacity: usize) -> Self {
        Self {
            forward: true,
            ..Self::new(capacity)
        }
    }

    /// Snapshot, oldest first
    pub fn entries(&self) -> Vec<DispatchEvent> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn last(&self) -> Option<DispatchEvent> {
        self.entries.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl SyscallLogger for RingLogger {
    fn log(&self, event: &DispatchEvent) {
        if self.forward {
            LogSink.log(event);
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(event.clone());
    }

    fn name(&self) -> &str {
        "ring"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lk_api::AbiTag;

    fn no_table(tag: AbiTag) -> DispatchEvent {
        DispatchEvent::Rejected(DispatchError::NoTable { tag })
    }

    #[test]
    fn test_ring_drops_oldest() {
        let ring = RingLogger::new(2);
        ring.log(&no_table(AbiTag::Linux));
        ring.log(&no_table(AbiTag::Native));
        ring.log(&no_table(AbiTag::DosSyscall));
        assert_eq!(
            ring.entries(),
            vec![no_table(AbiTag::Native), no_table(AbiTag::DosSyscall)]
        );
        assert_eq!(ring.last(), Some(no_table(AbiTag::DosSyscall)));
        ring.clear();
        assert!(ring.is_empty());
    }

    #[test]
    fn test_zero_capacity_still_keeps_last() {
        let ring = RingLogger::forwarding(0);
        ring.log(&no_table(AbiTag::Linux));
        ring.log(&no_table(AbiTag::Native));
        assert_eq!(ring.len(), 1);
    }
}
