//! PID allocation

use alloc::collections::VecDeque;

use lk_api::Pid;

/// Issues PIDs counting up from 1 to `max`, then recycles reaped PIDs
/// oldest first
#[derive(Debug)]
pub struct PidPool {
    // Wider than `Pid` so `max == Pid::MAX` cannot overflow.
    next: u64,
    max: u64,
    released: VecDeque<Pid>,
}

impl PidPool {
    pub fn new(max: Pid) -> Self {
        Self {
            next: 1,
            max: u64::from(max),
            released: VecDeque::new(),
        }
    }

    pub fn alloc(&mut self) -> Option<Pid> {
        if self.next <= self.max {
            let pid = self.next as Pid;
            self.next += 1;
            return Some(pid);
        }
        self.released.pop_front()
    }

    /// Returns a reaped PID to the pool
    pub fn release(&mut self, pid: Pid) {
        if pid != 0 && u64::from(pid) < self.next && !self.released.contains(&pid) {
            self.released.push_back(pid);
        }
    }

    /// PIDs that can still be handed out
    pub fn available(&self) -> usize {
        let fresh = (self.max + 1).saturating_sub(self.next);
        fresh as usize + self.released.len()
    }
}
