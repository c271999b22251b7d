//! System call traits

use super::error::DispatchEvent;

/// Receives dispatch diagnostics
pub trait SyscallLogger: Send + Sync {
    /// Records one event
    fn log(&self, event: &DispatchEvent);

    /// Get the logger name
    fn name(&self) -> &str;
}
