//! Unified logging support for lk-syscalls
//!
//! The macros compile to nothing when the `log` feature is off, so call
//! sites need no `#[cfg]` of their own.

/// Unified trace-level logging
#[macro_export]
macro_rules! sys_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    }
}

/// Unified debug-level logging
#[macro_export]
macro_rules! sys_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
    }
}

/// Unified info-level logging
#[macro_export]
macro_rules! sys_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::info!($($arg)*);
    }
}

/// Unified warn-level logging
#[macro_export]
macro_rules! sys_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
    }
}

/// Unified error-level logging
#[macro_export]
macro_rules! sys_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::error!($($arg)*);
    }
}

/// Mark a value as used to suppress unused variable warnings
/// when it only feeds a log line
#[inline]
pub fn mark_used<T>(value: T) -> T {
    value
}

/// Helper macro to mark multiple values as used
#[macro_export]
macro_rules! mark_used {
    ($($val:expr),*) => {
        let _ = ($($crate::logging::mark_used($val)),*);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_mark_used() {
        let x = 42;
        let y = "test";
        mark_used!(x, y);
        sys_debug!("marked {} {}", x, y);
    }
}
