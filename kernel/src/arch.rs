//! Interrupt control
//!
//! With `baremetal` on x86 this is `cli`/`sti` around the critical section.
//! Hosted builds only track the flag so the trap path can be exercised in
//! tests.

#[cfg(not(all(feature = "baremetal", any(target_arch = "x86", target_arch = "x86_64"))))]
mod soft {
    #[cfg(not(test))]
    use core::sync::atomic::{AtomicBool, Ordering};

    #[cfg(not(test))]
    static FLAG: AtomicBool = AtomicBool::new(true);

    #[cfg(not(test))]
    pub fn replace(enabled: bool) -> bool {
        FLAG.swap(enabled, Ordering::SeqCst)
    }

    #[cfg(not(test))]
    pub fn get() -> bool {
        FLAG.load(Ordering::SeqCst)
    }

    // Unit tests run on many threads; each one gets its own "CPU".
    #[cfg(test)]
    std::thread_local! {
        static FLAG: core::cell::Cell<bool> = const { core::cell::Cell::new(true) };
    }

    #[cfg(test)]
    pub fn replace(enabled: bool) -> bool {
        FLAG.with(|f| f.replace(enabled))
    }

    #[cfg(test)]
    pub fn get() -> bool {
        FLAG.with(|f| f.get())
    }
}

/// Disable interrupts and return the previous state
#[inline]
pub fn intr_off() -> bool {
    #[cfg(all(feature = "baremetal", target_arch = "x86"))]
    {
        let flags: u32;
        unsafe {
            core::arch::asm!("pushfd; pop {}; cli", out(reg) flags);
        }
        (flags & 0x200) != 0
    }

    #[cfg(all(feature = "baremetal", target_arch = "x86_64"))]
    {
        let flags: u64;
        unsafe {
            core::arch::asm!("pushfq; pop {}; cli", out(reg) flags);
        }
        (flags & 0x200) != 0
    }

    #[cfg(not(all(feature = "baremetal", any(target_arch = "x86", target_arch = "x86_64"))))]
    {
        soft::replace(false)
    }
}

/// Enable interrupts
#[inline]
pub fn intr_on() {
    #[cfg(all(feature = "baremetal", any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe {
        core::arch::asm!("sti");
    }

    #[cfg(not(all(feature = "baremetal", any(target_arch = "x86", target_arch = "x86_64"))))]
    soft::replace(true);
}

/// Whether interrupts are currently enabled
#[inline]
pub fn intr_enabled() -> bool {
    #[cfg(all(feature = "baremetal", target_arch = "x86"))]
    {
        let flags: u32;
        unsafe {
            core::arch::asm!("pushfd; pop {}", out(reg) flags);
        }
        (flags & 0x200) != 0
    }

    #[cfg(all(feature = "baremetal", target_arch = "x86_64"))]
    {
        let flags: u64;
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) flags);
        }
        (flags & 0x200) != 0
    }

    #[cfg(not(all(feature = "baremetal", any(target_arch = "x86", target_arch = "x86_64"))))]
    {
        soft::get()
    }
}

/// Runs `f` with interrupts off, restoring the previous state afterwards
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let was_enabled = intr_off();
    let result = f();
    if was_enabled {
        intr_on();
    }
    result
}
