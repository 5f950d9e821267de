//! Architecture-specific context switching
//!
//! Everything unsafe about moving between thread stacks is confined here:
//! a saved-register [`Context`], [`init_context`] to prime a fresh one so
//! the first switch lands in a trampoline that calls the entry function,
//! and [`switch`] to save the current registers and load another set.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::{Context, init_context, switch};
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::{Context, init_context, switch};
    } else {
        compile_error!("Unsupported architecture");
    }
}

/// Entry point of a fresh context; must never return
pub type EntryFn = extern "C" fn() -> !;
