//! Kernel-style print macros
//!
//! Leveled, line-atomic output on stderr. Every leveled line carries the
//! host and thread that emitted it, e.g. `[DEBUG] [h2:t17] parked on c4`.
//! The scheduler keeps that context current through [`set_context`].
//!
//! # Environment Variables
//!
//! - `LWT_FLUSH_EPRINT=1` - Flush stderr after each line (useful when chasing a crash)
//! - `LWT_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5)
//!
//! ```ignore
//! use lwt_core::{kdebug, kwarn};
//!
//! kdebug!("offer on {} queued", chan_id);
//! kwarn!("remote queue full, retrying");
//! ```

use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or digit; `None` for anything else
    pub fn parse(s: &str) -> Option<Self> {
        let level = match s.trim().to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => return None,
        };
        Some(level)
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

thread_local! {
    // (host id, thread id); 0 means "not inside a host yet"
    static CONTEXT: Cell<(u32, u32)> = const { Cell::new((0, 0)) };
}

/// Read `LWT_FLUSH_EPRINT` and `LWT_LOG_LEVEL`.
///
/// Runs on first use; calling it explicitly only makes the timing deterministic.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("LWT_FLUSH_EPRINT") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("LWT_LOG_LEVEL") {
        let level = LogLevel::parse(&val).unwrap_or(LogLevel::Info);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically (overrides `LWT_LOG_LEVEL`)
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

/// Record which host and thread is running on this OS thread
#[inline]
pub fn set_context(host: u32, lwt: u32) {
    CONTEXT.with(|c| c.set((host, lwt)));
}

/// Current (host, thread) logging context
#[inline]
pub fn context() -> (u32, u32) {
    CONTEXT.try_with(|c| c.get()).unwrap_or((0, 0))
}

/// Write one chunk to stderr under its lock, with an optional level/context
/// prefix and trailing newline
fn emit(prefix: Option<LogLevel>, args: std::fmt::Arguments<'_>, newline: bool) {
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    if let Some(level) = prefix {
        let _ = match context() {
            (0, _) => write!(out, "{} ", level.prefix()),
            (host, lwt) => write!(out, "{} [h{}:t{}] ", level.prefix(), host, lwt),
        };
    }
    let _ = out.write_fmt(args);
    if newline {
        let _ = out.write_all(b"\n");
    }
    if flush_enabled() {
        let _ = out.flush();
    }
}

#[doc(hidden)]
pub fn _kprint_impl(args: std::fmt::Arguments<'_>, newline: bool) {
    emit(None, args, newline);
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if level_enabled(level) {
        emit(Some(level), args, true);
    }
}

/// Print to stderr (no newline)
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::kprint::_kprint_impl(format_args!($($arg)*), false)
    };
}

/// Print to stderr with newline
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint::_kprint_impl(format_args!(""), true)
    };
    ($($arg:tt)*) => {
        $crate::kprint::_kprint_impl(format_args!($($arg)*), true)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! klog {
    ($level:ident, $($arg:tt)*) => {
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::$level,
            format_args!($($arg)*),
        )
    };
}

/// Error level; shown unless logging is off
#[macro_export]
macro_rules! kerror { ($($arg:tt)*) => { $crate::klog!(Error, $($arg)*) }; }

#[macro_export]
macro_rules! kwarn { ($($arg:tt)*) => { $crate::klog!(Warn, $($arg)*) }; }

#[macro_export]
macro_rules! kinfo { ($($arg:tt)*) => { $crate::klog!(Info, $($arg)*) }; }

#[macro_export]
macro_rules! kdebug { ($($arg:tt)*) => { $crate::klog!(Debug, $($arg)*) }; }

/// Scheduler switches and remote ops
#[macro_export]
macro_rules! ktrace { ($($arg:tt)*) => { $crate::klog!(Trace, $($arg)*) }; }
