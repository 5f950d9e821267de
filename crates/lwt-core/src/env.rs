//! Environment variable helpers used by the runtime config
//!
//! Every `LWT_*` override goes through these, so a malformed value silently
//! falls back to the compiled default instead of failing host startup.
//!
//! ```ignore
//! use lwt_core::env::{env_get, env_get_bool, env_get_size};
//!
//! let pool: usize = env_get("LWT_POOL_SIZE", 32);
//! let stack = env_get_size("LWT_STACK_SIZE", 256 * 1024); // accepts "512K", "2M"
//! let debug = env_get_bool("LWT_DEBUG", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, or return `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T`; `None` when unset or unparsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true, anything else false.
/// Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val),
        Err(_) => default,
    }
}

/// String value, or `default` when unset
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Byte size with an optional K/M/G suffix (binary units)
pub fn env_get_size(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_size(&v))
        .unwrap_or(default)
}

/// Check if `key` is set, regardless of value
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

pub(crate) fn parse_bool(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub(crate) fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let (digits, shift) = match val.char_indices().last()? {
        (i, 'k' | 'K') => (&val[..i], 10),
        (i, 'm' | 'M') => (&val[..i], 20),
        (i, 'g' | 'G') => (&val[..i], 30),
        _ => (val, 0),
    };
    let n: usize = digits.trim().parse().ok()?;
    n.checked_mul(1usize << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_returns_default() {
        let val: usize = env_get("__LWT_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);
        assert!(env_get_bool("__LWT_TEST_UNSET_VAR__", true));
        assert!(env_get_opt::<u32>("__LWT_TEST_UNSET_VAR__").is_none());
        assert_eq!(env_get_str("__LWT_TEST_UNSET_VAR__", "x"), "x");
        assert!(!env_is_set("__LWT_TEST_UNSET_VAR__"));
    }

    #[test]
    fn test_set_and_invalid() {
        std::env::set_var("__LWT_TEST_NUM__", " 123 ");
        assert_eq!(env_get::<usize>("__LWT_TEST_NUM__", 0), 123);
        std::env::set_var("__LWT_TEST_NUM__", "many");
        assert_eq!(env_get::<usize>("__LWT_TEST_NUM__", 99), 99);
        std::env::remove_var("__LWT_TEST_NUM__");
    }

    #[test]
    fn test_parse_bool() {
        for t in ["1", "true", "TRUE", "yes", "on", " On "] {
            assert!(parse_bool(t), "{t}");
        }
        for f in ["0", "false", "off", "garbage", ""] {
            assert!(!parse_bool(f), "{f}");
        }
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("256K"), Some(256 * 1024));
        assert_eq!(parse_size("2m"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("1G"), Some(1 << 30));
        assert_eq!(parse_size("K"), None);
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("lots"), None);
    }
}
