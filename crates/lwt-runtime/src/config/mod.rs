//! Runtime configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. [`configure`] called before the first host starts
//! 2. Environment variables
//! 3. Library defaults (`defaults.rs`)
//!
//! # Example
//!
//! ```rust,ignore
//! use lwt_runtime::config::{configure, RuntimeConfig};
//!
//! configure(RuntimeConfig::from_env().stack_size(1 << 20).pool_size(64))?;
//! ```

pub mod defaults;

use std::sync::OnceLock;

use lwt_core::constants::MIN_STACK_SIZE;
use lwt_core::env::{env_get, env_get_bool, env_get_size, env_get_str};
use lwt_core::{LwtError, LwtResult};

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Per-host runtime configuration with builder pattern.
///
/// Every host in the process uses the same values.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Usable stack bytes per thread
    pub stack_size: usize,
    /// Control blocks preallocated into each host's ready pool
    pub pool_size: usize,
    /// Maximum control blocks per host
    pub max_lwts: usize,
    /// Remote-operation queue slots per host
    pub remote_queue_capacity: usize,
    /// Enable debug logging
    pub debug_logging: bool,
    /// OS thread name prefix for `kthd_create`
    pub host_thread_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `LWT_STACK_SIZE` - Stack size per thread, accepts K/M suffixes
    /// - `LWT_POOL_SIZE` - Preallocated control blocks per host
    /// - `LWT_MAX_LWTS` - Control block limit per host
    /// - `LWT_REMOTE_QUEUE_CAPACITY` - Remote-operation queue slots
    /// - `LWT_DEBUG` - Enable debug logging (0/1)
    /// - `LWT_HOST_THREAD_PREFIX` - OS thread name prefix
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get_size("LWT_STACK_SIZE", defaults::STACK_SIZE),
            pool_size: env_get("LWT_POOL_SIZE", defaults::POOL_SIZE),
            max_lwts: env_get("LWT_MAX_LWTS", defaults::MAX_LWTS),
            remote_queue_capacity: env_get(
                "LWT_REMOTE_QUEUE_CAPACITY",
                defaults::REMOTE_QUEUE_CAPACITY,
            ),
            debug_logging: env_get_bool("LWT_DEBUG", defaults::DEBUG_LOGGING),
            host_thread_prefix: env_get_str(
                "LWT_HOST_THREAD_PREFIX",
                defaults::HOST_THREAD_PREFIX,
            ),
        }
    }

    /// Library defaults only, no environment.
    pub fn new() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            pool_size: defaults::POOL_SIZE,
            max_lwts: defaults::MAX_LWTS,
            remote_queue_capacity: defaults::REMOTE_QUEUE_CAPACITY,
            debug_logging: defaults::DEBUG_LOGGING,
            host_thread_prefix: defaults::HOST_THREAD_PREFIX.to_string(),
        }
    }

    // Builder methods

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }

    pub fn max_lwts(mut self, n: usize) -> Self {
        self.max_lwts = n;
        self
    }

    pub fn remote_queue_capacity(mut self, cap: usize) -> Self {
        self.remote_queue_capacity = cap;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn host_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.host_thread_prefix = prefix.into();
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
        }
        if self.max_lwts < 2 {
            return Err(ConfigError::InvalidValue("max_lwts must be >= 2"));
        }
        if self.pool_size > self.max_lwts {
            return Err(ConfigError::InvalidValue("pool_size must be <= max_lwts"));
        }
        if self.remote_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("remote_queue_capacity must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("LWT Runtime Configuration:");
        eprintln!("  stack_size:             {}", self.stack_size);
        eprintln!("  pool_size:              {}", self.pool_size);
        eprintln!("  max_lwts:               {}", self.max_lwts);
        eprintln!("  remote_queue_capacity:  {}", self.remote_queue_capacity);
        eprintln!("  debug_logging:          {}", self.debug_logging);
        eprintln!("  host_thread_prefix:     {}", self.host_thread_prefix);
    }
}

/// Install the process-wide config. Must run before the first host starts.
pub fn configure(config: RuntimeConfig) -> LwtResult<()> {
    config.validate().map_err(LwtError::from)?;
    CONFIG.set(config).map_err(|_| LwtError::AlreadyConfigured)
}

/// Process-wide config; falls back to `from_env()` (or library defaults if
/// the environment yields an invalid combination) on first use.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                lwt_core::kwarn!("{}; using library defaults", e);
                RuntimeConfig::new()
            }
        }
    })
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for LwtError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => LwtError::InvalidConfig(msg),
        }
    }
}
