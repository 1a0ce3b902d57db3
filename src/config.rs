//! Process-wide configuration and per-world overrides.

use std::sync::OnceLock;

/// Environment variable enabling debug-mode validation.
pub const DEBUG_ENV: &str = "PHALANX_DEBUG";

/// Environment variable enabling operation latency collection.
pub const PROFILING_ENV: &str = "PHALANX_PROFILING";

/// Process-wide settings, read from the environment once, the first
/// time any world consults them.
///
/// With `debug_mode` on, every public call fully validates its
/// arguments and reports user errors. With it off, callers are trusted:
/// stale handles and out-of-range component ids turn the call into a
/// silent no-op, and only internal invariants are still checked.
/// `profiling_mode` enables latency collection at operation boundaries
/// and has no functional effect.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub debug_mode: bool,
    pub profiling_mode: bool,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    /// Returns the process-wide configuration.
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(|| Config {
            debug_mode: env_flag(DEBUG_ENV),
            profiling_mode: env_flag(PROFILING_ENV),
        })
    }
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "on" | "yes"),
        Err(_) => false,
    }
}

/// Describes configuration options for the creation of a new world.
///
/// Unset fields fall back to the process-wide [Config]. Explicit values
/// exist so tests can pin a mode without touching the environment.
#[derive(Debug, Default, Clone)]
pub struct WorldOptions {
    pub debug_mode: Option<bool>,
    pub profiling_mode: Option<bool>,
}

impl WorldOptions {
    pub(crate) fn resolve(&self) -> (bool, bool) {
        let global = Config::global();
        (
            self.debug_mode.unwrap_or(global.debug_mode),
            self.profiling_mode.unwrap_or(global.profiling_mode),
        )
    }
}
