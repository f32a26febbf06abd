//! Global configuration options.

use std::{
    sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

/// Global configuration options for the steparray crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Validate Checksums
///  > default: [`true`]
///
/// If enabled, checksums (the `crc32c` operator and the per-block checksums of the [filesystem transport](crate::transport::filesystem)) are validated on read, otherwise validation is skipped.
///
/// ## Step Timeout
///  > default: 5 seconds
///
/// The default time a transport will wait in a blocking [`begin_step`](crate::engine::Engine::begin_step) for a producer to commit the next step.
/// A transport constructed with an explicit timeout ignores this option.
///
/// ## Parallel Decode
///  > default: [`true`]
///
/// If enabled, the blocks intersecting a selection are decoded concurrently with [`rayon`] in [`Engine::get`](crate::engine::Engine::get).
#[derive(Debug)]
pub struct Config {
    validate_checksums: bool,
    step_timeout: Duration,
    parallel_decode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            validate_checksums: true,
            step_timeout: Duration::from_secs(5),
            parallel_decode: true,
        }
    }
}

impl Config {
    /// Get the [validate checksums](#validate-checksums) configuration.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    /// Set the [validate checksums](#validate-checksums) configuration.
    pub fn set_validate_checksums(&mut self, validate_checksums: bool) {
        self.validate_checksums = validate_checksums;
    }

    /// Get the [step timeout](#step-timeout) configuration.
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Set the [step timeout](#step-timeout) configuration.
    pub fn set_step_timeout(&mut self, step_timeout: Duration) {
        self.step_timeout = step_timeout;
    }

    /// Get the [parallel decode](#parallel-decode) configuration.
    #[must_use]
    pub fn parallel_decode(&self) -> bool {
        self.parallel_decode
    }

    /// Set the [parallel decode](#parallel-decode) configuration.
    pub fn set_parallel_decode(&mut self, parallel_decode: bool) {
        self.parallel_decode = parallel_decode;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global steparray configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global steparray configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
