//! Runtime construction and entry point.
//!
//! The runtime is configured with a fluent, move-based builder. Each
//! method consumes `self` and returns an updated builder.
//!
//! ```ignore
//! use ringloop::runtime::RuntimeBuilder;
//!
//! let rt = RuntimeBuilder::new()
//!     .ring_entries(512)
//!     .with_env_overrides()?
//!     .build()?;
//! rt.block_on(async { /* ... */ Ok(()) })?;
//! ```
//!
//! For deterministic tests use [`Runtime::lab`], which pairs the runtime
//! with a [`LabHandle`] and runs on virtual time.

use crate::error::{Error, Result};
use crate::ring::{LabHandle, LabRing, Ring, UringRing};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::env_config;
use crate::runtime::local;
use crate::runtime::state::{self, RuntimeState};
use crate::runtime::task_handle::JoinHandle;
use core::fmt;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

/// Error constructing a runtime.
#[derive(Debug)]
pub enum BuildError {
    /// An environment variable held an unparseable value.
    InvalidEnv {
        /// The variable's name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
    /// The ring backend could not be created.
    Ring(std::io::Error),
    /// The config file could not be read or parsed.
    #[cfg(feature = "config-file")]
    ConfigFile(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnv { name, value } => {
                write!(f, "invalid value {value:?} for {name}")
            }
            Self::Ring(err) => write!(f, "ring backend unavailable: {err}"),
            #[cfg(feature = "config-file")]
            Self::ConfigFile(msg) => write!(f, "config file error: {msg}"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Fluent builder for [`Runtime`].
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    ring: Option<Box<dyn Ring>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            ring: None,
        }
    }

    /// Sets the submission queue depth requested from the ring backend.
    #[must_use]
    pub fn ring_entries(mut self, entries: u32) -> Self {
        self.config.ring_entries = entries;
        self
    }

    /// Sets the completion drain batch capacity.
    #[must_use]
    pub fn completion_batch(mut self, batch: usize) -> Self {
        self.config.completion_batch = batch;
        self
    }

    /// Sets how many suspensions an unwinding task may still perform.
    #[must_use]
    pub fn cleanup_quota(mut self, quota: u32) -> Self {
        self.config.cleanup_quota = quota;
        self
    }

    /// Runs the loop on virtual time (never sleeps, jumps to deadlines).
    #[must_use]
    pub fn virtual_time(mut self, enabled: bool) -> Self {
        self.config.virtual_time = enabled;
        self
    }

    /// Toggles the WARN log for unobserved task failures.
    #[must_use]
    pub fn warn_unobserved_failures(mut self, enabled: bool) -> Self {
        self.config.warn_unobserved_failures = enabled;
        self
    }

    /// Supplies a ring backend instead of the platform default.
    #[must_use]
    pub fn ring(mut self, ring: Box<dyn Ring>) -> Self {
        self.ring = Some(ring);
        self
    }

    /// Applies `RINGLOOP_*` environment overrides.
    ///
    /// # Errors
    ///
    /// [`BuildError::InvalidEnv`] for unparseable values.
    pub fn with_env_overrides(mut self) -> std::result::Result<Self, BuildError> {
        env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Creates a builder from a TOML document.
    ///
    /// # Errors
    ///
    /// [`BuildError::ConfigFile`] if the document does not parse.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(doc: &str) -> std::result::Result<Self, BuildError> {
        let config: RuntimeConfig =
            toml::from_str(doc).map_err(|err| BuildError::ConfigFile(err.to_string()))?;
        Ok(Self { config, ring: None })
    }

    /// Creates a builder from a TOML config file.
    ///
    /// # Errors
    ///
    /// [`BuildError::ConfigFile`] if the file cannot be read or parsed.
    #[cfg(feature = "config-file")]
    pub fn from_toml(path: impl AsRef<std::path::Path>) -> std::result::Result<Self, BuildError> {
        let doc = std::fs::read_to_string(path)
            .map_err(|err| BuildError::ConfigFile(err.to_string()))?;
        Self::from_toml_str(&doc)
    }

    /// Builds the runtime.
    ///
    /// Without an explicit ring: virtual-time builds get an auto lab ring,
    /// otherwise the io_uring backend is created.
    ///
    /// # Errors
    ///
    /// [`BuildError::Ring`] when no ring backend is available.
    pub fn build(mut self) -> std::result::Result<Runtime, BuildError> {
        self.config.normalize();
        let ring: Box<dyn Ring> = match self.ring {
            Some(ring) => ring,
            None if self.config.virtual_time => Box::new(LabRing::auto().0),
            None => Box::new(
                UringRing::with_entries(self.config.ring_entries).map_err(BuildError::Ring)?,
            ),
        };
        Ok(Runtime::from_parts(self.config, ring))
    }
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .field("ring", &self.ring.is_some())
            .finish()
    }
}

/// The single-threaded, completion-driven runtime.
///
/// One call to [`Runtime::block_on`] drives the scheduler loop until the
/// root future and every spawned task have finished.
#[derive(Debug)]
pub struct Runtime {
    state: Rc<RefCell<RuntimeState>>,
}

impl Runtime {
    /// Creates a runtime with the default configuration and ring backend.
    ///
    /// # Errors
    ///
    /// [`BuildError::Ring`] when no ring backend is available on this
    /// platform.
    pub fn new() -> std::result::Result<Self, BuildError> {
        RuntimeBuilder::new().build()
    }

    /// Creates a deterministic lab runtime on virtual time, paired with
    /// the control handle of its auto-mode [`LabRing`].
    #[must_use]
    pub fn lab() -> (Self, LabHandle) {
        let (ring, handle) = LabRing::auto();
        let config = RuntimeConfig {
            virtual_time: true,
            ..RuntimeConfig::default()
        };
        (Self::from_parts(config, Box::new(ring)), handle)
    }

    pub(crate) fn from_parts(config: RuntimeConfig, ring: Box<dyn Ring>) -> Self {
        Self {
            state: Rc::new(RefCell::new(RuntimeState::new(config, ring))),
        }
    }

    /// Spawns a task before or outside `block_on`. It runs once the loop
    /// does.
    pub fn spawn<T, F>(&self, fut: F) -> JoinHandle<T>
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        let (task, promise) = self.state.borrow_mut().spawn_in(fut, Vec::new(), false);
        JoinHandle::new(task, promise)
    }

    /// Runs the scheduler loop until the root future and every spawned
    /// task have finished, returning the root's result.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a running runtime, if the root task
    /// panics, or on a scheduler deadlock.
    pub fn block_on<T, F>(&self, fut: F) -> Result<T>
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        let (_root, promise) = self.state.borrow_mut().spawn_in(fut, Vec::new(), false);
        let guard = local::enter(Rc::clone(&self.state));
        state::run(&self.state);
        drop(guard);

        match promise.try_take() {
            Some(Err(err)) if err.panic_payload().is_some() => {
                let payload = err.panic_payload().map(|p| p.message().to_owned());
                panic!(
                    "root task panicked: {}",
                    payload.unwrap_or_else(|| "unknown panic".to_owned())
                );
            }
            Some(result) => result,
            None => Err(Error::internal("scheduler loop ended before the root task settled")),
        }
    }
}
