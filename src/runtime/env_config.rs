//! Environment variable overrides for [`RuntimeConfig`].
//!
//! Settings resolve in this order (highest priority first): programmatic
//! builder calls, `RINGLOOP_*` environment variables, config file (with
//! the `config-file` feature), built-in defaults.
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `RINGLOOP_RING_ENTRIES` | `u32` | `ring_entries` |
//! | `RINGLOOP_COMPLETION_BATCH` | `usize` | `completion_batch` |
//! | `RINGLOOP_CLEANUP_QUOTA` | `u32` | `cleanup_quota` |
//! | `RINGLOOP_VIRTUAL_TIME` | `bool` | `virtual_time` |
//! | `RINGLOOP_WARN_UNOBSERVED` | `bool` | `warn_unobserved_failures` |

use super::builder::BuildError;
use super::config::RuntimeConfig;

/// Environment variable for the submission queue depth.
pub const ENV_RING_ENTRIES: &str = "RINGLOOP_RING_ENTRIES";
/// Environment variable for the completion batch capacity.
pub const ENV_COMPLETION_BATCH: &str = "RINGLOOP_COMPLETION_BATCH";
/// Environment variable for the cleanup suspension quota.
pub const ENV_CLEANUP_QUOTA: &str = "RINGLOOP_CLEANUP_QUOTA";
/// Environment variable for virtual-time mode.
pub const ENV_VIRTUAL_TIME: &str = "RINGLOOP_VIRTUAL_TIME";
/// Environment variable for the unobserved-failure warning.
pub const ENV_WARN_UNOBSERVED: &str = "RINGLOOP_WARN_UNOBSERVED";

/// Applies any set `RINGLOOP_*` variables to `config`.
///
/// # Errors
///
/// [`BuildError::InvalidEnv`] if a variable is set but unparseable.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), BuildError> {
    if let Some(val) = read_env(ENV_RING_ENTRIES) {
        config.ring_entries = parse(ENV_RING_ENTRIES, &val)?;
    }
    if let Some(val) = read_env(ENV_COMPLETION_BATCH) {
        config.completion_batch = parse(ENV_COMPLETION_BATCH, &val)?;
    }
    if let Some(val) = read_env(ENV_CLEANUP_QUOTA) {
        config.cleanup_quota = parse(ENV_CLEANUP_QUOTA, &val)?;
    }
    if let Some(val) = read_env(ENV_VIRTUAL_TIME) {
        config.virtual_time = parse_bool(ENV_VIRTUAL_TIME, &val)?;
    }
    if let Some(val) = read_env(ENV_WARN_UNOBSERVED) {
        config.warn_unobserved_failures = parse_bool(ENV_WARN_UNOBSERVED, &val)?;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, BuildError> {
    value.parse().map_err(|_| BuildError::InvalidEnv {
        name,
        value: value.to_owned(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, BuildError> {
    match value {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BuildError::InvalidEnv {
            name,
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Process-global environment: tests touching it set distinct variables
    // and restore them, and each uses its own.

    #[test]
    fn applies_numeric_override() {
        std::env::set_var(ENV_RING_ENTRIES, "64");
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config).unwrap();
        assert_eq!(config.ring_entries, 64);
        std::env::remove_var(ENV_RING_ENTRIES);
    }

    #[test]
    fn rejects_garbage() {
        std::env::set_var(ENV_CLEANUP_QUOTA, "lots");
        let mut config = RuntimeConfig::default();
        assert!(apply_env_overrides(&mut config).is_err());
        std::env::remove_var(ENV_CLEANUP_QUOTA);
    }

    #[test]
    fn parses_bool_spellings() {
        assert!(parse_bool("X", "yes").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
