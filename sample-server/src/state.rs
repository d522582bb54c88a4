//! Server state
//!
//! Immutable per-server data shared with every handler.

use std::sync::Arc;
use std::time::Instant;

use crate::memory::{MemoryProbe, ProcessMemoryProbe};

/// Environment variables consulted for the environment label, in order
pub const ENVIRONMENT_VARS: [&str; 2] = ["APP_ENV", "NODE_ENV"];

/// Label used when none of `ENVIRONMENT_VARS` is set
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Server-wide shared state
pub struct AppState {
    started_at: Instant,
    memory: Arc<dyn MemoryProbe>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_memory_probe(Arc::new(ProcessMemoryProbe))
    }

    pub fn with_memory_probe(memory: Arc<dyn MemoryProbe>) -> Self {
        Self {
            started_at: Instant::now(),
            memory,
        }
    }

    /// Seconds since this state was created
    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    pub fn memory(&self) -> &dyn MemoryProbe {
        self.memory.as_ref()
    }

    /// Current environment label, read from the process environment on every call
    pub fn environment(&self) -> String {
        current_environment()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn current_environment() -> String {
    ENVIRONMENT_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_environment() {
        for name in ENVIRONMENT_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_environment_defaults_to_development() {
        clear_environment();
        assert_eq!(AppState::new().environment(), "development");
    }

    #[test]
    #[serial]
    fn test_app_env_wins_over_node_env() {
        clear_environment();
        std::env::set_var("NODE_ENV", "staging");
        assert_eq!(current_environment(), "staging");

        std::env::set_var("APP_ENV", "production");
        assert_eq!(current_environment(), "production");

        clear_environment();
    }

    #[test]
    #[serial]
    fn test_empty_value_is_ignored() {
        clear_environment();
        std::env::set_var("APP_ENV", "");
        std::env::set_var("NODE_ENV", "test");
        assert_eq!(current_environment(), "test");
        clear_environment();
    }

    #[test]
    fn test_uptime_increases() {
        let state = AppState::new();
        let first = state.uptime_secs();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(state.uptime_secs() > first);
    }
}
