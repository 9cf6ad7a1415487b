//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Get an environment variable as a u64.
pub fn get_u64(name: &str) -> Option<u64> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Common environment variable names.
pub mod vars {
    /// Feedlink home directory override.
    pub const FEEDLINK_HOME: &str = "FEEDLINK_HOME";

    /// Feedlink config file override.
    pub const FEEDLINK_CONFIG: &str = "FEEDLINK_CONFIG";

    /// Gateway port override.
    pub const FEEDLINK_PORT: &str = "FEEDLINK_PORT";

    /// Live-session idle timeout override, in seconds.
    pub const FEEDLINK_SESSION_IDLE_SECS: &str = "FEEDLINK_SESSION_IDLE_SECS";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_var_is_unset() {
        env::set_var("FEEDLINK_TEST_EMPTY", "");
        assert!(get_var("FEEDLINK_TEST_EMPTY").is_none());
    }

    #[test]
    fn test_get_numbers() {
        env::set_var("FEEDLINK_TEST_PORT", "9090");
        env::set_var("FEEDLINK_TEST_BAD_PORT", "ninety");
        assert_eq!(get_u16("FEEDLINK_TEST_PORT"), Some(9090));
        assert_eq!(get_u16("FEEDLINK_TEST_BAD_PORT"), None);
        assert_eq!(get_u64("FEEDLINK_TEST_PORT"), Some(9090));
    }
}
