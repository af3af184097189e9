//! Configuration for shared resources.
//!
//! Values are validated at construction with `nutype`, so a
//! [`SharedResourceConfig`] that exists is always usable.

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Human readable name of a shared resource.
///
/// Attached to every tracing span and event emitted for the resource.
/// Trimmed, non-empty and at most 128 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    default = "shared-resource",
    derive(
        Debug,
        Default,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ResourceName(String);

/// Behavior settings for a [`SharedResource`](crate::SharedResource).
///
/// # Example
/// ```rust
/// use lazyshare::config::{ResourceName, SharedResourceConfig};
///
/// let config = SharedResourceConfig::new()
///     .with_name(ResourceName::try_new("primary-db").unwrap())
///     .without_unclosed_drop_warning();
///
/// assert_eq!(config.name.as_ref(), "primary-db");
/// assert!(!config.warn_on_unclosed_drop);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedResourceConfig {
    /// Name used in logs
    pub name: ResourceName,
    /// Log a warning when a handle is dropped without `close()`
    pub warn_on_unclosed_drop: bool,
}

impl Default for SharedResourceConfig {
    fn default() -> Self {
        Self {
            name: ResourceName::default(),
            warn_on_unclosed_drop: true,
        }
    }
}

impl SharedResourceConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource name.
    #[must_use]
    pub fn with_name(mut self, name: ResourceName) -> Self {
        self.name = name;
        self
    }

    /// Silences the warning logged when a handle is dropped without `close()`.
    ///
    /// The reference is still released; only the log line is suppressed.
    #[must_use]
    pub const fn without_unclosed_drop_warning(mut self) -> Self {
        self.warn_on_unclosed_drop = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_validated() {
        let name = ResourceName::try_new("  cache  ").unwrap();
        assert_eq!(name.as_ref(), "cache");

        assert!(ResourceName::try_new("   ").is_err());
        assert!(ResourceName::try_new("x".repeat(129)).is_err());
        assert!(ResourceName::try_new("x".repeat(128)).is_ok());
    }

    #[test]
    fn default_config_warns_on_unclosed_drop() {
        let config = SharedResourceConfig::default();
        assert_eq!(config.name.as_ref(), "shared-resource");
        assert!(config.warn_on_unclosed_drop);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SharedResourceConfig =
            serde_json::from_str(r#"{ "name": "search-index" }"#).unwrap();

        assert_eq!(config.name.as_ref(), "search-index");
        assert!(config.warn_on_unclosed_drop);
    }

    #[test]
    fn invalid_name_is_rejected_during_deserialization() {
        let result = serde_json::from_str::<SharedResourceConfig>(r#"{ "name": "" }"#);
        assert!(result.is_err());
    }
}
