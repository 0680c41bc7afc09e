//! Generator configuration

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::defaults::DEBUG_LOCATION_ENV;

/// Snapshot of the environment, taken on first use
static ENV_CONFIG: Lazy<WeaverConfig> = Lazy::new(|| WeaverConfig {
    debug_location: std::env::var_os(DEBUG_LOCATION_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from),
});

/// Options that affect generation but not the identity of generated types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeaverConfig {
    /// Directory receiving a copy of every generated image, if set
    pub debug_location: Option<PathBuf>,
}

impl WeaverConfig {
    /// Configuration with everything disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration read from `WEAVER_DEBUG_LOCATION`
    pub fn from_env() -> Self {
        ENV_CONFIG.clone()
    }

    /// Dump generated images into `dir`
    pub fn with_debug_location(mut self, dir: impl AsRef<Path>) -> Self {
        self.debug_location = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Stop dumping generated images
    pub fn without_debug_location(mut self) -> Self {
        self.debug_location = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = WeaverConfig::new().with_debug_location("/tmp/weaver");
        assert_eq!(config.debug_location, Some(PathBuf::from("/tmp/weaver")));
        assert_eq!(config.without_debug_location(), WeaverConfig::default());
    }

    #[test]
    fn test_from_env_is_stable() {
        assert_eq!(WeaverConfig::from_env(), WeaverConfig::from_env());
    }
}
