//! Factory configuration.

/// Configuration for a [`crate::Factory`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether the factory can enumerate its databases.
    pub enumeration: bool,

    /// Whether to sync the journal after every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Number of commit frames after which a journal is rewritten as a single
    /// snapshot (0 = never).
    pub compaction_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enumeration: true,
            sync_on_commit: true,
            compaction_threshold: 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether database enumeration is supported.
    #[must_use]
    pub const fn enumeration(mut self, value: bool) -> Self {
        self.enumeration = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the compaction threshold in commit frames.
    #[must_use]
    pub const fn compaction_threshold(mut self, frames: u64) -> Self {
        self.compaction_threshold = frames;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.enumeration);
        assert!(config.sync_on_commit);
        assert_eq!(config.compaction_threshold, 1024);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .enumeration(false)
            .sync_on_commit(false)
            .compaction_threshold(8);

        assert!(!config.enumeration);
        assert!(!config.sync_on_commit);
        assert_eq!(config.compaction_threshold, 8);
    }
}
