//! Mailbox configuration.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```toml
//! fetch_timeout_secs = 30
//! cache_dir = "/var/cache/chainmail"
//! cache_ttl_secs = 86400
//! keystore_dir = "/var/lib/chainmail/keys"
//! user_agent = "chainmail-core/0.1.0"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{Cache, FileCache, KeyStore, MemoryCache};

/// Default timeout for fetching stored content
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Configuration for the mailbox and its fetch pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Timeout for a single HTTP fetch
    pub fetch_timeout_secs: u64,
    /// Directory for the file-backed fetch cache; in-memory when unset
    pub cache_dir: Option<PathBuf>,
    /// Expiry for file cache entries; never expire when unset
    pub cache_ttl_secs: Option<u64>,
    /// Directory holding sealed private keys
    pub keystore_dir: Option<PathBuf>,
    /// User-Agent header for HTTP fetches
    pub user_agent: String,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            cache_dir: None,
            cache_ttl_secs: None,
            keystore_dir: None,
            user_agent: format!("chainmail-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl MailboxConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Reject values that would make the mailbox unusable
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(Error::InvalidConfig("fetch_timeout_secs must be positive".into()));
        }
        if self.cache_ttl_secs == Some(0) {
            return Err(Error::InvalidConfig("cache_ttl_secs must be positive".into()));
        }
        if self.cache_ttl_secs.is_some() && self.cache_dir.is_none() {
            return Err(Error::InvalidConfig("cache_ttl_secs requires cache_dir".into()));
        }
        Ok(())
    }

    /// Fetch timeout as a duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Build the configured fetch cache
    pub fn build_cache(&self) -> Result<Arc<dyn Cache>> {
        match &self.cache_dir {
            Some(dir) => {
                let mut cache = FileCache::new(dir)?;
                if let Some(ttl) = self.cache_ttl_secs {
                    cache = cache.with_ttl(Duration::from_secs(ttl));
                }
                tracing::info!("Using file cache at {}", dir.display());
                Ok(Arc::new(cache))
            }
            None => Ok(Arc::new(MemoryCache::new())),
        }
    }

    /// Open the configured keystore, if any
    pub fn open_keystore(&self) -> Result<Option<KeyStore>> {
        self.keystore_dir.as_ref().map(KeyStore::new).transpose()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MailboxConfig::from_toml_str("").unwrap();

        assert_eq!(config, MailboxConfig::default());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("chainmail-core/"));
        assert!(config.open_keystore().unwrap().is_none());
    }

    #[test]
    fn test_full_document() {
        let dir = tempfile::tempdir().unwrap();
        let toml_str = format!(
            "fetch_timeout_secs = 5\ncache_dir = {:?}\ncache_ttl_secs = 60\nkeystore_dir = {:?}\nuser_agent = \"test-agent\"\n",
            dir.path().join("cache").display().to_string(),
            dir.path().join("keys").display().to_string(),
        );

        let config = MailboxConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config.fetch_timeout_secs, 5);
        assert_eq!(config.cache_ttl_secs, Some(60));
        assert_eq!(config.user_agent, "test-agent");

        let cache = config.build_cache().unwrap();
        cache.set("test://x", b"x").unwrap();
        assert!(dir.path().join("cache").is_dir());

        assert!(config.open_keystore().unwrap().is_some());
        assert!(dir.path().join("keys").is_dir());
    }

    #[test]
    fn test_invalid_documents() {
        for bad in [
            "fetch_timeout_secs = 0",
            "fetch_timeout_secs = \"thirty\"",
            "cache_ttl_secs = 10",
            "cache_dir = \"/tmp/x\"\ncache_ttl_secs = 0",
        ] {
            let err = MailboxConfig::from_toml_str(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{:?} gave {:?}", bad, err);
        }
    }

    #[test]
    fn test_memory_cache_without_dir() {
        let cache = MailboxConfig::default().build_cache().unwrap();
        cache.set("test://a", b"a").unwrap();
        assert_eq!(cache.get("test://a").unwrap().as_deref(), Some(&b"a"[..]));
    }
}
