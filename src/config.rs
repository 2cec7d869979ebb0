// Configuration for cpgidx
// Reads from environment variables with sensible defaults

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// External indexer binary, name or path (CPGIDX_SCIP_BINARY)
    pub scip_binary: String,

    /// Version written into every symbol (CPGIDX_PACKAGE_VERSION)
    pub package_version: String,

    /// Files above this size are skipped (CPGIDX_MAX_FILE_SIZE_MB)
    pub max_file_size_mb: u64,

    /// SQLite busy timeout in seconds (CPGIDX_BUSY_TIMEOUT_SECS)
    pub busy_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scip_binary: "scip-go".to_string(),
            package_version: ".".to_string(),
            max_file_size_mb: 10,
            busy_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("CPGIDX_SCIP_BINARY") {
            if val.trim().is_empty() {
                tracing::warn!(
                    "empty CPGIDX_SCIP_BINARY, using default: {}",
                    config.scip_binary
                );
            } else {
                config.scip_binary = val;
            }
        }

        if let Ok(val) = env::var("CPGIDX_PACKAGE_VERSION") {
            if val.contains(' ') || val.is_empty() {
                tracing::warn!(
                    "invalid CPGIDX_PACKAGE_VERSION value: {:?}, using default: {}",
                    val,
                    config.package_version
                );
            } else {
                config.package_version = val;
            }
        }

        override_parsed("CPGIDX_MAX_FILE_SIZE_MB", &mut config.max_file_size_mb);
        override_parsed("CPGIDX_BUSY_TIMEOUT_SECS", &mut config.busy_timeout_secs);

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

fn override_parsed<T>(key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    if let Ok(val) = env::var(key) {
        match val.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!("invalid {key} value: {val}, using default: {slot}"),
        }
    }
}
