//! Runtime configuration resolved from the environment.
//!
//! | Setting | Primary Env Var | Fallback | Default |
//! |---------|-----------------|----------|---------|
//! | Data directory | `THERA_HOME` | `$HOME/.thera` | `.thera` |
//! | NCBI API key | `THERA_NCBI_API_KEY` | `NCBI_API_KEY` | none |
//! | Disable persisted cache | `THERA_CACHE_DISABLED` | - | `false` |
//! | Request timeout (seconds) | `THERA_HTTP_TIMEOUT_SECS` | - | `30` |
//! | User agent | `THERA_USER_AGENT` | - | `thera/<version>` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thera_cache::{resolve_thera_home, CacheConfig};

use crate::gateway::DEFAULT_REQUEST_TIMEOUT;
use crate::ValidationError;

pub const DEFAULT_USER_AGENT: &str = concat!("thera/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq)]
pub struct TheraConfig {
    pub thera_home: PathBuf,
    pub ncbi_api_key: Option<String>,
    pub cache_disabled: bool,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for TheraConfig {
    fn default() -> Self {
        Self {
            thera_home: resolve_thera_home(),
            ncbi_api_key: None,
            cache_disabled: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: String::from(DEFAULT_USER_AGENT),
        }
    }
}

impl TheraConfig {
    /// Resolve every setting from the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve settings through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let thera_home = non_empty("THERA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(resolve_thera_home);

        let ncbi_api_key = non_empty("THERA_NCBI_API_KEY").or_else(|| non_empty("NCBI_API_KEY"));

        let cache_disabled = match non_empty("THERA_CACHE_DISABLED") {
            Some(value) => parse_flag("THERA_CACHE_DISABLED", &value)?,
            None => false,
        };

        let request_timeout = match non_empty("THERA_HTTP_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ValidationError::InvalidSetting {
                        name: "THERA_HTTP_TIMEOUT_SECS",
                        value,
                    })
                }
            },
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let user_agent = non_empty("THERA_USER_AGENT").unwrap_or_else(|| String::from(DEFAULT_USER_AGENT));

        Ok(Self {
            thera_home,
            ncbi_api_key,
            cache_disabled,
            request_timeout,
            user_agent,
        })
    }

    pub fn with_home(mut self, thera_home: impl Into<PathBuf>) -> Self {
        self.thera_home = thera_home.into();
        self
    }

    pub fn with_ncbi_api_key(mut self, key: impl Into<String>) -> Self {
        self.ncbi_api_key = Some(key.into());
        self
    }

    pub fn with_cache_disabled(mut self, disabled: bool) -> Self {
        self.cache_disabled = disabled;
        self
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::with_home(&self.thera_home)
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::InvalidSetting {
            name,
            value: value.to_owned(),
        }),
    }
}
