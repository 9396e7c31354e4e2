//! Configuration for Fanout.
//!
//! Loaded from `$FANOUT_CONFIG` when set, otherwise `~/.fanout/config.toml`.
//! Every key is optional; accessors on each section resolve the documented
//! default when a key is absent.
//!
//! ```toml
//! [transport]
//! user_agent = "fanout/${USER}"
//! timeout_secs = 20
//! connect_timeout_secs = 10
//! max_redirects = 10
//!
//! [dispatcher]
//! max_blocking_threads = 64
//! thread_name = "fanout-worker"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "FANOUT_CONFIG";

/// Environment variable overriding `[transport] timeout_secs`.
pub const TIMEOUT_ENV: &str = "FANOUT_TIMEOUT_SECS";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanoutConfig {
    pub transport: Option<TransportConfig>,
    pub dispatcher: Option<DispatcherConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// `[transport]` section: settings for the blocking HTTP client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// User-Agent header. `${VAR}` references are expanded from the environment.
    pub user_agent: Option<String>,
    /// Whole-request timeout. `0` disables it. Default: 30.
    pub timeout_secs: Option<u64>,
    /// TCP connect timeout. Default: 10.
    pub connect_timeout_secs: Option<u64>,
    /// Redirects followed before giving up. `0` disables redirects. Default: 10.
    pub max_redirects: Option<usize>,
    /// Idle connections kept per host. Default: 32.
    pub pool_max_idle_per_host: Option<usize>,
    /// Seconds an idle pooled connection is kept. Default: 90.
    pub pool_idle_timeout_secs: Option<u64>,
    /// TCP keepalive idle time. Default: 60.
    pub tcp_keepalive_secs: Option<u64>,
}

impl TransportConfig {
    pub const DEFAULT_USER_AGENT: &'static str = concat!("fanout/", env!("CARGO_PKG_VERSION"));
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_MAX_REDIRECTS: usize = 10;
    pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 32;
    pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;
    pub const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 60;

    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .as_deref()
            .map(expand_env_vars)
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_USER_AGENT.to_string())
    }

    /// Request timeout, `None` when disabled.
    ///
    /// `FANOUT_TIMEOUT_SECS` wins over the file when it holds a valid integer.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_with_override(env::var(TIMEOUT_ENV).ok().as_deref())
    }

    fn timeout_with_override(&self, env_value: Option<&str>) -> Option<Duration> {
        let from_env = env_value.and_then(|value| value.trim().parse::<u64>().ok());
        let secs = from_env
            .or(self.timeout_secs)
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECS);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(Self::DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn max_redirects(&self) -> usize {
        self.max_redirects.unwrap_or(Self::DEFAULT_MAX_REDIRECTS)
    }

    #[must_use]
    pub fn pool_max_idle_per_host(&self) -> usize {
        self.pool_max_idle_per_host
            .unwrap_or(Self::DEFAULT_POOL_MAX_IDLE_PER_HOST)
    }

    #[must_use]
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(
            self.pool_idle_timeout_secs
                .unwrap_or(Self::DEFAULT_POOL_IDLE_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(
            self.tcp_keepalive_secs
                .unwrap_or(Self::DEFAULT_TCP_KEEPALIVE_SECS),
        )
    }
}

/// `[dispatcher]` section: sizing of the scheduling context.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Upper bound on worker threads running blocking calls. Default: 512.
    /// Requests beyond this queue until a worker frees up.
    pub max_blocking_threads: Option<usize>,
    /// Name given to worker threads. Default: `fanout-worker`.
    pub thread_name: Option<String>,
    /// Seconds an idle worker thread lingers. Default: 10.
    pub thread_keep_alive_secs: Option<u64>,
}

impl DispatcherConfig {
    pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 512;
    pub const DEFAULT_THREAD_NAME: &'static str = "fanout-worker";
    pub const DEFAULT_THREAD_KEEP_ALIVE_SECS: u64 = 10;

    #[must_use]
    pub fn max_blocking_threads(&self) -> usize {
        self.max_blocking_threads
            .filter(|n| *n > 0)
            .unwrap_or(Self::DEFAULT_MAX_BLOCKING_THREADS)
    }

    #[must_use]
    pub fn thread_name(&self) -> &str {
        self.thread_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(Self::DEFAULT_THREAD_NAME)
    }

    #[must_use]
    pub fn thread_keep_alive(&self) -> Duration {
        Duration::from_secs(
            self.thread_keep_alive_secs
                .unwrap_or(Self::DEFAULT_THREAD_KEEP_ALIVE_SECS),
        )
    }
}

/// Replace `${VAR}` with the value of `VAR`, or nothing when unset.
///
/// An unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl FanoutConfig {
    /// Load the user config. `Ok(None)` when no config file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// `[transport]` section, or defaults when absent.
    #[must_use]
    pub fn transport(&self) -> TransportConfig {
        self.transport.clone().unwrap_or_default()
    }

    /// `[dispatcher]` section, or defaults when absent.
    #[must_use]
    pub fn dispatcher(&self) -> DispatcherConfig {
        self.dispatcher.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".fanout").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    // expand_env_vars tests

    #[test]
    fn expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn expand_env_vars_single_var() {
        unsafe {
            env::set_var("FANOUT_TEST_UA_VAR", "replaced");
        }
        let result = expand_env_vars("prefix ${FANOUT_TEST_UA_VAR} suffix");
        assert_eq!(result, "prefix replaced suffix");
        unsafe {
            env::remove_var("FANOUT_TEST_UA_VAR");
        }
    }

    #[test]
    fn expand_env_vars_missing_var_becomes_empty() {
        unsafe {
            env::remove_var("FANOUT_MISSING_VAR_FOR_TEST");
        }
        let result = expand_env_vars("before ${FANOUT_MISSING_VAR_FOR_TEST} after");
        assert_eq!(result, "before  after");
    }

    #[test]
    fn expand_env_vars_unclosed_brace_preserved() {
        assert_eq!(expand_env_vars("test ${UNCLOSED"), "test ${UNCLOSED");
    }

    #[test]
    fn expand_env_vars_empty_name_dropped() {
        assert_eq!(expand_env_vars("a${}b"), "ab");
    }

    // loading

    #[test]
    fn load_from_parses_both_sections() {
        let file = write_config(
            r#"
            [transport]
            user_agent = "batch-runner/2"
            connect_timeout_secs = 3
            max_redirects = 0

            [dispatcher]
            max_blocking_threads = 8
            thread_name = "probe"
            "#,
        );

        let config = FanoutConfig::load_from(file.path()).unwrap();
        let transport = config.transport();
        assert_eq!(transport.user_agent(), "batch-runner/2");
        assert_eq!(transport.connect_timeout(), Duration::from_secs(3));
        assert_eq!(transport.max_redirects(), 0);
        assert_eq!(
            transport.pool_max_idle_per_host(),
            TransportConfig::DEFAULT_POOL_MAX_IDLE_PER_HOST
        );

        let dispatcher = config.dispatcher();
        assert_eq!(dispatcher.max_blocking_threads(), 8);
        assert_eq!(dispatcher.thread_name(), "probe");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = write_config("");
        let config = FanoutConfig::load_from(file.path()).unwrap();
        assert!(config.transport.is_none());
        assert_eq!(
            config.dispatcher().max_blocking_threads(),
            DispatcherConfig::DEFAULT_MAX_BLOCKING_THREADS
        );
        assert_eq!(
            config.transport().user_agent(),
            TransportConfig::DEFAULT_USER_AGENT
        );
    }

    #[test]
    fn parse_error_carries_path() {
        let file = write_config("[transport]\ntimeout_secs = \"soon\"\n");
        let err = FanoutConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), &file.path().to_path_buf());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("[dispatcher]\nworkers = 4\n");
        let err = FanoutConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = FanoutConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    // resolved values

    #[test]
    fn zero_timeout_disables_it() {
        let config = TransportConfig {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.timeout_with_override(None), None);
    }

    #[test]
    fn timeout_override_wins_over_file() {
        let config = TransportConfig {
            timeout_secs: Some(30),
            ..Default::default()
        };
        assert_eq!(
            config.timeout_with_override(Some(" 5 ")),
            Some(Duration::from_secs(5))
        );
        assert_eq!(config.timeout_with_override(Some("0")), None);
        assert_eq!(
            config.timeout_with_override(Some("soon")),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            TransportConfig::default().timeout_with_override(None),
            Some(Duration::from_secs(TransportConfig::DEFAULT_TIMEOUT_SECS))
        );
    }

    #[test]
    fn zero_blocking_threads_falls_back_to_default() {
        let config = DispatcherConfig {
            max_blocking_threads: Some(0),
            thread_name: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.max_blocking_threads(),
            DispatcherConfig::DEFAULT_MAX_BLOCKING_THREADS
        );
        assert_eq!(config.thread_name(), DispatcherConfig::DEFAULT_THREAD_NAME);
    }

    #[test]
    fn blank_user_agent_falls_back_to_default() {
        let config = TransportConfig {
            user_agent: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.user_agent(), TransportConfig::DEFAULT_USER_AGENT);
    }
}
