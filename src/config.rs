//! Configuration types.
//!
//! Every section reads `TASKFORGE_*` environment variables through a lookup
//! function and falls back to its `Default` when a variable is absent.
//! [`Config::from_env`] loads all of them from the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default system prompt for the root agent.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the root coordinator. Break work into parts, \
     create specialist sub-agents with create_child when a distinct expertise is needed, \
     delegate with call_child, and combine their answers into a final result.";

/// Job store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Location of the libSQL database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/taskforge.db"),
        }
    }
}

impl StoreConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = lookup("TASKFORGE_DB_PATH") {
            config.path = PathBuf::from(path);
        }
        Ok(config)
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between claim cycles.
    pub poll_interval: Duration,
    /// Upper bound on simultaneously executing jobs. `None` means unbounded.
    pub max_concurrent_jobs: Option<usize>,
    /// Per-invocation executor timeout. `None` waits indefinitely.
    pub executor_timeout: Option<Duration>,
    /// How long shutdown waits for in-flight jobs before abandoning them.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_concurrent_jobs: None,
            executor_timeout: None,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl SchedulerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = parse_var::<u64>(&lookup, "TASKFORGE_POLL_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "TASKFORGE_POLL_SECS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.poll_interval = Duration::from_secs(secs);
        }
        config.max_concurrent_jobs =
            parse_var::<usize>(&lookup, "TASKFORGE_MAX_CONCURRENT_JOBS")?.filter(|n| *n > 0);
        config.executor_timeout = parse_var::<u64>(&lookup, "TASKFORGE_EXECUTOR_TIMEOUT_SECS")?
            .map(Duration::from_secs);
        if let Some(secs) = parse_var::<u64>(&lookup, "TASKFORGE_SHUTDOWN_GRACE_SECS")? {
            config.shutdown_grace = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// HTTP request-path configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

impl ServerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = lookup("TASKFORGE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var::<u16>(&lookup, "TASKFORGE_PORT")? {
            config.port = port;
        }
        Ok(config)
    }

    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Executor (language-model client) configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// API key. Without one the offline echo executor is used.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    /// Attempts after the first for transient failures.
    pub max_retries: u32,
    /// Tool-use round trips allowed within one invocation.
    pub max_tool_rounds: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            max_retries: 3,
            max_tool_rounds: 16,
        }
    }
}

impl ExecutorConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.api_key = lookup("ANTHROPIC_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        if let Some(model) = lookup("TASKFORGE_MODEL") {
            config.model = model;
        }
        if let Some(url) = lookup("TASKFORGE_LLM_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(max_tokens) = parse_var::<u32>(&lookup, "TASKFORGE_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "TASKFORGE_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(rounds) = parse_var::<usize>(&lookup, "TASKFORGE_MAX_TOOL_ROUNDS")? {
            config.max_tool_rounds = rounds;
        }
        Ok(config)
    }
}

/// Root agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Qualified name of the tree root.
    pub root_name: String,
    pub system_prompt: String,
    /// Placeholder answer returned by the `ask_user` capability.
    pub ask_user_answer: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            root_name: "Root".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            ask_user_answer: "I have no idea. Generate some default values.".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = lookup("TASKFORGE_ROOT_NAME") {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::InvalidValue {
                    key: "TASKFORGE_ROOT_NAME".to_string(),
                    message: "must be non-empty and must not contain '/'".to_string(),
                });
            }
            config.root_name = name;
        }
        if let Some(prompt) = lookup("TASKFORGE_SYSTEM_PROMPT") {
            config.system_prompt = prompt;
        }
        if let Some(answer) = lookup("TASKFORGE_ASK_USER_ANSWER") {
            config.ask_user_answer = answer;
        }
        Ok(config)
    }
}

/// Every section, loaded together at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
    pub executor: ExecutorConfig,
    pub agent: AgentConfig,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        Ok(Self {
            store: StoreConfig::from_lookup(&lookup)?,
            scheduler: SchedulerConfig::from_lookup(&lookup)?,
            server: ServerConfig::from_lookup(&lookup)?,
            executor: ExecutorConfig::from_lookup(&lookup)?,
            agent: AgentConfig::from_lookup(&lookup)?,
        })
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
    }
}
