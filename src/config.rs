//! Process configuration, read from the environment.
//!
//! Mirrors the teacher's binaries, which read configuration from environment
//! variables and CLI flags rather than a config file; field defaults follow
//! the timeouts and intervals fixed in the spec.

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub http_port: u16,
    pub routing_provider_base_url: Option<String>,
    pub routing_provider_api_key: Option<String>,
    pub routing_provider_timeout_secs: u64,
    pub db_timeout_secs: u64,
    pub handler_timeout_secs: u64,
    pub agent_tick_interval_secs: u64,
    pub lm_endpoint: Option<String>,
    pub lm_model: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from the process environment, falling back to
    /// development-friendly defaults for every field.
    pub fn from_env() -> Self {
        Self {
            db_path: env_or("DISPATCH_DB_PATH", "data/dispatch.db"),
            http_port: env_parsed("DISPATCH_HTTP_PORT", 8080),
            routing_provider_base_url: std::env::var("ROUTING_PROVIDER_BASE_URL").ok(),
            routing_provider_api_key: std::env::var("ROUTING_PROVIDER_API_KEY").ok(),
            routing_provider_timeout_secs: env_parsed("ROUTING_PROVIDER_TIMEOUT_SECS", 10),
            db_timeout_secs: env_parsed("DISPATCH_DB_TIMEOUT_SECS", 5),
            handler_timeout_secs: env_parsed("DISPATCH_HANDLER_TIMEOUT_SECS", 30),
            agent_tick_interval_secs: env_parsed("AGENT_TICK_INTERVAL_SECS", 600),
            lm_endpoint: std::env::var("AGENT_LM_ENDPOINT").ok(),
            lm_model: std::env::var("AGENT_LM_MODEL").ok(),
        }
    }
}
