/// Environment variable names used by this crate for convenient
/// configuration of the context block from microservices.
///
/// These are purely helpers; the core encoder types remain decoupled
/// from environment access.
use crate::context::ContextConfig;

/// Host name override for the context block, e.g. a container name.
pub const WIRELOG_HOSTNAME_ENV: &str = "WIRELOG_HOSTNAME";

/// Set to `1` or `true` to condense logger names to their final path
/// segment.
pub const WIRELOG_CONDENSED_LOGGER_ENV: &str = "WIRELOG_CONDENSED_LOGGER";

/// Comma-separated list of ambient keys copied into the context block.
pub const WIRELOG_AMBIENT_KEYS_ENV: &str = "WIRELOG_AMBIENT_KEYS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Build a [`ContextConfig`] from the environment, starting from the
/// defaults.
pub fn context_config_from_env() -> ContextConfig {
    let mut config = ContextConfig::default();
    if let Ok(host) = std::env::var(WIRELOG_HOSTNAME_ENV) {
        if !host.is_empty() {
            config.host_override = Some(host);
        }
    }
    let condensed = env_or(WIRELOG_CONDENSED_LOGGER_ENV, "");
    config.condensed_logger = condensed == "1" || condensed.eq_ignore_ascii_case("true");
    let keys = env_or(WIRELOG_AMBIENT_KEYS_ENV, "");
    config.ambient_keys = keys
        .split(',')
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string())
        .collect();
    config
}
