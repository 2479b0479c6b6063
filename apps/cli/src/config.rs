use std::env;
use std::path::PathBuf;
use std::time::Duration;

use guardian_core::AppError;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATABASE_PATH: &str = "./guardian.db";
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Runtime settings read from the environment and an optional `.env` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianConfig {
    pub database_path: PathBuf,
    pub read_only: bool,
    pub query_timeout: Duration,
    pub connect_timeout: Duration,
}

impl GuardianConfig {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_path = lookup("GUARDIAN_DATABASE_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let read_only = parse_env_bool(&lookup, "GUARDIAN_READ_ONLY", true)?;
        let query_timeout = Duration::from_secs(parse_env_secs(
            &lookup,
            "GUARDIAN_QUERY_TIMEOUT_SECS",
            DEFAULT_QUERY_TIMEOUT_SECS,
        )?);
        let connect_timeout = Duration::from_secs(parse_env_secs(
            &lookup,
            "GUARDIAN_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?);

        Ok(Self {
            database_path,
            read_only,
            query_timeout,
            connect_timeout,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn parse_env_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, AppError> {
    let Some(value) = lookup(name).filter(|value| !value.trim().is_empty()) else {
        return Ok(default);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(AppError::Validation(format!(
            "{name} must be true or false, got '{other}'"
        ))),
    }
}

fn parse_env_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<u64, AppError> {
    let Some(value) = lookup(name).filter(|value| !value.trim().is_empty()) else {
        return Ok(default);
    };

    let seconds = value
        .trim()
        .parse::<u64>()
        .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))?;
    if seconds == 0 {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use guardian_core::AppError;

    use super::GuardianConfig;

    fn load(pairs: &[(&str, &str)]) -> Result<GuardianConfig, AppError> {
        let values: HashMap<&str, &str> = pairs.iter().copied().collect();
        GuardianConfig::from_lookup(|name| values.get(name).map(|value| (*value).to_owned()))
    }

    #[test]
    fn defaults_are_read_only_with_standard_timeouts() {
        let Ok(config) = load(&[]) else {
            panic!("defaults should load");
        };
        assert_eq!(config.database_path, PathBuf::from("./guardian.db"));
        assert!(config.read_only);
        assert_eq!(config.query_timeout, Duration::from_secs(300));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("GUARDIAN_DATABASE_PATH", "/var/lib/guardian/cache.db"),
            ("GUARDIAN_READ_ONLY", "false"),
            ("GUARDIAN_QUERY_TIMEOUT_SECS", "60"),
        ]);
        assert!(matches!(
            config,
            Ok(ref config) if !config.read_only
                && config.query_timeout == Duration::from_secs(60)
                && config.database_path == PathBuf::from("/var/lib/guardian/cache.db")
        ));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let config = load(&[("GUARDIAN_READ_ONLY", "sometimes")]);
        assert!(matches!(
            config,
            Err(AppError::Validation(ref message)) if message.contains("GUARDIAN_READ_ONLY")
        ));

        let config = load(&[("GUARDIAN_CONNECT_TIMEOUT_SECS", "0")]);
        assert!(matches!(
            config,
            Err(AppError::Validation(ref message)) if message.contains("GUARDIAN_CONNECT_TIMEOUT_SECS")
        ));
    }
}
