use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use guardian_core::{AppError, AppResult};
use guardian_domain::{ClusterConfig, CredentialMode};

/// Login resolved for one connection attempt.
#[derive(Clone)]
pub struct ClusterCredentials {
    username: String,
    password: String,
}

impl ClusterCredentials {
    /// Creates credentials from a username and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the login name.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    pub(super) fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl Debug for ClusterCredentials {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClusterCredentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Resolves the secret half of a cluster's credential mode.
pub trait CredentialSource: Send + Sync {
    /// Returns the login to use for the cluster.
    fn resolve(&self, cluster: &ClusterConfig) -> AppResult<ClusterCredentials>;
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from `GUARDIAN_PROFILE_<NAME>_*` and `GUARDIAN_CLUSTER_<NAME>_PASSWORD`.
#[derive(Clone)]
pub struct EnvCredentialSource {
    lookup: Lookup,
}

impl EnvCredentialSource {
    /// Reads variables from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Reads variables through the given lookup function.
    #[must_use]
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn required(&self, key: &str) -> AppResult<String> {
        (self.lookup)(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Validation(format!("credential variable {key} is not set")))
    }
}

/// Maps a profile or cluster name onto an environment variable segment.
#[must_use]
pub fn env_key_segment(name: &str) -> String {
    name.trim()
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

impl CredentialSource for EnvCredentialSource {
    fn resolve(&self, cluster: &ClusterConfig) -> AppResult<ClusterCredentials> {
        match cluster.credential() {
            CredentialMode::Profile { profile } => {
                let prefix = format!("GUARDIAN_PROFILE_{}", env_key_segment(profile));
                Ok(ClusterCredentials::new(
                    self.required(format!("{prefix}_USER").as_str())?,
                    self.required(format!("{prefix}_PASSWORD").as_str())?,
                ))
            }
            CredentialMode::Password { username } => {
                let key = format!(
                    "GUARDIAN_CLUSTER_{}_PASSWORD",
                    env_key_segment(cluster.name())
                );
                Ok(ClusterCredentials::new(
                    username.as_str(),
                    self.required(key.as_str())?,
                ))
            }
        }
    }
}

/// Returns the same login for every cluster.
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    credentials: ClusterCredentials,
}

impl StaticCredentialSource {
    /// Creates a source that always yields the given credentials.
    #[must_use]
    pub fn new(credentials: ClusterCredentials) -> Self {
        Self { credentials }
    }
}

impl CredentialSource for StaticCredentialSource {
    fn resolve(&self, _cluster: &ClusterConfig) -> AppResult<ClusterCredentials> {
        Ok(self.credentials.clone())
    }
}
