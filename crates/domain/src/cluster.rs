use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use guardian_core::{AppError, AppResult, ClusterId, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Default listener port of an analytical cluster endpoint.
pub const DEFAULT_CLUSTER_PORT: u16 = 5439;

/// Credential profile used when none is configured.
pub const DEFAULT_CREDENTIAL_PROFILE: &str = "default";

/// Deployment flavour of a remote cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterType {
    /// Node-based cluster.
    #[default]
    Provisioned,
    /// Workgroup endpoint without managed nodes.
    Serverless,
}

impl ClusterType {
    /// Returns a stable storage value for this cluster type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioned => "Provisioned",
            Self::Serverless => "Serverless",
        }
    }
}

impl FromStr for ClusterType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "provisioned" => Ok(Self::Provisioned),
            "serverless" => Ok(Self::Serverless),
            _ => Err(AppError::Validation(format!(
                "unknown cluster type '{value}'"
            ))),
        }
    }
}

/// How a connection to the cluster authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialMode {
    /// IAM-style credentials resolved from a named profile.
    Profile {
        /// Credential profile name.
        profile: String,
    },
    /// Database username with a password resolved at connect time.
    Password {
        /// Database user the connection logs in as.
        username: String,
    },
}

impl CredentialMode {
    /// Returns whether this mode uses profile-based credentials.
    #[must_use]
    pub fn is_profile(&self) -> bool {
        matches!(self, Self::Profile { .. })
    }

    /// Returns the configured profile name, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        match self {
            Self::Profile { profile } => Some(profile.as_str()),
            Self::Password { .. } => None,
        }
    }

    /// Returns the configured database username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Profile { .. } => None,
            Self::Password { username } => Some(username.as_str()),
        }
    }
}

impl Default for CredentialMode {
    fn default() -> Self {
        Self::Profile {
            profile: DEFAULT_CREDENTIAL_PROFILE.to_owned(),
        }
    }
}

/// Outcome of the most recent scan recorded on a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    /// The last scan replaced the cached snapshot.
    Success,
    /// The last scan failed and left the cached snapshot untouched.
    Failed,
}

impl ScanStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl Display for ScanStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown scan status '{value}'"
            ))),
        }
    }
}

/// Operator-supplied cluster connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfigInput {
    /// Unique display name.
    pub name: String,
    /// Endpoint host name.
    pub host: String,
    /// Endpoint port.
    pub port: u16,
    /// Database to connect to.
    pub database: String,
    /// Deployment flavour.
    pub cluster_type: ClusterType,
    /// Region the cluster runs in.
    pub region: String,
    /// Authentication mode.
    pub credential: CredentialMode,
}

/// Validated cluster record owned by the local cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    id: Option<ClusterId>,
    name: NonEmptyString,
    host: NonEmptyString,
    port: u16,
    database: NonEmptyString,
    cluster_type: ClusterType,
    region: NonEmptyString,
    credential: CredentialMode,
    last_scan_at: Option<DateTime<Utc>>,
    last_scan_status: Option<ScanStatus>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ClusterConfig {
    /// Creates a validated, not yet persisted cluster record.
    pub fn new(input: ClusterConfigInput) -> AppResult<Self> {
        let ClusterConfigInput {
            name,
            host,
            port,
            database,
            cluster_type,
            region,
            credential,
        } = input;

        let name = NonEmptyString::new(name.trim())
            .map_err(|_| AppError::Validation("cluster name is required".to_owned()))?;
        let host = NonEmptyString::new(host.trim())
            .map_err(|_| AppError::Validation("host is required".to_owned()))?;
        let database = NonEmptyString::new(database.trim())
            .map_err(|_| AppError::Validation("database name is required".to_owned()))?;
        let region = NonEmptyString::new(region.trim())
            .map_err(|_| AppError::Validation("region is required".to_owned()))?;

        if port == 0 {
            return Err(AppError::Validation(
                "port must be between 1 and 65535".to_owned(),
            ));
        }

        let credential = match credential {
            CredentialMode::Profile { profile } => {
                let profile = profile.trim();
                CredentialMode::Profile {
                    profile: if profile.is_empty() {
                        DEFAULT_CREDENTIAL_PROFILE.to_owned()
                    } else {
                        profile.to_owned()
                    },
                }
            }
            CredentialMode::Password { username } => {
                let username = username.trim();
                if username.is_empty() {
                    return Err(AppError::Validation(
                        "username is required for password authentication".to_owned(),
                    ));
                }
                CredentialMode::Password {
                    username: username.to_owned(),
                }
            }
        };

        let now = Utc::now();
        Ok(Self {
            id: None,
            name,
            host,
            port,
            database,
            cluster_type,
            region,
            credential,
            last_scan_at: None,
            last_scan_status: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Attaches the persisted identifier.
    #[must_use]
    pub fn with_id(mut self, id: ClusterId) -> Self {
        self.id = Some(id);
        self
    }

    /// Attaches stored creation and modification timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    /// Attaches the most recent scan outcome.
    #[must_use]
    pub fn with_last_scan(
        mut self,
        last_scan_at: Option<DateTime<Utc>>,
        last_scan_status: Option<ScanStatus>,
    ) -> Self {
        self.last_scan_at = last_scan_at;
        self.last_scan_status = last_scan_status;
        self
    }

    /// Returns the persisted identifier, `None` before the first save.
    #[must_use]
    pub fn id(&self) -> Option<ClusterId> {
        self.id
    }

    /// Returns the unique cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the endpoint host.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Returns the endpoint port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the database name.
    #[must_use]
    pub fn database(&self) -> &str {
        self.database.as_str()
    }

    /// Returns the deployment flavour.
    #[must_use]
    pub fn cluster_type(&self) -> ClusterType {
        self.cluster_type
    }

    /// Returns the cluster region.
    #[must_use]
    pub fn region(&self) -> &str {
        self.region.as_str()
    }

    /// Returns the authentication mode.
    #[must_use]
    pub fn credential(&self) -> &CredentialMode {
        &self.credential
    }

    /// Returns when the last scan finished.
    #[must_use]
    pub fn last_scan_at(&self) -> Option<DateTime<Utc>> {
        self.last_scan_at
    }

    /// Returns the last scan outcome.
    #[must_use]
    pub fn last_scan_status(&self) -> Option<ScanStatus> {
        self.last_scan_status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last modification timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns `name (type)` for listings.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name.as_str(), self.cluster_type.as_str())
    }
}
