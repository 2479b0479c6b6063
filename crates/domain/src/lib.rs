//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod catalog;
mod cluster;
mod privilege;
mod query_template;
mod sql_text;

pub use catalog::{RemoteUser, RoleLineage, SYSTEM_SCHEMAS, TablePermission};
pub use cluster::{
    ClusterConfig, ClusterConfigInput, ClusterType, CredentialMode, DEFAULT_CLUSTER_PORT,
    DEFAULT_CREDENTIAL_PROFILE, ScanStatus,
};
pub use privilege::PermissionKind;
pub use query_template::{QueryTemplate, QueryTemplateInput};
pub use sql_text::{MASKED_SECRET, escape_literal, quote_identifier, quote_literal, unquote_identifier};
