// src/object_store.rs

//! Object-store collaborator: credentials and source paths for staging copies.

use std::collections::HashMap;
use std::fmt::{self, Debug};

use crate::errors::TaskError;

/// Access key pair handed to the warehouse's bulk copy.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Capability to resolve credentials and source locations.
pub trait ObjectStore: Send + Sync + Debug {
    fn resolve_credentials(&self, credential_ref: &str) -> Result<Credentials, TaskError>;

    /// Fully qualified path of `key` inside `bucket`.
    fn source_path(&self, bucket: &str, key: &str) -> String {
        join_source_path(bucket, key)
    }
}

/// Join bucket and key with exactly one `/` between them.
pub fn join_source_path(bucket: &str, key: &str) -> String {
    let key = key.trim_start_matches('/');
    if key.is_empty() {
        return bucket.to_string();
    }
    format!("{}/{}", bucket.trim_end_matches('/'), key)
}

/// Reads credentials from the environment.
///
/// For credential ref `aws_credentials` it tries
/// `AWS_CREDENTIALS_ACCESS_KEY_ID` / `AWS_CREDENTIALS_SECRET_ACCESS_KEY`
/// first, then the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
#[derive(Debug, Clone, Default)]
pub struct EnvObjectStore;

impl EnvObjectStore {
    pub fn new() -> Self {
        Self
    }

    fn pair(prefix: &str) -> Option<Credentials> {
        let access = std::env::var(format!("{prefix}ACCESS_KEY_ID")).ok()?;
        let secret = std::env::var(format!("{prefix}SECRET_ACCESS_KEY")).ok()?;
        Some(Credentials::new(access, secret))
    }
}

impl ObjectStore for EnvObjectStore {
    fn resolve_credentials(&self, credential_ref: &str) -> Result<Credentials, TaskError> {
        let prefix = format!(
            "{}_",
            credential_ref
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect::<String>()
        );
        Self::pair(&prefix)
            .or_else(|| Self::pair("AWS_"))
            .ok_or_else(|| TaskError::Credentials(credential_ref.to_string()))
    }
}

/// Fixed credentials keyed by reference.
#[derive(Debug, Clone, Default)]
pub struct StaticObjectStore {
    credentials: HashMap<String, Credentials>,
}

impl StaticObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(mut self, credential_ref: impl Into<String>, creds: Credentials) -> Self {
        self.credentials.insert(credential_ref.into(), creds);
        self
    }
}

impl ObjectStore for StaticObjectStore {
    fn resolve_credentials(&self, credential_ref: &str) -> Result<Credentials, TaskError> {
        self.credentials
            .get(credential_ref)
            .cloned()
            .ok_or_else(|| TaskError::Credentials(credential_ref.to_string()))
    }
}
