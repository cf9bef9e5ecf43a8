//! Blob storage for incident attachments.
//!
//! The API never proxies attachment bytes through incident routes. Clients
//! receive a short-lived credential URL and transfer bytes directly to the
//! store. `LocalBlobStore` backs that contract with a directory on disk and
//! HS256 tokens embedded in the URLs it hands out.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("credential rejected: {0}")]
    Credential(String),

    #[error("blob io failure: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct BlobCredential {
    pub url: String,
    pub expires_at: chrono::DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn issue_upload_credential(
        &self,
        path: &str,
        content_type: &str,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<BlobCredential, BlobError>;

    /// Size in bytes of a stored object, `None` when nothing is stored at
    /// `path`.
    async fn size(&self, path: &str, container: &str) -> Result<Option<u64>, BlobError>;

    async fn issue_read_credential(
        &self,
        path: &str,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<BlobCredential, BlobError>;

    async fn delete(&self, path: &str, container: &str) -> Result<(), BlobError>;

    async fn download(&self, path: &str, container: &str) -> Result<Vec<u8>, BlobError>;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlobAccess {
    Read,
    Write,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlobClaims {
    pub exp: i64,
    pub container: String,
    pub path: String,
    pub access: BlobAccess,
    pub content_type: Option<String>,
}

pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    path_pattern: Regex,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_url: &str, secret: &str) -> Result<Self, BlobError> {
        let path_pattern = Regex::new(r"^[A-Za-z0-9_-]+(/[A-Za-z0-9_-]+)*(\.[A-Za-z0-9]+)?$")
            .map_err(|error| BlobError::InvalidPath(error.to_string()))?;

        Ok(LocalBlobStore {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            path_pattern,
        })
    }

    fn file_path(&self, container: &str, path: &str) -> Result<PathBuf, BlobError> {
        if !self.path_pattern.is_match(container) || container.contains('/') {
            return Err(BlobError::InvalidPath(container.to_string()));
        }
        if !self.path_pattern.is_match(path) {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(container).join(path))
    }

    fn issue(
        &self,
        container: &str,
        path: &str,
        access: BlobAccess,
        content_type: Option<&str>,
        ttl_minutes: i64,
    ) -> Result<BlobCredential, BlobError> {
        self.file_path(container, path)?;

        let expires_at = Utc::now() + Duration::minutes(ttl_minutes);
        let claims: BlobClaims = BlobClaims {
            exp: expires_at.timestamp(),
            container: container.to_string(),
            path: path.to_string(),
            access,
            content_type: content_type.map(|content_type| content_type.to_string()),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| BlobError::Credential(error.to_string()))?;

        Ok(BlobCredential {
            url: format!(
                "{}/blobs/{}/{}?token={}",
                self.public_url, container, path, token
            ),
            expires_at,
        })
    }

    /// Checks a credential presented at the blob routes against the requested
    /// object and access mode.
    pub fn verify(
        &self,
        token: &str,
        container: &str,
        path: &str,
        access: BlobAccess,
    ) -> Result<BlobClaims, BlobError> {
        let validation: Validation = Validation::new(Algorithm::HS256);
        let claims = decode::<BlobClaims>(token, &self.decoding_key, &validation)
            .map_err(|error| BlobError::Credential(error.to_string()))?
            .claims;

        if claims.container != container || claims.path != path || claims.access != access {
            debug!("credential for {}/{} presented for {}/{}", claims.container, claims.path, container, path);
            return Err(BlobError::Credential("SCOPE_MISMATCH".to_string()));
        }
        Ok(claims)
    }

    pub async fn write(&self, path: &str, container: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let file_path = self.file_path(container, path)?;
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(file_path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn issue_upload_credential(
        &self,
        path: &str,
        content_type: &str,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<BlobCredential, BlobError> {
        self.issue(
            container,
            path,
            BlobAccess::Write,
            Some(content_type),
            ttl_minutes,
        )
    }

    async fn size(&self, path: &str, container: &str) -> Result<Option<u64>, BlobError> {
        let file_path = self.file_path(container, path)?;
        match tokio::fs::metadata(file_path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn issue_read_credential(
        &self,
        path: &str,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<BlobCredential, BlobError> {
        self.issue(container, path, BlobAccess::Read, None, ttl_minutes)
    }

    async fn delete(&self, path: &str, container: &str) -> Result<(), BlobError> {
        let file_path = self.file_path(container, path)?;
        match tokio::fs::remove_file(file_path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn download(&self, path: &str, container: &str) -> Result<Vec<u8>, BlobError> {
        let file_path = self.file_path(container, path)?;
        match tokio::fs::read(file_path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(format!("{}/{}", container, path)))
            }
            Err(error) => Err(error.into()),
        }
    }
}
